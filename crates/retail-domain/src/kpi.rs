use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Registro diario de desempeño de un usuario en una tienda.
///
/// Invariante: como máximo un registro por tripleta (user, store, date).
/// Las métricas son opcionales porque las cargas parciales (sin objetivo de
/// ventas o sin satisfacción medida) son habituales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub date: NaiveDate,
    pub conversion_rate: Option<f64>,
    pub avg_bill_value: Option<f64>,
    pub footfall: Option<i32>,
    pub sales_target: Option<f64>,
    pub actual_sales: Option<f64>,
    pub return_rate: Option<f64>,
    pub customer_satisfaction: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiMetrics {
    pub conversion_rate: Option<f64>,
    pub avg_bill_value: Option<f64>,
    pub footfall: Option<i32>,
    pub sales_target: Option<f64>,
    pub actual_sales: Option<f64>,
    pub return_rate: Option<f64>,
    pub customer_satisfaction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKpiRecord {
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub date: NaiveDate,
    pub metrics: KpiMetrics,
}

impl NewKpiRecord {
    pub fn new(user_id: Uuid,
               store_id: Uuid,
               date: NaiveDate,
               metrics: KpiMetrics)
               -> Result<Self, DomainError> {
        if let Some(footfall) = metrics.footfall {
            if footfall < 0 {
                return Err(DomainError::ValidationError(format!("footfall must be non-negative, got {footfall}")));
            }
        }
        for (field, value) in [("conversion_rate", metrics.conversion_rate),
                               ("avg_bill_value", metrics.avg_bill_value),
                               ("sales_target", metrics.sales_target),
                               ("actual_sales", metrics.actual_sales),
                               ("return_rate", metrics.return_rate)]
        {
            if let Some(v) = value {
                if v < 0.0 || !v.is_finite() {
                    return Err(DomainError::ValidationError(format!("{field} must be a non-negative number, got {v}")));
                }
            }
        }
        Ok(NewKpiRecord { user_id, store_id, date, metrics })
    }
}
