use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::StoreSize;
use crate::DomainError;

/// Fila persistida de una tienda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub region: Option<String>,
    pub manager_id: Option<Uuid>,
    pub store_size: StoreSize,
    pub target_metrics: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Datos de alta de una tienda. El gerente se asigna después con
/// `assign_manager`, porque la referencia tiendas <-> usuarios es circular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub location: String,
    pub region: Option<String>,
    pub store_size: StoreSize,
    pub target_metrics: Option<Value>,
}

impl NewStore {
    pub fn new(name: &str,
               location: &str,
               region: Option<&str>,
               store_size: StoreSize,
               target_metrics: Option<Value>)
               -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("store name must not be empty".to_string()));
        }
        if location.trim().is_empty() {
            return Err(DomainError::ValidationError("store location must not be empty".to_string()));
        }
        Ok(NewStore { name: name.to_string(),
                      location: location.to_string(),
                      region: region.map(|r| r.to_string()),
                      store_size,
                      target_metrics })
    }
}
