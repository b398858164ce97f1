use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::DomainError;

/// Intercambio pregunta/respuesta dentro de una sesión.
///
/// `scenario_id` es una referencia opcional sin cascada: si el escenario se
/// borra, la interacción sobrevive con la referencia a NULL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingInteraction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub question: String,
    pub user_response: String,
    pub ai_evaluation: Option<Value>,
    pub feedback: Option<String>,
    pub interaction_order: i32,
    pub response_time: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInteraction {
    pub session_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub question: String,
    pub user_response: String,
    pub ai_evaluation: Option<Value>,
    pub feedback: Option<String>,
    pub interaction_order: i32,
    pub response_time: Option<i32>,
}

impl NewInteraction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(session_id: Uuid,
               scenario_id: Option<Uuid>,
               question: &str,
               user_response: &str,
               ai_evaluation: Option<Value>,
               feedback: Option<&str>,
               interaction_order: i32,
               response_time: Option<i32>)
               -> Result<Self, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::ValidationError("interaction question must not be empty".to_string()));
        }
        if interaction_order < 0 {
            return Err(DomainError::ValidationError(format!(
                "interaction order must be non-negative, got {interaction_order}"
            )));
        }
        Ok(NewInteraction { session_id,
                            scenario_id,
                            question: question.to_string(),
                            user_response: user_response.to_string(),
                            ai_evaluation,
                            feedback: feedback.map(|f| f.to_string()),
                            interaction_order,
                            response_time })
    }
}
