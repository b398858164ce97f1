use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::{DifficultyLevel, SessionStatus};
use crate::DomainError;

/// Sesión de entrenamiento de un usuario.
///
/// `persona_type` y `difficulty_level` son instantáneas denormalizadas, no
/// claves foráneas: la sesión conserva lo que se entrenó aunque la persona
/// o el escenario cambien después.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub persona_type: String,
    pub difficulty_level: String,
    pub scenario_data: Option<Value>,
    pub responses: Option<Value>,
    pub scores: Option<Value>,
    pub completion_time: Option<i32>,
    pub session_status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
    pub persona_type: String,
    pub difficulty_level: String,
    pub scenario_data: Option<Value>,
}

impl NewSession {
    pub fn new(user_id: Uuid,
               persona_type: &str,
               difficulty_level: &str,
               scenario_data: Option<Value>)
               -> Result<Self, DomainError> {
        if persona_type.trim().is_empty() {
            return Err(DomainError::ValidationError("persona type must not be empty".to_string()));
        }
        DifficultyLevel::from_str(difficulty_level)?;
        Ok(NewSession { user_id,
                        persona_type: persona_type.to_string(),
                        difficulty_level: difficulty_level.to_string(),
                        scenario_data })
    }
}
