use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::DifficultyLevel;
use crate::DomainError;

/// Escenario de entrenamiento asociado a una persona.
///
/// `difficulty_level` se guarda como texto tal cual lo escribió el caller
/// ("Easy" y "easy" son equivalentes); la restricción es case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingScenario {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub difficulty_level: String,
    pub kpi_focus: Option<String>,
    pub scenario_data: Value,
    pub response_guidelines: Option<Value>,
    pub evaluation_criteria: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TrainingScenario {
    /// Dificultad tipada del escenario.
    pub fn difficulty(&self) -> Result<DifficultyLevel, DomainError> {
        DifficultyLevel::from_str(&self.difficulty_level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScenario {
    pub persona_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub difficulty_level: String,
    pub kpi_focus: Option<String>,
    pub scenario_data: Value,
    pub response_guidelines: Option<Value>,
    pub evaluation_criteria: Option<Value>,
}

impl NewScenario {
    pub fn new(persona_id: Uuid,
               title: &str,
               description: Option<&str>,
               difficulty_level: &str,
               kpi_focus: Option<&str>,
               scenario_data: Value,
               response_guidelines: Option<Value>,
               evaluation_criteria: Option<Value>)
               -> Result<Self, DomainError> {
        if title.trim().is_empty() {
            return Err(DomainError::ValidationError("scenario title must not be empty".to_string()));
        }
        // Valida pertenencia al conjunto cerrado conservando la grafía original.
        DifficultyLevel::from_str(difficulty_level)?;
        Ok(NewScenario { persona_id,
                         title: title.to_string(),
                         description: description.map(|d| d.to_string()),
                         difficulty_level: difficulty_level.to_string(),
                         kpi_focus: kpi_focus.map(|k| k.to_string()),
                         scenario_data,
                         response_guidelines,
                         evaluation_criteria })
    }
}
