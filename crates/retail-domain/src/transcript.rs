use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::DomainError;

/// Transcripción completa de una sesión, como JSON opaco más un resumen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTranscript {
    pub id: Uuid,
    pub session_id: Uuid,
    pub full_transcript: Value,
    pub summary: Option<String>,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTranscript {
    pub session_id: Uuid,
    pub full_transcript: Value,
    pub summary: Option<String>,
    pub word_count: i32,
}

impl NewTranscript {
    pub fn new(session_id: Uuid,
               full_transcript: Value,
               summary: Option<&str>,
               word_count: i32)
               -> Result<Self, DomainError> {
        if word_count < 0 {
            return Err(DomainError::ValidationError(format!(
                "word count must be non-negative, got {word_count}"
            )));
        }
        Ok(NewTranscript { session_id,
                           full_transcript,
                           summary: summary.map(|s| s.to_string()),
                           word_count })
    }
}
