//! Taxonomía de errores de almacenamiento, compartida por todos los
//! backends. Cada variante se corresponde con una clase de error nativa del
//! motor relacional; ningún backend debe tragarse una violación.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not null violation: {0}")]
    NotNullViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown storage error: {0}")]
    Unknown(String),
}

impl StorageError {
    /// Violaciones declarativas del esquema (clave duplicada, conjunto
    /// cerrado, referencia, NOT NULL). Nunca tiene sentido reintentarlas.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self,
                 StorageError::UniqueViolation(_)
                 | StorageError::CheckViolation(_)
                 | StorageError::ForeignKeyViolation(_)
                 | StorageError::NotNullViolation(_))
    }
}
