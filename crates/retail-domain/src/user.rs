use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::UserRole;
use crate::DomainError;

/// Fila persistida de un usuario.
///
/// `password_hash` es un blob opaco: el hasheo y la autenticación viven en
/// otra capa. `updated_at` lo estampa el almacenamiento en cada UPDATE,
/// ignorando cualquier valor que aporte el caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub store_id: Option<Uuid>,
    pub experience_level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos de alta de un usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub store_id: Option<Uuid>,
    pub experience_level: i32,
}

impl NewUser {
    pub fn new(email: &str,
               password_hash: &str,
               role: UserRole,
               store_id: Option<Uuid>,
               experience_level: i32)
               -> Result<Self, DomainError> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(DomainError::ValidationError(format!("invalid email: {email}")));
        }
        if password_hash.is_empty() {
            return Err(DomainError::ValidationError("password hash must not be empty".to_string()));
        }
        if experience_level < 0 {
            return Err(DomainError::ValidationError(format!(
                "experience level must be non-negative, got {experience_level}"
            )));
        }
        Ok(NewUser { email: email.to_string(),
                     password_hash: password_hash.to_string(),
                     role,
                     store_id,
                     experience_level })
    }
}

/// Cambios parciales sobre un usuario.
///
/// `store_id` usa doble Option: `None` no toca la columna, `Some(None)` la
/// pone a NULL. `updated_at` se acepta pero el almacenamiento siempre lo
/// sobreescribe con la hora del UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserChanges {
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub store_id: Option<Option<Uuid>>,
    pub experience_level: Option<i32>,
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.password_hash.is_none()
        && self.role.is_none()
        && self.store_id.is_none()
        && self.experience_level.is_none()
        && self.is_active.is_none()
        && self.updated_at.is_none()
    }
}
