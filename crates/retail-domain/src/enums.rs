//! Conjuntos cerrados de valores del esquema.
//! Cada enum se corresponde con un CHECK de la base de datos; parsear un
//! valor fuera del conjunto devuelve `DomainError::ValidationError`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Rol de un usuario de la plataforma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    StoreManager,
    RegionalManager,
    Trainer,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::StoreManager => "store_manager",
            UserRole::RegionalManager => "regional_manager",
            UserRole::Trainer => "trainer",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store_manager" => Ok(UserRole::StoreManager),
            "regional_manager" => Ok(UserRole::RegionalManager),
            "trainer" => Ok(UserRole::Trainer),
            "admin" => Ok(UserRole::Admin),
            other => Err(DomainError::ValidationError(format!("invalid role: {other}"))),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Categoría de tamaño de una tienda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSize {
    Small,
    Medium,
    Large,
}

impl StoreSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreSize::Small => "small",
            StoreSize::Medium => "medium",
            StoreSize::Large => "large",
        }
    }
}

impl FromStr for StoreSize {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(StoreSize::Small),
            "medium" => Ok(StoreSize::Medium),
            "large" => Ok(StoreSize::Large),
            other => Err(DomainError::ValidationError(format!("invalid store size: {other}"))),
        }
    }
}

impl fmt::Display for StoreSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Nivel de dificultad de escenarios y sesiones.
///
/// El esquema lo restringe de forma case-insensitive: "Easy", "EASY" y
/// "easy" son todos válidos y se conservan tal cual se escribieron. El
/// parseo normaliza sólo para validar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
            DifficultyLevel::Expert => "expert",
        }
    }
}

impl FromStr for DifficultyLevel {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            "expert" => Ok(DifficultyLevel::Expert),
            other => Err(DomainError::ValidationError(format!("invalid difficulty level: {other}"))),
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Estado de una sesión de entrenamiento.
///
/// Máquina de estados simple: `Active -> Completed` o `Active -> Abandoned`;
/// no hay más transiciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    /// Estados terminales: una vez alcanzados, la sesión no cambia más.
    pub fn is_terminal(&self) -> bool { !matches!(self, SessionStatus::Active) }
}

impl FromStr for SessionStatus {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(DomainError::ValidationError(format!("invalid session status: {other}"))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
