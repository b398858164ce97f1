//! Contratos de repositorio que implementa cada backend.
//!
//! Un trait por área del modelo: directorio (tiendas y usuarios), catálogo
//! (personas y escenarios), sesiones (con interacciones y transcripciones)
//! y KPI. Toda la superficie es lectura/escritura relacional estándar; la
//! lógica de negocio (orquestación de sesiones, evaluación, cómputo de KPI)
//! queda fuera de esta capa.

use chrono::NaiveDate;
use retail_domain::{KpiRecord, NewInteraction, NewKpiRecord, NewPersona, NewScenario, NewSession, NewStore,
                    NewTranscript, NewUser, Persona, Store, TrainingInteraction, TrainingScenario, TrainingSession,
                    TrainingTranscript, User, UserChanges};
use retail_domain::DifficultyLevel;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::policy::Caller;

/// Tiendas y usuarios.
///
/// Las operaciones por fila sobre usuarios (`get_user`, `update_user`)
/// pasan por la política de acceso y reciben un `Caller`; las búsquedas de
/// servicio (por email, listados) no, igual que una consulta con service
/// key frente a RLS.
pub trait DirectoryRepository {
    fn create_store(&self, store: NewStore) -> Result<Store, StorageError>;
    fn get_store(&self, id: Uuid) -> Result<Store, StorageError>;
    fn list_stores(&self) -> Result<Vec<Store>, StorageError>;
    /// Cierra el ciclo tiendas <-> usuarios: asigna el gerente una vez que
    /// ambas filas existen.
    fn assign_manager(&self, store_id: Uuid, user_id: Uuid) -> Result<Store, StorageError>;
    /// Borrado sin cascada: pone a NULL `users.store_id`, pero falla con
    /// violación de clave foránea si existen registros KPI de la tienda.
    fn delete_store(&self, id: Uuid) -> Result<(), StorageError>;

    fn create_user(&self, user: NewUser) -> Result<User, StorageError>;
    fn get_user(&self, caller: &Caller, id: Uuid) -> Result<User, StorageError>;
    fn get_user_by_email(&self, email: &str) -> Result<User, StorageError>;
    fn list_users_for_store(&self, store_id: Uuid) -> Result<Vec<User>, StorageError>;
    /// Update parcial. El backend estampa `updated_at` con la hora del
    /// UPDATE, ignorando cualquier valor presente en `changes`.
    fn update_user(&self, caller: &Caller, id: Uuid, changes: UserChanges) -> Result<User, StorageError>;
    /// Cascada sobre sesiones (y transitivamente interacciones y
    /// transcripciones); falla si el usuario tiene registros KPI.
    fn delete_user(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Personas y sus escenarios de entrenamiento.
pub trait CatalogRepository {
    fn create_persona(&self, persona: NewPersona) -> Result<Persona, StorageError>;
    fn get_persona(&self, id: Uuid) -> Result<Persona, StorageError>;
    fn get_persona_by_name(&self, name: &str) -> Result<Persona, StorageError>;
    fn list_personas(&self, only_active: bool) -> Result<Vec<Persona>, StorageError>;
    /// Borra la persona y, en cascada, todos sus escenarios.
    fn delete_persona(&self, id: Uuid) -> Result<(), StorageError>;

    fn create_scenario(&self, scenario: NewScenario) -> Result<TrainingScenario, StorageError>;
    fn get_scenario(&self, id: Uuid) -> Result<TrainingScenario, StorageError>;
    fn list_scenarios(&self,
                      persona_id: Uuid,
                      difficulty: Option<DifficultyLevel>)
                      -> Result<Vec<TrainingScenario>, StorageError>;
}

/// Sesiones de entrenamiento con sus interacciones y transcripciones.
pub trait SessionRepository {
    /// Alta con estado por defecto `active` y `started_at` en la hora
    /// actual.
    fn start_session(&self, session: NewSession) -> Result<TrainingSession, StorageError>;
    fn get_session(&self, id: Uuid) -> Result<TrainingSession, StorageError>;
    fn list_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TrainingSession>, StorageError>;
    /// Transición `active -> completed`; estampa `completed_at`. Sobre una
    /// sesión ya terminal devuelve `CheckViolation`.
    fn complete_session(&self,
                        id: Uuid,
                        responses: Option<Value>,
                        scores: Option<Value>,
                        completion_time: Option<i32>)
                        -> Result<TrainingSession, StorageError>;
    /// Transición `active -> abandoned`.
    fn abandon_session(&self, id: Uuid) -> Result<TrainingSession, StorageError>;
    /// Cascada sobre interacciones y transcripciones; el usuario padre no
    /// se toca.
    fn delete_session(&self, id: Uuid) -> Result<(), StorageError>;

    fn record_interaction(&self, interaction: NewInteraction) -> Result<TrainingInteraction, StorageError>;
    /// Interacciones de la sesión ordenadas por `interaction_order`.
    fn list_interactions(&self, session_id: Uuid) -> Result<Vec<TrainingInteraction>, StorageError>;

    fn save_transcript(&self, transcript: NewTranscript) -> Result<TrainingTranscript, StorageError>;
    /// La transcripción más reciente de la sesión.
    fn get_transcript_for_session(&self, session_id: Uuid) -> Result<TrainingTranscript, StorageError>;
}

/// Registros KPI diarios.
pub trait KpiRepository {
    /// Alta sujeta a la unicidad de la tripleta (user, store, date).
    fn insert_kpi(&self, record: NewKpiRecord) -> Result<KpiRecord, StorageError>;
    fn list_kpis_for_user(&self, user_id: Uuid) -> Result<Vec<KpiRecord>, StorageError>;
    fn list_kpis_for_store(&self,
                           store_id: Uuid,
                           from: NaiveDate,
                           to: NaiveDate)
                           -> Result<Vec<KpiRecord>, StorageError>;
}
