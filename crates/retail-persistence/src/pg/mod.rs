//! Implementación Postgres (Diesel) de los repositorios de `retail-core`.
//!
//! Objetivo general del módulo:
//! - Proveer una capa de persistencia durable (Postgres) con paridad 1:1
//!   respecto al backend en memoria: mismas variantes de error ante las
//!   mismas escrituras inválidas, mismas acciones referenciales.
//! - Dejar que el motor haga su trabajo: unicidades, checks, claves
//!   foráneas, cascadas, el trigger de `updated_at` y la política RLS viven
//!   en la migración; aquí sólo se mapean sus errores.
//! - Aislar el mapeo dominio <-> filas de DB del resto del workspace.
//!
//! Manejo de errores transitorios: reintento con backoff corto en cada
//! unidad de trabajo; las violaciones de constraint nunca se reintentan.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use retail_core::policy::Caller;
use retail_core::repo::{CatalogRepository, DirectoryRepository, KpiRepository, SessionRepository};
use retail_core::StorageError;
use retail_domain::{DifficultyLevel, KpiRecord, NewInteraction, NewKpiRecord, NewPersona, NewScenario, NewSession,
                    NewStore, NewTranscript, NewUser, Persona, SessionStatus, Store, StoreSize, TrainingInteraction,
                    TrainingScenario, TrainingSession, TrainingTranscript, User, UserChanges, UserRole};

use crate::error::map_diesel_error;
use crate::migrations::run_pending_migrations;
use crate::schema::{kpi_data, personas, stores, training_interactions, training_scenarios, training_sessions,
                    training_transcripts, users};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo se corre automáticamente el set de migraciones pendientes
/// (una sola vez, en el primer checkout).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción / tests de integración) o
/// simularlo en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, StorageError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &StorageError) -> bool {
    match e {
        StorageError::SerializationConflict => true,
        StorageError::TransientIo(_) => true,
        // Algunos mensajes de desconexión pueden llegar como Unknown con
        // texto; best-effort sin acoplar a SQLSTATE.
        StorageError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff lineal pequeño (hasta 3 intentos).
/// No altera semántica de negocio; sólo repite la unidad de trabajo.
fn with_retry<F, T>(mut f: F) -> Result<T, StorageError>
    where F: FnMut() -> Result<T, StorageError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Propaga la identidad del caller al setting `app.current_user_id`,
/// acotado a la transacción en curso. Es la misma identidad que evalúa la
/// política RLS de la tabla `users` para roles restringidos.
fn apply_rls_identity(conn: &mut PgConnection, caller: &Caller) -> QueryResult<()> {
    if let Some(uid) = caller.rls_identity() {
        diesel::sql_query("SELECT set_config('app.current_user_id', $1, true)")
            .bind::<diesel::sql_types::Text, _>(uid.to_string())
            .execute(conn)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filas Diesel y conversiones fila <-> dominio
// ---------------------------------------------------------------------------

#[derive(Queryable, Debug)]
pub struct StoreRow {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub region: Option<String>,
    pub manager_id: Option<Uuid>,
    pub store_size: String,
    pub target_metrics: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = stores)]
struct NewStoreRow<'a> {
    name: &'a str,
    location: &'a str,
    region: Option<&'a str>,
    store_size: &'a str,
    target_metrics: Option<&'a Value>,
}

fn store_from_row(row: StoreRow) -> Result<Store, StorageError> {
    let store_size = StoreSize::from_str(&row.store_size)
        .map_err(|e| StorageError::Unknown(format!("stores.store_size: {e}")))?;
    Ok(Store { id: row.id,
               name: row.name,
               location: row.location,
               region: row.region,
               manager_id: row.manager_id,
               store_size,
               target_metrics: row.target_metrics,
               is_active: row.is_active,
               created_at: row.created_at })
}

#[derive(Queryable, Debug)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub store_id: Option<Uuid>,
    pub experience_level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    email: &'a str,
    password_hash: &'a str,
    role: &'a str,
    store_id: Option<Uuid>,
    experience_level: i32,
}

/// Changeset parcial de usuario. `updated_at` se envía tal cual llegó del
/// caller; el trigger `users_set_updated_at` lo pisa en el mismo UPDATE.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = users)]
struct UserChangesRow<'a> {
    password_hash: Option<&'a str>,
    role: Option<&'a str>,
    store_id: Option<Option<Uuid>>,
    experience_level: Option<i32>,
    is_active: Option<bool>,
    updated_at: Option<DateTime<Utc>>,
}

fn user_from_row(row: UserRow) -> Result<User, StorageError> {
    let role = UserRole::from_str(&row.role).map_err(|e| StorageError::Unknown(format!("users.role: {e}")))?;
    Ok(User { id: row.id,
              email: row.email,
              password_hash: row.password_hash,
              role,
              store_id: row.store_id,
              experience_level: row.experience_level,
              is_active: row.is_active,
              created_at: row.created_at,
              updated_at: row.updated_at })
}

#[derive(Queryable, Debug)]
pub struct PersonaRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub profile: Value,
    pub scenarios: Option<Value>,
    pub difficulty_mapping: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = personas)]
struct NewPersonaRow<'a> {
    name: &'a str,
    description: Option<&'a str>,
    profile: &'a Value,
    scenarios: Option<&'a Value>,
    difficulty_mapping: Option<&'a Value>,
}

impl From<PersonaRow> for Persona {
    fn from(row: PersonaRow) -> Self {
        Persona { id: row.id,
                  name: row.name,
                  description: row.description,
                  profile: row.profile,
                  scenarios: row.scenarios,
                  difficulty_mapping: row.difficulty_mapping,
                  is_active: row.is_active,
                  created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
pub struct ScenarioRow {
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

#[derive(Insertable, Debug)]
#[diesel(table_name = training_scenarios)]
struct NewScenarioRow<'a> {
    persona_id: Uuid,
    title: &'a str,
    description: Option<&'a str>,
    difficulty_level: &'a str,
    kpi_focus: Option<&'a str>,
    scenario_data: &'a Value,
    response_guidelines: Option<&'a Value>,
    evaluation_criteria: Option<&'a Value>,
}

impl From<ScenarioRow> for TrainingScenario {
    fn from(row: ScenarioRow) -> Self {
        TrainingScenario { id: row.id,
                           persona_id: row.persona_id,
                           title: row.title,
                           description: row.description,
                           difficulty_level: row.difficulty_level,
                           kpi_focus: row.kpi_focus,
                           scenario_data: row.scenario_data,
                           response_guidelines: row.response_guidelines,
                           evaluation_criteria: row.evaluation_criteria,
                           is_active: row.is_active,
                           created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub persona_type: String,
    pub difficulty_level: String,
    pub scenario_data: Option<Value>,
    pub responses: Option<Value>,
    pub scores: Option<Value>,
    pub completion_time: Option<i32>,
    pub session_status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = training_sessions)]
struct NewSessionRow<'a> {
    user_id: Uuid,
    persona_type: &'a str,
    difficulty_level: &'a str,
    scenario_data: Option<&'a Value>,
}

/// Changeset de cierre de sesión: sólo toca los payloads presentes.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = training_sessions)]
struct SessionCloseRow<'a> {
    responses: Option<&'a Value>,
    scores: Option<&'a Value>,
    completion_time: Option<i32>,
    session_status: &'a str,
    completed_at: DateTime<Utc>,
}

fn session_from_row(row: SessionRow) -> Result<TrainingSession, StorageError> {
    let session_status = SessionStatus::from_str(&row.session_status)
        .map_err(|e| StorageError::Unknown(format!("training_sessions.session_status: {e}")))?;
    Ok(TrainingSession { id: row.id,
                         user_id: row.user_id,
                         persona_type: row.persona_type,
                         difficulty_level: row.difficulty_level,
                         scenario_data: row.scenario_data,
                         responses: row.responses,
                         scores: row.scores,
                         completion_time: row.completion_time,
                         session_status,
                         started_at: row.started_at,
                         completed_at: row.completed_at,
                         created_at: row.created_at })
}

#[derive(Queryable, Debug)]
pub struct InteractionRow {
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

#[derive(Insertable, Debug)]
#[diesel(table_name = training_interactions)]
struct NewInteractionRow<'a> {
    session_id: Uuid,
    scenario_id: Option<Uuid>,
    question: &'a str,
    user_response: &'a str,
    ai_evaluation: Option<&'a Value>,
    feedback: Option<&'a str>,
    interaction_order: i32,
    response_time: Option<i32>,
}

impl From<InteractionRow> for TrainingInteraction {
    fn from(row: InteractionRow) -> Self {
        TrainingInteraction { id: row.id,
                              session_id: row.session_id,
                              scenario_id: row.scenario_id,
                              question: row.question,
                              user_response: row.user_response,
                              ai_evaluation: row.ai_evaluation,
                              feedback: row.feedback,
                              interaction_order: row.interaction_order,
                              response_time: row.response_time,
                              created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
pub struct TranscriptRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub full_transcript: Value,
    pub summary: Option<String>,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = training_transcripts)]
struct NewTranscriptRow<'a> {
    session_id: Uuid,
    full_transcript: &'a Value,
    summary: Option<&'a str>,
    word_count: i32,
}

impl From<TranscriptRow> for TrainingTranscript {
    fn from(row: TranscriptRow) -> Self {
        TrainingTranscript { id: row.id,
                             session_id: row.session_id,
                             full_transcript: row.full_transcript,
                             summary: row.summary,
                             word_count: row.word_count,
                             created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
pub struct KpiRow {
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

#[derive(Insertable, Debug)]
#[diesel(table_name = kpi_data)]
struct NewKpiRow {
    user_id: Uuid,
    store_id: Uuid,
    date: NaiveDate,
    conversion_rate: Option<f64>,
    avg_bill_value: Option<f64>,
    footfall: Option<i32>,
    sales_target: Option<f64>,
    actual_sales: Option<f64>,
    return_rate: Option<f64>,
    customer_satisfaction: Option<f64>,
}

impl From<KpiRow> for KpiRecord {
    fn from(row: KpiRow) -> Self {
        KpiRecord { id: row.id,
                    user_id: row.user_id,
                    store_id: row.store_id,
                    date: row.date,
                    conversion_rate: row.conversion_rate,
                    avg_bill_value: row.avg_bill_value,
                    footfall: row.footfall,
                    sales_target: row.sales_target,
                    actual_sales: row.actual_sales,
                    return_rate: row.return_rate,
                    customer_satisfaction: row.customer_satisfaction,
                    created_at: row.created_at }
    }
}

/// Resultado interno de un UPDATE condicionado por estado.
enum CloseOutcome {
    Done(SessionRow),
    Terminal(String),
    Missing,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend Postgres de los cuatro repositorios.
pub struct PgBackend<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgBackend<P> {
    /// Crea un `PgBackend` a partir de un `ConnectionProvider`
    /// (generalmente `PoolProvider`).
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> DirectoryRepository for PgBackend<P> {
    fn create_store(&self, store: NewStore) -> Result<Store, StorageError> {
        let row: StoreRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(stores::table)
                .values(NewStoreRow { name: &store.name,
                                      location: &store.location,
                                      region: store.region.as_deref(),
                                      store_size: store.store_size.as_str(),
                                      target_metrics: store.target_metrics.as_ref() })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("create_store id={} name={}", row.id, row.name);
        store_from_row(row)
    }

    fn get_store(&self, id: Uuid) -> Result<Store, StorageError> {
        let row: Option<StoreRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            stores::table.filter(stores::id.eq(id))
                         .first(&mut conn)
                         .optional()
                         .map_err(map_diesel_error)
        })?;
        row.map(store_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn list_stores(&self) -> Result<Vec<Store>, StorageError> {
        let rows: Vec<StoreRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            stores::table.order(stores::name.asc())
                         .load(&mut conn)
                         .map_err(map_diesel_error)
        })?;
        rows.into_iter().map(store_from_row).collect()
    }

    fn assign_manager(&self, store_id: Uuid, user_id: Uuid) -> Result<Store, StorageError> {
        let row: Option<StoreRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::update(stores::table.filter(stores::id.eq(store_id)))
                .set(stores::manager_id.eq(Some(user_id)))
                .get_result(&mut conn)
                .optional()
                .map_err(map_diesel_error)
        })?;
        debug!("assign_manager store_id={store_id} user_id={user_id}");
        row.map(store_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn delete_store(&self, id: Uuid) -> Result<(), StorageError> {
        // SET NULL sobre users.store_id y RESTRICT frente a kpi_data los
        // aplica el motor.
        let affected = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(stores::table.filter(stores::id.eq(id)))
                .execute(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("delete_store id={id} affected={affected}");
        if affected == 0 { Err(StorageError::NotFound) } else { Ok(()) }
    }

    fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let row: UserRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(users::table)
                .values(NewUserRow { email: &user.email,
                                     password_hash: &user.password_hash,
                                     role: user.role.as_str(),
                                     store_id: user.store_id,
                                     experience_level: user.experience_level })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("create_user id={} email={}", row.id, row.email);
        user_from_row(row)
    }

    fn get_user(&self, caller: &Caller, id: Uuid) -> Result<User, StorageError> {
        // Misma semántica que una fila filtrada por RLS: fuera de la
        // política la fila no existe.
        if !caller.may_access_user_row(id) {
            return Err(StorageError::NotFound);
        }
        let row: Option<UserRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_only()
                .run(|tx| {
                    apply_rls_identity(tx, caller)?;
                    users::table.filter(users::id.eq(id)).first(tx).optional()
                })
                .map_err(map_diesel_error)
        })?;
        row.map(user_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let row: Option<UserRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            users::table.filter(users::email.eq(email))
                        .first(&mut conn)
                        .optional()
                        .map_err(map_diesel_error)
        })?;
        row.map(user_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn list_users_for_store(&self, store_id: Uuid) -> Result<Vec<User>, StorageError> {
        let rows: Vec<UserRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            users::table.filter(users::store_id.eq(Some(store_id)))
                        .order(users::email.asc())
                        .load(&mut conn)
                        .map_err(map_diesel_error)
        })?;
        rows.into_iter().map(user_from_row).collect()
    }

    fn update_user(&self, caller: &Caller, id: Uuid, changes: UserChanges) -> Result<User, StorageError> {
        if !caller.may_access_user_row(id) {
            return Err(StorageError::NotFound);
        }
        let row: Option<UserRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    apply_rls_identity(tx, caller)?;
                    if changes.is_empty() {
                        // UPDATE sin cambios: igual dispara el trigger.
                        diesel::update(users::table.filter(users::id.eq(id)))
                            .set(users::updated_at.eq(diesel::dsl::now))
                            .get_result(tx)
                            .optional()
                    } else {
                        diesel::update(users::table.filter(users::id.eq(id)))
                            .set(UserChangesRow { password_hash: changes.password_hash.as_deref(),
                                                  role: changes.role.map(|r| r.as_str()),
                                                  store_id: changes.store_id,
                                                  experience_level: changes.experience_level,
                                                  is_active: changes.is_active,
                                                  updated_at: changes.updated_at })
                            .get_result(tx)
                            .optional()
                    }
                })
                .map_err(map_diesel_error)
        })?;
        debug!("update_user id={id}");
        row.map(user_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        // La cascada sobre sesiones (y sus hijas) y el SET NULL sobre
        // stores.manager_id los aplica el motor; kpi_data es RESTRICT.
        let affected = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(users::table.filter(users::id.eq(id)))
                .execute(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("delete_user id={id} affected={affected}");
        if affected == 0 { Err(StorageError::NotFound) } else { Ok(()) }
    }
}

impl<P: ConnectionProvider> CatalogRepository for PgBackend<P> {
    fn create_persona(&self, persona: NewPersona) -> Result<Persona, StorageError> {
        let row: PersonaRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(personas::table)
                .values(NewPersonaRow { name: &persona.name,
                                        description: persona.description.as_deref(),
                                        profile: &persona.profile,
                                        scenarios: persona.scenarios.as_ref(),
                                        difficulty_mapping: persona.difficulty_mapping.as_ref() })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("create_persona id={} name={}", row.id, row.name);
        Ok(row.into())
    }

    fn get_persona(&self, id: Uuid) -> Result<Persona, StorageError> {
        let row: Option<PersonaRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            personas::table.filter(personas::id.eq(id))
                           .first(&mut conn)
                           .optional()
                           .map_err(map_diesel_error)
        })?;
        row.map(Persona::from).ok_or(StorageError::NotFound)
    }

    fn get_persona_by_name(&self, name: &str) -> Result<Persona, StorageError> {
        let row: Option<PersonaRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            personas::table.filter(personas::name.eq(name))
                           .first(&mut conn)
                           .optional()
                           .map_err(map_diesel_error)
        })?;
        row.map(Persona::from).ok_or(StorageError::NotFound)
    }

    fn list_personas(&self, only_active: bool) -> Result<Vec<Persona>, StorageError> {
        let rows: Vec<PersonaRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let query = personas::table.order(personas::name.asc()).into_boxed();
            let query = if only_active { query.filter(personas::is_active.eq(true)) } else { query };
            query.load(&mut conn).map_err(map_diesel_error)
        })?;
        Ok(rows.into_iter().map(Persona::from).collect())
    }

    fn delete_persona(&self, id: Uuid) -> Result<(), StorageError> {
        // CASCADE sobre training_scenarios y SET NULL sobre
        // training_interactions.scenario_id los aplica el motor.
        let affected = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(personas::table.filter(personas::id.eq(id)))
                .execute(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("delete_persona id={id} affected={affected}");
        if affected == 0 { Err(StorageError::NotFound) } else { Ok(()) }
    }

    fn create_scenario(&self, scenario: NewScenario) -> Result<TrainingScenario, StorageError> {
        let row: ScenarioRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(training_scenarios::table)
                .values(NewScenarioRow { persona_id: scenario.persona_id,
                                         title: &scenario.title,
                                         description: scenario.description.as_deref(),
                                         difficulty_level: &scenario.difficulty_level,
                                         kpi_focus: scenario.kpi_focus.as_deref(),
                                         scenario_data: &scenario.scenario_data,
                                         response_guidelines: scenario.response_guidelines.as_ref(),
                                         evaluation_criteria: scenario.evaluation_criteria.as_ref() })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("create_scenario id={} persona_id={}", row.id, row.persona_id);
        Ok(row.into())
    }

    fn get_scenario(&self, id: Uuid) -> Result<TrainingScenario, StorageError> {
        let row: Option<ScenarioRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_scenarios::table.filter(training_scenarios::id.eq(id))
                                     .first(&mut conn)
                                     .optional()
                                     .map_err(map_diesel_error)
        })?;
        row.map(TrainingScenario::from).ok_or(StorageError::NotFound)
    }

    fn list_scenarios(&self,
                      persona_id: Uuid,
                      difficulty: Option<DifficultyLevel>)
                      -> Result<Vec<TrainingScenario>, StorageError> {
        let rows: Vec<ScenarioRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_scenarios::table.filter(training_scenarios::persona_id.eq(persona_id))
                                     .order((training_scenarios::created_at.asc(),
                                             training_scenarios::id.asc()))
                                     .load(&mut conn)
                                     .map_err(map_diesel_error)
        })?;
        // El filtro de dificultad compara contra el conjunto cerrado, no
        // contra la grafía almacenada.
        Ok(rows.into_iter()
               .map(TrainingScenario::from)
               .filter(|s| match difficulty {
                   Some(level) => s.difficulty().ok() == Some(level),
                   None => true,
               })
               .collect())
    }
}

impl<P: ConnectionProvider> SessionRepository for PgBackend<P> {
    fn start_session(&self, session: NewSession) -> Result<TrainingSession, StorageError> {
        let row: SessionRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(training_sessions::table)
                .values(NewSessionRow { user_id: session.user_id,
                                        persona_type: &session.persona_type,
                                        difficulty_level: &session.difficulty_level,
                                        scenario_data: session.scenario_data.as_ref() })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("start_session id={} user_id={}", row.id, row.user_id);
        session_from_row(row)
    }

    fn get_session(&self, id: Uuid) -> Result<TrainingSession, StorageError> {
        let row: Option<SessionRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_sessions::table.filter(training_sessions::id.eq(id))
                                    .first(&mut conn)
                                    .optional()
                                    .map_err(map_diesel_error)
        })?;
        row.map(session_from_row).transpose()?.ok_or(StorageError::NotFound)
    }

    fn list_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TrainingSession>, StorageError> {
        let rows: Vec<SessionRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_sessions::table.filter(training_sessions::user_id.eq(user_id))
                                    .order((training_sessions::started_at.asc(), training_sessions::id.asc()))
                                    .load(&mut conn)
                                    .map_err(map_diesel_error)
        })?;
        rows.into_iter().map(session_from_row).collect()
    }

    fn complete_session(&self,
                        id: Uuid,
                        responses: Option<Value>,
                        scores: Option<Value>,
                        completion_time: Option<i32>)
                        -> Result<TrainingSession, StorageError> {
        self.close_session(id, SessionStatus::Completed, responses, scores, completion_time)
    }

    fn abandon_session(&self, id: Uuid) -> Result<TrainingSession, StorageError> {
        self.close_session(id, SessionStatus::Abandoned, None, None, None)
    }

    fn delete_session(&self, id: Uuid) -> Result<(), StorageError> {
        let affected = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(training_sessions::table.filter(training_sessions::id.eq(id)))
                .execute(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("delete_session id={id} affected={affected}");
        if affected == 0 { Err(StorageError::NotFound) } else { Ok(()) }
    }

    fn record_interaction(&self, interaction: NewInteraction) -> Result<TrainingInteraction, StorageError> {
        let row: InteractionRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(training_interactions::table)
                .values(NewInteractionRow { session_id: interaction.session_id,
                                            scenario_id: interaction.scenario_id,
                                            question: &interaction.question,
                                            user_response: &interaction.user_response,
                                            ai_evaluation: interaction.ai_evaluation.as_ref(),
                                            feedback: interaction.feedback.as_deref(),
                                            interaction_order: interaction.interaction_order,
                                            response_time: interaction.response_time })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("record_interaction id={} session_id={}", row.id, row.session_id);
        Ok(row.into())
    }

    fn list_interactions(&self, session_id: Uuid) -> Result<Vec<TrainingInteraction>, StorageError> {
        let rows: Vec<InteractionRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_interactions::table.filter(training_interactions::session_id.eq(session_id))
                                        .order((training_interactions::interaction_order.asc(),
                                                training_interactions::created_at.asc()))
                                        .load(&mut conn)
                                        .map_err(map_diesel_error)
        })?;
        Ok(rows.into_iter().map(TrainingInteraction::from).collect())
    }

    fn save_transcript(&self, transcript: NewTranscript) -> Result<TrainingTranscript, StorageError> {
        let row: TranscriptRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(training_transcripts::table)
                .values(NewTranscriptRow { session_id: transcript.session_id,
                                           full_transcript: &transcript.full_transcript,
                                           summary: transcript.summary.as_deref(),
                                           word_count: transcript.word_count })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("save_transcript id={} session_id={}", row.id, row.session_id);
        Ok(row.into())
    }

    fn get_transcript_for_session(&self, session_id: Uuid) -> Result<TrainingTranscript, StorageError> {
        let row: Option<TranscriptRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            training_transcripts::table.filter(training_transcripts::session_id.eq(session_id))
                                       .order(training_transcripts::created_at.desc())
                                       .first(&mut conn)
                                       .optional()
                                       .map_err(map_diesel_error)
        })?;
        row.map(TrainingTranscript::from).ok_or(StorageError::NotFound)
    }
}

impl<P: ConnectionProvider> PgBackend<P> {
    /// Transición terminal de una sesión. El UPDATE va condicionado a
    /// `session_status = 'active'`; cero filas afectadas se desambigua
    /// entre sesión inexistente y transición inválida.
    fn close_session(&self,
                     id: Uuid,
                     target: SessionStatus,
                     responses: Option<Value>,
                     scores: Option<Value>,
                     completion_time: Option<i32>)
                     -> Result<TrainingSession, StorageError> {
        let outcome = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    let updated: Option<SessionRow> =
                        diesel::update(training_sessions::table
                                           .filter(training_sessions::id.eq(id))
                                           .filter(training_sessions::session_status
                                                       .eq(SessionStatus::Active.as_str())))
                            .set(SessionCloseRow { responses: responses.as_ref(),
                                                   scores: scores.as_ref(),
                                                   completion_time,
                                                   session_status: target.as_str(),
                                                   completed_at: Utc::now() })
                            .get_result(tx)
                            .optional()?;
                    if let Some(row) = updated {
                        return Ok(CloseOutcome::Done(row));
                    }
                    let status: Option<String> = training_sessions::table
                        .filter(training_sessions::id.eq(id))
                        .select(training_sessions::session_status)
                        .first(tx)
                        .optional()?;
                    Ok::<CloseOutcome, diesel::result::Error>(match status {
                        Some(s) => CloseOutcome::Terminal(s),
                        None => CloseOutcome::Missing,
                    })
                })
                .map_err(map_diesel_error)
        })?;
        match outcome {
            CloseOutcome::Done(row) => {
                debug!("close_session id={id} -> {}", target);
                session_from_row(row)
            }
            CloseOutcome::Terminal(status) => Err(StorageError::CheckViolation(format!(
                "training_sessions.session_status: no transition {status} -> {target}"
            ))),
            CloseOutcome::Missing => Err(StorageError::NotFound),
        }
    }
}

impl<P: ConnectionProvider> KpiRepository for PgBackend<P> {
    fn insert_kpi(&self, record: NewKpiRecord) -> Result<KpiRecord, StorageError> {
        let row: KpiRow = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(kpi_data::table)
                .values(NewKpiRow { user_id: record.user_id,
                                    store_id: record.store_id,
                                    date: record.date,
                                    conversion_rate: record.metrics.conversion_rate,
                                    avg_bill_value: record.metrics.avg_bill_value,
                                    footfall: record.metrics.footfall,
                                    sales_target: record.metrics.sales_target,
                                    actual_sales: record.metrics.actual_sales,
                                    return_rate: record.metrics.return_rate,
                                    customer_satisfaction: record.metrics.customer_satisfaction })
                .get_result(&mut conn)
                .map_err(map_diesel_error)
        })?;
        debug!("insert_kpi id={} user_id={} date={}", row.id, row.user_id, row.date);
        Ok(row.into())
    }

    fn list_kpis_for_user(&self, user_id: Uuid) -> Result<Vec<KpiRecord>, StorageError> {
        let rows: Vec<KpiRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            kpi_data::table.filter(kpi_data::user_id.eq(user_id))
                           .order((kpi_data::date.asc(), kpi_data::store_id.asc()))
                           .load(&mut conn)
                           .map_err(map_diesel_error)
        })?;
        Ok(rows.into_iter().map(KpiRecord::from).collect())
    }

    fn list_kpis_for_store(&self,
                           store_id: Uuid,
                           from: NaiveDate,
                           to: NaiveDate)
                           -> Result<Vec<KpiRecord>, StorageError> {
        let rows: Vec<KpiRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            kpi_data::table.filter(kpi_data::store_id.eq(store_id))
                           .filter(kpi_data::date.ge(from))
                           .filter(kpi_data::date.le(to))
                           .order((kpi_data::date.asc(), kpi_data::user_id.asc()))
                           .load(&mut conn)
                           .map_err(map_diesel_error)
        })?;
        Ok(rows.into_iter().map(KpiRecord::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Construcción de pools
// ---------------------------------------------------------------------------

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min_size =
///   max_size`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
/// - Devuelve `StorageError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, StorageError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| StorageError::TransientIo(format!("pool build: {e}")))?;
    // Ejecutar migraciones una sola vez al construir (primer checkout).
    {
        let mut conn = pool.get()
                           .map_err(|e| StorageError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Alias explícito para semántica clara (igual a `build_pool` actualmente).
pub fn build_pool_with_migrations(database_url: &str, min: u32, max: u32) -> Result<PgPool, StorageError> {
    build_pool(database_url, min, max)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, StorageError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
