//! Backend relacional en memoria.
//!
//! Objetivo: paridad 1:1 con el esquema Postgres, aplicada a mano. Las
//! mismas escrituras que el motor rechazaría (clave duplicada, valor fuera
//! del conjunto cerrado, referencia inexistente) fallan aquí con la misma
//! variante de `StorageError`; las mismas acciones referenciales (cascada,
//! SET NULL, RESTRICT) se ejecutan al borrar; los mismos valores por
//! defecto (id generado, flags activos, marcas temporales) se materializan
//! al insertar. Sirve para tests rápidos y prototipos sin base de datos.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::debug;
use retail_domain::{DifficultyLevel, KpiRecord, NewInteraction, NewKpiRecord, NewPersona, NewScenario, NewSession,
                    NewStore, NewTranscript, NewUser, Persona, SessionStatus, Store, TrainingInteraction,
                    TrainingScenario, TrainingSession, TrainingTranscript, User, UserChanges};
use serde_json::Value;
use uuid::Uuid;

use crate::audit;
use crate::errors::StorageError;
use crate::policy::Caller;
use crate::repo::{CatalogRepository, DirectoryRepository, KpiRepository, SessionRepository};

#[derive(Default)]
struct Tables {
    stores: BTreeMap<Uuid, Store>,
    users: BTreeMap<Uuid, User>,
    personas: BTreeMap<Uuid, Persona>,
    scenarios: BTreeMap<Uuid, TrainingScenario>,
    sessions: BTreeMap<Uuid, TrainingSession>,
    interactions: BTreeMap<Uuid, TrainingInteraction>,
    transcripts: BTreeMap<Uuid, TrainingTranscript>,
    kpi_data: BTreeMap<Uuid, KpiRecord>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }

    fn persona_name_taken(&self, name: &str) -> bool {
        self.personas.values().any(|p| p.name == name)
    }

    fn kpi_triple_taken(&self, user_id: Uuid, store_id: Uuid, date: chrono::NaiveDate) -> bool {
        self.kpi_data
            .values()
            .any(|k| k.user_id == user_id && k.store_id == store_id && k.date == date)
    }

    fn require_store(&self, id: Uuid) -> Result<(), StorageError> {
        if self.stores.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::ForeignKeyViolation(format!("stores({id})")))
        }
    }

    fn require_user(&self, id: Uuid) -> Result<(), StorageError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::ForeignKeyViolation(format!("users({id})")))
        }
    }

    fn require_persona(&self, id: Uuid) -> Result<(), StorageError> {
        if self.personas.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::ForeignKeyViolation(format!("personas({id})")))
        }
    }

    fn require_session(&self, id: Uuid) -> Result<(), StorageError> {
        if self.sessions.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::ForeignKeyViolation(format!("training_sessions({id})")))
        }
    }

    fn require_scenario(&self, id: Uuid) -> Result<(), StorageError> {
        if self.scenarios.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::ForeignKeyViolation(format!("training_scenarios({id})")))
        }
    }
}

/// Valida un texto de dificultad contra el conjunto cerrado, como haría el
/// CHECK case-insensitive de la tabla correspondiente.
fn check_difficulty(table: &str, value: &str) -> Result<(), StorageError> {
    DifficultyLevel::from_str(value)
        .map(|_| ())
        .map_err(|_| StorageError::CheckViolation(format!("{table}.difficulty_level: {value}")))
}

fn persona_row(p: NewPersona) -> Persona {
    Persona { id: Uuid::new_v4(),
              name: p.name,
              description: p.description,
              profile: p.profile,
              scenarios: p.scenarios,
              difficulty_mapping: p.difficulty_mapping,
              is_active: true,
              created_at: Utc::now() }
}

pub struct MemoryBackend {
    inner: RwLock<Tables>,
}

impl MemoryBackend {
    /// Backend vacío salvo por las tres personas de referencia, igual que
    /// una base recién migrada.
    pub fn new() -> Self {
        let backend = MemoryBackend { inner: RwLock::new(Tables::default()) };
        if let Ok(mut tables) = backend.inner.write() {
            for seed in retail_domain::seed_personas() {
                let row = persona_row(seed);
                tables.personas.insert(row.id, row);
            }
        }
        backend
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::TransientIo("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::TransientIo("memory backend lock poisoned".to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryRepository for MemoryBackend {
    fn create_store(&self, store: NewStore) -> Result<Store, StorageError> {
        let mut tables = self.write()?;
        let row = Store { id: Uuid::new_v4(),
                          name: store.name,
                          location: store.location,
                          region: store.region,
                          manager_id: None,
                          store_size: store.store_size,
                          target_metrics: store.target_metrics,
                          is_active: true,
                          created_at: Utc::now() };
        debug!("create_store id={} name={}", row.id, row.name);
        tables.stores.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_store(&self, id: Uuid) -> Result<Store, StorageError> {
        self.read()?.stores.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    fn list_stores(&self) -> Result<Vec<Store>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<Store> = tables.stores.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn assign_manager(&self, store_id: Uuid, user_id: Uuid) -> Result<Store, StorageError> {
        let mut tables = self.write()?;
        tables.require_user(user_id)?;
        let store = tables.stores.get_mut(&store_id).ok_or(StorageError::NotFound)?;
        store.manager_id = Some(user_id);
        Ok(store.clone())
    }

    fn delete_store(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.stores.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        // kpi_data.store_id es ON DELETE RESTRICT
        if tables.kpi_data.values().any(|k| k.store_id == id) {
            return Err(StorageError::ForeignKeyViolation(format!("kpi_data.store_id -> stores({id})")));
        }
        // users.store_id es ON DELETE SET NULL
        for user in tables.users.values_mut() {
            if user.store_id == Some(id) {
                user.store_id = None;
            }
        }
        tables.stores.remove(&id);
        debug!("delete_store id={id}");
        Ok(())
    }

    fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let mut tables = self.write()?;
        if tables.email_taken(&user.email) {
            return Err(StorageError::UniqueViolation(format!("users.email: {}", user.email)));
        }
        if let Some(store_id) = user.store_id {
            tables.require_store(store_id)?;
        }
        let now = Utc::now();
        let row = User { id: Uuid::new_v4(),
                         email: user.email,
                         password_hash: user.password_hash,
                         role: user.role,
                         store_id: user.store_id,
                         experience_level: user.experience_level,
                         is_active: true,
                         created_at: now,
                         updated_at: now };
        debug!("create_user id={} email={}", row.id, row.email);
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_user(&self, caller: &Caller, id: Uuid) -> Result<User, StorageError> {
        let tables = self.read()?;
        // Una fila fuera de la política se comporta como inexistente,
        // igual que una fila filtrada por RLS.
        match tables.users.get(&id) {
            Some(row) if caller.may_access_user_row(row.id) => Ok(row.clone()),
            _ => Err(StorageError::NotFound),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let tables = self.read()?;
        tables.users
              .values()
              .find(|u| u.email == email)
              .cloned()
              .ok_or(StorageError::NotFound)
    }

    fn list_users_for_store(&self, store_id: Uuid) -> Result<Vec<User>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<User> = tables.users
                                        .values()
                                        .filter(|u| u.store_id == Some(store_id))
                                        .cloned()
                                        .collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(rows)
    }

    fn update_user(&self, caller: &Caller, id: Uuid, changes: UserChanges) -> Result<User, StorageError> {
        let mut tables = self.write()?;
        match tables.users.get(&id) {
            Some(row) if caller.may_access_user_row(row.id) => {}
            _ => return Err(StorageError::NotFound),
        }
        if let Some(Some(store_id)) = changes.store_id {
            tables.require_store(store_id)?;
        }
        let row = tables.users.get_mut(&id).ok_or(StorageError::NotFound)?;
        if let Some(password_hash) = changes.password_hash {
            row.password_hash = password_hash;
        }
        if let Some(role) = changes.role {
            row.role = role;
        }
        if let Some(store_id) = changes.store_id {
            row.store_id = store_id;
        }
        if let Some(level) = changes.experience_level {
            row.experience_level = level;
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        if let Some(supplied) = changes.updated_at {
            // Como en SQL: la columna es escribible, el sello la pisa después.
            row.updated_at = supplied;
        }
        audit::touch(row);
        debug!("update_user id={id}");
        Ok(row.clone())
    }

    fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        // kpi_data.user_id es ON DELETE RESTRICT
        if tables.kpi_data.values().any(|k| k.user_id == id) {
            return Err(StorageError::ForeignKeyViolation(format!("kpi_data.user_id -> users({id})")));
        }
        // stores.manager_id es ON DELETE SET NULL
        for store in tables.stores.values_mut() {
            if store.manager_id == Some(id) {
                store.manager_id = None;
            }
        }
        // training_sessions.user_id es ON DELETE CASCADE; la cascada
        // arrastra interacciones y transcripciones de cada sesión.
        let session_ids: Vec<Uuid> = tables.sessions
                                           .values()
                                           .filter(|s| s.user_id == id)
                                           .map(|s| s.id)
                                           .collect();
        for session_id in &session_ids {
            tables.interactions.retain(|_, i| i.session_id != *session_id);
            tables.transcripts.retain(|_, t| t.session_id != *session_id);
            tables.sessions.remove(session_id);
        }
        tables.users.remove(&id);
        debug!("delete_user id={id} cascaded_sessions={}", session_ids.len());
        Ok(())
    }
}

impl CatalogRepository for MemoryBackend {
    fn create_persona(&self, persona: NewPersona) -> Result<Persona, StorageError> {
        let mut tables = self.write()?;
        if tables.persona_name_taken(&persona.name) {
            return Err(StorageError::UniqueViolation(format!("personas.name: {}", persona.name)));
        }
        let row = persona_row(persona);
        debug!("create_persona id={} name={}", row.id, row.name);
        tables.personas.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_persona(&self, id: Uuid) -> Result<Persona, StorageError> {
        self.read()?.personas.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    fn get_persona_by_name(&self, name: &str) -> Result<Persona, StorageError> {
        let tables = self.read()?;
        tables.personas
              .values()
              .find(|p| p.name == name)
              .cloned()
              .ok_or(StorageError::NotFound)
    }

    fn list_personas(&self, only_active: bool) -> Result<Vec<Persona>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<Persona> = tables.personas
                                           .values()
                                           .filter(|p| !only_active || p.is_active)
                                           .cloned()
                                           .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn delete_persona(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.personas.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        // training_scenarios.persona_id es ON DELETE CASCADE; las
        // interacciones que apuntaban a esos escenarios quedan con la
        // referencia a NULL (SET NULL, sin cascada).
        let scenario_ids: Vec<Uuid> = tables.scenarios
                                            .values()
                                            .filter(|s| s.persona_id == id)
                                            .map(|s| s.id)
                                            .collect();
        for scenario_id in &scenario_ids {
            for interaction in tables.interactions.values_mut() {
                if interaction.scenario_id == Some(*scenario_id) {
                    interaction.scenario_id = None;
                }
            }
            tables.scenarios.remove(scenario_id);
        }
        tables.personas.remove(&id);
        debug!("delete_persona id={id} cascaded_scenarios={}", scenario_ids.len());
        Ok(())
    }

    fn create_scenario(&self, scenario: NewScenario) -> Result<TrainingScenario, StorageError> {
        let mut tables = self.write()?;
        tables.require_persona(scenario.persona_id)?;
        check_difficulty("training_scenarios", &scenario.difficulty_level)?;
        let row = TrainingScenario { id: Uuid::new_v4(),
                                     persona_id: scenario.persona_id,
                                     title: scenario.title,
                                     description: scenario.description,
                                     difficulty_level: scenario.difficulty_level,
                                     kpi_focus: scenario.kpi_focus,
                                     scenario_data: scenario.scenario_data,
                                     response_guidelines: scenario.response_guidelines,
                                     evaluation_criteria: scenario.evaluation_criteria,
                                     is_active: true,
                                     created_at: Utc::now() };
        debug!("create_scenario id={} persona_id={}", row.id, row.persona_id);
        tables.scenarios.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_scenario(&self, id: Uuid) -> Result<TrainingScenario, StorageError> {
        self.read()?.scenarios.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    fn list_scenarios(&self,
                      persona_id: Uuid,
                      difficulty: Option<DifficultyLevel>)
                      -> Result<Vec<TrainingScenario>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<TrainingScenario> =
            tables.scenarios
                  .values()
                  .filter(|s| s.persona_id == persona_id)
                  .filter(|s| match difficulty {
                      // El filtro compara contra el conjunto cerrado, no contra la grafía.
                      Some(level) => s.difficulty().ok() == Some(level),
                      None => true,
                  })
                  .cloned()
                  .collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(rows)
    }
}

impl SessionRepository for MemoryBackend {
    fn start_session(&self, session: NewSession) -> Result<TrainingSession, StorageError> {
        let mut tables = self.write()?;
        tables.require_user(session.user_id)?;
        check_difficulty("training_sessions", &session.difficulty_level)?;
        let now = Utc::now();
        let row = TrainingSession { id: Uuid::new_v4(),
                                    user_id: session.user_id,
                                    persona_type: session.persona_type,
                                    difficulty_level: session.difficulty_level,
                                    scenario_data: session.scenario_data,
                                    responses: None,
                                    scores: None,
                                    completion_time: None,
                                    session_status: SessionStatus::Active,
                                    started_at: now,
                                    completed_at: None,
                                    created_at: now };
        debug!("start_session id={} user_id={}", row.id, row.user_id);
        tables.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_session(&self, id: Uuid) -> Result<TrainingSession, StorageError> {
        self.read()?.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    fn list_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TrainingSession>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<TrainingSession> = tables.sessions
                                                   .values()
                                                   .filter(|s| s.user_id == user_id)
                                                   .cloned()
                                                   .collect();
        rows.sort_by(|a, b| (a.started_at, a.id).cmp(&(b.started_at, b.id)));
        Ok(rows)
    }

    fn complete_session(&self,
                        id: Uuid,
                        responses: Option<Value>,
                        scores: Option<Value>,
                        completion_time: Option<i32>)
                        -> Result<TrainingSession, StorageError> {
        let mut tables = self.write()?;
        let row = tables.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        if row.session_status != SessionStatus::Active {
            return Err(StorageError::CheckViolation(format!(
                "training_sessions.session_status: no transition {} -> completed",
                row.session_status
            )));
        }
        if responses.is_some() {
            row.responses = responses;
        }
        if scores.is_some() {
            row.scores = scores;
        }
        if completion_time.is_some() {
            row.completion_time = completion_time;
        }
        row.session_status = SessionStatus::Completed;
        row.completed_at = Some(Utc::now());
        debug!("complete_session id={id}");
        Ok(row.clone())
    }

    fn abandon_session(&self, id: Uuid) -> Result<TrainingSession, StorageError> {
        let mut tables = self.write()?;
        let row = tables.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        if row.session_status != SessionStatus::Active {
            return Err(StorageError::CheckViolation(format!(
                "training_sessions.session_status: no transition {} -> abandoned",
                row.session_status
            )));
        }
        row.session_status = SessionStatus::Abandoned;
        row.completed_at = Some(Utc::now());
        debug!("abandon_session id={id}");
        Ok(row.clone())
    }

    fn delete_session(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.sessions.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        tables.interactions.retain(|_, i| i.session_id != id);
        tables.transcripts.retain(|_, t| t.session_id != id);
        tables.sessions.remove(&id);
        debug!("delete_session id={id}");
        Ok(())
    }

    fn record_interaction(&self, interaction: NewInteraction) -> Result<TrainingInteraction, StorageError> {
        let mut tables = self.write()?;
        tables.require_session(interaction.session_id)?;
        if let Some(scenario_id) = interaction.scenario_id {
            tables.require_scenario(scenario_id)?;
        }
        let row = TrainingInteraction { id: Uuid::new_v4(),
                                        session_id: interaction.session_id,
                                        scenario_id: interaction.scenario_id,
                                        question: interaction.question,
                                        user_response: interaction.user_response,
                                        ai_evaluation: interaction.ai_evaluation,
                                        feedback: interaction.feedback,
                                        interaction_order: interaction.interaction_order,
                                        response_time: interaction.response_time,
                                        created_at: Utc::now() };
        debug!("record_interaction id={} session_id={}", row.id, row.session_id);
        tables.interactions.insert(row.id, row.clone());
        Ok(row)
    }

    fn list_interactions(&self, session_id: Uuid) -> Result<Vec<TrainingInteraction>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<TrainingInteraction> = tables.interactions
                                                       .values()
                                                       .filter(|i| i.session_id == session_id)
                                                       .cloned()
                                                       .collect();
        rows.sort_by_key(|i| (i.interaction_order, i.created_at));
        Ok(rows)
    }

    fn save_transcript(&self, transcript: NewTranscript) -> Result<TrainingTranscript, StorageError> {
        let mut tables = self.write()?;
        tables.require_session(transcript.session_id)?;
        let row = TrainingTranscript { id: Uuid::new_v4(),
                                       session_id: transcript.session_id,
                                       full_transcript: transcript.full_transcript,
                                       summary: transcript.summary,
                                       word_count: transcript.word_count,
                                       created_at: Utc::now() };
        debug!("save_transcript id={} session_id={}", row.id, row.session_id);
        tables.transcripts.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_transcript_for_session(&self, session_id: Uuid) -> Result<TrainingTranscript, StorageError> {
        let tables = self.read()?;
        tables.transcripts
              .values()
              .filter(|t| t.session_id == session_id)
              .max_by_key(|t| (t.created_at, t.id))
              .cloned()
              .ok_or(StorageError::NotFound)
    }
}

impl KpiRepository for MemoryBackend {
    fn insert_kpi(&self, record: NewKpiRecord) -> Result<KpiRecord, StorageError> {
        let mut tables = self.write()?;
        tables.require_user(record.user_id)?;
        tables.require_store(record.store_id)?;
        if tables.kpi_triple_taken(record.user_id, record.store_id, record.date) {
            return Err(StorageError::UniqueViolation(format!(
                "kpi_data (user_id, store_id, date): ({}, {}, {})",
                record.user_id, record.store_id, record.date
            )));
        }
        let row = KpiRecord { id: Uuid::new_v4(),
                              user_id: record.user_id,
                              store_id: record.store_id,
                              date: record.date,
                              conversion_rate: record.metrics.conversion_rate,
                              avg_bill_value: record.metrics.avg_bill_value,
                              footfall: record.metrics.footfall,
                              sales_target: record.metrics.sales_target,
                              actual_sales: record.metrics.actual_sales,
                              return_rate: record.metrics.return_rate,
                              customer_satisfaction: record.metrics.customer_satisfaction,
                              created_at: Utc::now() };
        debug!("insert_kpi id={} user_id={} date={}", row.id, row.user_id, row.date);
        tables.kpi_data.insert(row.id, row.clone());
        Ok(row)
    }

    fn list_kpis_for_user(&self, user_id: Uuid) -> Result<Vec<KpiRecord>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<KpiRecord> = tables.kpi_data
                                             .values()
                                             .filter(|k| k.user_id == user_id)
                                             .cloned()
                                             .collect();
        rows.sort_by_key(|k| (k.date, k.store_id));
        Ok(rows)
    }

    fn list_kpis_for_store(&self,
                           store_id: Uuid,
                           from: chrono::NaiveDate,
                           to: chrono::NaiveDate)
                           -> Result<Vec<KpiRecord>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<KpiRecord> = tables.kpi_data
                                             .values()
                                             .filter(|k| k.store_id == store_id && k.date >= from && k.date <= to)
                                             .cloned()
                                             .collect();
        rows.sort_by_key(|k| (k.date, k.user_id));
        Ok(rows)
    }
}
