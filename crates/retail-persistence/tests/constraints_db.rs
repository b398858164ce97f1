//! Tests de integración contra Postgres real. Se saltan solos cuando no hay
//! `DATABASE_URL` en el entorno (mismo criterio que el resto del workspace).

use std::env;

use chrono::{NaiveDate, TimeZone};
use retail_core::{CatalogRepository, Caller, DirectoryRepository, KpiRepository, SessionRepository, StorageError};
use retail_domain::{KpiMetrics, NewInteraction, NewKpiRecord, NewPersona, NewScenario, NewSession, NewStore,
                    NewTranscript, NewUser, SessionStatus, StoreSize, UserRole};
use retail_persistence::{build_pool, PgBackend, PoolProvider};
use serde_json::json;
use uuid::Uuid;

fn backend() -> Option<PgBackend<PoolProvider>> {
    let database_url = match env::var("DATABASE_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("Skipping DB integration test: DATABASE_URL not set");
            return None;
        }
    };
    // build_pool ejecuta las migraciones pendientes en el primer checkout
    let pool = build_pool(&database_url, 1, 2).expect("pool");
    Some(PgBackend::new(PoolProvider { pool }))
}

fn unique_email(tag: &str) -> String {
    format!("{tag}+{}@store.example", Uuid::new_v4())
}

fn make_user(backend: &PgBackend<PoolProvider>, tag: &str) -> retail_domain::User {
    let new = NewUser::new(&unique_email(tag), "$2b$12$hash", UserRole::StoreManager, None, 1).unwrap();
    backend.create_user(new).unwrap()
}

fn make_store(backend: &PgBackend<PoolProvider>) -> retail_domain::Store {
    let new = NewStore::new("Integration Store", "1 Test Road", None, StoreSize::Medium, None).unwrap();
    backend.create_store(new).unwrap()
}

#[test]
fn seed_personas_are_present_after_migration() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let persona = backend.get_persona_by_name("Bargain Hunter")?;
    assert_eq!(persona.profile["age"], json!(32));
    assert!(persona.scenarios.is_some());
    Ok(())
}

#[test]
fn duplicate_email_raises_unique_violation() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let email = unique_email("dup");
    backend.create_user(NewUser::new(&email, "$2b$12$hash", UserRole::Trainer, None, 0)?)?;
    match backend.create_user(NewUser::new(&email, "$2b$12$other", UserRole::Trainer, None, 0)?) {
        Err(StorageError::UniqueViolation(_)) => Ok(()),
        other => panic!("expected UniqueViolation, got {other:?}"),
    }
}

#[test]
fn updated_at_trigger_overrides_caller_value() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let user = make_user(&backend, "stamp");
    let forged = chrono::Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    let changes = retail_domain::UserChanges { experience_level: Some(7),
                                               updated_at: Some(forged),
                                               ..Default::default() };
    let updated = backend.update_user(&Caller::Service, user.id, changes)?;
    assert_eq!(updated.experience_level, 7);
    // El trigger pisa el valor aportado por el caller
    assert_ne!(updated.updated_at, forged);
    assert!(updated.updated_at >= user.created_at);
    Ok(())
}

#[test]
fn persona_delete_cascades_scenarios() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let name = format!("Integration Persona {}", Uuid::new_v4());
    let persona = backend.create_persona(NewPersona::new(&name, None, json!({"behavior": "test"}), None, None)?)?;
    let scenario = backend.create_scenario(NewScenario::new(persona.id,
                                                            "Cascade check",
                                                            None,
                                                            "easy",
                                                            None,
                                                            json!({"step": 1}),
                                                            None,
                                                            None)?)?;
    backend.delete_persona(persona.id)?;
    assert!(matches!(backend.get_scenario(scenario.id), Err(StorageError::NotFound)));
    Ok(())
}

#[test]
fn session_delete_cascades_children_but_not_user() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let user = make_user(&backend, "cascade");
    let session = backend.start_session(NewSession::new(user.id, "Bargain Hunter", "easy", None)?)?;
    backend.record_interaction(NewInteraction::new(session.id, None, "Q", "A", None, None, 0, None)?)?;
    backend.save_transcript(NewTranscript::new(session.id, json!([{"role": "customer"}]), None, 10)?)?;

    backend.delete_session(session.id)?;
    assert!(backend.list_interactions(session.id)?.is_empty());
    assert!(matches!(backend.get_transcript_for_session(session.id), Err(StorageError::NotFound)));
    assert!(backend.get_user(&Caller::Service, user.id).is_ok());
    Ok(())
}

#[test]
fn kpi_triple_is_unique() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let user = make_user(&backend, "kpi");
    let store = make_store(&backend);
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let metrics = KpiMetrics { conversion_rate: Some(12.5), ..Default::default() };
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics.clone())?)?;
    match backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics.clone())?) {
        Err(StorageError::UniqueViolation(_)) => {}
        other => panic!("expected UniqueViolation, got {other:?}"),
    }
    // Cambiar la fecha basta para aceptar el insert
    let next = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, next, metrics)?)?;
    Ok(())
}

#[test]
fn bad_difficulty_hits_the_check_constraint() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let user = make_user(&backend, "check");
    // Construcción literal para esquivar la validación del dominio y
    // ejercitar el CHECK del motor.
    let raw = NewSession { user_id: user.id,
                           persona_type: "Bargain Hunter".to_string(),
                           difficulty_level: "brutal".to_string(),
                           scenario_data: None };
    match backend.start_session(raw) {
        Err(StorageError::CheckViolation(_)) => {}
        other => panic!("expected CheckViolation, got {other:?}"),
    }
    // La grafía mixta pertenece al conjunto (CHECK case-insensitive)
    let mixed = NewSession { user_id: user.id,
                             persona_type: "Bargain Hunter".to_string(),
                             difficulty_level: "Expert".to_string(),
                             scenario_data: None };
    let session = backend.start_session(mixed)?;
    assert_eq!(session.difficulty_level, "Expert");
    assert_eq!(session.session_status, SessionStatus::Active);
    Ok(())
}

#[test]
fn session_state_machine_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let user = make_user(&backend, "machine");
    let session = backend.start_session(NewSession::new(user.id, "Bargain Hunter", "medium", None)?)?;
    let done = backend.complete_session(session.id, None, Some(json!({"accuracy": 4})), Some(300))?;
    assert_eq!(done.session_status, SessionStatus::Completed);
    assert!(done.completed_at.is_some());
    match backend.abandon_session(session.id) {
        Err(StorageError::CheckViolation(_)) => Ok(()),
        other => panic!("expected CheckViolation, got {other:?}"),
    }
}

#[test]
fn store_delete_detaches_users_and_respects_kpi_restrict() -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend() {
        Some(b) => b,
        None => return Ok(()),
    };
    let store = make_store(&backend);
    let email = unique_email("attached");
    let user = backend.create_user(NewUser::new(&email, "$2b$12$hash", UserRole::StoreManager, Some(store.id), 1)?)?;

    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, KpiMetrics::default())?)?;
    assert!(matches!(backend.delete_store(store.id), Err(StorageError::ForeignKeyViolation(_))));

    let other = make_store(&backend);
    let changes = retail_domain::UserChanges { store_id: Some(Some(other.id)), ..Default::default() };
    backend.update_user(&Caller::Service, user.id, changes)?;
    backend.delete_store(other.id)?;
    let detached = backend.get_user(&Caller::Service, user.id)?;
    assert_eq!(detached.store_id, None);
    Ok(())
}
