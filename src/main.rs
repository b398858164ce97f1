//! Binario de aprovisionamiento y validación del esquema de entrenamiento.
//!
//! Primero recorre el backend en memoria de punta a punta (seeds, unicidad,
//! cascadas, sello de auditoría, política por fila) y después, si hay
//! `DATABASE_URL`, construye el pool Postgres (lo que aplica las migraciones
//! embebidas) y repite las comprobaciones centrales contra la base real.

use chrono::{NaiveDate, TimeZone, Utc};
use retail_core::{CatalogRepository, Caller, DirectoryRepository, KpiRepository, MemoryBackend, SessionRepository,
                  StorageError};
use retail_domain::{KpiMetrics, NewKpiRecord, NewSession, NewStore, NewUser, SessionStatus, StoreSize, UserChanges,
                    UserRole};
use serde_json::json;
use uuid::Uuid;

fn main() {
    // Cargar variables de entorno desde .env si existe (antes de leer DATABASE_URL)
    let _ = dotenvy::dotenv();

    run_memory_validation();

    if std::env::var("DATABASE_URL").is_ok() {
        if let Err(e) = provision_postgres() {
            eprintln!("[PG] Error de aprovisionamiento: {e}");
            std::process::exit(1);
        }
    } else {
        eprintln!("[PG] DATABASE_URL no definido; omitiendo aprovisionamiento Postgres");
    }
}

/// Recorrido completo sobre el backend en memoria: mismas invariantes que
/// la migración SQL, sin base de datos.
fn run_memory_validation() {
    let backend = MemoryBackend::new();

    // Seeds: las tres personas de referencia vienen de fábrica
    let personas = backend.list_personas(true).expect("list personas");
    assert_eq!(personas.len(), 3, "deben existir 3 personas de referencia");
    let bargain = backend.get_persona_by_name("Bargain Hunter").expect("seed persona");
    assert_eq!(bargain.profile["age"], json!(32));

    // Directorio: tienda + usuario, email único
    let store = backend.create_store(NewStore::new("Flagship", "12 High Street", Some("North"),
                                                   StoreSize::Large, None).expect("new store"))
                       .expect("create store");
    let user = backend.create_user(NewUser::new("manager@flagship.example", "$2b$12$hash",
                                                UserRole::StoreManager, Some(store.id), 3).expect("new user"))
                      .expect("create user");
    let dup = NewUser::new("manager@flagship.example", "$2b$12$other", UserRole::Trainer, None, 0).expect("new user");
    assert!(matches!(backend.create_user(dup), Err(StorageError::UniqueViolation(_))),
            "el email duplicado debe rechazarse");
    backend.assign_manager(store.id, user.id).expect("assign manager");

    // Sello de auditoría: el valor del caller se pisa siempre
    let forged = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    let updated = backend.update_user(&Caller::Service,
                                      user.id,
                                      UserChanges { experience_level: Some(4),
                                                    updated_at: Some(forged),
                                                    ..Default::default() })
                         .expect("update user");
    assert_ne!(updated.updated_at, forged, "updated_at debe estamparse en el UPDATE");

    // Política por fila: sólo la fila propia es visible
    let foreign = Caller::User(Uuid::new_v4());
    assert!(matches!(backend.get_user(&foreign, user.id), Err(StorageError::NotFound)));
    assert!(backend.get_user(&Caller::User(user.id), user.id).is_ok());

    // Sesión: active -> completed, sin segunda transición
    let session = backend.start_session(NewSession::new(user.id, "Bargain Hunter", "easy", None).expect("new session"))
                         .expect("start session");
    assert_eq!(session.session_status, SessionStatus::Active);
    let done = backend.complete_session(session.id, Some(json!(["resp"])), Some(json!({"accuracy": 4})), Some(420))
                      .expect("complete session");
    assert_eq!(done.session_status, SessionStatus::Completed);
    assert!(matches!(backend.abandon_session(session.id), Err(StorageError::CheckViolation(_))));

    // KPI: tripleta única (user, store, date)
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let metrics = KpiMetrics { conversion_rate: Some(12.5), footfall: Some(340), ..Default::default() };
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics.clone()).expect("new kpi"))
           .expect("insert kpi");
    assert!(matches!(backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics).expect("new kpi")),
                     Err(StorageError::UniqueViolation(_))));

    println!("!Validación memoria: OK (seeds, unicidad, sello, política, estado de sesión, KPI)");
}

/// Aprovisionamiento Postgres: construir el pool aplica las migraciones
/// pendientes; después se repiten las comprobaciones centrales.
fn provision_postgres() -> Result<(), StorageError> {
    let pool = retail_persistence::build_dev_pool_from_env()?;
    let backend = retail_persistence::PgBackend::new(retail_persistence::PoolProvider { pool });

    let bargain = backend.get_persona_by_name("Bargain Hunter")?;
    println!("[PG] seed persona presente: {} (perfil: {})", bargain.name, bargain.profile["occupation"]);

    let email = format!("provision+{}@store.example", Uuid::new_v4());
    let user = backend.create_user(NewUser::new(&email, "$2b$12$hash", UserRole::Trainer, None, 0)
                                       .map_err(|e| StorageError::CheckViolation(e.to_string()))?)?;
    let updated = backend.update_user(&Caller::Service,
                                      user.id,
                                      UserChanges { experience_level: Some(1), ..Default::default() })?;
    if updated.updated_at < user.updated_at {
        return Err(StorageError::Unknown("el trigger de updated_at no estampó el UPDATE".to_string()));
    }

    let session = backend.start_session(NewSession::new(user.id, "Bargain Hunter", "easy", None)
                                            .map_err(|e| StorageError::CheckViolation(e.to_string()))?)?;
    backend.complete_session(session.id, None, Some(json!({"accuracy": 5})), Some(300))?;
    // Limpieza: la cascada del usuario arrastra la sesión
    backend.delete_user(user.id)?;

    println!("!Validación Postgres: OK (migraciones, seeds, sello de auditoría, estado de sesión)");
    Ok(())
}
