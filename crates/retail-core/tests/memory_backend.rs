use chrono::{NaiveDate, TimeZone, Utc};
use retail_core::{CatalogRepository, Caller, DirectoryRepository, KpiRepository, MemoryBackend, SessionRepository,
                  StorageError};
use retail_domain::{KpiMetrics, NewInteraction, NewKpiRecord, NewPersona, NewScenario, NewSession, NewStore,
                    NewTranscript, NewUser, SessionStatus, StoreSize, UserRole};
use serde_json::json;
use uuid::Uuid;

fn sample_store(backend: &MemoryBackend) -> retail_domain::Store {
    let new = NewStore::new("Downtown Flagship", "12 High Street", Some("North"), StoreSize::Large, None).unwrap();
    backend.create_store(new).unwrap()
}

fn sample_user(backend: &MemoryBackend, email: &str) -> retail_domain::User {
    let new = NewUser::new(email, "$2b$12$hash", UserRole::StoreManager, None, 3).unwrap();
    backend.create_user(new).unwrap()
}

fn sample_session(backend: &MemoryBackend, user_id: Uuid) -> retail_domain::TrainingSession {
    let new = NewSession::new(user_id, "Bargain Hunter", "easy", Some(json!({"context": "discount rack"}))).unwrap();
    backend.start_session(new).unwrap()
}

#[test]
fn duplicate_email_is_a_unique_violation() {
    let backend = MemoryBackend::new();
    sample_user(&backend, "manager@store.example");
    let dup = NewUser::new("manager@store.example", "$2b$12$other", UserRole::Trainer, None, 0).unwrap();
    match backend.create_user(dup) {
        Err(StorageError::UniqueViolation(msg)) => assert!(msg.contains("users.email")),
        other => panic!("expected UniqueViolation, got {other:?}"),
    }
}

#[test]
fn insert_defaults_are_materialized() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "defaults@store.example");
    assert!(user.is_active);
    assert_eq!(user.created_at, user.updated_at);
    let session = sample_session(&backend, user.id);
    assert_eq!(session.session_status, SessionStatus::Active);
    assert!(session.completed_at.is_none());
}

#[test]
fn bad_difficulty_string_is_a_check_violation() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "difficulty@store.example");
    // Bypass the domain constructor to hit the backend check directly
    let raw = NewSession { user_id: user.id,
                           persona_type: "Bargain Hunter".to_string(),
                           difficulty_level: "brutal".to_string(),
                           scenario_data: None };
    match backend.start_session(raw) {
        Err(StorageError::CheckViolation(msg)) => assert!(msg.contains("difficulty_level")),
        other => panic!("expected CheckViolation, got {other:?}"),
    }
    // Mixed case is inside the closed set
    let mixed = NewSession { user_id: user.id,
                             persona_type: "Bargain Hunter".to_string(),
                             difficulty_level: "Expert".to_string(),
                             scenario_data: None };
    let session = backend.start_session(mixed).unwrap();
    assert_eq!(session.difficulty_level, "Expert");
}

#[test]
fn update_user_stamps_updated_at_ignoring_caller_value() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "stamp@store.example");
    let forged = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    let changes = retail_domain::UserChanges { experience_level: Some(5),
                                               updated_at: Some(forged),
                                               ..Default::default() };
    let before = Utc::now();
    let updated = backend.update_user(&Caller::Service, user.id, changes).unwrap();
    assert_eq!(updated.experience_level, 5);
    assert_ne!(updated.updated_at, forged);
    assert!(updated.updated_at >= before);
    assert!(updated.updated_at >= updated.created_at);
}

#[test]
fn persona_delete_cascades_scenarios() {
    let backend = MemoryBackend::new();
    let persona = backend.create_persona(NewPersona::new("Window Shopper",
                                                         None,
                                                         json!({"behavior": "browses"}),
                                                         None,
                                                         None).unwrap())
                         .unwrap();
    for title in ["First visit", "Second visit"] {
        let s = NewScenario::new(persona.id, title, None, "easy", None, json!({"step": 1}), None, None).unwrap();
        backend.create_scenario(s).unwrap();
    }
    assert_eq!(backend.list_scenarios(persona.id, None).unwrap().len(), 2);
    backend.delete_persona(persona.id).unwrap();
    assert!(matches!(backend.get_persona(persona.id), Err(StorageError::NotFound)));
    assert!(backend.list_scenarios(persona.id, None).unwrap().is_empty());
}

#[test]
fn session_delete_cascades_children_but_not_user() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "cascade@store.example");
    let session = sample_session(&backend, user.id);
    let interaction = NewInteraction::new(session.id,
                                          None,
                                          "Can you match the online price?",
                                          "Let me show you what the price includes.",
                                          Some(json!({"accuracy": 4})),
                                          None,
                                          0,
                                          Some(35)).unwrap();
    backend.record_interaction(interaction).unwrap();
    let transcript = NewTranscript::new(session.id, json!([{"role": "customer"}]), Some("short"), 120).unwrap();
    backend.save_transcript(transcript).unwrap();

    backend.delete_session(session.id).unwrap();
    assert!(backend.list_interactions(session.id).unwrap().is_empty());
    assert!(matches!(backend.get_transcript_for_session(session.id), Err(StorageError::NotFound)));
    // The parent row is untouched
    assert!(backend.get_user(&Caller::Service, user.id).is_ok());
}

#[test]
fn user_delete_cascades_sessions_transitively() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "transitive@store.example");
    let session = sample_session(&backend, user.id);
    let interaction = NewInteraction::new(session.id, None, "Q", "A", None, None, 0, None).unwrap();
    backend.record_interaction(interaction).unwrap();

    backend.delete_user(user.id).unwrap();
    assert!(matches!(backend.get_session(session.id), Err(StorageError::NotFound)));
    assert!(backend.list_interactions(session.id).unwrap().is_empty());
}

#[test]
fn kpi_triple_is_unique_but_any_field_change_is_allowed() {
    let backend = MemoryBackend::new();
    let store = sample_store(&backend);
    let other_store = backend.create_store(NewStore::new("Mall Branch",
                                                         "Unit 5, Mall",
                                                         None,
                                                         StoreSize::Small,
                                                         None).unwrap())
                             .unwrap();
    let user = sample_user(&backend, "kpi@store.example");
    let other_user = sample_user(&backend, "kpi2@store.example");
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let metrics = KpiMetrics { conversion_rate: Some(12.5), footfall: Some(340), ..Default::default() };

    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics.clone()).unwrap())
           .unwrap();
    match backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, metrics.clone()).unwrap()) {
        Err(StorageError::UniqueViolation(msg)) => assert!(msg.contains("kpi_data")),
        other => panic!("expected UniqueViolation, got {other:?}"),
    }
    // Varying any one of the three fields succeeds
    let next_day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, next_day, metrics.clone()).unwrap())
           .unwrap();
    backend.insert_kpi(NewKpiRecord::new(other_user.id, store.id, date, metrics.clone()).unwrap())
           .unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, other_store.id, date, metrics).unwrap())
           .unwrap();
    assert_eq!(backend.list_kpis_for_user(user.id).unwrap().len(), 3);
}

#[test]
fn seed_persona_profile_round_trips() {
    let backend = MemoryBackend::new();
    let persona = backend.get_persona_by_name("Bargain Hunter").unwrap();
    assert_eq!(persona.profile["age"], json!(32));
    assert_eq!(persona.profile["occupation"], json!("working professional"));
    assert!(persona.is_active);
    // All three reference rows are present after provisioning
    assert_eq!(backend.list_personas(true).unwrap().len(), 3);
}

#[test]
fn store_delete_sets_user_store_null_and_respects_kpi_restrict() {
    let backend = MemoryBackend::new();
    let store = sample_store(&backend);
    let new = NewUser::new("attached@store.example", "$2b$12$hash", UserRole::StoreManager, Some(store.id), 1).unwrap();
    let user = backend.create_user(new).unwrap();
    assert_eq!(user.store_id, Some(store.id));

    // Blocked while KPI history references the store
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, KpiMetrics::default()).unwrap())
           .unwrap();
    assert!(matches!(backend.delete_store(store.id), Err(StorageError::ForeignKeyViolation(_))));

    // Without KPI rows the delete detaches users instead of deleting them
    let other = backend.create_store(NewStore::new("Pop-up", "Station Hall", None, StoreSize::Small, None).unwrap())
                       .unwrap();
    backend.update_user(&Caller::Service,
                        user.id,
                        retail_domain::UserChanges { store_id: Some(Some(other.id)), ..Default::default() })
           .unwrap();
    backend.delete_store(other.id).unwrap();
    let detached = backend.get_user(&Caller::Service, user.id).unwrap();
    assert_eq!(detached.store_id, None);
}

#[test]
fn user_delete_is_blocked_by_kpi_history() {
    let backend = MemoryBackend::new();
    let store = sample_store(&backend);
    let user = sample_user(&backend, "pinned@store.example");
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    backend.insert_kpi(NewKpiRecord::new(user.id, store.id, date, KpiMetrics::default()).unwrap())
           .unwrap();
    assert!(matches!(backend.delete_user(user.id), Err(StorageError::ForeignKeyViolation(_))));
}

#[test]
fn session_state_machine_rejects_second_transition() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "machine@store.example");
    let session = sample_session(&backend, user.id);
    let done = backend.complete_session(session.id, Some(json!(["resp"])), Some(json!({"accuracy": 4})), Some(540))
                      .unwrap();
    assert_eq!(done.session_status, SessionStatus::Completed);
    assert!(done.completed_at.is_some());

    assert!(matches!(backend.complete_session(session.id, None, None, None),
                     Err(StorageError::CheckViolation(_))));
    assert!(matches!(backend.abandon_session(session.id), Err(StorageError::CheckViolation(_))));

    let second = sample_session(&backend, user.id);
    let gone = backend.abandon_session(second.id).unwrap();
    assert_eq!(gone.session_status, SessionStatus::Abandoned);
    assert!(matches!(backend.complete_session(second.id, None, None, None),
                     Err(StorageError::CheckViolation(_))));
}

#[test]
fn user_row_policy_hides_foreign_rows() {
    let backend = MemoryBackend::new();
    let alice = sample_user(&backend, "alice@store.example");
    let bob = sample_user(&backend, "bob@store.example");

    let as_alice = Caller::User(alice.id);
    assert_eq!(backend.get_user(&as_alice, alice.id).unwrap().id, alice.id);
    // Bob's row behaves as absent for Alice, on reads and writes alike
    assert!(matches!(backend.get_user(&as_alice, bob.id), Err(StorageError::NotFound)));
    let changes = retail_domain::UserChanges { experience_level: Some(99), ..Default::default() };
    assert!(matches!(backend.update_user(&as_alice, bob.id, changes), Err(StorageError::NotFound)));
    // The service identity bypasses the policy
    assert!(backend.get_user(&Caller::Service, bob.id).is_ok());
}

#[test]
fn fk_violations_on_insert_paths() {
    let backend = MemoryBackend::new();
    let missing = Uuid::new_v4();
    let user = NewUser::new("orphan@store.example", "$2b$12$hash", UserRole::Trainer, Some(missing), 0).unwrap();
    assert!(matches!(backend.create_user(user), Err(StorageError::ForeignKeyViolation(_))));

    let session = NewSession::new(missing, "Bargain Hunter", "easy", None).unwrap();
    assert!(matches!(backend.start_session(session), Err(StorageError::ForeignKeyViolation(_))));

    let scenario = NewScenario::new(missing, "Ghost", None, "easy", None, json!({}), None, None).unwrap();
    assert!(matches!(backend.create_scenario(scenario), Err(StorageError::ForeignKeyViolation(_))));
}

#[test]
fn scenario_delete_nulls_interaction_reference() {
    let backend = MemoryBackend::new();
    let persona = backend.get_persona_by_name("Overwhelmed Parent").unwrap();
    let scenario = backend.create_scenario(NewScenario::new(persona.id,
                                                            "Uniform rush",
                                                            None,
                                                            "easy",
                                                            None,
                                                            json!({"context": "school uniforms"}),
                                                            None,
                                                            None).unwrap())
                          .unwrap();
    let user = sample_user(&backend, "nulling@store.example");
    let session = sample_session(&backend, user.id);
    let interaction = backend.record_interaction(NewInteraction::new(session.id,
                                                                     Some(scenario.id),
                                                                     "Size 8 uniforms?",
                                                                     "Right this way.",
                                                                     None,
                                                                     None,
                                                                     0,
                                                                     None).unwrap())
                             .unwrap();
    assert_eq!(interaction.scenario_id, Some(scenario.id));

    backend.delete_persona(persona.id).unwrap();
    let listed = backend.list_interactions(session.id).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].scenario_id, None);
}

#[test]
fn interactions_are_ordered_by_interaction_order() {
    let backend = MemoryBackend::new();
    let user = sample_user(&backend, "ordering@store.example");
    let session = sample_session(&backend, user.id);
    for order in [2, 0, 1] {
        let i = NewInteraction::new(session.id, None, "Q", "A", None, None, order, None).unwrap();
        backend.record_interaction(i).unwrap();
    }
    let orders: Vec<i32> = backend.list_interactions(session.id)
                                  .unwrap()
                                  .iter()
                                  .map(|i| i.interaction_order)
                                  .collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[test]
fn scenario_difficulty_filter_matches_case_insensitively() {
    let backend = MemoryBackend::new();
    let persona = backend.get_persona_by_name("Trend-Seeking Influencer").unwrap();
    for (title, difficulty) in [("Photo-ready outfit", "Easy"), ("Studio lights", "expert")] {
        let s = NewScenario::new(persona.id, title, None, difficulty, None, json!({}), None, None).unwrap();
        backend.create_scenario(s).unwrap();
    }
    let easy = backend.list_scenarios(persona.id, Some(retail_domain::DifficultyLevel::Easy)).unwrap();
    assert_eq!(easy.len(), 1);
    assert_eq!(easy[0].title, "Photo-ready outfit");
    assert_eq!(backend.list_scenarios(persona.id, None).unwrap().len(), 2);
}
