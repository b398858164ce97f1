use std::str::FromStr;

use retail_domain::{seed_personas, DifficultyLevel, NewKpiRecord, NewScenario, NewSession, NewUser, SessionStatus,
                    StoreSize, UserRole};
use retail_domain::KpiMetrics;
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_role_round_trip() {
    for role in [UserRole::StoreManager, UserRole::RegionalManager, UserRole::Trainer, UserRole::Admin] {
        assert_eq!(UserRole::from_str(role.as_str()).unwrap(), role);
    }
}

#[test]
fn test_role_outside_closed_set_is_rejected() {
    assert!(UserRole::from_str("superuser").is_err());
    // Roles are matched exactly, not case-insensitively
    assert!(UserRole::from_str("Admin").is_err());
}

#[test]
fn test_store_size_outside_closed_set_is_rejected() {
    assert!(StoreSize::from_str("tiny").is_err());
    assert_eq!(StoreSize::from_str("medium").unwrap(), StoreSize::Medium);
}

#[test]
fn test_difficulty_parse_is_case_insensitive() {
    assert_eq!(DifficultyLevel::from_str("Easy").unwrap(), DifficultyLevel::Easy);
    assert_eq!(DifficultyLevel::from_str("EXPERT").unwrap(), DifficultyLevel::Expert);
    assert_eq!(DifficultyLevel::from_str("hard").unwrap(), DifficultyLevel::Hard);
    assert!(DifficultyLevel::from_str("impossible").is_err());
}

#[test]
fn test_session_status_state_machine() {
    assert!(!SessionStatus::Active.is_terminal());
    assert!(SessionStatus::Completed.is_terminal());
    assert!(SessionStatus::Abandoned.is_terminal());
}

#[test]
fn test_new_user_validation() {
    assert!(NewUser::new("trainer@store.example", "$2b$hash", UserRole::Trainer, None, 2).is_ok());
    assert!(NewUser::new("not-an-email", "$2b$hash", UserRole::Trainer, None, 0).is_err());
    assert!(NewUser::new("a@b.example", "", UserRole::Trainer, None, 0).is_err());
    assert!(NewUser::new("a@b.example", "$2b$hash", UserRole::Trainer, None, -1).is_err());
}

#[test]
fn test_new_session_keeps_difficulty_spelling() {
    let s = NewSession::new(Uuid::new_v4(), "Bargain Hunter", "Medium", None).unwrap();
    assert_eq!(s.difficulty_level, "Medium");
    assert!(NewSession::new(Uuid::new_v4(), "Bargain Hunter", "brutal", None).is_err());
}

#[test]
fn test_new_scenario_rejects_bad_difficulty() {
    let res = NewScenario::new(Uuid::new_v4(),
                               "Price objection",
                               None,
                               "nightmare",
                               Some("conversion_rate"),
                               json!({"context": "discount rack"}),
                               None,
                               None);
    assert!(res.is_err());
}

#[test]
fn test_new_kpi_rejects_negative_metrics() {
    let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let bad = KpiMetrics { footfall: Some(-5), ..Default::default() };
    assert!(NewKpiRecord::new(Uuid::new_v4(), Uuid::new_v4(), date, bad).is_err());
    let ok = KpiMetrics { conversion_rate: Some(12.5), footfall: Some(340), ..Default::default() };
    assert!(NewKpiRecord::new(Uuid::new_v4(), Uuid::new_v4(), date, ok).is_ok());
}

#[test]
fn test_seed_personas_match_migration_rows() {
    // The SQL migration inserts the same three rows; keep names pinned here.
    let seeds = seed_personas();
    let names: Vec<&str> = seeds.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Bargain Hunter", "Overwhelmed Parent", "Trend-Seeking Influencer"]);
    for p in &seeds {
        assert!(p.profile.get("behavior").is_some(), "seed persona {} must carry a profile", p.name);
        assert!(p.scenarios.is_some());
        assert!(p.difficulty_mapping.is_some());
    }
}
