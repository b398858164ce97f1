// retail-domain library entry point
pub mod enums;
pub mod error;
pub mod interaction;
pub mod kpi;
pub mod persona;
pub mod scenario;
pub mod session;
pub mod store;
pub mod transcript;
pub mod user;

pub use enums::{DifficultyLevel, SessionStatus, StoreSize, UserRole};
pub use error::DomainError;
pub use interaction::{NewInteraction, TrainingInteraction};
pub use kpi::{KpiMetrics, KpiRecord, NewKpiRecord};
pub use persona::{seed_personas, NewPersona, Persona};
pub use scenario::{NewScenario, TrainingScenario};
pub use session::{NewSession, TrainingSession};
pub use store::{NewStore, Store};
pub use transcript::{NewTranscript, TrainingTranscript};
pub use user::{NewUser, User, UserChanges};
