pub mod types;
pub use types::{CatalogRepository, DirectoryRepository, KpiRepository, SessionRepository};
