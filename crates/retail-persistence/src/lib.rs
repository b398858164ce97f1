//! retail-persistence
//!
//! Backend Postgres (Diesel) de los repositorios de `retail-core`.
//! La autoridad del esquema es la migración embebida: tablas, conjuntos
//! cerrados, acciones referenciales, el trigger de `updated_at` sobre
//! `users`, la política row-level-security y las personas de referencia.
//!
//! Módulos:
//! - `pg`: implementaciones sobre Postgres de los cuatro repositorios.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.
//! - `error`: mapeo de errores Diesel a la taxonomía compartida.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::map_diesel_error;
pub use pg::{build_dev_pool_from_env, build_pool, build_pool_with_migrations, ConnectionProvider, PgBackend, PgPool,
             PoolProvider};
