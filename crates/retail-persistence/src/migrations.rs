//! Wrapper para correr migraciones embebidas.
//!
//! El directorio `migrations/` de este crate contiene la migración del
//! esquema de entrenamiento (tablas, checks, acciones referenciales,
//! trigger de `updated_at`, política RLS y seeds de personas). Al construir
//! el pool se ejecutan las pendientes una sola vez.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use retail_core::StorageError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<(), StorageError> {
    // gen_random_uuid() requiere pgcrypto en Postgres < 13.
    conn.batch_execute("CREATE EXTENSION IF NOT EXISTS pgcrypto;").ok();
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| StorageError::Unknown(format!("migration error: {e}")))
}
