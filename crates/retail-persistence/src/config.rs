//! Carga de configuración de conexión desde variables de entorno.
//!
//! Convención: `DATABASE_URL` obligatoria; `DATABASE_MIN_CONNECTIONS` y
//! `DATABASE_MAX_CONNECTIONS` opcionales con defaults razonables para
//! desarrollo. El `.env` se carga una sola vez, de forma perezosa.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use retail_core::StorageError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, StorageError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL")
            .map_err(|_| StorageError::TransientIo("DATABASE_URL no definido".to_string()))?;
        let min_connections = read_pool_size("DATABASE_MIN_CONNECTIONS", 2);
        let max_connections = read_pool_size("DATABASE_MAX_CONNECTIONS", 16);
        Ok(Self { url, min_connections, max_connections })
    }
}

fn read_pool_size(var: &str, default: u32) -> u32 {
    env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
