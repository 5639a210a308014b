//! Carga y gestión de configuración de la aplicación (PostgreSQL, servidor y
//! artefactos de modelos).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use url::Url;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Sin base de datos el servicio arranca, pero no puede entrenar.
    pub database_url: Option<String>,
    pub server_addr: String,
    pub artifacts_path: PathBuf,
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de cualquier origen clave → valor.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        if let Some(raw) = &database_url {
            let url = Url::parse(raw).context("DATABASE_URL no es una URL válida")?;
            if !matches!(url.scheme(), "postgres" | "postgresql") {
                return Err(anyhow!(
                    "DATABASE_URL debe usar el esquema postgres://, no {}://",
                    url.scheme()
                ));
            }
        }

        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let artifacts_path =
            PathBuf::from(var("ARTIFACTS_PATH").unwrap_or_else(|| "model_artifacts.json".to_string()));
        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("DB_MAX_CONNECTIONS debe ser un entero positivo: {raw}"))?,
            None => 5,
        };

        Ok(Self {
            database_url,
            server_addr,
            artifacts_path,
            db_max_connections,
        })
    }

    /// URL de la base de datos apta para los logs, sin contraseña.
    pub fn redacted_database_url(&self) -> Option<String> {
        let raw = self.database_url.as_deref()?;
        match Url::parse(raw) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                Some(url.to_string())
            }
            Err(_) => Some("<inválida>".to_string()),
        }
    }
}
