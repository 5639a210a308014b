//! Acceso de sólo lectura a la tabla `appeals`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::models::RawAppeal;
use crate::normalize::normalize_one;

/// Origen de las apelaciones históricas.
#[async_trait]
pub trait AppealSource: Send + Sync {
    /// Lee el corpus completo tal y como lo guarda el almacén.
    async fn fetch_all(&self) -> Result<Vec<RawAppeal>>;

    /// Días de resolución de un caso real al azar con ese distrito y cuya
    /// categoría contenga `category`, sin distinguir mayúsculas.
    async fn sample_case(&self, district: &str, category: &str) -> Result<Option<f64>>;
}

const FETCH_ALL: &str = r#"
    SELECT created_at::text        AS created_at,
           registration_date::text AS registration_date,
           completion_date::text   AS completion_date,
           district,
           category,
           source,
           content
    FROM appeals
"#;

const SAMPLE_CASE: &str = r#"
    SELECT (EXTRACT(EPOCH FROM (completion_date::timestamptz - created_at::timestamptz)) / 86400.0)::float8
    FROM appeals
    WHERE district = $1
      AND category ILIKE $2 ESCAPE '\'
      AND completion_date IS NOT NULL
      AND completion_date::timestamptz >= created_at::timestamptz
    ORDER BY random()
    LIMIT 1
"#;

/// Implementación sobre PostgreSQL.
#[derive(Clone)]
pub struct PgAppealSource {
    pool: PgPool,
}

impl PgAppealSource {
    /// Prepara el pool sin abrir conexiones; la primera consulta conecta.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)
            .context("DATABASE_URL no es una cadena de conexión válida")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AppealSource for PgAppealSource {
    async fn fetch_all(&self) -> Result<Vec<RawAppeal>> {
        let rows = sqlx::query_as::<_, RawAppeal>(FETCH_ALL)
            .fetch_all(&self.pool)
            .await
            .context("Error leyendo la tabla appeals")?;
        info!(rows = rows.len(), "Apelaciones leídas de la base de datos");
        Ok(rows)
    }

    async fn sample_case(&self, district: &str, category: &str) -> Result<Option<f64>> {
        let pattern = format!("%{}%", escape_like(category.trim()));
        debug!(district, pattern = %pattern, "Buscando caso histórico");
        let days = sqlx::query_scalar::<_, Option<f64>>(SAMPLE_CASE)
            .bind(district.trim())
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await
            .context("Error consultando un caso histórico")?;
        Ok(days.flatten())
    }
}

/// Escapa los comodines de `LIKE` para que la categoría se busque literal.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Origen en memoria, para pruebas y demostraciones sin base de datos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppealSource {
    rows: Vec<RawAppeal>,
    delay: Option<Duration>,
}

impl InMemoryAppealSource {
    pub fn new(rows: Vec<RawAppeal>) -> Self {
        Self { rows, delay: None }
    }

    /// Retrasa cada lectura completa; útil para observar un trabajo en curso.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AppealSource for InMemoryAppealSource {
    async fn fetch_all(&self) -> Result<Vec<RawAppeal>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.rows.clone())
    }

    async fn sample_case(&self, district: &str, category: &str) -> Result<Option<f64>> {
        let district = district.trim();
        let needle = category.trim().to_lowercase();
        let matches: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| normalize_one(row).ok())
            .filter(|a| a.district == district && a.category.to_lowercase().contains(&needle))
            .map(|a| a.days_to_resolve as f64)
            .collect();
        Ok(matches.choose(&mut rand::thread_rng()).copied())
    }
}
