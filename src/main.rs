use std::sync::Arc;

use anyhow::{Context, Result};
use appeal_forecast::{
    config::AppConfig,
    create_router,
    registry::{load_snapshot, ModelRegistry},
    source::{AppealSource, PgAppealSource},
    AppState,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Preparar el acceso a la base de datos (perezoso: no conecta aún)
    let source: Option<Arc<dyn AppealSource>> = match &cfg.database_url {
        Some(url) => {
            let pg = PgAppealSource::connect_lazy(url, cfg.db_max_connections)?;
            info!(
                database = %cfg.redacted_database_url().unwrap_or_default(),
                max_connections = cfg.db_max_connections,
                "Origen de apelaciones configurado"
            );
            Some(Arc::new(pg))
        }
        None => {
            warn!("DATABASE_URL no está definida; /train y /actual no estarán disponibles");
            None
        }
    };

    // 4. Recuperar el último snapshot entrenado, si existe
    let registry = match load_snapshot(&cfg.artifacts_path) {
        Ok(Some(snapshot)) => ModelRegistry::with_snapshot(snapshot),
        Ok(None) => {
            info!(path = %cfg.artifacts_path.display(), "Sin artefacto previo; arranque en frío");
            ModelRegistry::new()
        }
        Err(err) => {
            warn!(
                path = %cfg.artifacts_path.display(),
                "No se pudo cargar el artefacto ({err}); arranque en frío"
            );
            ModelRegistry::new()
        }
    };

    // 5. Crear estado compartido y router
    let server_addr = cfg.server_addr.clone();
    let app_state = AppState::new(cfg, source).with_registry(Arc::new(registry));
    let app = create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error sirviendo la API")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
