use std::sync::Arc;

use crate::{config::AppConfig, jobs::TrainingJobs, registry::ModelRegistry, source::AppealSource};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub jobs: Arc<TrainingJobs>,
    // None si no hay DATABASE_URL: se sirve lo cargado pero no se entrena.
    pub source: Option<Arc<dyn AppealSource>>,
}

impl AppState {
    pub fn new(config: AppConfig, source: Option<Arc<dyn AppealSource>>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(ModelRegistry::new()),
            jobs: Arc::new(TrainingJobs::new()),
            source,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }
}
