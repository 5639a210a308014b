//! Trabajo de entrenamiento en segundo plano: como mucho uno en curso, con
//! estado consultable y cancelación cooperativa.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{TrainingError, TriggerError};
use crate::registry::{save_snapshot, ModelRegistry};
use crate::source::AppealSource;
use crate::trainer::{self, CancelFlag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Estado visible del último trabajo.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    pub state: JobState,
    pub job_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
    pub is_busy: bool,
    /// Snapshot publicado por el trabajo, si terminó bien.
    pub snapshot_id: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct TrainingJobs {
    status: Mutex<TrainingStatus>,
    cancel: Mutex<Option<CancelFlag>>,
}

impl TrainingJobs {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(TrainingStatus {
                message: "Sin entrenamientos en esta sesión.".to_string(),
                ..TrainingStatus::default()
            }),
            cancel: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TrainingStatus {
        self.status.lock().clone()
    }

    /// Lanza un entrenamiento si no hay otro en curso. El resultado sólo se
    /// publica en `registry` si la ejecución completa termina bien; después
    /// se persiste en `artifacts` cuando se indica.
    pub fn trigger(
        self: &Arc<Self>,
        source: Arc<dyn AppealSource>,
        registry: Arc<ModelRegistry>,
        artifacts: Option<PathBuf>,
    ) -> Result<Uuid, TriggerError> {
        let job_id = Uuid::new_v4();
        let cancel = CancelFlag::default();
        {
            let mut status = self.status.lock();
            if status.is_busy {
                let running = status.job_id.unwrap_or_default();
                warn!(job_id = %running, "Entrenamiento rechazado: ya hay uno en curso");
                return Err(TriggerError::TrainingInProgress(running));
            }
            *status = TrainingStatus {
                state: JobState::Running,
                job_id: Some(job_id),
                started_at: Some(Utc::now()),
                finished_at: None,
                message: "Iniciando entrenamiento...".to_string(),
                progress: 0.0,
                is_busy: true,
                snapshot_id: None,
            };
            *self.cancel.lock() = Some(cancel.clone());
        }
        info!(%job_id, "Entrenamiento lanzado");

        let jobs = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = jobs.run(job_id, source, &registry, cancel).await;
            if let (Ok(snapshot_id), Some(path)) = (&outcome, artifacts) {
                persist(&registry, *snapshot_id, path).await;
            }
            jobs.finish(job_id, outcome);
        });

        Ok(job_id)
    }

    /// Pide la cancelación del trabajo en curso. Se hace efectiva en el
    /// siguiente punto de control del entrenamiento.
    pub fn cancel(&self) -> Result<Uuid, TriggerError> {
        let status = self.status.lock();
        match (status.is_busy, status.job_id, self.cancel.lock().as_ref()) {
            (true, Some(job_id), Some(flag)) => {
                flag.cancel();
                info!(%job_id, "Cancelación solicitada");
                Ok(job_id)
            }
            _ => Err(TriggerError::NothingRunning),
        }
    }

    async fn run(
        self: &Arc<Self>,
        job_id: Uuid,
        source: Arc<dyn AppealSource>,
        registry: &ModelRegistry,
        cancel: CancelFlag,
    ) -> Result<Uuid, TrainingError> {
        self.update(job_id, 0.05, "Leyendo apelaciones históricas...");
        let raw = source
            .fetch_all()
            .await
            .map_err(|err| TrainingError::Source(format!("{err:#}")))?;

        let jobs = Arc::clone(self);
        let flag = cancel.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            trainer::train(&raw, &flag, &|progress: f32, message: &str| {
                jobs.update(job_id, progress, message)
            })
        })
        .await
        .map_err(|err| TrainingError::Aborted(err.to_string()))??;

        // Un cancel que llegue tras el último ajuste todavía descarta el resultado.
        if cancel.is_cancelled() {
            return Err(TrainingError::Cancelled);
        }
        Ok(registry.publish(snapshot).id)
    }

    fn update(&self, job_id: Uuid, progress: f32, message: &str) {
        let mut status = self.status.lock();
        if status.job_id == Some(job_id) {
            status.progress = progress.clamp(0.0, 1.0);
            status.message = message.to_string();
        }
    }

    fn finish(&self, job_id: Uuid, outcome: Result<Uuid, TrainingError>) {
        let mut status = self.status.lock();
        if status.job_id != Some(job_id) {
            return;
        }
        status.is_busy = false;
        status.finished_at = Some(Utc::now());
        match outcome {
            Ok(snapshot_id) => {
                status.state = JobState::Succeeded;
                status.progress = 1.0;
                status.snapshot_id = Some(snapshot_id);
                status.message = format!("¡Entrenamiento completado! Snapshot {snapshot_id}");
                info!(%job_id, %snapshot_id, "Entrenamiento completado");
            }
            Err(TrainingError::Cancelled) => {
                status.state = JobState::Cancelled;
                status.message = "Entrenamiento cancelado; se mantienen los modelos anteriores.".to_string();
                warn!(%job_id, "Entrenamiento cancelado");
            }
            Err(err) => {
                status.state = JobState::Failed;
                status.message = format!("Error en el entrenamiento: {err}");
                error!(%job_id, "Error en el entrenamiento: {err}");
            }
        }
        *self.cancel.lock() = None;
    }
}

async fn persist(registry: &ModelRegistry, snapshot_id: Uuid, path: PathBuf) {
    let Some(snapshot) = registry.current().filter(|s| s.id == snapshot_id) else {
        return;
    };
    let result = tokio::task::spawn_blocking(move || save_snapshot(&path, &snapshot)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(%snapshot_id, "No se pudo guardar el artefacto: {err}"),
        Err(err) => error!(%snapshot_id, "La tarea de guardado terminó de forma anómala: {err}"),
    }
}
