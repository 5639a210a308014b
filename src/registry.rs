//! Registro de modelos: un único snapshot inmutable publicado por intercambio
//! atómico del puntero, más su persistencia en disco.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::encoding::EncodingSchema;
use crate::evaluation::{EvaluationMetrics, PerformancePoint};
use crate::models::{ModelKind, PerModel};
use crate::normalize::DropCounts;
use crate::regression::TrainedModel;

/// Versión del formato del artefacto en disco.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Cifras de la ejecución que produjo el snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub rows_read: usize,
    pub dropped: DropCounts,
    pub train_rows: usize,
    pub held_out_rows: usize,
    pub districts: usize,
    pub categories: usize,
    pub feature_bytes: usize,
}

/// Resultado publicado de un entrenamiento: esquema, modelos y métricas de
/// la misma ejecución. No se modifica nunca tras publicarse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRegistrySnapshot {
    pub id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub schema: EncodingSchema,
    pub models: PerModel<TrainedModel>,
    pub metrics: PerModel<EvaluationMetrics>,
    pub performance: Vec<PerformancePoint>,
    pub summary: TrainingSummary,
}

/// Contenedor del snapshot vigente. El cerrojo sólo protege la lectura o el
/// reemplazo del puntero, nunca el trabajo de predicción.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ModelRegistrySnapshot>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ModelRegistrySnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// Snapshot vigente en el momento de la llamada.
    pub fn current(&self) -> Option<Arc<ModelRegistrySnapshot>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Sustituye el snapshot vigente en una sola asignación.
    pub fn publish(&self, snapshot: ModelRegistrySnapshot) -> Arc<ModelRegistrySnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self.current.write().replace(Arc::clone(&snapshot));
        info!(
            snapshot_id = %snapshot.id,
            previous = ?previous.map(|s| s.id),
            "Nuevo snapshot de modelos publicado"
        );
        snapshot
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("error de E/S en {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artefacto con formato inválido: {0}")]
    Format(#[from] serde_json::Error),
    #[error("versión de artefacto no soportada: {0}")]
    UnsupportedVersion(u32),
    #[error("artefacto con un modelo {0} inconsistente")]
    Corrupt(ModelKind),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactRef<'a> {
    format_version: u32,
    snapshot: &'a ModelRegistrySnapshot,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    format_version: u32,
    snapshot: ModelRegistrySnapshot,
}

/// Guarda el snapshot en `path`. Escribe primero un fichero temporal y luego
/// lo renombra, así un corte a medias nunca deja un artefacto truncado.
pub fn save_snapshot(path: &Path, snapshot: &ModelRegistrySnapshot) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp).map_err(io_err(&tmp))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(
        &mut writer,
        &ArtifactRef {
            format_version: ARTIFACT_FORMAT_VERSION,
            snapshot,
        },
    )?;
    writer.flush().map_err(io_err(&tmp))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;

    info!(path = %path.display(), snapshot_id = %snapshot.id, "Artefacto de modelos guardado");
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PersistError {
    let path = path.to_path_buf();
    move |source| PersistError::Io { path, source }
}

/// Carga el snapshot persistido. `Ok(None)` si todavía no existe.
pub fn load_snapshot(path: &Path) -> Result<Option<ModelRegistrySnapshot>, PersistError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_err(path)(source)),
    };
    let artifact: Artifact = serde_json::from_reader(BufReader::new(file))?;
    if artifact.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(artifact.format_version));
    }
    for (kind, model) in artifact.snapshot.models.iter() {
        if model.kind() != kind || !model.is_well_formed() {
            return Err(PersistError::Corrupt(kind));
        }
    }
    info!(
        path = %path.display(),
        snapshot_id = %artifact.snapshot.id,
        "Artefacto de modelos cargado"
    );
    Ok(Some(artifact.snapshot))
}
