//! Entrenamiento completo: normalización, partición reproducible, ajuste del
//! esquema, ajuste de los tres modelos y evaluación sobre la partición
//! reservada. Devuelve un snapshot listo para publicar o un error; nunca un
//! conjunto parcial de modelos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;
use uuid::Uuid;

use crate::encoding::EncodingSchema;
use crate::error::TrainingError;
use crate::evaluation::{evaluate, performance_sample};
use crate::models::{CanonicalAppeal, PerModel, RawAppeal};
use crate::normalize::normalize;
use crate::registry::{ModelRegistrySnapshot, TrainingSummary};
use crate::regression::fit_model;

/// Mínimo de apelaciones válidas para entrenar.
pub const MIN_TRAINING_RECORDS: usize = 30;
/// Fracción de apelaciones reservada para las métricas.
pub const HELD_OUT_FRACTION: f64 = 0.2;
/// Semilla de la partición y del bootstrap del bosque.
pub const SPLIT_SEED: u64 = 42;

/// Bandera de cancelación cooperativa, consultada entre ajustes de modelos.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TrainingError> {
        if self.is_cancelled() {
            Err(TrainingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Entrena sobre el corpus crudo. `progress` recibe un avance entre 0 y 1 y
/// un mensaje legible.
pub fn train(
    raw: &[RawAppeal],
    cancel: &CancelFlag,
    progress: &dyn Fn(f32, &str),
) -> Result<ModelRegistrySnapshot, TrainingError> {
    progress(0.1, "Normalizando apelaciones...");
    let normalized = normalize(raw);
    let available = normalized.appeals.len();
    if available < MIN_TRAINING_RECORDS {
        return Err(TrainingError::InsufficientData {
            available,
            required: MIN_TRAINING_RECORDS,
        });
    }

    let (train_set, held_out) = split(normalized.appeals);
    info!(
        train_rows = train_set.len(),
        held_out_rows = held_out.len(),
        "Partición de entrenamiento/evaluación"
    );

    // El esquema sólo ve la partición de entrenamiento.
    let schema = EncodingSchema::fit(&train_set)?;
    let cardinalities = schema.cardinalities();
    let train_features = schema.transform_batch(&train_set);
    let train_labels: Vec<f32> = train_set.iter().map(|a| a.days_to_resolve).collect();
    let held_out_features = schema.transform_batch(&held_out);
    let held_out_labels: Vec<f32> = held_out.iter().map(|a| a.days_to_resolve).collect();
    info!(
        districts = schema.districts.values().len(),
        categories = schema.categories.values().len(),
        feature_bytes = train_features.approx_bytes(),
        "Esquema de codificación ajustado"
    );

    let mut step = 0;
    let models = PerModel::try_from_fn(|kind| {
        cancel.check()?;
        step += 1;
        progress(0.2 + 0.2 * step as f32, &format!("Ajustando modelo {kind}..."));
        let model = fit_model(kind, cardinalities, &train_features, &train_labels, SPLIT_SEED)
            .map_err(|source| TrainingError::ModelFit { kind, source })?;
        info!(model = %kind, "Modelo ajustado");
        Ok::<_, TrainingError>(model)
    })?;
    cancel.check()?;

    progress(0.9, "Evaluando modelos...");
    let metrics = PerModel::try_from_fn(|kind| {
        evaluate(models.get(kind), &held_out_features, &held_out_labels)
            .map_err(|source| TrainingError::Evaluation { kind, source })
    })?;
    for (kind, m) in metrics.iter() {
        info!(model = %kind, rmse = m.rmse, mae = m.mae, "Métricas sobre la partición reservada");
    }

    let summary = TrainingSummary {
        rows_read: normalized.report.rows_read,
        dropped: normalized.report.dropped.clone(),
        train_rows: train_set.len(),
        held_out_rows: held_out.len(),
        districts: schema.districts.values().len(),
        categories: schema.categories.values().len(),
        feature_bytes: train_features.approx_bytes() + held_out_features.approx_bytes(),
    };
    let performance = performance_sample(&schema, &models, &held_out);
    cancel.check()?;

    Ok(ModelRegistrySnapshot {
        id: Uuid::new_v4(),
        trained_at: Utc::now(),
        schema,
        models,
        metrics,
        performance,
        summary,
    })
}

/// Baraja con semilla fija y separa la partición reservada. Cada partición
/// conserva el orden original del corpus, así el esquema asigna índices en
/// orden de aparición.
fn split(appeals: Vec<CanonicalAppeal>) -> (Vec<CanonicalAppeal>, Vec<CanonicalAppeal>) {
    let n = appeals.len();
    let held_out_rows = ((n as f64 * HELD_OUT_FRACTION).round() as usize).clamp(1, n - 1);

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(SPLIT_SEED));
    let mut is_held_out = vec![false; n];
    for &i in &order[..held_out_rows] {
        is_held_out[i] = true;
    }

    let mut train_set = Vec::with_capacity(n - held_out_rows);
    let mut held_out = Vec::with_capacity(held_out_rows);
    for (appeal, held) in appeals.into_iter().zip(is_held_out) {
        if held {
            held_out.push(appeal);
        } else {
            train_set.push(appeal);
        }
    }
    (train_set, held_out)
}
