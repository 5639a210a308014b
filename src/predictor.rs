//! Predicción y consultas sobre el snapshot publicado.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::PredictError;
use crate::evaluation::{served_days, PerformancePoint};
use crate::models::{AppealInput, PerModel};
use crate::registry::{ModelRegistry, ModelRegistrySnapshot};
use crate::regression::Regressor;

/// Días estimados por cada modelo, junto al snapshot que los produjo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(flatten)]
    pub predictions: PerModel<f64>,
    pub snapshot_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub unseen_district: bool,
    pub unseen_category: bool,
}

/// Predice con el snapshot vigente. Se lee una sola vez, así las tres
/// predicciones salen siempre del mismo esquema y los mismos modelos.
pub fn predict(registry: &ModelRegistry, input: &AppealInput) -> Result<Prediction, PredictError> {
    let snapshot = current(registry)?;
    Ok(predict_with(&snapshot, input))
}

pub fn predict_with(snapshot: &ModelRegistrySnapshot, input: &AppealInput) -> Prediction {
    let at = input.registration_date.unwrap_or_else(Utc::now);
    let schema = &snapshot.schema;
    let row = schema.encode(&input.district, &input.category, &at);

    let unseen_district = row.district == schema.districts.unseen_code();
    let unseen_category = row.category == schema.categories.unseen_code();
    if unseen_district || unseen_category {
        warn!(
            district = %input.district,
            category = %input.category,
            unseen_district,
            unseen_category,
            "Valor no visto en el entrenamiento; se usa la categoría reservada"
        );
    }

    Prediction {
        predictions: snapshot.models.map(|_, model| served_days(model.predict_row(&row))),
        snapshot_id: snapshot.id,
        trained_at: snapshot.trained_at,
        unseen_district,
        unseen_category,
    }
}

/// Métricas del snapshot vigente, agrupadas por métrica.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub snapshot_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub mae: PerModel<f64>,
    pub rmse: PerModel<f64>,
}

pub fn metrics(registry: &ModelRegistry) -> Result<MetricsReport, PredictError> {
    let snapshot = current(registry)?;
    Ok(MetricsReport {
        snapshot_id: snapshot.id,
        trained_at: snapshot.trained_at,
        mae: snapshot.metrics.map(|_, m| m.mae),
        rmse: snapshot.metrics.map(|_, m| m.rmse),
    })
}

/// Muestra real/predicho guardada al entrenar.
pub fn performance(registry: &ModelRegistry) -> Result<Vec<PerformancePoint>, PredictError> {
    Ok(current(registry)?.performance.clone())
}

fn current(registry: &ModelRegistry) -> Result<Arc<ModelRegistrySnapshot>, PredictError> {
    registry.current().ok_or(PredictError::NoTrainedModel)
}
