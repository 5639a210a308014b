//! Regresores entrenables sobre `FeatureMatrix`.
//!
//! Los tres modelos guardan sus parámetros como datos serde planos para que el
//! snapshot completo pueda persistirse y recargarse sin reentrenar.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod tree;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::{FeatureMatrix, FeatureVector};
use crate::models::ModelKind;

pub use boosting::{BoostingOptions, GradientBoostedRegressor};
pub use forest::{ForestOptions, RandomForestRegressor};
pub use linear::{LinearOptions, LinearRegressor};
pub use tree::{Tree, TreeOptions};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("no hay filas de entrenamiento")]
    EmptyTrainingSet,
    #[error("{features} filas de características frente a {labels} etiquetas")]
    LengthMismatch { features: usize, labels: usize },
    #[error("etiqueta no finita en la fila {0}")]
    NonFiniteLabel(usize),
    #[error("el ajuste lineal falló: {0}")]
    Solver(String),
    #[error("demasiadas columnas one-hot para el modelo lineal: {0}")]
    TooManyFeatures(usize),
    #[error("matriz de diseño demasiado grande: {rows} filas × {columns} columnas")]
    DesignTooLarge { rows: usize, columns: usize },
}

/// Modelo capaz de predecir días de resolución a partir de un vector.
pub trait Regressor {
    fn predict_row(&self, row: &FeatureVector) -> f64;

    fn predict(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix.rows().map(|row| self.predict_row(&row)).collect()
    }
}

/// Parámetros ajustados, etiquetados por familia de modelo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModelParams {
    Linear(LinearRegressor),
    RandomForest(RandomForestRegressor),
    GradientBoosted(GradientBoostedRegressor),
}

/// Modelo entrenado junto con el instante en que terminó su ajuste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedModel {
    pub params: ModelParams,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        match self.params {
            ModelParams::Linear(_) => ModelKind::Linear,
            ModelParams::RandomForest(_) => ModelKind::RandomForest,
            ModelParams::GradientBoosted(_) => ModelKind::GradientBoosted,
        }
    }

    /// Comprueba la estructura de unos parámetros leídos de un artefacto.
    pub fn is_well_formed(&self) -> bool {
        match &self.params {
            ModelParams::Linear(model) => {
                model.offsets.windows(2).all(|pair| pair[0] <= pair[1])
                    && model.offsets[3] <= model.weights.len()
                    && model.intercept.is_finite()
                    && model.weights.iter().all(|w| w.is_finite())
            }
            ModelParams::RandomForest(model) => {
                !model.trees.is_empty() && model.trees.iter().all(Tree::is_well_formed)
            }
            ModelParams::GradientBoosted(model) => {
                model.base_score.is_finite()
                    && model.learning_rate.is_finite()
                    && model.trees.iter().all(Tree::is_well_formed)
            }
        }
    }
}

impl Regressor for TrainedModel {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        match &self.params {
            ModelParams::Linear(model) => model.predict_row(row),
            ModelParams::RandomForest(model) => model.predict_row(row),
            ModelParams::GradientBoosted(model) => model.predict_row(row),
        }
    }
}

/// Ajusta un modelo de la familia indicada con sus opciones por defecto.
/// `cardinalities` sigue el orden de `Field::ALL`.
pub fn fit_model(
    kind: ModelKind,
    cardinalities: [usize; 4],
    features: &FeatureMatrix,
    labels: &[f32],
    seed: u64,
) -> Result<TrainedModel, FitError> {
    let targets = validate(features, labels)?;
    let params = match kind {
        ModelKind::Linear => ModelParams::Linear(LinearRegressor::fit(
            &LinearOptions::default(),
            cardinalities,
            features,
            &targets,
        )?),
        ModelKind::RandomForest => ModelParams::RandomForest(RandomForestRegressor::fit(
            &ForestOptions::default(),
            cardinalities,
            features,
            &targets,
            seed,
        )),
        ModelKind::GradientBoosted => ModelParams::GradientBoosted(GradientBoostedRegressor::fit(
            &BoostingOptions::default(),
            cardinalities,
            features,
            &targets,
        )),
    };
    Ok(TrainedModel {
        params,
        trained_at: Utc::now(),
    })
}

/// Comprueba las dimensiones y devuelve las etiquetas en `f64`.
fn validate(features: &FeatureMatrix, labels: &[f32]) -> Result<Vec<f64>, FitError> {
    if features.len() != labels.len() {
        return Err(FitError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(FitError::EmptyTrainingSet);
    }
    if let Some(row) = labels.iter().position(|y| !y.is_finite()) {
        return Err(FitError::NonFiniteLabel(row));
    }
    Ok(labels.iter().map(|&y| y as f64).collect())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_inputs() {
        let empty = FeatureMatrix::default();
        assert_eq!(
            fit_model(ModelKind::Linear, fixtures::CARDINALITIES, &empty, &[], 1),
            Err(FitError::EmptyTrainingSet)
        );

        let (matrix, mut labels) = fixtures::additive();
        labels.pop();
        assert!(matches!(
            fit_model(ModelKind::RandomForest, fixtures::CARDINALITIES, &matrix, &labels, 1),
            Err(FitError::LengthMismatch { .. })
        ));

        let (matrix, mut labels) = fixtures::additive();
        labels[7] = f32::NAN;
        assert_eq!(
            fit_model(ModelKind::GradientBoosted, fixtures::CARDINALITIES, &matrix, &labels, 1),
            Err(FitError::NonFiniteLabel(7))
        );
    }

    #[test]
    fn trained_model_keeps_kind_through_json() {
        let (matrix, labels) = fixtures::additive();
        for kind in ModelKind::ALL {
            let model = fit_model(kind, fixtures::CARDINALITIES, &matrix, &labels, 42).unwrap();
            assert_eq!(model.kind(), kind);

            let json = serde_json::to_value(&model).unwrap();
            assert_eq!(json["params"]["kind"], kind.as_str());
            let back: TrainedModel = serde_json::from_value(json).unwrap();
            assert_eq!(back.kind(), kind);
            let row = matrix.row(5);
            assert!((back.predict_row(&row) - model.predict_row(&row)).abs() < 1e-9);
        }
    }
}
