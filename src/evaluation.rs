//! Métricas de error (RMSE, MAE) sobre la partición reservada.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::{EncodingSchema, FeatureMatrix};
use crate::models::{CanonicalAppeal, PerModel};
use crate::regression::{Regressor, TrainedModel};

/// Máximo de filas reservadas que se guardan para `/performance`.
pub const PERFORMANCE_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("el conjunto de evaluación está vacío")]
    EmptyEvaluationSet,
    #[error("{features} filas de características frente a {labels} etiquetas")]
    LengthMismatch { features: usize, labels: usize },
    #[error("las métricas no son finitas")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub rmse: f64,
    pub mae: f64,
}

/// Días predichos tal y como se sirven: nunca negativos.
pub fn served_days(prediction: f64) -> f64 {
    prediction.max(0.0)
}

/// Evalúa un modelo sobre filas que no se usaron para ajustarlo, con las
/// predicciones recortadas igual que al servirlas.
pub fn evaluate<R: Regressor + ?Sized>(
    model: &R,
    features: &FeatureMatrix,
    labels: &[f32],
) -> Result<EvaluationMetrics, EvaluationError> {
    if features.len() != labels.len() {
        return Err(EvaluationError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    let predictions: Vec<f64> = model.predict(features).into_iter().map(served_days).collect();
    score(&predictions, labels)
}

/// RMSE y MAE de un vector de predicciones frente a sus etiquetas.
pub fn score(predictions: &[f64], labels: &[f32]) -> Result<EvaluationMetrics, EvaluationError> {
    if labels.is_empty() {
        return Err(EvaluationError::EmptyEvaluationSet);
    }
    if predictions.len() != labels.len() {
        return Err(EvaluationError::LengthMismatch {
            features: predictions.len(),
            labels: labels.len(),
        });
    }

    let n = labels.len() as f64;
    let (squared, absolute) = predictions
        .iter()
        .zip(labels)
        .fold((0.0f64, 0.0f64), |(sq, abs), (p, &y)| {
            let residual = p - y as f64;
            (sq + residual * residual, abs + residual.abs())
        });
    let mae = absolute / n;
    // RMSE ≥ MAE siempre; el redondeo puede dejar la raíz un ulp por debajo.
    let metrics = EvaluationMetrics {
        rmse: (squared / n).sqrt().max(mae),
        mae,
    };
    if !metrics.rmse.is_finite() || !metrics.mae.is_finite() {
        return Err(EvaluationError::NonFinite);
    }
    Ok(metrics)
}

/// Fila reservada con su valor real y lo que predijo cada modelo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePoint {
    pub district: String,
    pub category: String,
    pub actual: f32,
    pub predicted: PerModel<f64>,
}

/// Toma las primeras filas reservadas para la comparación real/predicho.
pub fn performance_sample(
    schema: &EncodingSchema,
    models: &PerModel<TrainedModel>,
    held_out: &[CanonicalAppeal],
) -> Vec<PerformancePoint> {
    held_out
        .iter()
        .take(PERFORMANCE_SAMPLE_SIZE)
        .map(|appeal| {
            let row = schema.transform(appeal);
            PerformancePoint {
                district: appeal.district.clone(),
                category: appeal.category.clone(),
                actual: appeal.days_to_resolve,
                predicted: models.map(|_, model| served_days(model.predict_row(&row))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::FeatureVector;

    struct Constant(f64);

    impl Regressor for Constant {
        fn predict_row(&self, _row: &FeatureVector) -> f64 {
            self.0
        }
    }

    fn matrix(rows: usize) -> FeatureMatrix {
        (0..rows)
            .map(|i| FeatureVector {
                district: i as u16,
                category: 0,
                day_of_week: 0,
                month: 0,
            })
            .collect()
    }

    #[test]
    fn computes_rmse_and_mae() {
        let metrics = evaluate(&Constant(2.0), &matrix(4), &[1.0, 3.0, 2.0, 6.0]).unwrap();
        // Residuos: 1, -1, 0, -4
        assert!((metrics.mae - 1.5).abs() < 1e-12);
        assert!((metrics.rmse - (18.0f64 / 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_set_is_an_error() {
        assert_eq!(
            evaluate(&Constant(1.0), &FeatureMatrix::default(), &[]),
            Err(EvaluationError::EmptyEvaluationSet)
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            evaluate(&Constant(1.0), &matrix(3), &[1.0]),
            Err(EvaluationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_predictions_are_rejected() {
        assert_eq!(
            evaluate(&Constant(f64::INFINITY), &matrix(2), &[1.0, 2.0]),
            Err(EvaluationError::NonFinite)
        );
    }

    #[test]
    fn constant_residuals_keep_rmse_at_least_mae() {
        for n in 1..40usize {
            for k in 0..200 {
                let labels = vec![k as f32 * 0.1; n];
                let metrics = score(&vec![0.0; n], &labels).unwrap();
                assert!(metrics.rmse >= metrics.mae, "n={n} k={k}: {metrics:?}");
            }
        }
    }

    #[test]
    fn negative_predictions_are_scored_as_zero_days() {
        let metrics = evaluate(&Constant(-5.0), &matrix(2), &[1.0, 2.0]).unwrap();
        assert!((metrics.mae - 1.5).abs() < 1e-12);
    }

    #[test]
    fn rmse_never_below_mae() {
        let labels: Vec<f32> = (0..50).map(|i| ((i * 37) % 23) as f32 * 0.7).collect();
        for guess in [0.0, 3.5, 7.0, 100.0] {
            let metrics = evaluate(&Constant(guess), &matrix(labels.len()), &labels).unwrap();
            assert!(metrics.mae >= 0.0);
            assert!(metrics.rmse >= metrics.mae);
        }
    }
}
