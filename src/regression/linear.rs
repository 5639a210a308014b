//! Regresión lineal con regularización ridge sobre la expansión one-hot de los
//! códigos, ajustada con `linfa-elasticnet` (`l1_ratio = 0`). El intercepto no
//! se penaliza; las columnas que nunca se activan (como el código reservado)
//! quedan con peso 0.

use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{FitError, Regressor};
use crate::encoding::{FeatureMatrix, FeatureVector, Field};

/// Límite de columnas one-hot.
const MAX_COLUMNS: usize = 8192;
/// Límite de celdas de la matriz de diseño densa (filas × columnas).
const MAX_DESIGN_CELLS: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearOptions {
    /// Penalización ridge sobre la suma de cuadrados (no sobre la media).
    pub l2: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            l2: 1e-3,
            max_iterations: 2_000,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRegressor {
    /// Desplazamiento de cada campo dentro de `weights`, en orden de `Field::ALL`.
    pub offsets: [usize; 4],
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LinearRegressor {
    pub fn fit(
        options: &LinearOptions,
        cardinalities: [usize; 4],
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<Self, FitError> {
        let mut offsets = [0usize; 4];
        let mut width = 0usize;
        for (slot, cardinality) in offsets.iter_mut().zip(cardinalities) {
            *slot = width;
            width += cardinality;
        }
        if width > MAX_COLUMNS {
            return Err(FitError::TooManyFeatures(width));
        }
        let rows = targets.len();
        if rows.saturating_mul(width) > MAX_DESIGN_CELLS {
            return Err(FitError::DesignTooLarge { rows, columns: width });
        }

        let design = one_hot(&offsets, &cardinalities, features, width);
        let dataset = Dataset::new(design, Array1::from(targets.to_vec()));

        // linfa minimiza 1/(2n)·‖y − Xw‖² + ½·penalty·‖w‖², de ahí el reescalado.
        let model = ElasticNet::<f64>::params()
            .penalty(options.l2 / rows as f64)
            .l1_ratio(0.0)
            .with_intercept(true)
            .max_iterations(options.max_iterations)
            .tolerance(options.tolerance)
            .fit(&dataset)
            .map_err(|err| FitError::Solver(err.to_string()))?;

        let weights = model.hyperplane().to_vec();
        let intercept = model.intercept();
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(FitError::Solver("coeficientes no finitos".to_string()));
        }
        Ok(Self {
            offsets,
            intercept,
            weights,
        })
    }
}

impl Regressor for LinearRegressor {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        let mut value = self.intercept;
        for field in Field::ALL {
            let column = self.offsets[field.position()] + row.code(field);
            let next_offset = self
                .offsets
                .get(field.position() + 1)
                .copied()
                .unwrap_or(self.weights.len());
            if column < next_offset {
                value += self.weights.get(column).copied().unwrap_or(0.0);
            }
        }
        value
    }
}

/// Matriz de diseño densa: una columna por código de cada campo.
fn one_hot(
    offsets: &[usize; 4],
    cardinalities: &[usize; 4],
    features: &FeatureMatrix,
    width: usize,
) -> Array2<f64> {
    let mut design = Array2::<f64>::zeros((features.len(), width));
    for (i, row) in features.rows().enumerate() {
        for field in Field::ALL {
            let code = row.code(field);
            if code < cardinalities[field.position()] {
                design[(i, offsets[field.position()] + code)] = 1.0;
            }
        }
    }
    design
}
