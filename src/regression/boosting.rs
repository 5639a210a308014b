use serde::{Deserialize, Serialize};

use super::tree::{Tree, TreeOptions};
use super::Regressor;
use crate::encoding::{FeatureMatrix, FeatureVector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostingOptions {
    pub rounds: usize,
    pub learning_rate: f64,
    pub tree: TreeOptions,
}

impl Default for BoostingOptions {
    fn default() -> Self {
        Self {
            rounds: 20,
            learning_rate: 0.3,
            tree: TreeOptions {
                max_depth: 5,
                min_rows_to_split: 2,
                l2: 1.0,
            },
        }
    }
}

/// Gradient boosting con pérdida cuadrática: cada ronda ajusta un árbol a los
/// residuos de las rondas anteriores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientBoostedRegressor {
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
}

impl GradientBoostedRegressor {
    pub fn fit(
        options: &BoostingOptions,
        cardinalities: [usize; 4],
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Self {
        let n = features.len();
        let base_score = if n == 0 {
            0.0
        } else {
            targets.iter().sum::<f64>() / n as f64
        };
        let mut current = vec![base_score; n];
        let mut trees = Vec::with_capacity(options.rounds);

        for _ in 0..options.rounds {
            let residuals: Vec<f64> = targets.iter().zip(&current).map(|(y, p)| y - p).collect();
            let tree = Tree::grow(&options.tree, cardinalities, features, &residuals, (0..n).collect());
            for (i, prediction) in current.iter_mut().enumerate() {
                *prediction += options.learning_rate * tree.predict(&features.row(i));
            }
            trees.push(tree);
        }

        Self {
            base_score,
            learning_rate: options.learning_rate,
            trees,
        }
    }
}

impl Regressor for GradientBoostedRegressor {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }
}
