use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{Tree, TreeOptions};
use super::Regressor;
use crate::encoding::{FeatureMatrix, FeatureVector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestOptions {
    pub n_trees: usize,
    pub tree: TreeOptions,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 20,
            tree: TreeOptions {
                max_depth: 10,
                min_rows_to_split: 2,
                l2: 0.0,
            },
        }
    }
}

/// Bosque aleatorio: media de árboles entrenados sobre muestras bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub trees: Vec<Tree>,
}

impl RandomForestRegressor {
    pub fn fit(
        options: &ForestOptions,
        cardinalities: [usize; 4],
        features: &FeatureMatrix,
        targets: &[f64],
        seed: u64,
    ) -> Self {
        let n = features.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let trees = (0..options.n_trees)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                Tree::grow(&options.tree, cardinalities, features, targets, sample)
            })
            .collect();
        Self { trees }
    }
}

impl Regressor for RandomForestRegressor {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}
