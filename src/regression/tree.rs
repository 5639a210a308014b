//! Árbol de regresión con divisiones de igualdad categórica (`campo == código`).
//!
//! Cada nodo se evalúa con una sola pasada por sus filas acumulando suma y
//! conteo por código, así que no hace falta materializar columnas one-hot.

use serde::{Deserialize, Serialize};

use crate::encoding::{Code, FeatureMatrix, FeatureVector, Field};

const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeOptions {
    pub max_depth: usize,
    pub min_rows_to_split: usize,
    /// Regularización L2 del valor de las hojas (0 = media simple).
    pub l2: f64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_rows_to_split: 2,
            l2: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    #[serde(rename_all = "camelCase")]
    Branch {
        field: Field,
        code: Code,
        matched: u32,
        rest: u32,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &FeatureVector) -> f64 {
        let mut index = 0usize;
        while let Some(node) = self.nodes.get(index) {
            match node {
                Node::Leaf { value } => return *value,
                Node::Branch {
                    field,
                    code,
                    matched,
                    rest,
                } => {
                    index = if row.code(*field) == *code as usize {
                        *matched as usize
                    } else {
                        *rest as usize
                    };
                }
            }
        }
        0.0
    }

    /// Un árbol cargado de fuera sólo es utilizable si cada rama apunta a
    /// nodos posteriores existentes y las hojas son finitas. Así `predict` y
    /// `depth` siempre terminan.
    pub fn is_well_formed(&self) -> bool {
        let len = self.nodes.len();
        len > 0
            && self.nodes.iter().enumerate().all(|(index, node)| match node {
                Node::Branch { matched, rest, .. } => [*matched, *rest]
                    .iter()
                    .all(|&child| (child as usize) > index && (child as usize) < len),
                Node::Leaf { value } => value.is_finite(),
            })
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match nodes.get(index) {
                Some(Node::Branch { matched, rest, .. }) => {
                    1 + walk(nodes, *matched as usize).max(walk(nodes, *rest as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Hace crecer un árbol sobre `rows` (que puede repetir filas, como en
    /// un bootstrap). `rows` no debe estar vacío.
    pub fn grow(
        options: &TreeOptions,
        cardinalities: [usize; 4],
        features: &FeatureMatrix,
        targets: &[f64],
        rows: Vec<usize>,
    ) -> Tree {
        let mut builder = Builder {
            options,
            cardinalities,
            features,
            targets,
            nodes: Vec::new(),
        };
        builder.build(rows, 0);
        Tree {
            nodes: builder.nodes,
        }
    }
}

struct Split {
    field: Field,
    code: Code,
}

struct Builder<'a> {
    options: &'a TreeOptions,
    cardinalities: [usize; 4],
    features: &'a FeatureMatrix,
    targets: &'a [f64],
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> u32 {
        let index = self.nodes.len() as u32;
        let sum: f64 = rows.iter().map(|&r| self.targets[r]).sum();
        let leaf = Node::Leaf {
            value: sum / (rows.len() as f64 + self.options.l2),
        };

        let split = if depth < self.options.max_depth && rows.len() >= self.options.min_rows_to_split
        {
            self.best_split(&rows, sum)
        } else {
            None
        };

        self.nodes.push(leaf);
        let Some(Split { field, code }) = split else {
            return index;
        };

        let (matched_rows, rest_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.features.code(field, r) == code as usize);
        let matched = self.build(matched_rows, depth + 1);
        let rest = self.build(rest_rows, depth + 1);
        self.nodes[index as usize] = Node::Branch {
            field,
            code,
            matched,
            rest,
        };
        index
    }

    fn best_split(&self, rows: &[usize], total_sum: f64) -> Option<Split> {
        let n = rows.len() as f64;
        let l2 = self.options.l2;
        let parent_score = total_sum * total_sum / (n + l2);
        let mut best: Option<(f64, Split)> = None;

        for field in Field::ALL {
            let cardinality = self.cardinalities[field.position()];
            let mut sums = vec![0.0f64; cardinality];
            let mut counts = vec![0usize; cardinality];
            for &r in rows {
                let code = self.features.code(field, r);
                if code < cardinality {
                    sums[code] += self.targets[r];
                    counts[code] += 1;
                }
            }

            for code in 0..cardinality {
                let left_n = counts[code];
                if left_n == 0 || left_n == rows.len() {
                    continue;
                }
                let left_sum = sums[code];
                let right_sum = total_sum - left_sum;
                let right_n = (rows.len() - left_n) as f64;
                let gain = left_sum * left_sum / (left_n as f64 + l2)
                    + right_sum * right_sum / (right_n + l2)
                    - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |(g, _)| gain > *g) {
                    best = Some((
                        gain,
                        Split {
                            field,
                            code: code as Code,
                        },
                    ));
                }
            }
        }
        best.map(|(_, split)| split)
    }
}
