//! Outlier scoring over recent `(price, volume)` pairs.
//!
//! The analyzer only depends on [`AnomalyModel`]; [`IsolationForest`] is the
//! default implementation. Scores follow one convention for every model:
//! lower means more anomalous, negative means "outlier at the configured
//! contamination level".

use crate::error::ModelError;
use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;
use rand::{Rng, SeedableRng};

/// Stateless-per-call outlier model
pub trait AnomalyModel: Send + Sync {
    /// Fit on `points` and return one score per point, in input order
    fn score(&self, points: &[[f64; 2]]) -> Result<Vec<f64>, ModelError>;

    fn name(&self) -> &str;
}

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest over 2-D points
///
/// Each tree isolates points with random axis-aligned splits; anomalies get
/// isolated in fewer splits. Scores are `-s(x) - offset` where `s(x)` is the
/// usual `2^(-E[h(x)] / c(n))` anomaly score and `offset` is the
/// `contamination` quantile of the training scores.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_trees: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    fn build_tree(
        points: &[[f64; 2]],
        indices: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Node {
        if depth >= max_depth || indices.len() <= 1 {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        // Only features that still vary inside this node can split it
        let mut candidates = Vec::with_capacity(2);
        let mut ranges = [(0.0, 0.0); 2];
        for (feature, range) in ranges.iter_mut().enumerate() {
            let (min, max) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &i| (lo.min(points[i][feature]), hi.max(points[i][feature])),
            );
            *range = (min, max);
            if max > min {
                candidates.push(feature);
            }
        }

        if candidates.is_empty() {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        let feature = candidates[rng.gen_range(0..candidates.len())];
        let (min, max) = ranges[feature];
        let threshold = rng.gen_range(min..max);

        // Partition in place: left side holds values < threshold
        let mut split = 0;
        for j in 0..indices.len() {
            if points[indices[j]][feature] < threshold {
                indices.swap(split, j);
                split += 1;
            }
        }

        let (left, right) = indices.split_at_mut(split);
        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::build_tree(points, left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_tree(points, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(node: &Node, point: &[f64; 2], depth: usize) -> f64 {
        match node {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] < *threshold {
                    Self::path_length(left, point, depth + 1)
                } else {
                    Self::path_length(right, point, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl AnomalyModel for IsolationForest {
    fn score(&self, points: &[[f64; 2]]) -> Result<Vec<f64>, ModelError> {
        if points.len() < 2 {
            return Err(ModelError::InsufficientData {
                got: points.len(),
                needed: 2,
            });
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput);
        }

        let sample_size = self.max_samples.min(points.len());
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees: Vec<Node> = (0..self.n_trees)
            .map(|_| {
                let mut indices = sample_indices(&mut rng, points.len(), sample_size).into_vec();
                Self::build_tree(points, &mut indices, 0, max_depth, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(sample_size);
        let raw: Vec<f64> = points
            .iter()
            .map(|point| {
                let mean_depth = trees
                    .iter()
                    .map(|tree| Self::path_length(tree, point, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                // Higher raw value = more normal
                -(2f64).powf(-mean_depth / normalizer)
            })
            .collect();

        let offset = quantile(&raw, self.contamination);
        let scores: Vec<f64> = raw.iter().map(|s| s - offset).collect();

        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ModelError::NonFiniteOutput);
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }
}

/// Linear-interpolated quantile, `q` in [0, 1]
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<[f64; 2]> {
        let mut points: Vec<[f64; 2]> = (0..19)
            .map(|i| [1.0 + (i % 5) as f64 * 0.01, 100.0 + (i % 3) as f64])
            .collect();
        points.push([5.0, 900.0]);
        points
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let forest = IsolationForest::default();
        let scores = forest.score(&cluster_with_outlier()).unwrap();

        assert_eq!(scores.len(), 20);
        let last = *scores.last().unwrap();
        assert!(last < 0.0, "outlier should be below the contamination offset");
        assert!(scores[..19].iter().all(|s| *s > last));
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let forest = IsolationForest::default();
        let points = cluster_with_outlier();
        assert_eq!(forest.score(&points).unwrap(), forest.score(&points).unwrap());
    }

    #[test]
    fn test_constant_points_are_not_anomalous() {
        let forest = IsolationForest::default();
        let scores = forest.score(&[[1.0, 100.0]; 20]).unwrap();
        assert!(scores.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let forest = IsolationForest::default();
        assert!(matches!(
            forest.score(&[[1.0, 1.0]]),
            Err(ModelError::InsufficientData { .. })
        ));
        assert_eq!(
            forest.score(&[[1.0, 1.0], [f64::NAN, 1.0]]),
            Err(ModelError::NonFiniteInput)
        );
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(20));
    }
}
