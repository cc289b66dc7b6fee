//! Ensemble of isolation trees

use rand::Rng;

use super::{average_path_length, IsolationTree};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::features::FeatureVector;

/// Isolation Forest model
///
/// Starts untrained. [`fit`](Self::fit) replaces every tree, so the forest is
/// always consistent with exactly one training set.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    num_trees: usize,
    /// Upper bound on the per-tree bootstrap sample
    max_samples: usize,
    max_depth: usize,
    /// Sample size the current trees were grown on (normalizes scores)
    trained_sample_size: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(100, 256, 10)
    }
}

impl IsolationForest {
    pub fn new(num_trees: usize, max_samples: usize, max_depth: usize) -> Self {
        Self {
            trees: Vec::new(),
            num_trees,
            max_samples,
            max_depth,
            trained_sample_size: 0,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.num_trees, config.sample_size, config.max_tree_depth)
    }

    /// Grow `num_trees` trees, each on a bootstrap sample (with replacement)
    /// of `min(max_samples, data.len())` points
    ///
    /// Previous trees are discarded.
    pub fn fit<R: Rng + ?Sized>(&mut self, data: &[FeatureVector], rng: &mut R) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let sample_size = self.max_samples.min(data.len());
        let mut trees = Vec::with_capacity(self.num_trees);
        let mut sample: Vec<FeatureVector> = Vec::with_capacity(sample_size);

        for _ in 0..self.num_trees {
            sample.clear();
            sample.extend((0..sample_size).map(|_| data[rng.gen_range(0..data.len())]));
            trees.push(IsolationTree::build(&sample, self.max_depth, rng));
        }

        self.trees = trees;
        self.trained_sample_size = sample_size;

        tracing::debug!(
            trees = self.trees.len(),
            sample_size,
            points = data.len(),
            "Isolation forest fitted"
        );

        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trained_sample_size(&self) -> usize {
        self.trained_sample_size
    }

    /// Mean path length of `point` across all trees
    pub fn mean_path_length(&self, point: &FeatureVector) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(Error::ModelNotTrained);
        }

        let total: f64 = self.trees.iter().map(|tree| tree.path_length(point)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Anomaly score in `(0, 1]`: `2^(-mean path / c(sample size))`
    pub fn anomaly_score(&self, point: &FeatureVector) -> Result<f64> {
        let mean_path = self.mean_path_length(point)?;
        let normalizer = average_path_length(self.trained_sample_size);

        // A single-point sample never splits: every path is 0
        if normalizer <= 0.0 {
            return Ok(1.0);
        }

        Ok(2f64.powf(-mean_path / normalizer))
    }

    /// Score many points at once
    pub fn score_all(&self, points: &[FeatureVector]) -> Result<Vec<f64>> {
        points.iter().map(|p| self.anomaly_score(p)).collect()
    }
}
