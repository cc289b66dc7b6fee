//! Isolation-forest anomaly detection over a user's transactions
//!
//! The detector owns one forest. Training grows a complete replacement forest
//! outside any lock and swaps it in; scoring takes a snapshot of the current
//! forest. Training and scoring on the same detector therefore never observe
//! a half-built model.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::features::{FeatureBuilder, FeatureVector};
use crate::isolation::IsolationForest;
use crate::models::{expenses, Anomaly, AnomalyType, Severity, Transaction};

/// Trains and queries an isolation forest for one user (or one model scope)
pub struct AnomalyDetector {
    config: EngineConfig,
    model: RwLock<Arc<IsolationForest>>,
    rng: Mutex<StdRng>,
}

impl AnomalyDetector {
    /// Create a detector; seeded from `config.seed` when set, otherwise
    /// from system entropy
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Create a detector with a fixed seed (reproducible training)
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: EngineConfig, rng: StdRng) -> Self {
        let forest = IsolationForest::from_config(&config);
        Self {
            config,
            model: RwLock::new(Arc::new(forest)),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the current model
    pub fn model(&self) -> Result<Arc<IsolationForest>> {
        let guard = self
            .model
            .read()
            .map_err(|_| Error::Lock("Failed to acquire model lock".into()))?;
        Ok(Arc::clone(&guard))
    }

    pub fn is_model_trained(&self) -> bool {
        self.model().map(|m| m.is_trained()).unwrap_or(false)
    }

    /// Train on `transactions`, skipping (with a warning) when the history is
    /// too short to be meaningful
    ///
    /// Returns whether a new model was installed. A skipped training leaves
    /// any previous model in place.
    pub fn train_model(&self, transactions: &[Transaction]) -> bool {
        match self.try_train_model(transactions) {
            Ok(_) => true,
            Err(Error::InsufficientData { required, actual }) => {
                warn!(
                    required,
                    actual, "Not enough transactions to train anomaly model, skipping"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Anomaly model training failed");
                false
            }
        }
    }

    /// Train using the detector's own RNG; returns the number of training
    /// points
    pub fn try_train_model(&self, transactions: &[Transaction]) -> Result<usize> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Lock("Failed to acquire rng lock".into()))?;
        self.train_model_with_rng(transactions, &mut *rng)
    }

    /// Train with a caller-supplied random source
    pub fn train_model_with_rng<R: Rng + ?Sized>(
        &self,
        transactions: &[Transaction],
        rng: &mut R,
    ) -> Result<usize> {
        let transactions = expenses(transactions);
        if transactions.len() < self.config.min_training_transactions {
            return Err(Error::InsufficientData {
                required: self.config.min_training_transactions,
                actual: transactions.len(),
            });
        }

        let points: Vec<FeatureVector> = FeatureBuilder::new(&transactions, self.config.offset())
            .build_all(&transactions)
            .iter()
            .map(|point| point.features())
            .collect();

        let mut forest = IsolationForest::from_config(&self.config);
        forest.fit(&points, rng)?;

        let mut guard = self
            .model
            .write()
            .map_err(|_| Error::Lock("Failed to acquire model lock".into()))?;
        *guard = Arc::new(forest);

        debug!(points = points.len(), "Anomaly model trained");
        Ok(points.len())
    }

    /// Score one transaction, with frequencies counted over `all`
    pub fn score_transaction(&self, tx: &Transaction, all: &[Transaction]) -> Result<f64> {
        let forest = self.model()?;
        let point = FeatureBuilder::new(all, self.config.offset()).build(tx);
        forest.anomaly_score(&point.features())
    }

    /// Severity for a forest score, or `None` when it is below the reporting
    /// threshold
    pub fn severity_for(&self, score: f64) -> Option<Severity> {
        if score <= self.config.anomaly_threshold {
            None
        } else if score > self.config.high_severity_score {
            Some(Severity::High)
        } else if score > self.config.medium_severity_score {
            Some(Severity::Medium)
        } else {
            Some(Severity::Low)
        }
    }

    /// Score the user's most recent transactions and report the anomalous
    /// ones, most anomalous first
    ///
    /// Trains on the full supplied set first if no model exists yet. If the
    /// history is too short to train, the result is empty.
    pub fn detect_anomalies(
        &self,
        user_id: &str,
        transactions: &[Transaction],
    ) -> Result<Vec<Anomaly>> {
        self.detect_anomalies_at(user_id, transactions, Utc::now())
    }

    /// Same as [`detect_anomalies`](Self::detect_anomalies), stamping each
    /// anomaly as detected at `detected_at`
    pub fn detect_anomalies_at(
        &self,
        user_id: &str,
        transactions: &[Transaction],
        detected_at: DateTime<Utc>,
    ) -> Result<Vec<Anomaly>> {
        let transactions = expenses(transactions);

        if !self.is_model_trained() {
            self.train_model(&transactions);
        }

        let forest = self.model()?;
        if !forest.is_trained() {
            warn!(
                user_id,
                transactions = transactions.len(),
                "No trained anomaly model, skipping isolation forest scoring"
            );
            return Ok(Vec::new());
        }

        let builder = FeatureBuilder::new(&transactions, self.config.offset());

        let mut recent: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(self.config.recent_window);

        let mut anomalies = Vec::new();
        for tx in &recent {
            let point = builder.build(tx);
            let score = forest.anomaly_score(&point.features())?;

            let Some(severity) = self.severity_for(score) else {
                continue;
            };

            let description = format!(
                "Unusual transaction: {} for {:.2} (anomaly score {:.2})",
                tx.label(),
                tx.amount,
                score
            );
            anomalies.push(
                Anomaly::new(user_id, &tx.id, AnomalyType::Amount, severity, description)
                    .with_transaction(&tx.id)
                    .with_score(score)
                    .with_detected_at(detected_at),
            );
        }

        anomalies.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(
            user_id,
            scored = recent.len(),
            anomalies = anomalies.len(),
            "Anomaly detection complete"
        );

        Ok(anomalies)
    }
}
