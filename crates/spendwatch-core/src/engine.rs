//! Analysis Engine - runs every pipeline over one user's transactions
//!
//! Three pipelines contribute to a report:
//! - isolation forest scoring of recent transactions (per-user model)
//! - per-category spending patterns
//! - daily and category baseline alerts
//!
//! A pipeline that fails is logged and skipped; the others still report.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::baseline::BaselineAlerter;
use crate::config::EngineConfig;
use crate::detector::AnomalyDetector;
use crate::error::{Error, Result};
use crate::models::{expenses, Anomaly, SpendingPattern, Transaction};
use crate::patterns::PatternAnalyzer;

/// Identifies an analysis pipeline in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    IsolationForest,
    Patterns,
    Baseline,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsolationForest => "isolation_forest",
            Self::Patterns => "patterns",
            Self::Baseline => "baseline",
        }
    }
}

/// Everything one analysis run found for a user
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub user_id: String,
    /// Most severe first, then most recent
    pub anomalies: Vec<Anomaly>,
    /// One per category, sorted by category
    pub patterns: Vec<SpendingPattern>,
    pub analyzed_at: DateTime<Utc>,
    /// The user's valid expenses considered
    pub transactions_analyzed: usize,
    /// Records dropped for failing validation
    pub skipped_invalid: usize,
    /// Whether the user's isolation forest was trained after this run
    pub model_trained: bool,
}

impl AnalysisReport {
    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-user anomaly detectors, created on first use
#[derive(Default)]
pub struct DetectorCache {
    detectors: RwLock<HashMap<String, Arc<AnomalyDetector>>>,
}

impl DetectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's detector, creating an untrained one if needed
    pub fn get_or_create(
        &self,
        user_id: &str,
        config: &EngineConfig,
    ) -> Result<Arc<AnomalyDetector>> {
        {
            let detectors = self
                .detectors
                .read()
                .map_err(|_| Error::Lock("Failed to acquire detector cache lock".into()))?;
            if let Some(detector) = detectors.get(user_id) {
                return Ok(Arc::clone(detector));
            }
        }

        let mut detectors = self
            .detectors
            .write()
            .map_err(|_| Error::Lock("Failed to acquire detector cache lock".into()))?;
        let detector = detectors
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AnomalyDetector::new(config.clone())));
        Ok(Arc::clone(detector))
    }

    /// Drop the user's detector (and its model); returns whether one existed
    pub fn remove(&self, user_id: &str) -> Result<bool> {
        let mut detectors = self
            .detectors
            .write()
            .map_err(|_| Error::Lock("Failed to acquire detector cache lock".into()))?;
        Ok(detectors.remove(user_id).is_some())
    }

    /// Number of users with a cached detector
    pub fn user_count(&self) -> Result<usize> {
        let detectors = self
            .detectors
            .read()
            .map_err(|_| Error::Lock("Failed to acquire detector cache lock".into()))?;
        Ok(detectors.len())
    }
}

/// The main analysis engine
pub struct SpendingEngine {
    config: EngineConfig,
    detectors: DetectorCache,
    patterns: PatternAnalyzer,
    baseline: BaselineAlerter,
}

impl SpendingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            patterns: PatternAnalyzer::new(&config),
            baseline: BaselineAlerter::new(&config),
            detectors: DetectorCache::new(),
            config,
        }
    }

    /// Create an engine from the config override file (or embedded defaults)
    pub fn load() -> Result<Self> {
        Ok(Self::new(EngineConfig::load()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The detector holding `user_id`'s model
    pub fn detector_for(&self, user_id: &str) -> Result<Arc<AnomalyDetector>> {
        self.detectors.get_or_create(user_id, &self.config)
    }

    /// Forget a user's trained model; the next analysis retrains it
    pub fn forget(&self, user_id: &str) -> Result<bool> {
        let removed = self.detectors.remove(user_id)?;
        if removed {
            tracing::debug!(user_id, "Dropped cached anomaly model");
        }
        Ok(removed)
    }

    /// Train (or retrain) the user's model on `transactions`
    pub fn train(&self, user_id: &str, transactions: &[Transaction]) -> Result<bool> {
        Ok(self.detector_for(user_id)?.train_model(transactions))
    }

    /// Analyze `user_id` as of now
    pub fn analyze(&self, user_id: &str, transactions: &[Transaction]) -> AnalysisReport {
        self.analyze_at(user_id, transactions, Utc::now())
    }

    /// Run every pipeline over `user_id`'s transactions; baseline alerts
    /// evaluate `as_of`'s calendar day
    ///
    /// Other users' transactions in `transactions` are ignored, so a user's
    /// model and frequency features only ever see their own history.
    pub fn analyze_at(
        &self,
        user_id: &str,
        transactions: &[Transaction],
        as_of: DateTime<Utc>,
    ) -> AnalysisReport {
        let mine: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        let cleaned = expenses(&mine);
        let skipped_invalid = mine.len() - cleaned.len();

        let mut anomalies = Vec::new();

        let detected = self
            .detector_for(user_id)
            .and_then(|detector| detector.detect_anomalies_at(user_id, &cleaned, as_of));
        Self::collect(Pipeline::IsolationForest, detected, &mut anomalies);

        let alerts = self.baseline.check_at(user_id, &cleaned, as_of);
        Self::collect(Pipeline::Baseline, Ok(alerts), &mut anomalies);

        let patterns = self.patterns.analyze_at(user_id, &cleaned, as_of);
        tracing::debug!(
            pipeline = Pipeline::Patterns.as_str(),
            count = patterns.len(),
            "Pipeline complete"
        );

        // Sort by severity (highest first), then by detection time (most recent first)
        anomalies.sort_by(|a, b| {
            b.severity
                .priority()
                .cmp(&a.severity.priority())
                .then_with(|| b.detected_at.cmp(&a.detected_at))
        });

        let model_trained = self
            .detector_for(user_id)
            .map(|d| d.is_model_trained())
            .unwrap_or(false);

        tracing::info!(
            user_id,
            transactions = cleaned.len(),
            skipped_invalid,
            anomalies = anomalies.len(),
            patterns = patterns.len(),
            model_trained,
            "Spending analysis complete"
        );

        AnalysisReport {
            user_id: user_id.to_string(),
            anomalies,
            patterns,
            analyzed_at: as_of,
            transactions_analyzed: cleaned.len(),
            skipped_invalid,
            model_trained,
        }
    }

    fn collect(pipeline: Pipeline, result: Result<Vec<Anomaly>>, into: &mut Vec<Anomaly>) {
        match result {
            Ok(found) => {
                tracing::debug!(
                    pipeline = pipeline.as_str(),
                    count = found.len(),
                    "Pipeline complete"
                );
                into.extend(found);
            }
            Err(e) => {
                tracing::warn!(
                    pipeline = pipeline.as_str(),
                    error = %e,
                    "Analysis pipeline failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyType, Severity};
    use crate::test_utils::{
        daily_spend, day, food_scenario, outlier_transaction, routine_history, ts,
    };

    fn seeded_engine() -> SpendingEngine {
        SpendingEngine::new(EngineConfig {
            seed: Some(17),
            ..Default::default()
        })
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpendingEngine>();
    }

    #[test]
    fn test_detector_cached_per_user() {
        let engine = seeded_engine();
        let a1 = engine.detector_for("alice").unwrap();
        let a2 = engine.detector_for("alice").unwrap();
        let b = engine.detector_for("bob").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(engine.detectors.user_count().unwrap(), 2);
    }

    #[test]
    fn test_poisoned_cache_reports_lock_error() {
        let cache = DetectorCache::new();
        let config = EngineConfig::default();
        cache.get_or_create("alice", &config).unwrap();

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.detectors.write().unwrap();
            panic!("writer died holding the cache lock");
        }));
        assert!(poisoned.is_err());

        assert!(matches!(cache.user_count(), Err(Error::Lock(_))));
        assert!(matches!(cache.remove("alice"), Err(Error::Lock(_))));
    }

    #[test]
    fn test_forget_drops_model() {
        let engine = seeded_engine();
        assert!(engine.train("alice", &routine_history("alice", 30)).unwrap());
        assert!(engine.detector_for("alice").unwrap().is_model_trained());

        assert!(engine.forget("alice").unwrap());
        assert!(!engine.forget("alice").unwrap());
        assert!(!engine.detector_for("alice").unwrap().is_model_trained());
    }

    #[test]
    fn test_empty_history() {
        let engine = seeded_engine();
        let report = engine.analyze_at("alice", &[], ts(2024, 6, 1, 12));

        assert!(report.anomalies.is_empty());
        assert!(report.patterns.is_empty());
        assert!(!report.model_trained);
        assert_eq!(report.transactions_analyzed, 0);
    }

    #[test]
    fn test_short_history_still_gets_patterns_and_baseline() {
        // Too few to train a forest, enough for baseline alerts
        let engine = seeded_engine();
        let mut txs = daily_spend("alice", "Food", day(2024, 5, 28), 3, 100.0);
        txs.push(Transaction::new("big", "alice", 900.0, "Food", ts(2024, 5, 31, 9)));

        let report = engine.analyze_at("alice", &txs, ts(2024, 5, 31, 20));

        assert!(!report.model_trained);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.anomalies.len(), 2);
        assert_eq!(report.anomalies[0].severity, Severity::High);
        assert_eq!(report.anomalies[1].anomaly_type, AnomalyType::Category);
    }

    #[test]
    fn test_invalid_transactions_counted_and_skipped() {
        let engine = seeded_engine();
        let mut txs = food_scenario("alice");
        txs.push(Transaction::new("refund", "alice", -50.0, "Food", ts(2024, 4, 10, 9)));
        txs.push(Transaction::new("", "alice", 50.0, "Food", ts(2024, 4, 10, 9)));

        let report = engine.analyze_at("alice", &txs, ts(2024, 6, 1, 12));
        assert_eq!(report.skipped_invalid, 2);
        assert_eq!(report.transactions_analyzed, 12);
        assert_eq!(report.patterns[0].transaction_count, 12);
    }

    #[test]
    fn test_outlier_reported_end_to_end() {
        let engine = seeded_engine();
        let mut txs = routine_history("alice", 60);
        txs.push(outlier_transaction("alice", "tx-outlier"));

        let report = engine.analyze_at("alice", &txs, ts(2024, 6, 1, 23));

        assert!(report.model_trained);
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.transaction_id.as_deref() == Some("tx-outlier")));
        // Electronics, Food, Transport, Utilities
        assert_eq!(report.patterns.len(), 4);
    }

    #[test]
    fn test_anomalies_stamped_with_analysis_time() {
        let engine = seeded_engine();
        let mut txs = routine_history("alice", 60);
        txs.push(outlier_transaction("alice", "tx-outlier"));
        let as_of = ts(2024, 6, 1, 23);

        let report = engine.analyze_at("alice", &txs, as_of);

        assert_eq!(report.analyzed_at, as_of);
        assert!(!report.anomalies.is_empty());
        assert!(report.anomalies.iter().all(|a| a.detected_at == as_of));
    }

    #[test]
    fn test_anomalies_sorted_by_severity() {
        let engine = seeded_engine();
        let mut txs = routine_history("alice", 60);
        txs.push(outlier_transaction("alice", "tx-outlier"));

        let report = engine.analyze_at("alice", &txs, ts(2024, 6, 1, 23));
        let priorities: Vec<u8> = report
            .anomalies
            .iter()
            .map(|a| a.severity.priority())
            .collect();
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_report_json() {
        let engine = seeded_engine();
        let report = engine.analyze_at("alice", &food_scenario("alice"), ts(2024, 6, 1, 12));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["user_id"], "alice");
        assert_eq!(json["patterns"][0]["trend"], "decreasing");
        assert!(json["anomalies"].is_array());
    }
}
