//! Spendwatch Core Library
//!
//! Per-user spending analysis for personal finance:
//! - Transaction intake and validation
//! - Feature extraction for anomaly scoring
//! - Isolation Forest anomaly detection
//! - Per-category spending patterns and trends
//! - Daily and category baseline alerts
//! - Analysis engine that runs every pipeline for a user

pub mod baseline;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod features;
pub mod isolation;
pub mod models;
pub mod patterns;

/// Test utilities: deterministic transaction fixtures
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use baseline::{BaselineAlerter, SpendingBaseline};
pub use config::EngineConfig;
pub use detector::AnomalyDetector;
pub use engine::{AnalysisReport, DetectorCache, Pipeline, SpendingEngine};
pub use error::{Error, Result};
pub use features::{build_data_point, Feature, FeatureBuilder, FeatureVector, SpendingDataPoint};
pub use isolation::{IsolationForest, IsolationTree};
pub use models::{
    from_records, Anomaly, AnomalyType, Severity, SpendingPattern, Transaction,
    TransactionRecord, Trend,
};
pub use patterns::PatternAnalyzer;
