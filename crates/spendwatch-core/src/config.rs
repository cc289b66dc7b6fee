//! Engine configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/spendwatch/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Override files are partial: any key they leave out keeps its default.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Largest UTC offset in use anywhere (UTC+14:00)
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Tuning knobs for every analysis pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of isolation trees in the forest
    pub num_trees: usize,
    /// Bootstrap sample size per tree (capped at the training set size)
    pub sample_size: usize,
    /// Depth at which tree construction stops splitting
    pub max_tree_depth: usize,
    /// Fixed RNG seed for reproducible training; `None` draws from entropy
    pub seed: Option<u64>,
    /// Forest score above which a transaction is reported
    pub anomaly_threshold: f64,
    /// Score above which a reported transaction is medium severity
    pub medium_severity_score: f64,
    /// Score above which a reported transaction is high severity
    pub high_severity_score: f64,
    /// Training is skipped for histories shorter than this
    pub min_training_transactions: usize,
    /// How many of a user's most recent transactions are scored
    pub recent_window: usize,
    /// Relative change between trend halves that counts as a trend
    pub trend_change_threshold: f64,
    /// Today's total vs. daily baseline ratio that raises an alert
    pub daily_baseline_multiplier: f64,
    /// Today's category spend vs. category baseline ratio that raises an alert
    pub category_baseline_multiplier: f64,
    /// Offset for calendar days and time-of-day features
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            max_tree_depth: 10,
            seed: None,
            anomaly_threshold: 0.6,
            medium_severity_score: 0.7,
            high_severity_score: 0.8,
            min_training_transactions: 10,
            recent_window: 100,
            trend_change_threshold: 0.10,
            daily_baseline_multiplier: 2.0,
            category_baseline_multiplier: 3.0,
            utc_offset_minutes: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default override location, falling back
    /// to the embedded defaults
    pub fn load() -> Result<Self> {
        Self::load_with(default_config_path().as_deref())
    }

    /// Load from an optional override path; `None` (no data dir on this
    /// platform) or a missing file yields the embedded defaults
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::from_toml_str(DEFAULT_CONFIG),
        }
    }

    /// Load configuration from an explicit file
    ///
    /// A missing file falls back to the embedded defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::from_toml_str(DEFAULT_CONFIG);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Self::default();
        raw.apply(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Reject values that would make the pipelines meaningless
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(Error::Config("num_trees must be at least 1".into()));
        }
        if self.sample_size < 2 {
            return Err(Error::Config("sample_size must be at least 2".into()));
        }
        if self.max_tree_depth == 0 {
            return Err(Error::Config("max_tree_depth must be at least 1".into()));
        }
        for (name, value) in [
            ("anomaly_threshold", self.anomaly_threshold),
            ("medium_severity_score", self.medium_severity_score),
            ("high_severity_score", self.high_severity_score),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.medium_severity_score > self.high_severity_score {
            return Err(Error::Config(
                "medium_severity_score must not exceed high_severity_score".into(),
            ));
        }
        if self.recent_window == 0 {
            return Err(Error::Config("recent_window must be at least 1".into()));
        }
        if self.trend_change_threshold < 0.0 {
            return Err(Error::Config(
                "trend_change_threshold must not be negative".into(),
            ));
        }
        if self.daily_baseline_multiplier <= 0.0 || self.category_baseline_multiplier <= 0.0 {
            return Err(Error::Config("baseline multipliers must be positive".into()));
        }
        if self.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(Error::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// The configured offset as a chrono timezone
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Get the default override config path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendwatch").join("config").join("engine.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    forest: Option<RawForest>,
    detector: Option<RawDetector>,
    patterns: Option<RawPatterns>,
    baseline: Option<RawBaseline>,
    time: Option<RawTime>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawForest {
    num_trees: Option<usize>,
    sample_size: Option<usize>,
    max_tree_depth: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDetector {
    anomaly_threshold: Option<f64>,
    medium_severity_score: Option<f64>,
    high_severity_score: Option<f64>,
    min_training_transactions: Option<usize>,
    recent_window: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatterns {
    trend_change_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBaseline {
    daily_multiplier: Option<f64>,
    category_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTime {
    utc_offset_minutes: Option<i32>,
}

impl RawConfig {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(forest) = self.forest {
            if let Some(v) = forest.num_trees {
                config.num_trees = v;
            }
            if let Some(v) = forest.sample_size {
                config.sample_size = v;
            }
            if let Some(v) = forest.max_tree_depth {
                config.max_tree_depth = v;
            }
            if forest.seed.is_some() {
                config.seed = forest.seed;
            }
        }

        if let Some(detector) = self.detector {
            if let Some(v) = detector.anomaly_threshold {
                config.anomaly_threshold = v;
            }
            if let Some(v) = detector.medium_severity_score {
                config.medium_severity_score = v;
            }
            if let Some(v) = detector.high_severity_score {
                config.high_severity_score = v;
            }
            if let Some(v) = detector.min_training_transactions {
                config.min_training_transactions = v;
            }
            if let Some(v) = detector.recent_window {
                config.recent_window = v;
            }
        }

        if let Some(v) = self.patterns.and_then(|p| p.trend_change_threshold) {
            config.trend_change_threshold = v;
        }

        if let Some(baseline) = self.baseline {
            if let Some(v) = baseline.daily_multiplier {
                config.daily_baseline_multiplier = v;
            }
            if let Some(v) = baseline.category_multiplier {
                config.category_baseline_multiplier = v;
            }
        }

        if let Some(v) = self.time.and_then(|t| t.utc_offset_minutes) {
            config.utc_offset_minutes = v;
        }
    }
}
