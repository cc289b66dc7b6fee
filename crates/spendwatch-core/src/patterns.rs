//! Per-category spending patterns
//!
//! A simple, explainable companion to the isolation forest: for each category
//! a user spends in, report the monthly average, whether spend is trending up
//! or down, how erratic the amounts are (coefficient of variation) and how
//! much the numbers can be trusted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::models::{user_expenses, SpendingPattern, Transaction, Trend};

const SECONDS_PER_MONTH: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Categories with fewer transactions than this always report a stable trend
const MIN_TREND_TRANSACTIONS: usize = 4;

/// Categories with fewer transactions than this report a zero variation score
const MIN_VARIATION_TRANSACTIONS: usize = 3;

/// Observations at which confidence saturates
const FULL_CONFIDENCE_TRANSACTIONS: f64 = 10.0;

/// Computes [`SpendingPattern`]s from a transaction history
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    trend_change_threshold: f64,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl PatternAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trend_change_threshold: config.trend_change_threshold,
        }
    }

    /// Analyze every category of `user_id`'s transactions
    pub fn analyze(&self, user_id: &str, transactions: &[Transaction]) -> Vec<SpendingPattern> {
        self.analyze_at(user_id, transactions, Utc::now())
    }

    /// Same as [`analyze`](Self::analyze) with an explicit analysis time
    pub fn analyze_at(
        &self,
        user_id: &str,
        transactions: &[Transaction],
        analyzed_at: DateTime<Utc>,
    ) -> Vec<SpendingPattern> {
        let transactions = user_expenses(transactions, user_id);

        let mut by_category: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for tx in &transactions {
            by_category.entry(tx.category.as_str()).or_default().push(tx);
        }

        let patterns: Vec<SpendingPattern> = by_category
            .into_iter()
            .map(|(category, mut txs)| {
                txs.sort_by_key(|tx| tx.timestamp);
                let amounts: Vec<f64> = txs.iter().map(|tx| tx.amount).collect();

                SpendingPattern {
                    user_id: user_id.to_string(),
                    category: category.to_string(),
                    average_monthly: average_monthly(&txs),
                    trend: classify_trend(&amounts, self.trend_change_threshold),
                    anomaly_score: coefficient_of_variation(&amounts),
                    last_analyzed: analyzed_at,
                    confidence: confidence(txs.len()),
                    transaction_count: txs.len(),
                }
            })
            .collect();

        debug!(
            user_id,
            categories = patterns.len(),
            "Spending patterns analyzed"
        );

        patterns
    }
}

/// Total spend divided by the months the transactions span (at least one)
pub fn average_monthly(transactions: &[&Transaction]) -> f64 {
    let total: f64 = transactions.iter().map(|tx| tx.amount).sum();

    let oldest = transactions.iter().map(|tx| tx.timestamp).min();
    let newest = transactions.iter().map(|tx| tx.timestamp).max();
    let months = match (oldest, newest) {
        (Some(oldest), Some(newest)) => {
            (newest - oldest).num_seconds() as f64 / SECONDS_PER_MONTH
        }
        _ => 0.0,
    };

    total / months.max(1.0)
}

/// Compare the average of the later half of `amounts` (time order) against
/// the earlier half
pub fn classify_trend(amounts: &[f64], threshold: f64) -> Trend {
    if amounts.len() < MIN_TREND_TRANSACTIONS {
        return Trend::Stable;
    }

    let (first, second) = amounts.split_at(amounts.len() / 2);
    let first_avg = mean(first);
    let second_avg = mean(second);

    if first_avg <= 0.0 {
        return Trend::Stable;
    }

    let change = (second_avg - first_avg) / first_avg;
    if change > threshold {
        Trend::Increasing
    } else if change < -threshold {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Population standard deviation over mean; 0 for fewer than three amounts
pub fn coefficient_of_variation(amounts: &[f64]) -> f64 {
    if amounts.len() < MIN_VARIATION_TRANSACTIONS {
        return 0.0;
    }

    let avg = mean(amounts);
    if avg <= 0.0 {
        return 0.0;
    }

    let variance = amounts.iter().map(|a| (a - avg).powi(2)).sum::<f64>() / amounts.len() as f64;
    variance.sqrt() / avg
}

/// `min(count / 10, 1)`
pub fn confidence(count: usize) -> f64 {
    (count as f64 / FULL_CONFIDENCE_TRANSACTIONS).min(1.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
