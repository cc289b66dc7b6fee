//! Feature extraction for the isolation forest
//!
//! Every transaction becomes a fixed-order numeric vector:
//! `[amount, day_of_week, hour_of_day, merchant_frequency, category_frequency]`.
//! Frequencies are counted over the whole transaction set handed in, not just
//! the transactions being scored.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

use crate::models::Transaction;

/// Features the isolation trees can split on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Amount,
    DayOfWeek,
    HourOfDay,
    MerchantFrequency,
    CategoryFrequency,
}

impl Feature {
    /// Number of features in a vector
    pub const COUNT: usize = 5;

    /// All features, in vector order
    pub const ALL: [Feature; Feature::COUNT] = [
        Feature::Amount,
        Feature::DayOfWeek,
        Feature::HourOfDay,
        Feature::MerchantFrequency,
        Feature::CategoryFrequency,
    ];

    /// Position of this feature in a [`FeatureVector`]
    pub fn index(self) -> usize {
        match self {
            Self::Amount => 0,
            Self::DayOfWeek => 1,
            Self::HourOfDay => 2,
            Self::MerchantFrequency => 3,
            Self::CategoryFrequency => 4,
        }
    }
}

/// Fixed-order numeric representation of a transaction
pub type FeatureVector = [f64; Feature::COUNT];

/// A transaction projected into feature space
#[derive(Debug, Clone, PartialEq)]
pub struct SpendingDataPoint {
    pub amount: f64,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u32,
    /// 0..=23
    pub hour_of_day: u32,
    /// Transactions in the set sharing this merchant
    pub merchant_frequency: usize,
    /// Transactions in the set sharing this category
    pub category_frequency: usize,
}

impl SpendingDataPoint {
    pub fn features(&self) -> FeatureVector {
        [
            self.amount,
            f64::from(self.day_of_week),
            f64::from(self.hour_of_day),
            self.merchant_frequency as f64,
            self.category_frequency as f64,
        ]
    }

    pub fn value(&self, feature: Feature) -> f64 {
        self.features()[feature.index()]
    }
}

/// Builds data points against one transaction set
///
/// Merchant and category counts are computed once up front, so building a
/// point per transaction stays linear in the size of the set.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    merchant_counts: HashMap<String, usize>,
    category_counts: HashMap<String, usize>,
    offset: FixedOffset,
}

impl FeatureBuilder {
    /// Count frequencies over `transactions`, bucketing time in `offset`
    pub fn new(transactions: &[Transaction], offset: FixedOffset) -> Self {
        let mut merchant_counts: HashMap<String, usize> = HashMap::new();
        let mut category_counts: HashMap<String, usize> = HashMap::new();

        for tx in transactions {
            *merchant_counts
                .entry(tx.merchant_key().to_string())
                .or_insert(0) += 1;
            *category_counts.entry(tx.category.clone()).or_insert(0) += 1;
        }

        Self {
            merchant_counts,
            category_counts,
            offset,
        }
    }

    pub fn build(&self, tx: &Transaction) -> SpendingDataPoint {
        let local = tx.timestamp.with_timezone(&self.offset);

        SpendingDataPoint {
            amount: tx.amount,
            category: tx.category.clone(),
            timestamp: tx.timestamp,
            day_of_week: local.weekday().num_days_from_sunday(),
            hour_of_day: local.hour(),
            merchant_frequency: self
                .merchant_counts
                .get(tx.merchant_key())
                .copied()
                .unwrap_or(0),
            category_frequency: self.category_counts.get(&tx.category).copied().unwrap_or(0),
        }
    }

    pub fn build_all(&self, transactions: &[Transaction]) -> Vec<SpendingDataPoint> {
        transactions.iter().map(|tx| self.build(tx)).collect()
    }
}

/// Build a single data point for `target` with frequencies over `all`
pub fn build_data_point(
    target: &Transaction,
    all: &[Transaction],
    offset: FixedOffset,
) -> SpendingDataPoint {
    let merchant_frequency = all
        .iter()
        .filter(|tx| tx.merchant_key() == target.merchant_key())
        .count();
    let category_frequency = all
        .iter()
        .filter(|tx| tx.category == target.category)
        .count();
    let local = target.timestamp.with_timezone(&offset);

    SpendingDataPoint {
        amount: target.amount,
        category: target.category.clone(),
        timestamp: target.timestamp,
        day_of_week: local.weekday().num_days_from_sunday(),
        hour_of_day: local.hour(),
        merchant_frequency,
        category_frequency,
    }
}
