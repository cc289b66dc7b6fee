//! Baseline spending alerts
//!
//! Compares what a user spent on the evaluation day against their own
//! history: the average daily total over every earlier active day, and the
//! average daily spend per category over the days that category was used.
//! No model is involved, so these alerts work from the first day of history.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::models::{user_expenses, Anomaly, AnomalyType, Severity, Transaction};

/// Average spend over a user's history before a given day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendingBaseline {
    /// Mean daily total over active days; `None` without history
    pub daily_average: Option<f64>,
    /// Mean daily spend per category over the days it was used
    pub category_averages: HashMap<String, f64>,
    /// Distinct days with at least one expense
    pub active_days: usize,
}

/// Raises amount and category alerts against a [`SpendingBaseline`]
#[derive(Debug, Clone)]
pub struct BaselineAlerter {
    daily_multiplier: f64,
    category_multiplier: f64,
    offset: FixedOffset,
}

impl Default for BaselineAlerter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl BaselineAlerter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            daily_multiplier: config.daily_baseline_multiplier,
            category_multiplier: config.category_baseline_multiplier,
            offset: config.offset(),
        }
    }

    /// Calendar day a transaction falls on
    pub fn local_day(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.offset).date_naive()
    }

    /// Baseline from the user's expenses strictly before `before`
    pub fn compute_baseline(
        &self,
        user_id: &str,
        transactions: &[Transaction],
        before: NaiveDate,
    ) -> SpendingBaseline {
        let mut daily: HashMap<NaiveDate, f64> = HashMap::new();
        let mut by_category: HashMap<&str, HashMap<NaiveDate, f64>> = HashMap::new();

        for tx in transactions.iter().filter(|tx| tx.user_id == user_id) {
            let day = self.local_day(tx.timestamp);
            if day >= before {
                continue;
            }
            *daily.entry(day).or_default() += tx.amount;
            *by_category
                .entry(tx.category.as_str())
                .or_default()
                .entry(day)
                .or_default() += tx.amount;
        }

        let daily_average = if daily.is_empty() {
            None
        } else {
            Some(daily.values().sum::<f64>() / daily.len() as f64)
        };

        let category_averages = by_category
            .into_iter()
            .map(|(category, days)| {
                let avg = days.values().sum::<f64>() / days.len() as f64;
                (category.to_string(), avg)
            })
            .collect();

        SpendingBaseline {
            daily_average,
            category_averages,
            active_days: daily.len(),
        }
    }

    /// Check today's spending against the user's baseline
    pub fn check(&self, user_id: &str, transactions: &[Transaction]) -> Vec<Anomaly> {
        self.check_at(user_id, transactions, Utc::now())
    }

    /// Check the spending on `as_of`'s calendar day against every earlier day
    ///
    /// At most one daily-total alert (high severity) plus one alert per
    /// category (medium severity). Transactions after that day are ignored.
    pub fn check_at(
        &self,
        user_id: &str,
        transactions: &[Transaction],
        as_of: DateTime<Utc>,
    ) -> Vec<Anomaly> {
        let transactions = user_expenses(transactions, user_id);
        let today = self.local_day(as_of);

        let todays: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| self.local_day(tx.timestamp) == today)
            .collect();
        if todays.is_empty() {
            return Vec::new();
        }

        let baseline = self.compute_baseline(user_id, &transactions, today);
        let Some(daily_average) = baseline.daily_average else {
            debug!(user_id, "No spending history before today, skipping baseline check");
            return Vec::new();
        };

        let mut anomalies = Vec::new();

        let today_total: f64 = todays.iter().map(|tx| tx.amount).sum();
        if today_total > self.daily_multiplier * daily_average {
            let ratio = today_total / daily_average;
            let mut anomaly = Anomaly::new(
                user_id,
                &format!("daily:{}", today),
                AnomalyType::Amount,
                Severity::High,
                format!(
                    "Spent {:.2} today, {:.1}x your daily average of {:.2}",
                    today_total, ratio, daily_average
                ),
            )
            .with_score(ratio)
            .with_detected_at(as_of);
            if let Some(tx) = largest(&todays) {
                anomaly = anomaly.with_transaction(&tx.id);
            }
            anomalies.push(anomaly);
        }

        let mut todays_by_category: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for &tx in &todays {
            todays_by_category
                .entry(tx.category.as_str())
                .or_default()
                .push(tx);
        }

        for (category, txs) in todays_by_category {
            // A category with no history has no baseline to exceed
            let Some(&category_average) = baseline.category_averages.get(category) else {
                continue;
            };

            let spent: f64 = txs.iter().map(|tx| tx.amount).sum();
            if spent <= self.category_multiplier * category_average {
                continue;
            }

            let ratio = spent / category_average;
            let mut anomaly = Anomaly::new(
                user_id,
                &format!("category:{}:{}", category, today),
                AnomalyType::Category,
                Severity::Medium,
                format!(
                    "{} spending of {:.2} today is {:.1}x your usual {:.2}",
                    category, spent, ratio, category_average
                ),
            )
            .with_score(ratio)
            .with_detected_at(as_of);
            if let Some(tx) = largest(&txs) {
                anomaly = anomaly.with_transaction(&tx.id);
            }
            anomalies.push(anomaly);
        }

        if !anomalies.is_empty() {
            info!(
                user_id,
                day = %today,
                today_total,
                daily_average,
                alerts = anomalies.len(),
                "Baseline spending alerts raised"
            );
        }

        anomalies
    }
}

fn largest<'a>(transactions: &[&'a Transaction]) -> Option<&'a Transaction> {
    transactions
        .iter()
        .copied()
        .max_by(|a, b| a.amount.total_cmp(&b.amount))
}
