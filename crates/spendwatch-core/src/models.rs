//! Domain models for Spendwatch

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Category used when a record arrives without one
pub const UNCATEGORIZED: &str = "Uncategorized";

/// An expense transaction supplied by the data-access layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    /// Always positive: only expenses are analyzed
    pub amount: f64,
    pub category: String,
    pub merchant: Option<String>,
    /// Free-text description (e.g. the SMS or statement line)
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            amount,
            category: category.into(),
            merchant: None,
            description: None,
            timestamp,
        }
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the expense invariants (non-empty id, positive finite amount)
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_transaction("<empty>", "missing id"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::invalid_transaction(
                &self.id,
                format!("amount must be positive, got {}", self.amount),
            ));
        }
        Ok(())
    }

    /// Merchant key used for frequency counting (missing merchant = "")
    pub fn merchant_key(&self) -> &str {
        self.merchant.as_deref().unwrap_or("")
    }

    /// Best human-readable label: description, then merchant, then category
    pub fn label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.merchant.as_deref().filter(|m| !m.trim().is_empty()))
            .unwrap_or(self.category.as_str())
    }
}

/// Keep only transactions that satisfy the expense invariants
///
/// Invalid records are skipped with a warning rather than failing the batch.
pub fn expenses(transactions: &[Transaction]) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|tx| match tx.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping invalid transaction");
                false
            }
        })
        .cloned()
        .collect()
}

/// Valid expenses belonging to `user_id`
///
/// Filters by user before validating, so other users' bad records are neither
/// cloned nor logged.
pub fn user_expenses(transactions: &[Transaction], user_id: &str) -> Vec<Transaction> {
    let mine: Vec<Transaction> = transactions
        .iter()
        .filter(|tx| tx.user_id == user_id)
        .cloned()
        .collect();
    expenses(&mine)
}

/// Loosely-typed transaction as handed over by an ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: String,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = Error;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            Error::invalid_transaction(
                &record.id,
                format!("unparsable timestamp: {}", record.timestamp),
            )
        })?;

        let category = record
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        let tx = Transaction {
            id: record.id,
            user_id: record.user_id,
            amount: record.amount,
            category,
            merchant: record.merchant.filter(|m| !m.trim().is_empty()),
            description: record.description,
            timestamp,
        };
        tx.validate()?;

        Ok(tx)
    }
}

/// Convert a batch of records, skipping (and logging) the invalid ones
pub fn from_records(records: impl IntoIterator<Item = TransactionRecord>) -> Vec<Transaction> {
    let mut skipped = 0usize;
    let transactions: Vec<Transaction> = records
        .into_iter()
        .filter_map(|record| match Transaction::try_from(record) {
            Ok(tx) => Some(tx),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping invalid transaction record");
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        tracing::debug!(
            accepted = transactions.len(),
            skipped,
            "Transaction records converted"
        );
    }

    transactions
}

/// Parse a timestamp in various common formats (naive values are UTC)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S", // 2024-01-15 13:45:00
        "%Y-%m-%dT%H:%M:%S", // 2024-01-15T13:45:00
        "%Y-%m-%d %H:%M",    // 2024-01-15 13:45
    ];
    for fmt in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// What kind of deviation an anomaly describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// Unusual amount (single transaction or daily total)
    Amount,
    /// Unusual transaction frequency
    Frequency,
    /// Unusual spend within one category
    Category,
    /// Unusual location
    Location,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Frequency => "frequency",
            Self::Category => "category",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amount" => Ok(Self::Amount),
            "frequency" => Ok(Self::Frequency),
            "category" => Ok(Self::Category),
            "location" => Ok(Self::Location),
            _ => Err(format!("Unknown anomaly type: {}", s)),
        }
    }
}

/// Severity level of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// An anomaly raised by the detector or the baseline alerter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Stable key: the same finding always hashes to the same id
    pub id: String,
    pub user_id: String,
    /// Transaction that triggered (or contributed most to) the anomaly
    pub transaction_id: Option<String>,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    /// Forest score, or spend-to-baseline ratio for baseline alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub detected_at: DateTime<Utc>,
    /// Managed by the notification side; always false when created here
    pub is_resolved: bool,
}

impl Anomaly {
    /// Create an anomaly keyed on `subject` (a transaction id or a
    /// category/day key)
    pub fn new(
        user_id: impl Into<String>,
        subject: &str,
        anomaly_type: AnomalyType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            id: anomaly_id(&user_id, subject, anomaly_type),
            user_id,
            transaction_id: None,
            anomaly_type,
            severity,
            description: description.into(),
            score: None,
            detected_at: Utc::now(),
            is_resolved: false,
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Stamp the evaluation time instead of the wall clock
    pub fn with_detected_at(mut self, detected_at: DateTime<Utc>) -> Self {
        self.detected_at = detected_at;
        self
    }
}

/// Generate the stable id for an anomaly
fn anomaly_id(user_id: &str, subject: &str, anomaly_type: AnomalyType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(subject.as_bytes());
    hasher.update([0u8]);
    hasher.update(anomaly_type.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Direction of spending in a category over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-category spending summary for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingPattern {
    pub user_id: String,
    pub category: String,
    pub average_monthly: f64,
    pub trend: Trend,
    /// Coefficient of variation of the category's amounts
    pub anomaly_score: f64,
    pub last_analyzed: DateTime<Utc>,
    /// 0-1, saturating at 10 observations
    pub confidence: f64,
    pub transaction_count: usize,
}
