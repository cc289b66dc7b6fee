//! Integration tests for spendwatch-core
//!
//! These tests exercise the full intake → analyze → report workflow.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use spendwatch_core::{
    from_records, AnomalyType, EngineConfig, Severity, SpendingEngine, Transaction,
    TransactionRecord, Trend,
};

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// Ninety days of ordinary spending for one user: groceries most days,
/// a ride every other day and a monthly power token
fn ninety_days(user_id: &str) -> Vec<Transaction> {
    let start = at(2024, 1, 1, 0);
    let mut txs = Vec::new();

    for d in 0..90i64 {
        let day = start + Duration::days(d);
        txs.push(
            Transaction::new(
                format!("{}-food-{}", user_id, d),
                user_id,
                350.0 + ((d * 13) % 90) as f64,
                "Food",
                day + Duration::hours(12 + d % 6),
            )
            .with_merchant(if d % 3 == 0 { "Carrefour" } else { "Naivas" }),
        );
        if d % 2 == 0 {
            txs.push(
                Transaction::new(
                    format!("{}-ride-{}", user_id, d),
                    user_id,
                    200.0 + ((d * 7) % 50) as f64,
                    "Transport",
                    day + Duration::hours(8),
                )
                .with_merchant("Uber"),
            );
        }
        if d % 30 == 5 {
            txs.push(
                Transaction::new(
                    format!("{}-power-{}", user_id, d),
                    user_id,
                    1500.0,
                    "Utilities",
                    day + Duration::hours(19),
                )
                .with_merchant("KPLC Prepaid"),
            );
        }
    }

    txs
}

fn records_json() -> &'static str {
    r#"[
        {"id": "r1", "user_id": "wanjiru", "amount": 420.0, "category": "Food",
         "merchant": "Naivas", "timestamp": "2024-02-01T12:30:00Z"},
        {"id": "r2", "user_id": "wanjiru", "amount": 380.0, "category": "Food",
         "merchant": "Naivas", "timestamp": "2024-02-02 13:10:00"},
        {"id": "r3", "user_id": "wanjiru", "amount": 250.0,
         "timestamp": "2024-02-03"},
        {"id": "r4", "user_id": "wanjiru", "amount": -420.0, "category": "Food",
         "timestamp": "2024-02-04T09:00:00Z"},
        {"id": "r5", "user_id": "wanjiru", "amount": 99.0, "category": "Food",
         "timestamp": "last tuesday"}
    ]"#
}

// =============================================================================
// Intake Tests
// =============================================================================

#[test]
fn test_records_to_transactions() -> Result<()> {
    let records: Vec<TransactionRecord> =
        serde_json::from_str(records_json()).context("Failed to decode records")?;
    let transactions = from_records(records);

    let ids: Vec<&str> = transactions.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    assert_eq!(transactions[2].category, "Uncategorized");
    assert_eq!(transactions[1].timestamp, at(2024, 2, 2, 13) + Duration::minutes(10));

    Ok(())
}

// =============================================================================
// Engine Workflow Tests
// =============================================================================

#[test]
fn test_quiet_history_has_no_baseline_alerts() -> Result<()> {
    let engine = SpendingEngine::new(EngineConfig {
        seed: Some(7),
        ..Default::default()
    });
    let txs = ninety_days("amani");

    let report = engine.analyze_at("amani", &txs, at(2024, 3, 30, 23));

    assert!(report.model_trained);
    let categories: Vec<&str> = report.patterns.iter().map(|p| p.category.as_str()).collect();
    assert_eq!(categories, vec!["Food", "Transport", "Utilities"]);
    assert!(report.patterns.iter().all(|p| p.confidence == 1.0 || p.transaction_count < 10));
    // Only per-transaction forest findings; nothing trips the daily baseline
    assert!(report
        .anomalies
        .iter()
        .all(|a| a.anomaly_type == AnomalyType::Amount && a.transaction_id.is_some()));
    assert!(report
        .anomalies
        .iter()
        .filter_map(|a| a.score)
        .all(|score| score > engine.config().anomaly_threshold && score <= 1.0));

    Ok(())
}

#[test]
fn test_spending_spree_raises_every_kind_of_alert() -> Result<()> {
    let engine = SpendingEngine::new(EngineConfig {
        seed: Some(21),
        ..Default::default()
    });
    let mut txs = ninety_days("amani");
    txs.push(
        Transaction::new("spree", "amani", 85_000.0, "Electronics", at(2024, 3, 31, 3))
            .with_merchant("Unknown Electronics Ltd"),
    );
    txs.push(
        Transaction::new("taxi", "amani", 2_400.0, "Transport", at(2024, 3, 31, 4))
            .with_merchant("Uber"),
    );

    let report = engine.analyze_at("amani", &txs, at(2024, 3, 31, 23));

    // Daily total blows through 2x the average
    let daily = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::Amount && a.severity == Severity::High)
        .context("expected a daily total alert")?;
    assert_eq!(daily.transaction_id.as_deref(), Some("spree"));

    // Transport spend is far above its per-day norm
    let category = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::Category)
        .context("expected a category alert")?;
    assert_eq!(category.severity, Severity::Medium);
    assert_eq!(category.transaction_id.as_deref(), Some("taxi"));

    // The forest flags the purchase itself
    assert!(report.anomalies.iter().any(|a| a.transaction_id.as_deref() == Some("spree")
        && a.score.map_or(false, |s| s > 0.6 && s <= 1.0)));

    let priorities: Vec<u8> = report.anomalies.iter().map(|a| a.severity.priority()).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));

    Ok(())
}

#[test]
fn test_rising_spend_trend() {
    let start = at(2024, 1, 1, 12);
    let txs: Vec<Transaction> = (0..8)
        .map(|i| {
            let amount = if i < 4 { 1000.0 } else { 1400.0 };
            Transaction::new(
                format!("rent-{}", i),
                "amani",
                amount,
                "Housing",
                start + Duration::days(i * 15),
            )
        })
        .collect();

    let engine = SpendingEngine::new(EngineConfig::default());
    let report = engine.analyze_at("amani", &txs, at(2024, 6, 1, 0));
    let housing = &report.patterns[0];
    assert_eq!(housing.trend, Trend::Increasing);
    assert!((housing.confidence - 0.8).abs() < 1e-12);
    // 9600 over 105 days = 3.5 months
    assert!((housing.average_monthly - 9600.0 / 3.5).abs() < 1e-6);
}

#[test]
fn test_users_analyzed_independently() {
    let engine = SpendingEngine::new(EngineConfig {
        seed: Some(3),
        ..Default::default()
    });
    let mut txs = ninety_days("amani");
    txs.extend(ninety_days("baraka"));
    txs.push(Transaction::new("baraka-big", "baraka", 60_000.0, "Food", at(2024, 3, 31, 9)));

    let amani = engine.analyze_at("amani", &txs, at(2024, 3, 31, 23));
    let baraka = engine.analyze_at("baraka", &txs, at(2024, 3, 31, 23));

    assert!(amani.anomalies.iter().all(|a| a.user_id == "amani"));
    assert!(baraka
        .anomalies
        .iter()
        .any(|a| a.transaction_id.as_deref() == Some("baraka-big")));
    let amani_model = engine.detector_for("amani").unwrap().model().unwrap();
    let baraka_model = engine.detector_for("baraka").unwrap().model().unwrap();
    assert!(!std::sync::Arc::ptr_eq(&amani_model, &baraka_model));
}

#[test]
fn test_concurrent_analysis() {
    let engine = SpendingEngine::new(EngineConfig {
        num_trees: 20,
        seed: Some(5),
        ..Default::default()
    });
    let users = ["amani", "baraka", "chebet", "dalmas"];
    let txs: Vec<Transaction> = users.iter().flat_map(|u| ninety_days(u)).collect();

    std::thread::scope(|s| {
        for user in users {
            let engine = &engine;
            let txs = &txs;
            s.spawn(move || {
                for _ in 0..2 {
                    let report = engine.analyze_at(user, txs, at(2024, 3, 30, 23));
                    assert_eq!(report.user_id, user);
                    assert_eq!(report.patterns.len(), 3);
                }
            });
        }
    });

    for user in users {
        assert!(engine.detector_for(user).unwrap().is_model_trained());
    }
}

#[test]
fn test_forget_then_retrain() {
    let engine = SpendingEngine::new(EngineConfig::default());
    let txs = ninety_days("amani");

    assert!(engine.analyze_at("amani", &txs, at(2024, 3, 30, 23)).model_trained);
    assert!(engine.forget("amani").unwrap());
    assert!(!engine.detector_for("amani").unwrap().is_model_trained());
    assert!(engine.analyze_at("amani", &txs, at(2024, 3, 30, 23)).model_trained);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_config_override_file_drives_engine() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[detector]
min_training_transactions = 500

[baseline]
daily_multiplier = 1.2

[time]
utc_offset_minutes = 180
"#
    )?;

    let config = EngineConfig::load_from(file.path())?;
    assert_eq!(config.min_training_transactions, 500);
    assert_eq!(config.num_trees, 100);

    let engine = SpendingEngine::new(config);
    let mut txs = ninety_days("amani");
    // 22:30 UTC on March 30 is March 31 in Nairobi
    let late = at(2024, 3, 30, 22) + Duration::minutes(30);
    txs.push(Transaction::new("late", "amani", 900.0, "Food", late));

    let report = engine.analyze_at("amani", &txs, at(2024, 3, 31, 6));

    // History is too short for the raised training minimum
    assert!(!report.model_trained);
    let daily = report
        .anomalies
        .iter()
        .find(|a| a.severity == Severity::High)
        .context("expected daily alert at the lowered multiplier")?;
    assert_eq!(daily.transaction_id.as_deref(), Some("late"));

    Ok(())
}

/// `SpendingEngine::load` resolves the override under the platform data dir
/// and falls back to the embedded defaults when none exists
#[cfg(target_os = "linux")]
#[test]
fn test_engine_load_resolves_data_dir() -> Result<()> {
    let data_home = tempfile::tempdir()?;
    std::env::set_var("XDG_DATA_HOME", data_home.path());

    let engine = SpendingEngine::load()?;
    assert_eq!(engine.config(), &EngineConfig::default());

    let config_dir = data_home.path().join("spendwatch").join("config");
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(config_dir.join("engine.toml"), "[forest]\nnum_trees = 40\n")?;

    let engine = SpendingEngine::load()?;
    assert_eq!(engine.config().num_trees, 40);
    assert_eq!(engine.config().sample_size, EngineConfig::default().sample_size);

    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[forest]\nnum_trees = 0").unwrap();

    assert!(EngineConfig::load_from(file.path()).is_err());
}
