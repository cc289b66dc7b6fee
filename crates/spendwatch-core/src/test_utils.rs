//! Test utilities for spendwatch-core
//!
//! Deterministic transaction fixtures shared by unit tests across modules.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::models::Transaction;

const ROUTINE_MERCHANTS: [(&str, &str); 4] = [
    ("Naivas Supermarket", "Food"),
    ("Carrefour", "Food"),
    ("Uber", "Transport"),
    ("KPLC Prepaid", "Utilities"),
];

/// UTC timestamp at the top of an hour
pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// `n` unremarkable expenses, one per day from 2024-01-01
///
/// Amounts stay between 400 and 600, hours between 08:00 and 17:00, and the
/// merchants rotate through four regulars.
pub fn routine_history(user_id: &str, n: usize) -> Vec<Transaction> {
    let start = ts(2024, 1, 1, 0);
    (0..n)
        .map(|i| {
            let (merchant, category) = ROUTINE_MERCHANTS[i % ROUTINE_MERCHANTS.len()];
            let amount = 400.0 + ((i * 37) % 200) as f64;
            let timestamp = start + Duration::days(i as i64) + Duration::hours(8 + (i % 10) as i64);
            Transaction::new(format!("{}-tx-{}", user_id, i), user_id, amount, category, timestamp)
                .with_merchant(merchant)
        })
        .collect()
}

/// A large 03:00 purchase at a merchant and category the user never used,
/// dated after any [`routine_history`]
pub fn outlier_transaction(user_id: &str, id: &str) -> Transaction {
    Transaction::new(id, user_id, 85_000.0, "Electronics", ts(2024, 6, 1, 3))
        .with_merchant("Unknown Electronics Ltd")
}

const FOOD_DAY_OFFSETS: [i64; 12] = [0, 2, 5, 8, 10, 13, 16, 19, 21, 24, 27, 30];

fn food_purchases(user_id: &str, amounts: [f64; 12]) -> Vec<Transaction> {
    let start = ts(2024, 4, 1, 12);
    amounts
        .iter()
        .zip(FOOD_DAY_OFFSETS)
        .enumerate()
        .map(|(i, (&amount, offset))| {
            Transaction::new(
                format!("food-{}", i),
                user_id,
                amount,
                "Food",
                start + Duration::days(offset),
            )
            .with_merchant("Java House")
        })
        .collect()
}

/// Twelve Food expenses over exactly 30 days; one 3000 purchase early on,
/// the rest around 500
pub fn food_scenario(user_id: &str) -> Vec<Transaction> {
    food_purchases(
        user_id,
        [3000.0, 450.0, 520.0, 480.0, 510.0, 545.0, 490.0, 530.0, 470.0, 505.0, 515.0, 505.0],
    )
}

/// Twelve Food expenses over exactly 30 days, with a single 3000 purchase
/// as the fifth one
pub fn food_with_midstream_spike(user_id: &str) -> Vec<Transaction> {
    food_purchases(
        user_id,
        [500.0, 520.0, 480.0, 510.0, 3000.0, 495.0, 505.0, 515.0, 490.0, 500.0, 505.0, 500.0],
    )
}

/// `days` consecutive days of spending starting at `first_day`, split evenly
/// across two purchases (10:00 and 18:00 UTC)
pub fn daily_spend(
    user_id: &str,
    category: &str,
    first_day: NaiveDate,
    days: u32,
    per_day: f64,
) -> Vec<Transaction> {
    (0..days)
        .flat_map(|d| {
            let day = first_day + Duration::days(d as i64);
            [10, 18].into_iter().map(move |hour| {
                let timestamp = day.and_hms_opt(hour, 0, 0).unwrap().and_utc();
                Transaction::new(
                    format!("{}-{}-{}-{}", user_id, category, day, hour),
                    user_id,
                    per_day / 2.0,
                    category,
                    timestamp,
                )
            })
        })
        .collect()
}

/// Calendar day shorthand
pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
