//! Isolation Forest anomaly detection
//!
//! Anomalies are few and different, so random axis-aligned splits isolate
//! them in fewer steps than normal points. A forest of randomized trees turns
//! the average isolation depth into a score in `(0, 1]`:
//!
//! - close to 1: isolated quickly, strong outlier
//! - around 0.5: typical point
//! - well below 0.5: deep inside a dense region
//!
//! Reference: Liu, Ting & Zhou, "Isolation Forest", ICDM 2008.

pub mod forest;
pub mod tree;

pub use forest::IsolationForest;
pub use tree::{IsolationTree, Node, NodeId};

/// Euler–Mascheroni constant
pub const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Expected path length `c(n)` of an unsuccessful search in a binary search
/// tree of `n` points
///
/// Used both to normalize scores and to account for the subtree that was
/// never grown below a leaf holding more than one point. The harmonic number
/// is approximated by `ln(i) + γ`, which is poor at `i = 1`, so `c(2)` uses
/// the exact value 1.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => return 0.0,
        2 => return 1.0,
        _ => {}
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}
