//! Forecast engine: next-period migration score per district.
//!
//! # Process
//!
//! 1. **Lag features**
//!    - Walk each district's periods in date order
//!    - Pair every period with the one before it: previous migration score
//!      and previous demographic volume, alongside the current enrolment
//!      and biometric volumes
//!    - A district's first period has no predecessor and yields no row, so
//!      usable history is one period shorter than observed history
//!
//! 2. **Model**
//!    - Seeded 80/20 shuffle split of the lagged rows
//!    - Random forest of bootstrap-sampled CART regression trees, split on
//!      squared-error reduction, predicting the current migration score
//!    - RMSE on the held-out rows
//!
//! 3. **Projection**
//!    - For each district's latest lagged row, treat the current period as
//!      "previous" and predict the following one
//!    - Emit current score, predicted score and the delta
//!
//! With no lagged rows at all, or too few to leave a training set after the
//! split, the engine returns `InsufficientHistory` instead of a model.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::analysis::stats::{mean, rmse, seeded_rng, train_test_split};
use crate::config::ForecastConfig;
use crate::model::{DistrictIndicatorRecord, DistrictKey, ForecastRecord};

pub const FEATURE_NAMES: [&str; 4] = [
    "prev_migration_score",
    "prev_demographic",
    "enrolment",
    "biometric",
];

// ---------------------------------------------------------------------------
// Lag features
// ---------------------------------------------------------------------------

/// One training row: a district-period paired with its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedRow {
    pub key: DistrictKey,
    pub date: NaiveDate,
    /// In `FEATURE_NAMES` order.
    pub features: Vec<f64>,
    /// Migration score of this period.
    pub target: f64,
    /// Demographic volume of this period, the next projection's lag input.
    pub demographic: f64,
}

/// Builds lagged rows from the dated indicator view.
///
/// Records without a date are ignored. Output is sorted by district then
/// date.
pub fn lagged_rows(periods: &[DistrictIndicatorRecord]) -> Vec<LaggedRow> {
    let mut series: BTreeMap<&DistrictKey, Vec<(NaiveDate, &DistrictIndicatorRecord)>> = BTreeMap::new();
    for record in periods {
        if let Some(date) = record.date {
            series.entry(&record.key).or_default().push((date, record));
        }
    }

    let mut rows = Vec::new();
    for (key, mut points) in series {
        points.sort_by_key(|(date, _)| *date);
        for pair in points.windows(2) {
            let (_, prev) = pair[0];
            let (date, cur) = pair[1];
            rows.push(LaggedRow {
                key: key.clone(),
                date,
                features: vec![
                    prev.migration_score,
                    prev.total_demographic_updates,
                    cur.total_enrolments,
                    cur.total_biometric_updates,
                ],
                target: cur.migration_score,
                demographic: cur.total_demographic_updates,
            });
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Regression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TreeNode {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// CART regression tree, grown to purity unless capped by `max_depth`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Lowest summed squared error split of `idx`, as (feature, threshold).
fn best_split(x: &[Vec<f64>], y: &[f64], idx: &[usize]) -> Option<(usize, f64)> {
    let n = idx.len();
    let width = x[idx[0]].len();
    let total_sum: f64 = idx.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = idx.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<(usize, f64, f64)> = None;
    let mut order = idx.to_vec();
    for feature in 0..width {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]).then(a.cmp(&b)));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for split in 1..n {
            let moved = y[order[split - 1]];
            left_sum += moved;
            left_sq += moved * moved;

            let lo = x[order[split - 1]][feature];
            let hi = x[order[split]][feature];
            if hi <= lo {
                continue;
            }

            let left_n = split as f64;
            let right_n = (n - split) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n) + (right_sq - right_sum * right_sum / right_n);

            if best.is_none_or(|(_, _, b)| sse < b) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((feature, threshold, sse));
            }
        }
    }

    best.filter(|(_, _, sse)| *sse < parent_sse)
        .map(|(feature, threshold, _)| (feature, threshold))
}

impl RegressionTree {
    /// Fits on the rows listed in `idx` (duplicates allowed, as produced by
    /// bootstrap sampling).
    pub fn fit(x: &[Vec<f64>], y: &[f64], idx: Vec<usize>, config: &ForecastConfig) -> Self {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        // (node slot, rows, depth); explicit stack keeps deep trees off the
        // thread stack.
        let mut stack = vec![(0usize, idx, 0usize)];

        while let Some((slot, rows, depth)) = stack.pop() {
            let value = if rows.is_empty() {
                0.0
            } else {
                rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64
            };

            let can_split = rows.len() >= config.min_samples_split
                && config.max_depth.is_none_or(|max| depth < max);
            let split = if can_split { best_split(x, y, &rows) } else { None };

            match split {
                None => nodes[slot] = TreeNode::Leaf { value },
                Some((feature, threshold)) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.into_iter().partition(|&i| x[i][feature] <= threshold);
                    let left = nodes.len();
                    nodes.push(TreeNode::Leaf { value });
                    let right = nodes.len();
                    nodes.push(TreeNode::Leaf { value });
                    nodes[slot] = TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
            }
        }

        RegressionTree { nodes }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => node = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Random forest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fits `config.trees` trees, each on a bootstrap sample of the rows.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForecastConfig, rng: &mut StdRng) -> Self {
        let n = x.len();
        let trees = (0..config.trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, bootstrap, config)
            })
            .collect();
        RandomForest { trees }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let predictions: Vec<f64> = self.trees.iter().map(|t| t.predict(x)).collect();
        mean(&predictions)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    /// One projection per district with at least two periods, in key order.
    pub records: Vec<ForecastRecord>,
    /// Held-out RMSE; `None` if the split left no test rows.
    pub rmse: Option<f64>,
    pub lagged_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    Forecast(ForecastReport),
    /// Nothing to train on. `lagged_rows == 0` means no district has two
    /// periods; otherwise the split left every lagged row for testing.
    InsufficientHistory { districts: usize, lagged_rows: usize },
}

/// Trains on the dated indicator view and projects one period ahead.
pub fn forecast(
    periods: &[DistrictIndicatorRecord],
    config: &ForecastConfig,
    seed: Option<u64>,
) -> ForecastOutcome {
    let districts = periods
        .iter()
        .map(|r| &r.key)
        .collect::<BTreeSet<_>>()
        .len();
    let rows = lagged_rows(periods);
    if rows.is_empty() {
        warn!(districts, "not enough history for lag features");
        return ForecastOutcome::InsufficientHistory {
            districts,
            lagged_rows: 0,
        };
    }

    let (train_idx, test_idx) = train_test_split(rows.len(), config.test_fraction, &mut seeded_rng(seed));
    if train_idx.is_empty() {
        warn!(lagged = rows.len(), "split left no training rows");
        return ForecastOutcome::InsufficientHistory {
            districts,
            lagged_rows: rows.len(),
        };
    }

    let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].features.clone()).collect();
    let y_train: Vec<f64> = train_idx.iter().map(|&i| rows[i].target).collect();
    let model = RandomForest::fit(&x_train, &y_train, config, &mut seeded_rng(seed));

    let actual: Vec<f64> = test_idx.iter().map(|&i| rows[i].target).collect();
    let predicted: Vec<f64> = test_idx.iter().map(|&i| model.predict(&rows[i].features)).collect();
    let rmse = rmse(&actual, &predicted);

    // rows are sorted by district then date, so the last row per key wins
    let mut latest: BTreeMap<&DistrictKey, &LaggedRow> = BTreeMap::new();
    for row in &rows {
        latest.insert(&row.key, row);
    }

    let records = latest
        .into_values()
        .map(|row| {
            let current = row.target;
            let projection = [current, row.demographic, row.features[2], row.features[3]];
            let predicted = model.predict(&projection);
            ForecastRecord {
                key: row.key.clone(),
                current_score: current,
                predicted_score: predicted,
                predicted_delta: predicted - current,
            }
        })
        .collect::<Vec<_>>();

    info!(
        lagged = rows.len(),
        train = train_idx.len(),
        test = test_idx.len(),
        rmse = ?rmse,
        projected = records.len(),
        "forecast complete"
    );

    ForecastOutcome::Forecast(ForecastReport {
        records,
        rmse,
        lagged_rows: rows.len(),
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
