//! Outlier engine: isolation-forest scoring of districts.
//!
//! Districts are described by biometric-to-infant ratio, infant enrolments
//! and biometric update volume. Each tree is grown on a random sub-sample
//! by splitting on a random feature at a random threshold until points are
//! isolated or the height limit `ceil(log2(psi))` is reached. Anomalies are
//! isolated in fewer splits, so the standard score
//! `s(x) = 2^(-E[h(x)] / c(psi))` is close to 1 for them and around 0.5 or
//! below for ordinary districts.
//!
//! The flagged set is relative: the `ceil(contamination * N)` highest
//! scores are flagged, whatever their absolute value.

use std::cmp::Ordering;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use tracing::info;

use crate::analysis::stats::{fraction_count, seeded_rng};
use crate::config::OutlierConfig;
use crate::model::{AnomalyFlag, DistrictIndicatorRecord};

pub const FEATURE_NAMES: [&str; 3] = ["bio_ratio", "enrol_0_5", "total_biometric_updates"];

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Feature vector for one district, in `FEATURE_NAMES` order.
pub fn features(record: &DistrictIndicatorRecord) -> Vec<f64> {
    vec![record.bio_ratio, record.enrol_0_5, record.total_biometric_updates]
}

/// Average path length of an unsuccessful BST search among `n` points;
/// normalizes path lengths and stands in for unexpanded leaves.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ---------------------------------------------------------------------------
// Isolation tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(points: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(points, sample, 0, height_limit, rng);
        tree
    }

    /// Appends the subtree for `idx` and returns its node index.
    fn grow(
        &mut self,
        points: &[Vec<f64>],
        idx: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { size: idx.len() });
        if depth >= height_limit || idx.len() <= 1 {
            return slot;
        }

        // Only features that still vary, over a finite range, can separate
        // anything.
        let width = points[idx[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|f| {
                let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(points[i][f]), hi.max(points[i][f]))
                });
                (hi > lo && (hi - lo).is_finite()).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return slot;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| points[i][feature] < threshold);

        let left = self.grow(points, left_idx, depth + 1, height_limit, rng);
        let right = self.grow(points, right_idx, depth + 1, height_limit, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Isolation score per point, in input order.
pub fn isolation_scores(points: &[Vec<f64>], config: &OutlierConfig, rng: &mut StdRng) -> Vec<f64> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    let psi = config.max_samples.min(n);
    let height_limit = (psi.max(2) as f64).log2().ceil() as usize;

    let trees: Vec<IsolationTree> = (0..config.trees)
        .map(|_| {
            let subsample = sample(rng, n, psi).into_vec();
            IsolationTree::fit(points, subsample, height_limit, rng)
        })
        .collect();

    let norm = average_path_length(psi);
    points
        .iter()
        .map(|x| {
            let mean_path = trees.iter().map(|t| t.path_length(x)).sum::<f64>() / trees.len() as f64;
            if norm > 0.0 {
                2f64.powf(-mean_path / norm)
            } else {
                // a single district cannot be isolated any further
                0.5
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutlierReport {
    /// One flag per input record, in input order.
    pub flags: Vec<AnomalyFlag>,
    pub flagged: usize,
}

impl OutlierReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyFlag> {
        self.flags.iter().filter(|f| f.is_anomaly)
    }
}

/// Scores every district and flags the most anomalous
/// `contamination` fraction.
pub fn detect_outliers(
    records: &[DistrictIndicatorRecord],
    config: &OutlierConfig,
    seed: Option<u64>,
) -> OutlierReport {
    if records.is_empty() {
        return OutlierReport::default();
    }

    let points: Vec<Vec<f64>> = records.iter().map(features).collect();
    let mut rng = seeded_rng(seed);
    let scores = isolation_scores(&points, config, &mut rng);

    let flagged = fraction_count(config.contamination, records.len());
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => records[a].key.cmp(&records[b].key),
        other => other,
    });
    let mut is_anomaly = vec![false; records.len()];
    for &idx in order.iter().take(flagged) {
        is_anomaly[idx] = true;
    }

    let flags = records
        .iter()
        .zip(scores)
        .zip(is_anomaly)
        .map(|((r, score), is_anomaly)| AnomalyFlag {
            key: r.key.clone(),
            score,
            is_anomaly,
        })
        .collect();

    info!(
        districts = records.len(),
        flagged,
        contamination = config.contamination,
        "outlier detection complete"
    );
    OutlierReport { flags, flagged }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
