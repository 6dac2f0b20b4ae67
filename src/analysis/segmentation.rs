//! Segmentation engine: k-means clustering of districts.
//!
//! Each district is described by four features (total enrolments, update
//! intensity, child share, migration index). Features are standardized
//! across the whole district population, then partitioned with Lloyd's
//! algorithm from k-means++ seeds. `n_init` independent seedings are run
//! and the one with the lowest inertia (within-cluster sum of squares) is
//! kept. All randomness comes from one seeded RNG, so a fixed seed gives
//! the same cluster ids on every run.
//!
//! Cluster ids are arbitrary labels in `[0, K)`; any meaning attached to
//! them ("migration hotspot", ...) is applied downstream by people.

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::analysis::stats::{Standardizer, seeded_rng, squared_distance};
use crate::config::SegmentationConfig;
use crate::model::{ClusterAssignment, DistrictIndicatorRecord};

pub const FEATURE_NAMES: [&str; 4] = [
    "total_enrolments",
    "update_intensity",
    "child_share",
    "migration_index",
];

/// Feature vector for one district, in `FEATURE_NAMES` order.
pub fn features(record: &DistrictIndicatorRecord) -> Vec<f64> {
    vec![
        record.total_enrolments,
        record.update_intensity,
        record.child_share,
        record.migration_index,
    ]
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// One entry per input record, in input order.
    pub assignments: Vec<ClusterAssignment>,
    /// Cluster count actually used; below the configured K when there are
    /// fewer districts than clusters.
    pub effective_k: usize,
    pub inertia: f64,
    /// Centroids in standardized feature space.
    pub centroids: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationOutcome {
    Clustered(Segmentation),
    /// No districts to cluster.
    InsufficientData,
}

// ---------------------------------------------------------------------------
// k-means
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct KMeansFit {
    labels: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
}

/// Index of the nearest centroid and its squared distance. Ties go to the
/// lower index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest existing one.
fn kmeans_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    let mut dist: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let chosen = if total > 0.0 && total.is_finite() {
            let target = rng.gen_range(0.0..total);
            let mut acc = 0.0;
            let mut pick = points.len() - 1;
            for (idx, d) in dist.iter().enumerate() {
                acc += d;
                if acc > target {
                    pick = idx;
                    break;
                }
            }
            pick
        } else {
            // every point already coincides with a centroid
            rng.gen_range(0..points.len())
        };

        let centroid = points[chosen].clone();
        for (d, p) in dist.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// One Lloyd run from a k-means++ seeding.
fn lloyd(
    points: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut StdRng,
) -> KMeansFit {
    let width = points[0].len();
    let mut centroids = kmeans_plus_plus(points, k, rng);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..max_iterations {
        for (label, p) in labels.iter_mut().zip(points) {
            *label = nearest(p, &centroids).0;
        }

        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (label, p) in labels.iter().zip(points) {
            counts[*label] += 1;
            for (s, v) in sums[*label].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut updated: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .zip(&centroids)
            .map(|((sum, &count), old)| {
                if count == 0 {
                    old.clone()
                } else {
                    sum.into_iter().map(|s| s / count as f64).collect()
                }
            })
            .collect();

        // Re-seed empty clusters with the points worst served by their
        // current centroid.
        let empty: Vec<usize> = (0..k).filter(|&c| counts[c] == 0).collect();
        if !empty.is_empty() {
            let mut by_distance: Vec<(usize, f64)> = points
                .iter()
                .zip(&labels)
                .enumerate()
                .map(|(idx, (p, &label))| (idx, squared_distance(p, &updated[label])))
                .collect();
            by_distance.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            for (cluster, (idx, _)) in empty.into_iter().zip(by_distance) {
                updated[cluster] = points[idx].clone();
                labels[idx] = cluster;
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = updated;
        if shift <= tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (idx, d) = nearest(p, &centroids);
        *label = idx;
        inertia += d;
    }

    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// Best of `n_init` Lloyd runs.
fn kmeans(points: &[Vec<f64>], k: usize, config: &SegmentationConfig, rng: &mut StdRng) -> KMeansFit {
    // Tolerance is relative to the data's mean per-feature variance.
    let width = points[0].len();
    let n = points.len() as f64;
    let mean_variance = (0..width)
        .map(|col| {
            let m = points.iter().map(|p| p[col]).sum::<f64>() / n;
            points.iter().map(|p| (p[col] - m).powi(2)).sum::<f64>() / n
        })
        .sum::<f64>()
        / width.max(1) as f64;
    let tolerance = config.tolerance * mean_variance;

    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init {
        let fit = lloyd(points, k, config.max_iterations, tolerance, rng);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    // n_init >= 1 is enforced by config validation
    best.unwrap_or_else(|| lloyd(points, k, config.max_iterations, tolerance, rng))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Clusters districts into at most `config.clusters` groups.
pub fn segment(
    records: &[DistrictIndicatorRecord],
    config: &SegmentationConfig,
    seed: Option<u64>,
) -> SegmentationOutcome {
    if records.is_empty() {
        warn!("no districts to segment");
        return SegmentationOutcome::InsufficientData;
    }

    let mut k = config.clusters.max(1);
    if records.len() < k {
        warn!(
            districts = records.len(),
            configured = k,
            "fewer districts than clusters, reducing cluster count"
        );
        k = records.len();
    }

    let raw: Vec<Vec<f64>> = records.iter().map(features).collect();
    let scaled = Standardizer::fit(&raw).transform(&raw);
    let mut rng = seeded_rng(seed);
    let fit = kmeans(&scaled, k, config, &mut rng);

    let assignments = records
        .iter()
        .zip(&fit.labels)
        .map(|(r, &cluster)| ClusterAssignment {
            key: r.key.clone(),
            cluster,
        })
        .collect();

    info!(
        districts = records.len(),
        features = %FEATURE_NAMES.join(","),
        clusters = k,
        inertia = fit.inertia,
        "segmentation complete"
    );

    SegmentationOutcome::Clustered(Segmentation {
        assignments,
        effective_k: k,
        inertia: fit.inertia,
        centroids: fit.centroids,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::indicators::derive_record;
    use crate::model::DistrictKey;
    use std::collections::BTreeSet;

    fn district(name: &str, enrol: f64, bio: f64, demo: f64) -> DistrictIndicatorRecord {
        derive_record(
            DistrictKey::new("S", name),
            None,
            vec![("enrol_0_5".into(), enrol * 0.4), ("enrol_5_17".into(), enrol * 0.4)],
            enrol,
            bio,
            demo,
        )
    }

    /// Three well separated behaviour groups of four districts each.
    fn grouped_districts() -> Vec<DistrictIndicatorRecord> {
        let mut out = Vec::new();
        for i in 0..4 {
            let j = i as f64;
            out.push(district(&format!("BIG{}", i), 100_000.0 + j * 500.0, 2_000.0, 1_000.0));
            out.push(district(&format!("MIG{}", i), 1_000.0 + j * 10.0, 100.0, 5_000.0 + j * 50.0));
            out.push(district(&format!("QUIET{}", i), 900.0 + j * 10.0, 20.0, 0.0));
        }
        out
    }

    fn clustered(outcome: SegmentationOutcome) -> Segmentation {
        match outcome {
            SegmentationOutcome::Clustered(s) => s,
            SegmentationOutcome::InsufficientData => panic!("expected clusters"),
        }
    }

    #[test]
    fn test_every_district_gets_exactly_one_id_below_k() {
        let records = grouped_districts();
        let config = SegmentationConfig::default();
        let seg = clustered(segment(&records, &config, Some(42)));

        assert_eq!(seg.assignments.len(), records.len());
        for (a, r) in seg.assignments.iter().zip(&records) {
            assert_eq!(a.key, r.key, "assignments keep input order");
            assert!(a.cluster < config.clusters);
        }
        let distinct: BTreeSet<usize> = seg.assignments.iter().map(|a| a.cluster).collect();
        assert!(distinct.len() <= config.clusters);
    }

    #[test]
    fn test_separated_groups_are_not_mixed() {
        let records = grouped_districts();
        let config = SegmentationConfig {
            clusters: 3,
            ..SegmentationConfig::default()
        };
        let seg = clustered(segment(&records, &config, Some(7)));

        for prefix in ["BIG", "MIG", "QUIET"] {
            let ids: BTreeSet<usize> = seg
                .assignments
                .iter()
                .filter(|a| a.key.district.starts_with(prefix))
                .map(|a| a.cluster)
                .collect();
            assert_eq!(ids.len(), 1, "{} districts should share one cluster", prefix);
        }
        let distinct: BTreeSet<usize> = seg.assignments.iter().map(|a| a.cluster).collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let records = grouped_districts();
        let config = SegmentationConfig::default();
        let first = segment(&records, &config, Some(42));
        let second = segment(&records, &config, Some(42));
        assert_eq!(first, second);
    }

    #[test]
    fn test_fewer_districts_than_k_reduces_k() {
        let records = vec![district("A", 10.0, 1.0, 1.0), district("B", 5000.0, 10.0, 900.0)];
        let seg = clustered(segment(&records, &SegmentationConfig::default(), Some(42)));

        assert_eq!(seg.effective_k, 2);
        assert_eq!(seg.assignments.len(), 2);
        assert_ne!(seg.assignments[0].cluster, seg.assignments[1].cluster);
    }

    #[test]
    fn test_identical_districts_do_not_crash() {
        let records: Vec<_> = (0..6).map(|i| district(&format!("D{}", i), 10.0, 1.0, 1.0)).collect();
        let seg = clustered(segment(&records, &SegmentationConfig::default(), Some(42)));
        assert_eq!(seg.assignments.len(), 6);
        assert!(seg.inertia.abs() < 1e-9);
    }

    #[test]
    fn test_no_districts_is_insufficient_data() {
        assert_eq!(
            segment(&[], &SegmentationConfig::default(), Some(42)),
            SegmentationOutcome::InsufficientData
        );
    }
}
