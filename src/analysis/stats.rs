//! Small numeric helpers shared by the segmentation, outlier and forecast
//! engines.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Slack applied before rounding a fraction of a population up, so that
/// products like `0.01 * 300.0 = 3.0000000000000004` give 3, not 4.
const FRACTION_EPSILON: f64 = 1e-9;

/// RNG for one engine. `None` seeds from OS entropy.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population (n, not n - 1) standard deviation.
pub fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Root-mean-squared error, or `None` for empty input.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    Some(mse.sqrt())
}

/// `ceil(fraction * n)` with float slack, clamped to `[0, n]`.
pub fn fraction_count(fraction: f64, n: usize) -> usize {
    let raw = (fraction * n as f64 - FRACTION_EPSILON).ceil();
    if raw <= 0.0 { 0 } else { (raw as usize).min(n) }
}

/// Shuffled train/test index split. The test set takes
/// `fraction_count(test_fraction, n)` indices.
pub fn train_test_split(n: usize, test_fraction: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let test_len = fraction_count(test_fraction, n);
    let train = indices.split_off(test_len);
    (train, indices)
}

// ---------------------------------------------------------------------------
// Standardization
// ---------------------------------------------------------------------------

/// Per-column zero-mean, unit-variance scaling.
///
/// A constant column keeps scale 1, so it is centred but not blown up.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);

        for col in 0..width {
            let values: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let m = mean(&values);
            let sd = population_std(&values, m);
            means.push(m);
            scales.push(if sd > 0.0 && sd.is_finite() { sd } else { 1.0 });
        }

        Self { means, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|r| {
                r.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_count_rounds_up_with_slack() {
        assert_eq!(fraction_count(0.01, 300), 3);
        assert_eq!(fraction_count(0.01, 100), 1);
        assert_eq!(fraction_count(0.01, 50), 1);
        assert_eq!(fraction_count(0.01, 0), 0);
        assert_eq!(fraction_count(0.2, 10), 2);
        assert_eq!(fraction_count(0.2, 11), 3);
        assert_eq!(fraction_count(1.5, 4), 4, "clamped to n");
    }

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(&[1.0, 2.0], &[1.0, 2.0]), Some(0.0));
        assert_eq!(rmse(&[0.0, 0.0], &[3.0, 4.0]), Some((12.5f64).sqrt()));
        assert_eq!(rmse(&[], &[]), None);
    }

    #[test]
    fn test_standardizer_zero_mean_unit_variance() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![5.0, 5.0]];
        let scaler = Standardizer::fit(&rows);
        let scaled = scaler.transform(&rows);

        let col0: Vec<f64> = scaled.iter().map(|r| r[0]).collect();
        let m = mean(&col0);
        assert!(m.abs() < 1e-12);
        assert!((population_std(&col0, m) - 1.0).abs() < 1e-12);

        assert_eq!(scaler.scales[1], 1.0, "constant column keeps unit scale");
        assert!(scaled.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_split_is_a_seeded_partition() {
        let (train, test) = train_test_split(10, 0.2, &mut seeded_rng(Some(42)));
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        let again = train_test_split(10, 0.2, &mut seeded_rng(Some(42)));
        assert_eq!(again, (train, test));
    }
}
