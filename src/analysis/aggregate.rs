//! District aggregation.
//!
//! `aggregate` collapses a category's raw observations into bucket sums per
//! grouping key. The key type decides the view:
//! - `DistrictKey` — one entry per (state, district), every row counts;
//! - `DatedKey`    — one entry per (district, date), undated rows are left
//!   out.
//!
//! Keys are taken exactly as the loader produced them. Counts are integral,
//! so the f64 sums are exact (below 2^53) and the result does not depend on
//! the order rows or files arrive in.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{CategoryTable, CategoryTotals, DatedKey, DistrictKey, GroupKey};

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Sums every bucket of `table` per key `K`.
pub fn aggregate<K: GroupKey>(table: &CategoryTable) -> CategoryTotals<K> {
    let width = table.bucket_names.len();
    let mut totals: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    let mut skipped = 0usize;

    for obs in &table.rows {
        let Some(key) = K::from_observation(obs) else {
            skipped += 1;
            continue;
        };
        let sums = totals.entry(key).or_insert_with(|| vec![0.0; width]);
        for (sum, value) in sums.iter_mut().zip(&obs.buckets) {
            *sum += value;
        }
    }

    if skipped > 0 {
        debug!(
            category = %table.category,
            rows = skipped,
            "rows left out of keyed aggregation (no date)"
        );
    }

    CategoryTotals {
        category: table.category,
        bucket_names: table.bucket_names.clone(),
        totals,
    }
}

/// Totals-only view: one entry per (state, district).
pub fn aggregate_by_district(table: &CategoryTable) -> CategoryTotals<DistrictKey> {
    aggregate(table)
}

/// Time-series view: one entry per (district, date).
pub fn aggregate_by_date(table: &CategoryTable) -> CategoryTotals<DatedKey> {
    aggregate(table)
}

/// Number of rows the dated view cannot use.
pub fn count_undated(table: &CategoryTable) -> usize {
    table.rows.iter().filter(|r| r.date.is_none()).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
