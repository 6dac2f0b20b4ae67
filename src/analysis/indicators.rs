//! Indicator engine: joins the three category aggregates and derives the
//! comparative ratios.
//!
//! The join is a full outer join on the grouping key. A district seen in
//! any one category gets a record; categories it is missing from
//! contribute zeros. Every ratio divides by `denominator + 1`
//! (`DENOMINATOR_OFFSET`), so the smallest possible denominator is 1.
//!
//! The same join runs twice per pipeline run: once on `DistrictKey`
//! (totals view, consumed by segmentation, outliers and reports) and once
//! on `DatedKey` (per-period view, consumed by the forecast engine).

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::info;

use crate::analysis::aggregate::{aggregate_by_date, aggregate_by_district};
use crate::config::{ENROL_0_5, ENROL_5_17};
use crate::model::{
    CategoryTable, CategoryTotals, DistrictIndicatorRecord, DistrictKey, GroupKey,
};

/// Added to every ratio denominator.
pub const DENOMINATOR_OFFSET: f64 = 1.0;

/// Infant enrolment floor for the catch-up ranking; smaller districts
/// produce noisy ratios.
pub const CATCHUP_MIN_INFANT_ENROLMENTS: f64 = 100.0;

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// `numerator / (denominator + 1)`. A negative denominator (corrupt input)
/// is floored at zero so the divisor stays at least 1.
pub fn offset_ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator.max(0.0) + DENOMINATOR_OFFSET)
}

/// Builds a record from joined raw counts.
///
/// `buckets` holds every canonical bucket in schema order; the three totals
/// are the per-category bucket sums.
pub fn derive_record(
    key: DistrictKey,
    date: Option<chrono::NaiveDate>,
    buckets: Vec<(String, f64)>,
    total_enrolments: f64,
    total_biometric_updates: f64,
    total_demographic_updates: f64,
) -> DistrictIndicatorRecord {
    let lookup = |name: &str| {
        buckets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    };
    let enrol_0_5 = lookup(ENROL_0_5);
    let enrol_5_17 = lookup(ENROL_5_17);
    let total_updates = total_biometric_updates + total_demographic_updates;

    DistrictIndicatorRecord {
        key,
        date,
        enrol_0_5,
        enrol_5_17,
        total_enrolments,
        total_biometric_updates,
        total_demographic_updates,
        total_updates,
        migration_score: offset_ratio(total_demographic_updates, total_biometric_updates),
        child_catchup_ratio: offset_ratio(enrol_5_17, enrol_0_5),
        digital_intensity: total_demographic_updates + total_biometric_updates,
        update_intensity: offset_ratio(total_updates, total_enrolments),
        child_share: offset_ratio(enrol_0_5 + enrol_5_17, total_enrolments),
        migration_index: offset_ratio(total_demographic_updates, total_biometric_updates),
        bio_ratio: offset_ratio(total_biometric_updates, enrol_0_5),
        buckets,
    }
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Outer-joins the three category aggregates on `K` and derives every
/// indicator. Records come back in key order.
pub fn join_indicators<K: GroupKey>(
    enrolment: &CategoryTotals<K>,
    biometric: &CategoryTotals<K>,
    demographic: &CategoryTotals<K>,
) -> Vec<DistrictIndicatorRecord> {
    let keys: BTreeSet<&K> = enrolment
        .totals
        .keys()
        .chain(biometric.totals.keys())
        .chain(demographic.totals.keys())
        .collect();

    keys.into_iter()
        .map(|key| {
            let mut buckets = Vec::with_capacity(
                enrolment.bucket_names.len()
                    + biometric.bucket_names.len()
                    + demographic.bucket_names.len(),
            );
            for totals in [enrolment, biometric, demographic] {
                let values = totals.get(key);
                for (i, name) in totals.bucket_names.iter().enumerate() {
                    let value = values.and_then(|v| v.get(i).copied()).unwrap_or(0.0);
                    buckets.push((name.clone(), value));
                }
            }

            derive_record(
                key.district_key().clone(),
                key.date(),
                buckets,
                enrolment.grand_total(key),
                biometric.grand_total(key),
                demographic.grand_total(key),
            )
        })
        .collect()
}

/// Both indicator views for one run.
#[derive(Debug, Clone, Default)]
pub struct IndicatorTables {
    /// One record per (state, district).
    pub districts: Vec<DistrictIndicatorRecord>,
    /// One record per (state, district, date), sorted by district then date.
    pub periods: Vec<DistrictIndicatorRecord>,
}

/// Aggregates the three category tables and joins them into both views.
pub fn build_indicator_tables(
    enrolment: &CategoryTable,
    biometric: &CategoryTable,
    demographic: &CategoryTable,
) -> IndicatorTables {
    let districts = join_indicators(
        &aggregate_by_district(enrolment),
        &aggregate_by_district(biometric),
        &aggregate_by_district(demographic),
    );
    let periods = join_indicators(
        &aggregate_by_date(enrolment),
        &aggregate_by_date(biometric),
        &aggregate_by_date(demographic),
    );

    info!(
        districts = districts.len(),
        periods = periods.len(),
        "indicator tables built"
    );
    IndicatorTables { districts, periods }
}

// ---------------------------------------------------------------------------
// Insight rankings
// ---------------------------------------------------------------------------

/// Highest `field` first; ties fall back to (state, district) ascending.
fn rank_by<'a, F>(
    records: impl IntoIterator<Item = &'a DistrictIndicatorRecord>,
    n: usize,
    field: F,
) -> Vec<&'a DistrictIndicatorRecord>
where
    F: Fn(&DistrictIndicatorRecord) -> f64,
{
    let mut ranked: Vec<&DistrictIndicatorRecord> = records.into_iter().collect();
    ranked.sort_by(|a, b| match field(b).total_cmp(&field(a)) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    });
    ranked.truncate(n);
    ranked
}

/// Potential migration hotspots: demographic updates outpacing biometric.
pub fn top_migration(records: &[DistrictIndicatorRecord], n: usize) -> Vec<&DistrictIndicatorRecord> {
    rank_by(records, n, |r| r.migration_score)
}

/// Late-registration areas: school-age enrolment outpacing infant
/// enrolment, among districts with more than
/// `CATCHUP_MIN_INFANT_ENROLMENTS` infant enrolments.
pub fn top_catchup(records: &[DistrictIndicatorRecord], n: usize) -> Vec<&DistrictIndicatorRecord> {
    rank_by(
        records
            .iter()
            .filter(|r| r.enrol_0_5 > CATCHUP_MIN_INFANT_ENROLMENTS),
        n,
        |r| r.child_catchup_ratio,
    )
}

/// Highest absolute update volume.
pub fn top_digital(records: &[DistrictIndicatorRecord], n: usize) -> Vec<&DistrictIndicatorRecord> {
    rank_by(records, n, |r| r.digital_intensity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
