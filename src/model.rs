//! Shared data types for the registration analytics pipeline.
//!
//! Everything downstream of the loader works on these types: raw
//! observations, per-category totals, the joined indicator records and the
//! three engine outputs (cluster ids, anomaly flags, forecasts).

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// The three record types ingested by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Enrolment,
    Biometric,
    Demographic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Enrolment, Category::Biometric, Category::Demographic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Enrolment => "enrolment",
            Category::Biometric => "biometric",
            Category::Demographic => "demographic",
        }
    }

    /// Classifies an input file by its name.
    ///
    /// Checked in the order biometric, demographic, enrolment, so a file
    /// named `biometric_enrolment_fix.csv` is biometric.
    pub fn classify(file_name: &str) -> Option<Category> {
        let name = file_name.to_lowercase();
        [Category::Biometric, Category::Demographic, Category::Enrolment]
            .into_iter()
            .find(|c| name.contains(c.as_str()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// (state, district) grouping key, as normalized by the loader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DistrictKey {
    pub state: String,
    pub district: String,
}

impl DistrictKey {
    pub fn new(state: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
        }
    }
}

impl fmt::Display for DistrictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.district, self.state)
    }
}

/// (date, state, district) grouping key.
///
/// Field order makes the derived `Ord` sort by district first and then
/// chronologically, which is exactly the layout the forecast engine walks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatedKey {
    pub district: DistrictKey,
    pub date: NaiveDate,
}

/// A grouping key the aggregator and indicator engine can be generic over.
pub trait GroupKey: Ord + Clone {
    /// Extracts the key from an observation, or `None` if the observation
    /// cannot take part in this grouping (an undated row in a dated view).
    fn from_observation(obs: &RawObservation) -> Option<Self>;

    fn district_key(&self) -> &DistrictKey;

    fn date(&self) -> Option<NaiveDate>;
}

impl GroupKey for DistrictKey {
    fn from_observation(obs: &RawObservation) -> Option<Self> {
        Some(DistrictKey::new(obs.state.clone(), obs.district.clone()))
    }

    fn district_key(&self) -> &DistrictKey {
        self
    }

    fn date(&self) -> Option<NaiveDate> {
        None
    }
}

impl GroupKey for DatedKey {
    fn from_observation(obs: &RawObservation) -> Option<Self> {
        obs.date.map(|date| DatedKey {
            district: DistrictKey::new(obs.state.clone(), obs.district.clone()),
            date,
        })
    }

    fn district_key(&self) -> &DistrictKey {
        &self.district
    }

    fn date(&self) -> Option<NaiveDate> {
        Some(self.date)
    }
}

// ---------------------------------------------------------------------------
// Raw and aggregated tables
// ---------------------------------------------------------------------------

/// One row from a source file after normalization.
///
/// `buckets` is aligned with the owning table's `bucket_names`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub category: Category,
    pub date: Option<NaiveDate>,
    pub state: String,
    pub district: String,
    pub buckets: Vec<f64>,
}

/// All normalized observations of one category, concatenated across files.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    pub category: Category,
    /// Canonical bucket names, in schema order.
    pub bucket_names: Vec<String>,
    pub rows: Vec<RawObservation>,
}

impl CategoryTable {
    pub fn empty(category: Category, bucket_names: Vec<String>) -> Self {
        Self {
            category,
            bucket_names,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Summed buckets per key for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotals<K: Ord> {
    pub category: Category,
    pub bucket_names: Vec<String>,
    pub totals: BTreeMap<K, Vec<f64>>,
}

impl<K: Ord> CategoryTotals<K> {
    pub fn get(&self, key: &K) -> Option<&[f64]> {
        self.totals.get(key).map(Vec::as_slice)
    }

    /// Sum over every bucket for `key`; zero if the key is absent.
    pub fn grand_total(&self, key: &K) -> f64 {
        self.get(key).map(|b| b.iter().sum()).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Joined indicators
// ---------------------------------------------------------------------------

/// The category-merged record for one district (or one district-period).
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictIndicatorRecord {
    pub key: DistrictKey,
    /// `None` in the totals view, the period in the dated view.
    pub date: Option<NaiveDate>,
    /// Every canonical bucket of every category, in schema order.
    pub buckets: Vec<(String, f64)>,

    pub enrol_0_5: f64,
    pub enrol_5_17: f64,
    pub total_enrolments: f64,
    pub total_biometric_updates: f64,
    pub total_demographic_updates: f64,
    pub total_updates: f64,

    pub migration_score: f64,
    pub child_catchup_ratio: f64,
    pub digital_intensity: f64,
    pub update_intensity: f64,
    pub child_share: f64,
    pub migration_index: f64,
    pub bio_ratio: f64,
}

impl DistrictIndicatorRecord {
    pub fn bucket(&self, name: &str) -> Option<f64> {
        self.buckets.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

// ---------------------------------------------------------------------------
// Engine outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub key: DistrictKey,
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyFlag {
    pub key: DistrictKey,
    /// Isolation score in (0, 1]; higher is more anomalous.
    pub score: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub key: DistrictKey,
    pub current_score: f64,
    pub predicted_score: f64,
    pub predicted_delta: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
