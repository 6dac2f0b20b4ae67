//! Pipeline configuration loader - parses regmon.toml
//!
//! Separates the input layout, per-category column schema and model
//! parameters from code, so a new extract layout or a different cluster
//! count does not need a recompile. Every field has a default; a missing
//! file section falls back to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::Category;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "regmon.toml";

/// Environment variable overriding `DEFAULT_CONFIG_PATH`.
pub const CONFIG_ENV_VAR: &str = "REGMON_CONFIG";

/// Canonical bucket names the indicator ratios are built from.
pub const ENROL_0_5: &str = "enrol_0_5";
pub const ENROL_5_17: &str = "enrol_5_17";

/// Column names owned by the indicator tables; no bucket may use them.
pub const RESERVED_COLUMNS: &[&str] = &[
    "state",
    "district",
    "date",
    "total_enrolments",
    "total_biometric_updates",
    "total_demographic_updates",
    "total_updates",
    "migration_score",
    "child_catchup_ratio",
    "digital_intensity",
    "update_intensity",
    "child_share",
    "migration_index",
    "bio_ratio",
    "cluster",
];

// ---------------------------------------------------------------------------
// TOML Configuration Structures
// ---------------------------------------------------------------------------

/// Root configuration, one per pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory searched recursively for category CSV files.
    pub input_root: PathBuf,
    /// Directory receiving result tables and reports.
    pub output_dir: PathBuf,
    /// chrono format of the `date` column (day-month-year).
    pub date_format: String,
    /// Upper-case state/district names at load time so spellings that
    /// differ only in case join into one district.
    pub coalesce_key_case: bool,
    /// Worker threads used to read input files.
    pub load_threads: usize,
    /// Seed shared by every randomized engine.
    pub random_seed: u64,
    /// When false, engines seed from OS entropy and reruns are not
    /// reproducible.
    pub deterministic: bool,
    pub schema: SchemaConfig,
    pub segmentation: SegmentationConfig,
    pub outliers: OutlierConfig,
    pub forecast: ForecastConfig,
}

/// One numeric bucket column: its header in the source file and the
/// canonical name it carries through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketColumn {
    pub source: String,
    pub canonical: String,
}

impl BucketColumn {
    fn new(source: &str, canonical: &str) -> Self {
        Self {
            source: source.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

/// Per-category bucket schema (the explicit rename map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub enrolment: Vec<BucketColumn>,
    pub biometric: Vec<BucketColumn>,
    pub demographic: Vec<BucketColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub clusters: usize,
    /// Independent k-means++ initializations; the lowest inertia wins.
    pub n_init: usize,
    pub max_iterations: usize,
    /// Convergence threshold on total centroid movement.
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Fraction of districts expected to be anomalous.
    pub contamination: f64,
    pub trees: usize,
    /// Upper bound on the per-tree sub-sample size.
    pub max_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub trees: usize,
    /// Share of lagged rows held out for the RMSE estimate.
    pub test_fraction: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("data"),
            output_dir: PathBuf::from("analysis_results"),
            date_format: "%d-%m-%Y".to_string(),
            coalesce_key_case: true,
            load_threads: 4,
            random_seed: 42,
            deterministic: true,
            schema: SchemaConfig::default(),
            segmentation: SegmentationConfig::default(),
            outliers: OutlierConfig::default(),
            forecast: ForecastConfig::default(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enrolment: vec![
                BucketColumn::new("age_0_5", ENROL_0_5),
                BucketColumn::new("age_5_17", ENROL_5_17),
                BucketColumn::new("age_18_greater", "enrol_18_plus"),
            ],
            biometric: vec![
                BucketColumn::new("bio_age_5_17", "bio_update_child"),
                BucketColumn::new("bio_age_17_", "bio_update_adult"),
            ],
            demographic: vec![
                BucketColumn::new("demo_age_5_17", "demo_update_child"),
                BucketColumn::new("demo_age_17_", "demo_update_adult"),
            ],
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            clusters: 4,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            contamination: 0.01,
            trees: 100,
            max_samples: 256,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            test_fraction: 0.2,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

impl SchemaConfig {
    pub fn columns(&self, category: Category) -> &[BucketColumn] {
        match category {
            Category::Enrolment => &self.enrolment,
            Category::Biometric => &self.biometric,
            Category::Demographic => &self.demographic,
        }
    }

    pub fn canonical_names(&self, category: Category) -> Vec<String> {
        self.columns(category)
            .iter()
            .map(|c| c.canonical.clone())
            .collect()
    }
}

impl PipelineConfig {
    /// The seed engines should use, or `None` to seed from entropy.
    pub fn seed(&self) -> Option<u64> {
        self.deterministic.then_some(self.random_seed)
    }

    /// Checks the schema and model parameters before any data is read.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // canonical name -> "category.source" that first claimed it
        let mut owners: HashMap<&str, String> = HashMap::new();
        for category in Category::ALL {
            for column in self.schema.columns(category) {
                let canonical = column.canonical.as_str();
                if RESERVED_COLUMNS.contains(&canonical) {
                    return Err(ConfigError::ReservedName {
                        name: column.canonical.clone(),
                        category,
                    });
                }
                let owner = format!("{}.{}", category, column.source);
                if let Some(first) = owners.get(canonical) {
                    return Err(ConfigError::CanonicalCollision {
                        name: column.canonical.clone(),
                        first: first.clone(),
                        second: owner,
                    });
                }
                owners.insert(canonical, owner);
            }
        }

        let enrolment = self.schema.canonical_names(Category::Enrolment);
        for required in [ENROL_0_5, ENROL_5_17] {
            if !enrolment.iter().any(|n| n == required) {
                return Err(ConfigError::MissingRequiredBucket {
                    name: required,
                    category: Category::Enrolment,
                });
            }
        }

        check(self.load_threads > 0, "load_threads", "must be at least 1")?;
        check(self.segmentation.clusters > 0, "segmentation.clusters", "must be at least 1")?;
        check(self.segmentation.n_init > 0, "segmentation.n_init", "must be at least 1")?;
        check(
            self.segmentation.max_iterations > 0,
            "segmentation.max_iterations",
            "must be at least 1",
        )?;
        check(
            self.segmentation.tolerance.is_finite() && self.segmentation.tolerance >= 0.0,
            "segmentation.tolerance",
            "must be a finite, non-negative number",
        )?;
        check(
            self.outliers.contamination > 0.0 && self.outliers.contamination <= 0.5,
            "outliers.contamination",
            "must be in (0, 0.5]",
        )?;
        check(self.outliers.trees > 0, "outliers.trees", "must be at least 1")?;
        check(self.outliers.max_samples > 1, "outliers.max_samples", "must be at least 2")?;
        check(self.forecast.trees > 0, "forecast.trees", "must be at least 1")?;
        check(
            self.forecast.test_fraction > 0.0 && self.forecast.test_fraction < 1.0,
            "forecast.test_fraction",
            "must be in (0, 1)",
        )?;
        check(
            self.forecast.min_samples_split >= 2,
            "forecast.min_samples_split",
            "must be at least 2",
        )?;
        check(
            self.forecast.max_depth != Some(0),
            "forecast.max_depth",
            "must be at least 1 when set",
        )?;
        Ok(())
    }
}

fn check(ok: bool, name: &'static str, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: reason.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loading Functions
// ---------------------------------------------------------------------------

/// Loads and validates a pipeline configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: PipelineConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Resolves the config path from `REGMON_CONFIG` (a `.env` file is honoured)
/// and loads it. Without an override and without `regmon.toml` in the
/// working directory, the validated defaults are used.
pub fn load_config_default() -> Result<PipelineConfig, ConfigError> {
    dotenv::dotenv().ok();

    match env::var(CONFIG_ENV_VAR) {
        Ok(path) => load_config(path),
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        Err(_) => {
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
