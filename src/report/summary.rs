//! Machine-readable run summary (`run_summary.json`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::forecast::ForecastOutcome;
use crate::analysis::outliers::OutlierReport;
use crate::analysis::segmentation::SegmentationOutcome;
use crate::ingest::loader::LoadReport;
use crate::model::Category;

/// Per-category loading counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorySummary {
    pub files_found: usize,
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows: usize,
    pub rows_missing_key: usize,
    /// Rows kept in the totals view but left out of the dated view.
    pub undated_rows: usize,
}

impl CategorySummary {
    pub fn from_load(files_found: usize, report: &LoadReport, undated_rows: usize) -> Self {
        Self {
            files_found,
            files_read: report.files_read,
            files_skipped: report.skipped.len(),
            rows: report.table.len(),
            rows_missing_key: report.rows_missing_key,
            undated_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentationSummary {
    Clustered { effective_k: usize, inertia: f64 },
    InsufficientData,
}

impl From<&SegmentationOutcome> for SegmentationSummary {
    fn from(outcome: &SegmentationOutcome) -> Self {
        match outcome {
            SegmentationOutcome::Clustered(s) => SegmentationSummary::Clustered {
                effective_k: s.effective_k,
                inertia: s.inertia,
            },
            SegmentationOutcome::InsufficientData => SegmentationSummary::InsufficientData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierSummary {
    pub districts: usize,
    pub flagged: usize,
}

impl From<&OutlierReport> for OutlierSummary {
    fn from(report: &OutlierReport) -> Self {
        Self {
            districts: report.flags.len(),
            flagged: report.flagged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastSummary {
    Forecast {
        lagged_rows: usize,
        train_rows: usize,
        test_rows: usize,
        rmse: Option<f64>,
        projected: usize,
    },
    InsufficientHistory {
        districts: usize,
        lagged_rows: usize,
    },
}

impl From<&ForecastOutcome> for ForecastSummary {
    fn from(outcome: &ForecastOutcome) -> Self {
        match outcome {
            ForecastOutcome::Forecast(r) => ForecastSummary::Forecast {
                lagged_rows: r.lagged_rows,
                train_rows: r.train_rows,
                test_rows: r.test_rows,
                rmse: r.rmse,
                projected: r.records.len(),
            },
            ForecastOutcome::InsufficientHistory {
                districts,
                lagged_rows,
            } => ForecastSummary::InsufficientHistory {
                districts: *districts,
                lagged_rows: *lagged_rows,
            },
        }
    }
}

/// Counts for every stage of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub input_root: PathBuf,
    pub output_dir: PathBuf,
    /// `None` when the run was seeded from entropy.
    pub seed: Option<u64>,
    pub categories: BTreeMap<Category, CategorySummary>,
    pub districts: usize,
    pub dated_rows: usize,
    pub segmentation: SegmentationSummary,
    pub outliers: OutlierSummary,
    pub forecast: ForecastSummary,
}

impl RunSummary {
    pub fn files_skipped(&self) -> usize {
        self.categories.values().map(|c| c.files_skipped).sum()
    }
}
