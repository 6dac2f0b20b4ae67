//! CSV result tables.
//!
//! Headers are written explicitly so an empty result still produces a
//! header-only file. Floats use Rust's shortest round-trip formatting,
//! which keeps reruns on the same input byte-identical.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::analysis::forecast::ForecastOutcome;
use crate::analysis::outliers::OutlierReport;
use crate::analysis::segmentation::SegmentationOutcome;
use crate::error::{PipelineError, Result};
use crate::model::DistrictIndicatorRecord;

/// Totals and derived indicators, in column order after the buckets.
pub const INDICATOR_COLUMNS: [&str; 11] = [
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
];

pub const ANOMALY_COLUMNS: [&str; 7] = [
    "state",
    "district",
    "enrol_0_5",
    "total_biometric_updates",
    "bio_ratio",
    "anomaly_score",
    "is_anomaly",
];

pub const FORECAST_COLUMNS: [&str; 5] = [
    "state",
    "district",
    "current_score",
    "predicted_score",
    "predicted_delta",
];

#[derive(Debug, Serialize)]
struct AnomalyRow<'a> {
    state: &'a str,
    district: &'a str,
    enrol_0_5: f64,
    total_biometric_updates: f64,
    bio_ratio: f64,
    anomaly_score: f64,
    is_anomaly: bool,
}

#[derive(Debug, Serialize)]
struct ForecastRow<'a> {
    state: &'a str,
    district: &'a str,
    current_score: f64,
    predicted_score: f64,
    predicted_delta: f64,
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> PipelineError + '_ {
    move |source| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn open_writer<'h, I>(path: &Path, header: I) -> Result<csv::Writer<File>>
where
    I: IntoIterator<Item = &'h str>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err(path))?;
    writer.write_record(header).map_err(csv_err(path))?;
    Ok(writer)
}

fn finish(mut writer: csv::Writer<File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn indicator_values(record: &DistrictIndicatorRecord) -> [f64; 11] {
    [
        record.total_enrolments,
        record.total_biometric_updates,
        record.total_demographic_updates,
        record.total_updates,
        record.migration_score,
        record.child_catchup_ratio,
        record.digital_intensity,
        record.update_intensity,
        record.child_share,
        record.migration_index,
        record.bio_ratio,
    ]
}

/// Header of `district_clusters.csv` for the given canonical buckets.
pub fn cluster_header(bucket_names: &[String]) -> Vec<String> {
    let mut header = vec!["state".to_string(), "district".to_string()];
    header.extend(bucket_names.iter().cloned());
    header.extend(INDICATOR_COLUMNS.iter().map(|c| c.to_string()));
    header.push("cluster".to_string());
    header
}

/// Writes the full district table with cluster ids. Returns the row count.
///
/// `records` must be the slice the segmentation ran on, so assignments
/// line up by position.
pub fn write_clusters(
    path: &Path,
    bucket_names: &[String],
    records: &[DistrictIndicatorRecord],
    outcome: &SegmentationOutcome,
) -> Result<usize> {
    let header = cluster_header(bucket_names);
    let mut writer = open_writer(path, header.iter().map(String::as_str))?;

    let assignments = match outcome {
        SegmentationOutcome::Clustered(s) => s.assignments.as_slice(),
        SegmentationOutcome::InsufficientData => &[],
    };

    for (record, assignment) in records.iter().zip(assignments) {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.key.state.clone());
        row.push(record.key.district.clone());
        row.extend(
            bucket_names
                .iter()
                .map(|name| record.bucket(name).unwrap_or(0.0).to_string()),
        );
        row.extend(indicator_values(record).iter().map(f64::to_string));
        row.push(assignment.cluster.to_string());
        writer.write_record(&row).map_err(csv_err(path))?;
    }

    finish(writer, path)?;
    Ok(assignments.len().min(records.len()))
}

/// Writes the anomaly score and flag of every district.
pub fn write_anomalies(
    path: &Path,
    records: &[DistrictIndicatorRecord],
    report: &OutlierReport,
) -> Result<usize> {
    let mut writer = open_writer(path, ANOMALY_COLUMNS)?;
    let mut written = 0;

    for (record, flag) in records.iter().zip(&report.flags) {
        writer
            .serialize(AnomalyRow {
                state: &record.key.state,
                district: &record.key.district,
                enrol_0_5: record.enrol_0_5,
                total_biometric_updates: record.total_biometric_updates,
                bio_ratio: record.bio_ratio,
                anomaly_score: flag.score,
                is_anomaly: flag.is_anomaly,
            })
            .map_err(csv_err(path))?;
        written += 1;
    }

    finish(writer, path)?;
    Ok(written)
}

/// Writes one projection per district; header only when the forecast had
/// too little history.
pub fn write_forecast(path: &Path, outcome: &ForecastOutcome) -> Result<usize> {
    let mut writer = open_writer(path, FORECAST_COLUMNS)?;

    let records = match outcome {
        ForecastOutcome::Forecast(r) => r.records.as_slice(),
        ForecastOutcome::InsufficientHistory { .. } => &[],
    };
    for record in records {
        writer
            .serialize(ForecastRow {
                state: &record.key.state,
                district: &record.key.district,
                current_score: record.current_score,
                predicted_score: record.predicted_score,
                predicted_delta: record.predicted_delta,
            })
            .map_err(csv_err(path))?;
    }

    finish(writer, path)?;
    Ok(records.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
