/// Output artifacts of a pipeline run.
///
/// Submodules:
/// - `tables`   — CSV result tables (clusters, anomalies, forecast)
/// - `markdown` — findings, anomaly and prediction reports
/// - `summary`  — `run_summary.json` structures
/// - `check`    — verification of a finished output directory

pub mod check;
pub mod markdown;
pub mod summary;
pub mod tables;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::Analysis;
use summary::RunSummary;

pub const CLUSTERS_CSV: &str = "district_clusters.csv";
pub const ANOMALIES_CSV: &str = "district_anomalies.csv";
pub const FORECAST_CSV: &str = "district_forecast.csv";
pub const FINDINGS_MD: &str = "findings.md";
pub const ANOMALY_REPORT_MD: &str = "anomaly_report.md";
pub const PREDICTION_REPORT_MD: &str = "prediction_report.md";
pub const RUN_SUMMARY_JSON: &str = "run_summary.json";

/// Every file a successful run leaves in the output directory.
pub const ARTIFACTS: [&str; 7] = [
    CLUSTERS_CSV,
    ANOMALIES_CSV,
    FORECAST_CSV,
    FINDINGS_MD,
    ANOMALY_REPORT_MD,
    PREDICTION_REPORT_MD,
    RUN_SUMMARY_JSON,
];

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

/// Writes every artifact into `output_dir`, creating it if needed.
/// Returns the written paths in `ARTIFACTS` order.
pub fn write_all(
    output_dir: &Path,
    bucket_names: &[String],
    analysis: &Analysis,
    summary: &RunSummary,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir).map_err(|source| PipelineError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let path = |name: &str| output_dir.join(name);
    let districts = &analysis.indicators.districts;

    let clustered = tables::write_clusters(&path(CLUSTERS_CSV), bucket_names, districts, &analysis.segmentation)?;
    let scored = tables::write_anomalies(&path(ANOMALIES_CSV), districts, &analysis.outliers)?;
    let projected = tables::write_forecast(&path(FORECAST_CSV), &analysis.forecast)?;

    write_text(&path(FINDINGS_MD), &markdown::render_findings(districts)?)?;
    write_text(
        &path(ANOMALY_REPORT_MD),
        &markdown::render_anomaly_report(districts, &analysis.outliers)?,
    )?;
    write_text(
        &path(PREDICTION_REPORT_MD),
        &markdown::render_prediction_report(&analysis.forecast)?,
    )?;
    write_json(&path(RUN_SUMMARY_JSON), summary)?;

    info!(
        dir = %output_dir.display(),
        clustered,
        scored,
        projected,
        "reports written"
    );
    Ok(ARTIFACTS.iter().map(|name| path(*name)).collect())
}
