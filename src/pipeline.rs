//! End-to-end orchestration of one analysis run.
//!
//! discover → load (per category, pooled file reads) → aggregate + join →
//! {segmentation, outliers, forecast} → reports
//!
//! The first three stages are sequential because each needs the full
//! output of the one before. The engines only read the indicator tables,
//! so they run side by side on scoped threads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;

use chrono::Utc;
use tracing::info;

use crate::analysis::aggregate::count_undated;
use crate::analysis::forecast::{self, ForecastOutcome};
use crate::analysis::indicators::{IndicatorTables, build_indicator_tables};
use crate::analysis::outliers::{OutlierReport, detect_outliers};
use crate::analysis::segmentation::{SegmentationOutcome, segment};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::discovery::discover;
use crate::ingest::loader::load_category;
use crate::model::{Category, CategoryTable};
use crate::report;
use crate::report::summary::{CategorySummary, RunSummary};

/// Indicator tables plus the three engine results.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub indicators: IndicatorTables,
    pub segmentation: SegmentationOutcome,
    pub outliers: OutlierReport,
    pub forecast: ForecastOutcome,
}

#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub analysis: Analysis,
    pub summary: RunSummary,
    /// Files written to the output directory.
    pub artifacts: Vec<PathBuf>,
}

/// Runs the three engines on `indicators`.
pub fn analyze(indicators: IndicatorTables, config: &PipelineConfig) -> Analysis {
    let seed = config.seed();

    let (segmentation, outliers, forecast) = thread::scope(|s| {
        let districts = &indicators.districts;
        let segmentation = s.spawn(|| segment(districts, &config.segmentation, seed));
        let outliers = s.spawn(|| detect_outliers(districts, &config.outliers, seed));
        let forecast = forecast::forecast(&indicators.periods, &config.forecast, seed);

        // an engine panic is a bug; surface it on the caller's thread
        let segmentation = segmentation
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let outliers = outliers
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (segmentation, outliers, forecast)
    });

    Analysis {
        indicators,
        segmentation,
        outliers,
        forecast,
    }
}

/// Canonical bucket names of all categories, in schema order.
pub fn bucket_names(config: &PipelineConfig) -> Vec<String> {
    Category::ALL
        .into_iter()
        .flat_map(|c| config.schema.canonical_names(c))
        .collect()
}

/// Runs the whole pipeline once and writes every artifact.
///
/// Fails on an invalid config, an unreadable input root, when no category
/// produced any rows, or when an output cannot be written. Unreadable
/// individual files are skipped and show up in the summary.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutputs> {
    config.validate()?;
    info!(
        input = %config.input_root.display(),
        output = %config.output_dir.display(),
        seed = ?config.seed(),
        "starting pipeline"
    );

    let files = discover(&config.input_root).map_err(|source| PipelineError::Io {
        path: config.input_root.clone(),
        source,
    })?;
    info!(
        enrolment = files.enrolment.len(),
        biometric = files.biometric.len(),
        demographic = files.demographic.len(),
        "input files discovered"
    );

    let mut categories = BTreeMap::new();
    let mut load = |category: Category| -> CategoryTable {
        let paths = files.get(category);
        let report = load_category(category, paths, config);
        let undated = count_undated(&report.table);
        if undated > 0 {
            info!(%category, rows = undated, "undated rows excluded from the per-period view");
        }
        categories.insert(category, CategorySummary::from_load(paths.len(), &report, undated));
        report.table
    };
    let enrolment = load(Category::Enrolment);
    let biometric = load(Category::Biometric);
    let demographic = load(Category::Demographic);

    if [&enrolment, &biometric, &demographic]
        .iter()
        .all(|t| t.is_empty())
    {
        return Err(PipelineError::NoData(config.input_root.clone()));
    }

    let indicators = build_indicator_tables(&enrolment, &biometric, &demographic);
    let analysis = analyze(indicators, config);

    let summary = RunSummary {
        generated_at: Utc::now(),
        input_root: config.input_root.clone(),
        output_dir: config.output_dir.clone(),
        seed: config.seed(),
        categories,
        districts: analysis.indicators.districts.len(),
        dated_rows: analysis.indicators.periods.len(),
        segmentation: (&analysis.segmentation).into(),
        outliers: (&analysis.outliers).into(),
        forecast: (&analysis.forecast).into(),
    };

    let artifacts = report::write_all(&config.output_dir, &bucket_names(config), &analysis, &summary)?;
    info!(files = artifacts.len(), "pipeline complete");

    Ok(PipelineOutputs {
        analysis,
        summary,
        artifacts,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::ingest::fixtures::{fixture_biometric_csv, fixture_demographic_csv, fixture_enrolment_csv};
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            input_root: dir.path().join("data"),
            output_dir: dir.path().join("out"),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_bucket_names_cover_all_categories_in_order() {
        let names = bucket_names(&PipelineConfig::default());
        assert_eq!(names.first().map(String::as_str), Some("enrol_0_5"));
        assert_eq!(names.last().map(String::as_str), Some("demo_update_adult"));
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_no_rows_anywhere_is_no_data() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_for(&dir);
        fs::create_dir_all(&config.input_root).expect("mkdir");
        fs::write(config.input_root.join("unrelated.csv"), "a,b\n1,2\n").expect("write");

        match run(&config) {
            Err(PipelineError::NoData(root)) => assert_eq!(root, config.input_root),
            other => panic!("expected NoData, got {:?}", other.map(|o| o.artifacts)),
        }
    }

    #[test]
    fn test_missing_input_root_is_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_for(&dir);
        assert!(matches!(run(&config), Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_invalid_config_fails_before_reading() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = config_for(&dir);
        config.segmentation.clusters = 0;
        assert!(matches!(
            run(&config),
            Err(PipelineError::Config(ConfigError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_run_with_two_categories_writes_every_artifact() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_for(&dir);
        fs::create_dir_all(&config.input_root).expect("mkdir");
        fs::write(config.input_root.join("enrolment_0.csv"), fixture_enrolment_csv()).expect("write");
        fs::write(config.input_root.join("biometric_0.csv"), fixture_biometric_csv()).expect("write");

        let outputs = run(&config).expect("pipeline should run");
        assert_eq!(outputs.artifacts.len(), report::ARTIFACTS.len());
        for path in &outputs.artifacts {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert_eq!(outputs.summary.categories[&Category::Demographic].files_found, 0);
        assert!(outputs.summary.districts > 0);
    }

    #[test]
    fn test_fixture_extracts_join_across_categories() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_for(&dir);
        fs::create_dir_all(&config.input_root).expect("mkdir");
        fs::write(config.input_root.join("enrolment_0.csv"), fixture_enrolment_csv()).expect("write");
        fs::write(config.input_root.join("biometric_0.csv"), fixture_biometric_csv()).expect("write");
        fs::write(config.input_root.join("demographic_0.csv"), fixture_demographic_csv()).expect("write");

        let outputs = run(&config).expect("pipeline should run");
        let names: Vec<String> = outputs
            .analysis
            .indicators
            .districts
            .iter()
            .map(|r| r.key.to_string())
            .collect();
        assert_eq!(names.len(), 3, "{:?}", names);

        let mysuru = outputs
            .analysis
            .indicators
            .districts
            .iter()
            .find(|r| r.key.district == "MYSURU")
            .expect("demographic-only district");
        assert_eq!(mysuru.total_enrolments, 0.0);
        assert_eq!(mysuru.total_demographic_updates, 4.0);
    }
}
