//! Registration Activity Analytics - Batch Runner
//!
//! Runs the full pipeline once:
//! 1. Discovers enrolment, biometric and demographic CSVs under the input root
//! 2. Loads and normalizes them, then joins district-level indicators
//! 3. Segments districts, flags anomalies and forecasts migration scores
//! 4. Writes result tables and reports to the output directory
//!
//! Usage:
//!   cargo run --release                          # regmon.toml or defaults
//!   cargo run --release -- --config other.toml   # explicit config file
//!
//! Environment:
//!   REGMON_CONFIG - config file path (also read from .env)
//!   RUST_LOG      - log filter, default `info`

use regmon_service::analysis::forecast::ForecastOutcome;
use regmon_service::analysis::segmentation::SegmentationOutcome;
use regmon_service::config::{PipelineConfig, load_config, load_config_default};
use regmon_service::error::ConfigError;
use regmon_service::logging::init_tracing;
use regmon_service::pipeline;
use std::env;

fn main() {
    init_tracing();

    println!("🗺️  Registration Activity Analytics");
    println!("==================================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH]", args[0]);
                std::process::exit(1);
            }
        }
    }

    println!("⚙️  Loading configuration...");
    let loaded: Result<PipelineConfig, ConfigError> = match &config_path {
        Some(path) => load_config(path),
        None => load_config_default(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("\n❌ Configuration error: {}\n", e);
        std::process::exit(1);
    });
    println!("✓ Configuration loaded:");
    println!("  - Input root: {}", config.input_root.display());
    println!("  - Output dir: {}", config.output_dir.display());
    println!("  - Clusters: {}", config.segmentation.clusters);
    println!("  - Contamination: {}", config.outliers.contamination);
    match config.seed() {
        Some(seed) => println!("  - Seed: {}\n", seed),
        None => println!("  - Seed: entropy (non-deterministic)\n"),
    }

    println!("🔄 Running pipeline...");
    let outputs = match pipeline::run(&config) {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("\n❌ Pipeline failed: {}\n", e);
            std::process::exit(1);
        }
    };
    let summary = &outputs.summary;
    println!("✓ Pipeline complete\n");

    println!("📋 Inputs:");
    for (category, counts) in &summary.categories {
        println!(
            "   {:<12} {} files read, {} skipped, {} rows",
            category, counts.files_read, counts.files_skipped, counts.rows
        );
    }
    println!("   Districts: {}  |  District-periods: {}\n", summary.districts, summary.dated_rows);

    println!("📊 Results:");
    match &outputs.analysis.segmentation {
        SegmentationOutcome::Clustered(s) => {
            println!("   ✓ Segmentation: {} clusters (inertia {:.2})", s.effective_k, s.inertia)
        }
        SegmentationOutcome::InsufficientData => println!("   ✗ Segmentation: insufficient data"),
    }
    println!(
        "   ✓ Outliers: {} of {} districts flagged",
        outputs.analysis.outliers.flagged,
        outputs.analysis.outliers.flags.len()
    );
    match &outputs.analysis.forecast {
        ForecastOutcome::Forecast(r) => match r.rmse {
            Some(rmse) => println!("   ✓ Forecast: {} districts projected (RMSE {:.4})", r.records.len(), rmse),
            None => println!("   ✓ Forecast: {} districts projected", r.records.len()),
        },
        ForecastOutcome::InsufficientHistory { lagged_rows: 0, .. } => {
            println!("   ✗ Forecast: insufficient history (need two periods per district)")
        }
        ForecastOutcome::InsufficientHistory { lagged_rows, .. } => {
            println!("   ✗ Forecast: only {} lagged rows, none left for training", lagged_rows)
        }
    }

    println!("\n📁 Outputs:");
    for path in &outputs.artifacts {
        println!("   {}", path.display());
    }
    if summary.files_skipped() > 0 {
        println!("\n⚠️  {} input files were skipped; see the log for reasons", summary.files_skipped());
    }
    println!();
}
