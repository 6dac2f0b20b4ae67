#!/usr/bin/env rust
//! Output Verification
//!
//! Confirms that a pipeline run left every expected artifact behind:
//! all tables and reports exist and are non-empty, the cluster table has a
//! `cluster` column and at least one district, and the run summary is
//! valid JSON. Exits non-zero if anything is missing.
//!
//! Usage:
//!   cargo run --bin check_outputs                  # output_dir from config
//!   cargo run --bin check_outputs -- --dir PATH    # explicit directory

use regmon_service::config::load_config_default;
use regmon_service::logging::init_tracing;
use regmon_service::report::check::check_outputs;
use std::env;
use std::path::PathBuf;

fn main() {
    init_tracing();

    println!("🔍 Output Verification");
    println!("======================\n");

    let args: Vec<String> = env::args().collect();
    let explicit_dir = args
        .iter()
        .position(|a| a == "--dir")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let dir = match explicit_dir {
        Some(dir) => dir,
        None => match load_config_default() {
            Ok(config) => config.output_dir,
            Err(e) => {
                eprintln!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    };
    println!("📁 Checking {}\n", dir.display());

    let checks = check_outputs(&dir);
    let mut failed = 0;
    for check in &checks {
        match &check.problem {
            None => println!("   ✓ {}", check.name),
            Some(problem) => {
                println!("   ✗ {} - {}", check.name, problem);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        eprintln!("\n❌ {} of {} artifacts failed verification\n", failed, checks.len());
        std::process::exit(1);
    }
    println!("\n✓ All {} artifacts present\n", checks.len());
}
