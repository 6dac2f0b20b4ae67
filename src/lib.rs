//! regmon_service: district-level analytics over identity-registration
//! activity (enrolments, biometric updates, demographic updates).
//!
//! # Module structure
//!
//! ```text
//! regmon_service
//! ├── config      — PipelineConfig loader and validation (regmon.toml)
//! ├── error       — ConfigError, LoadError, PipelineError
//! ├── logging     — tracing subscriber setup for the binaries
//! ├── model       — shared data types (Category, DistrictKey, indicator records, …)
//! ├── ingest
//! │   ├── discovery — finds input CSVs and sorts them into categories
//! │   ├── loader    — parses and normalizes one category's files
//! │   └── fixtures (test only) — representative CSV extracts
//! ├── analysis
//! │   ├── aggregate    — per-category sums by district / district-period
//! │   ├── indicators   — outer join and derived ratios, insight rankings
//! │   ├── stats        — scaling, RMSE, seeded RNG and splits
//! │   ├── segmentation — k-means district clusters
//! │   ├── outliers     — isolation-forest anomaly flags
//! │   └── forecast     — random-forest next-period migration score
//! ├── report      — CSV tables, markdown reports, run summary
//! └── pipeline    — discover → load → indicators → engines → report
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
