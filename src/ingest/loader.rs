//! Category loader and normalizer.
//!
//! Reads every file of one category and concatenates the rows into a
//! `CategoryTable`:
//! - header names are trimmed and lower-cased before lookup;
//! - `date` is parsed with the configured day-month-year format, and a
//!   value that does not match becomes `None` (the row is kept);
//! - each configured bucket column is coerced to a number, with blanks,
//!   garbage and non-finite values counted as 0;
//! - `state` and `district` are trimmed, internal whitespace runs collapse
//!   to one space, and with `coalesce_key_case` they are upper-cased.
//!
//! A file that cannot be opened, is not valid CSV, or has no `state` /
//! `district` column is logged and skipped. The remaining files still load.
//! Files are read on a small thread pool and reassembled in input order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use chrono::NaiveDate;
use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::config::{BucketColumn, PipelineConfig};
use crate::error::LoadError;
use crate::model::{Category, CategoryTable, RawObservation};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How to read one category's files. Shared read-only by the workers.
#[derive(Debug, Clone)]
pub struct FileSchema {
    pub category: Category,
    pub columns: Vec<BucketColumn>,
    pub date_format: String,
    pub coalesce_key_case: bool,
}

impl FileSchema {
    pub fn from_config(category: Category, config: &PipelineConfig) -> Self {
        Self {
            category,
            columns: config.schema.columns(category).to_vec(),
            date_format: config.date_format.clone(),
            coalesce_key_case: config.coalesce_key_case,
        }
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.canonical.clone()).collect()
    }
}

/// A file whose rows were dropped, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Rows parsed from a single file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub rows: Vec<RawObservation>,
    /// Rows with a blank state or district, which cannot be grouped.
    pub rows_missing_key: usize,
}

/// Result of loading one category.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: CategoryTable,
    pub files_read: usize,
    pub rows_missing_key: usize,
    pub skipped: Vec<SkippedFile>,
}

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

/// Normalizes a header cell for lookup.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes a state or district value.
pub fn normalize_key(raw: &str, coalesce_case: bool) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if coalesce_case {
        collapsed.to_uppercase()
    } else {
        collapsed
    }
}

/// Largest magnitude a single count cell may carry. Larger values are
/// clamped so that district sums stay finite.
pub const MAX_COUNT: f64 = 1e12;

/// Coerces a count cell; anything that is not a finite number is 0.
pub fn parse_count(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.clamp(-MAX_COUNT, MAX_COUNT),
        _ => 0.0,
    }
}

/// Parses a date cell, or `None` if it does not match `format`.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), format).ok()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses one CSV source. `origin` only labels errors.
pub fn parse_records<R: Read>(
    reader: R,
    origin: &Path,
    schema: &FileSchema,
) -> Result<ParsedFile, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: origin.to_path_buf(),
        source,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(normalize_header)
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let state_idx = column("state").ok_or_else(|| LoadError::MissingKeyColumn {
        path: origin.to_path_buf(),
        column: "state",
    })?;
    let district_idx = column("district").ok_or_else(|| LoadError::MissingKeyColumn {
        path: origin.to_path_buf(),
        column: "district",
    })?;
    let date_idx = column("date");
    let bucket_idx: Vec<Option<usize>> = schema
        .columns
        .iter()
        .map(|c| column(&normalize_header(&c.source)))
        .collect();

    for (col, idx) in schema.columns.iter().zip(&bucket_idx) {
        if idx.is_none() {
            debug!(
                file = %origin.display(),
                column = %col.source,
                "bucket column absent, counting as 0"
            );
        }
    }

    let mut parsed = ParsedFile::default();
    for record in csv_reader.records() {
        let record = record.map_err(csv_error)?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let state = normalize_key(field(state_idx), schema.coalesce_key_case);
        let district = normalize_key(field(district_idx), schema.coalesce_key_case);
        if state.is_empty() || district.is_empty() {
            parsed.rows_missing_key += 1;
            continue;
        }

        let date = date_idx.and_then(|idx| parse_date(field(idx), &schema.date_format));
        let buckets = bucket_idx
            .iter()
            .map(|idx| idx.map(|i| parse_count(field(i))).unwrap_or(0.0))
            .collect();

        parsed.rows.push(RawObservation {
            category: schema.category,
            date,
            state,
            district,
            buckets,
        });
    }

    Ok(parsed)
}

/// Opens and parses one file.
pub fn read_file(path: &Path, schema: &FileSchema) -> Result<ParsedFile, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(BufReader::new(file), path, schema)
}

// ---------------------------------------------------------------------------
// Category loading
// ---------------------------------------------------------------------------

/// Loads every file of one category into a single table.
///
/// Never fails: unusable files end up in `LoadReport::skipped`, and an
/// empty `paths` gives an empty table.
pub fn load_category(
    category: Category,
    paths: &[PathBuf],
    config: &PipelineConfig,
) -> LoadReport {
    let schema = FileSchema::from_config(category, config);
    let mut report = LoadReport {
        table: CategoryTable::empty(category, schema.canonical_names()),
        files_read: 0,
        rows_missing_key: 0,
        skipped: Vec::new(),
    };

    if paths.is_empty() {
        warn!(%category, "no input files for category");
        return report;
    }

    let results = read_all(paths, Arc::new(schema), config.load_threads);

    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(parsed) => {
                debug!(
                    %category,
                    file = %path.display(),
                    rows = parsed.rows.len(),
                    "file loaded"
                );
                report.files_read += 1;
                report.rows_missing_key += parsed.rows_missing_key;
                report.table.rows.extend(parsed.rows);
            }
            Err(reason) => {
                warn!(%category, file = %path.display(), %reason, "skipping unreadable file");
                report.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    if report.rows_missing_key > 0 {
        warn!(
            %category,
            rows = report.rows_missing_key,
            "dropped rows with blank state or district"
        );
    }
    info!(
        %category,
        files = report.files_read,
        skipped = report.skipped.len(),
        rows = report.table.len(),
        "category loaded"
    );
    report
}

/// Reads `paths` on a thread pool. The returned vector is index-aligned
/// with `paths`; a worker that dies leaves an error in its slot.
fn read_all(
    paths: &[PathBuf],
    schema: Arc<FileSchema>,
    threads: usize,
) -> Vec<Result<ParsedFile, String>> {
    let pool = ThreadPool::new(threads.clamp(1, paths.len()));
    let (tx, rx) = mpsc::channel();

    for (idx, path) in paths.iter().enumerate() {
        let tx = tx.clone();
        let path = path.clone();
        let schema = Arc::clone(&schema);
        pool.execute(move || {
            let result = read_file(&path, &schema).map_err(|e| e.to_string());
            // Receiver outlives the pool; a send error only means the
            // caller is gone.
            let _ = tx.send((idx, result));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<Result<ParsedFile, String>>> = (0..paths.len()).map(|_| None).collect();
    for (idx, result) in rx {
        slots[idx] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err("reader thread panicked".to_string())))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use std::fs;

    fn schema(category: Category) -> FileSchema {
        FileSchema::from_config(category, &PipelineConfig::default())
    }

    fn parse(text: &str, category: Category) -> ParsedFile {
        parse_records(text.as_bytes(), Path::new("fixture.csv"), &schema(category))
            .expect("fixture should parse")
    }

    // --- Field normalization ------------------------------------------------

    #[test]
    fn test_normalize_key_trims_collapses_and_uppercases() {
        assert_eq!(normalize_key("  new   delhi ", true), "NEW DELHI");
        assert_eq!(normalize_key("  new   delhi ", false), "new delhi");
        assert_eq!(normalize_key("   ", true), "");
    }

    #[test]
    fn test_parse_count_forces_garbage_to_zero() {
        assert_eq!(parse_count("42"), 42.0);
        assert_eq!(parse_count(" 7.5 "), 7.5);
        assert_eq!(parse_count(""), 0.0);
        assert_eq!(parse_count("n/a"), 0.0);
        assert_eq!(parse_count("NaN"), 0.0);
        assert_eq!(parse_count("inf"), 0.0);
        assert_eq!(parse_count("1e308"), MAX_COUNT);
        assert_eq!(parse_count("-1e308"), -MAX_COUNT);
    }

    #[test]
    fn test_parse_date_day_month_year() {
        let d = parse_date("01-04-2025", "%d-%m-%Y").expect("valid date");
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert!(parse_date("2025/04/15", "%d-%m-%Y").is_none());
        assert!(parse_date("", "%d-%m-%Y").is_none());
    }

    // --- Parsing --------------------------------------------------------------

    #[test]
    fn test_parse_enrolment_fixture() {
        let parsed = parse(fixture_enrolment_csv(), Category::Enrolment);
        assert_eq!(parsed.rows.len(), 5, "no row is dropped for bad values");

        let first = &parsed.rows[0];
        assert_eq!(first.state, "MAHARASHTRA");
        assert_eq!(first.district, "PUNE");
        assert_eq!(first.buckets, vec![10.0, 20.0, 5.0]);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn test_messy_headers_and_keys_are_normalized() {
        let parsed = parse(fixture_enrolment_csv(), Category::Enrolment);
        let third = &parsed.rows[2];
        assert_eq!(third.state, "MAHARASHTRA", "lower-case state coalesces");
        assert_eq!(third.district, "PUNE", "padded district is trimmed");
    }

    #[test]
    fn test_non_numeric_count_becomes_zero() {
        let parsed = parse(fixture_enrolment_csv(), Category::Enrolment);
        assert_eq!(parsed.rows[3].buckets, vec![0.0, 2.0, 1.0]);

        let bio = parse(fixture_biometric_csv(), Category::Biometric);
        assert_eq!(bio.rows[2].buckets, vec![1.0, 0.0], "blank cell is 0");
    }

    #[test]
    fn test_unparsable_date_becomes_none_but_row_is_kept() {
        let parsed = parse(fixture_enrolment_csv(), Category::Enrolment);
        let garbled = &parsed.rows[4];
        assert!(garbled.date.is_none());
        assert_eq!(garbled.buckets, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_district_column_is_error() {
        let result = parse_records(
            fixture_missing_district_csv().as_bytes(),
            Path::new("broken.csv"),
            &schema(Category::Enrolment),
        );
        match result {
            Err(LoadError::MissingKeyColumn { column, .. }) => assert_eq!(column, "district"),
            other => panic!("expected missing district column, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_bucket_columns_count_as_zero() {
        let parsed = parse(fixture_enrolment_without_buckets_csv(), Category::Enrolment);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].buckets, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_blank_key_rows_are_counted_not_loaded() {
        let text = "date,state,district,age_0_5,age_5_17,age_18_greater\n\
                    01-03-2025,Goa,,1,1,1\n\
                    01-03-2025,Goa,North Goa,1,1,1\n";
        let parsed = parse(text, Category::Enrolment);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows_missing_key, 1);
    }

    #[test]
    fn test_case_is_preserved_when_coalescing_is_off() {
        let mut config = PipelineConfig::default();
        config.coalesce_key_case = false;
        let schema = FileSchema::from_config(Category::Enrolment, &config);
        let parsed = parse_records(
            fixture_enrolment_csv().as_bytes(),
            Path::new("fixture.csv"),
            &schema,
        )
        .expect("fixture should parse");
        assert_eq!(parsed.rows[0].state, "Maharashtra");
        assert_eq!(parsed.rows[2].state, "maharashtra");
    }

    // --- Category loading ---------------------------------------------------

    #[test]
    fn test_load_category_skips_bad_files_and_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("enrolment_a.csv");
        let broken = dir.path().join("enrolment_b.csv");
        let missing = dir.path().join("enrolment_c.csv");
        fs::write(&good, fixture_enrolment_csv()).expect("write");
        fs::write(&broken, fixture_missing_district_csv()).expect("write");

        let report = load_category(
            Category::Enrolment,
            &[good, broken.clone(), missing.clone()],
            &PipelineConfig::default(),
        );

        assert_eq!(report.files_read, 1);
        assert_eq!(report.table.len(), 5);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].path, broken);
        assert!(report.skipped[0].reason.contains("district"));
        assert_eq!(report.skipped[1].path, missing);
    }

    #[test]
    fn test_load_category_without_files_is_empty_table() {
        let report = load_category(Category::Demographic, &[], &PipelineConfig::default());
        assert!(report.table.is_empty());
        assert_eq!(
            report.table.bucket_names,
            vec!["demo_update_child".to_string(), "demo_update_adult".to_string()]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_load_category_concatenates_in_input_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("biometric_a.csv");
        let b = dir.path().join("biometric_b.csv");
        fs::write(&a, "state,district,bio_age_5_17,bio_age_17_\nS,A,1,1\n").expect("write");
        fs::write(&b, "state,district,bio_age_5_17,bio_age_17_\nS,B,2,2\n").expect("write");

        let mut config = PipelineConfig::default();
        config.load_threads = 2;
        let report = load_category(Category::Biometric, &[b, a], &config);

        let districts: Vec<&str> = report.table.rows.iter().map(|r| r.district.as_str()).collect();
        assert_eq!(districts, vec!["B", "A"]);
    }
}
