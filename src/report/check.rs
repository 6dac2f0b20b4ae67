//! Post-run verification of the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ARTIFACTS, CLUSTERS_CSV, RUN_SUMMARY_JSON};

/// Outcome of checking one artifact; `problem` is `None` when it passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactCheck {
    pub name: &'static str,
    pub path: PathBuf,
    pub problem: Option<String>,
}

impl ArtifactCheck {
    pub fn passed(&self) -> bool {
        self.problem.is_none()
    }
}

/// The cluster table must carry a `cluster` column and at least one row.
fn check_clusters(path: &Path) -> Result<(), String> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| e.to_string())?;
    let has_cluster = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .any(|h| h == "cluster");
    if !has_cluster {
        return Err("no 'cluster' column".to_string());
    }
    match reader.records().next() {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("no district rows".to_string()),
    }
}

fn check_summary(path: &Path) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|_| ())
        .map_err(|e| format!("invalid JSON: {}", e))
}

fn check_one(dir: &Path, name: &'static str) -> ArtifactCheck {
    let path = dir.join(name);
    let problem = match fs::metadata(&path) {
        Err(_) => Some("missing".to_string()),
        Ok(meta) if meta.len() == 0 => Some("empty".to_string()),
        Ok(_) => {
            let detail = match name {
                CLUSTERS_CSV => check_clusters(&path),
                RUN_SUMMARY_JSON => check_summary(&path),
                _ => Ok(()),
            };
            detail.err()
        }
    };
    ArtifactCheck {
        name,
        path,
        problem,
    }
}

/// Checks every expected artifact in `dir`, in `ARTIFACTS` order.
pub fn check_outputs(dir: &Path) -> Vec<ArtifactCheck> {
    ARTIFACTS.iter().map(|name| check_one(dir, *name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_all_valid(dir: &Path) {
        for name in ARTIFACTS {
            fs::write(dir.join(name), "x\n").expect("write");
        }
        fs::write(dir.join(CLUSTERS_CSV), "state,district,cluster\nS,A,0\n").expect("write");
        fs::write(dir.join(RUN_SUMMARY_JSON), "{\"districts\": 1}").expect("write");
    }

    #[test]
    fn test_complete_directory_passes() {
        let dir = TempDir::new().expect("tempdir");
        write_all_valid(dir.path());
        let checks = check_outputs(dir.path());
        assert_eq!(checks.len(), ARTIFACTS.len());
        assert!(checks.iter().all(ArtifactCheck::passed), "{:?}", checks);
    }

    #[test]
    fn test_missing_and_empty_files_are_reported() {
        let dir = TempDir::new().expect("tempdir");
        write_all_valid(dir.path());
        fs::remove_file(dir.path().join("findings.md")).expect("remove");
        fs::write(dir.path().join("anomaly_report.md"), "").expect("truncate");

        let failed: Vec<_> = check_outputs(dir.path())
            .into_iter()
            .filter(|c| !c.passed())
            .map(|c| (c.name, c.problem))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("findings.md", Some("missing".to_string())),
                ("anomaly_report.md", Some("empty".to_string())),
            ]
        );
    }

    #[test]
    fn test_cluster_table_needs_column_and_rows() {
        let dir = TempDir::new().expect("tempdir");
        write_all_valid(dir.path());

        fs::write(dir.path().join(CLUSTERS_CSV), "state,district,cluster\n").expect("write");
        let check = check_one(dir.path(), CLUSTERS_CSV);
        assert_eq!(check.problem.as_deref(), Some("no district rows"));

        fs::write(dir.path().join(CLUSTERS_CSV), "state,district\nS,A\n").expect("write");
        let check = check_one(dir.path(), CLUSTERS_CSV);
        assert_eq!(check.problem.as_deref(), Some("no 'cluster' column"));
    }
}
