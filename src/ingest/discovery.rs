//! Input file discovery and category classification.
//!
//! Walks the input root for `.csv` files and sorts them into enrolment,
//! biometric and demographic sets by filename. Files that match no category
//! are ignored. Paths are returned sorted so a run sees the same file order
//! regardless of directory iteration order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::Category;

/// Input files per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFiles {
    pub enrolment: Vec<PathBuf>,
    pub biometric: Vec<PathBuf>,
    pub demographic: Vec<PathBuf>,
}

impl CategoryFiles {
    pub fn get(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::Enrolment => &self.enrolment,
            Category::Biometric => &self.biometric,
            Category::Demographic => &self.demographic,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut Vec<PathBuf> {
        match category {
            Category::Enrolment => &mut self.enrolment,
            Category::Biometric => &mut self.biometric,
            Category::Demographic => &mut self.demographic,
        }
    }

    pub fn total(&self) -> usize {
        self.enrolment.len() + self.biometric.len() + self.demographic.len()
    }
}

/// Recursively collects every `.csv` file under `root`.
///
/// An unreadable root is an error; an unreadable subdirectory is logged and
/// skipped.
pub fn find_csv_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    let mut is_root = true;

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if is_root => return Err(e),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        is_root = false;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Sorts files into categories by name. Unmatched files are dropped.
pub fn classify_files(files: Vec<PathBuf>) -> CategoryFiles {
    let mut classified = CategoryFiles::default();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match Category::classify(&name) {
            Some(category) => classified.get_mut(category).push(path),
            None => debug!(file = %path.display(), "no category in filename, ignoring"),
        }
    }
    classified
}

/// Discovery entry point: find and classify.
pub fn discover(root: &Path) -> io::Result<CategoryFiles> {
    Ok(classify_files(find_csv_files(root)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
