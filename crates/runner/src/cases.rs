//! Registry of imaging cases available for segmentation.
//!
//! Built once at startup from a directory scan. Submit validation consults
//! [`CaseRegistry::contains`] so an unknown case is rejected synchronously
//! instead of becoming a job that fails minutes later.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Volume file extensions recognized as cases, in match order.
const CASE_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// Immutable index of case id -> imaging volume path.
#[derive(Debug)]
pub struct CaseRegistry {
    cases: BTreeMap<String, PathBuf>,
}

impl CaseRegistry {
    /// Scan `data_dir` for imaging volumes and index them by case id
    /// (file name minus the volume extension).
    ///
    /// Non-volume files are ignored. Subdirectories are not descended
    /// into; staging a flat case directory is the loader's concern.
    pub fn scan(data_dir: &Path) -> std::io::Result<Self> {
        let mut cases = BTreeMap::new();

        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(case_id) = strip_case_extension(name) {
                cases.insert(case_id.to_string(), entry.path());
            }
        }

        tracing::info!(
            case_count = cases.len(),
            data_dir = %data_dir.display(),
            "Case registry scanned",
        );

        Ok(Self { cases })
    }

    pub fn contains(&self, case_id: &str) -> bool {
        self.cases.contains_key(case_id)
    }

    /// Path to the imaging volume for `case_id`, if known.
    pub fn case_path(&self, case_id: &str) -> Option<&Path> {
        self.cases.get(case_id).map(PathBuf::as_path)
    }

    /// All known case ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.cases.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Strip a recognized volume extension, returning the case id.
fn strip_case_extension(file_name: &str) -> Option<&str> {
    CASE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .filter(|id| !id.is_empty())
}
