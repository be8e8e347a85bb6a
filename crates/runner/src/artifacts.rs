//! On-disk artifact conventions for job outputs.
//!
//! Each job owns exactly one directory, `<root>/<job_id>/`, where the
//! runner writes mask volumes and any sidecar files. The garbage collector
//! resolves a job id to that directory and deletes it wholesale; nothing
//! here participates in the engine's concurrency logic.

use std::path::{Path, PathBuf};

use mediseg_core::types::JobId;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory owned by `job_id`. Not created here; the runner
    /// creates it on first write.
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub fn exists(&self, job_id: JobId) -> bool {
        self.job_dir(job_id).is_dir()
    }

    /// Delete the job's artifact directory and everything in it.
    ///
    /// Returns `Ok(true)` if a directory was removed, `Ok(false)` if the
    /// job never wrote artifacts.
    pub fn remove_job(&self, job_id: JobId) -> std::io::Result<bool> {
        let dir = self.job_dir(job_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
