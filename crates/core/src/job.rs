//! Job model for the asynchronous segmentation engine.
//!
//! A [`Job`] is one submitted unit of trackable work. Its lifecycle is a
//! one-directional state machine (`Pending -> Running -> Completed |
//! Failed`) whose transitions are enforced by the job store; the types
//! here only describe the shape of each state.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Maximum accepted length for a `case_id`.
const MAX_CASE_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Flat job status, as exposed on the wire and used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-state payload. Carrying the result/error inside the variant makes
/// "result iff completed, error iff failed" impossible to violate.
#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Running {
        /// Completion percentage, 0-100, non-decreasing.
        progress: u8,
        /// Human-readable description of the current stage.
        message: String,
    },
    Completed {
        /// Opaque result payload produced by the inference runner.
        result: serde_json::Value,
    },
    Failed {
        /// Sanitized error string, safe to show to callers.
        error: String,
    },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Running { .. } => JobStatus::Running,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Segmentation quality mode.
///
/// `Fast` runs the low-resolution preview configuration; `Full` runs the
/// complete high-resolution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegMode {
    Fast,
    Full,
}

impl SegMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SegMode::Fast => "fast",
            SegMode::Full => "full",
        }
    }
}

/// Validated parameters of one segmentation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    pub case_id: String,
    pub mode: SegMode,
}

/// DTO for submitting a new job via `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobRequest {
    pub case_id: String,
    pub mode: SegMode,
}

impl SubmitJobRequest {
    /// Syntactic validation of the request.
    ///
    /// Checks shape only (non-empty, bounded length, safe charset);
    /// existence of the case is checked against the case registry by the
    /// dispatcher. Both failures reject the submission synchronously --
    /// an invalid request must never become a job that fails later.
    pub fn validate(&self) -> Result<JobInput, CoreError> {
        let case_id = self.case_id.trim();

        if case_id.is_empty() {
            return Err(CoreError::Validation("case_id must not be empty".into()));
        }
        if case_id.len() > MAX_CASE_ID_LEN {
            return Err(CoreError::Validation(format!(
                "case_id exceeds {MAX_CASE_ID_LEN} characters"
            )));
        }
        // Case ids name files on disk; restrict to a charset that cannot
        // escape the data directory.
        if !case_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(CoreError::Validation(format!(
                "case_id '{case_id}' contains unsupported characters"
            )));
        }
        if case_id.contains("..") {
            return Err(CoreError::Validation(
                "case_id must not contain '..'".into(),
            ));
        }

        Ok(JobInput {
            case_id: case_id.to_string(),
            mode: self.mode,
        })
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `running`, `failed`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One unit of trackable work, as held by the job store.
///
/// Handlers only ever see cloned snapshots of this record; the live copy
/// is owned and mutated exclusively by the store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: JobInput,
    pub state: JobState,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Create a fresh `Pending` record. Only the store calls this.
    pub fn new(id: JobId, input: JobInput, created_at: Timestamp) -> Self {
        Self {
            id,
            input,
            state: JobState::Pending,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Completion percentage: 0 before the run starts, the live value
    /// while running, 100 once completed. A failed job reports the last
    /// value it reached -- callers stop caring once they see `failed`.
    pub fn progress(&self) -> u8 {
        match &self.state {
            JobState::Pending => 0,
            JobState::Running { progress, .. } => *progress,
            JobState::Completed { .. } => 100,
            JobState::Failed { .. } => 0,
        }
    }

    pub fn progress_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Running { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Whole seconds elapsed since submission.
    pub fn elapsed_seconds(&self, now: Timestamp) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(case_id: &str) -> SubmitJobRequest {
        SubmitJobRequest {
            case_id: case_id.to_string(),
            mode: SegMode::Fast,
        }
    }

    #[test]
    fn status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn state_exposes_matching_status() {
        assert_eq!(JobState::Pending.status(), JobStatus::Pending);
        assert_eq!(
            JobState::Running {
                progress: 40,
                message: "resampling".into()
            }
            .status(),
            JobStatus::Running
        );
        assert_eq!(
            JobState::Completed {
                result: serde_json::json!({})
            }
            .status(),
            JobStatus::Completed
        );
        assert_eq!(
            JobState::Failed {
                error: "inference failed".into()
            }
            .status(),
            JobStatus::Failed
        );
    }

    #[test]
    fn validate_accepts_plain_case_id() {
        let input = request("liver_003").validate().unwrap();
        assert_eq!(input.case_id, "liver_003");
        assert_eq!(input.mode, SegMode::Fast);
    }

    #[test]
    fn validate_trims_whitespace() {
        let input = request("  spleen_12  ").validate().unwrap();
        assert_eq!(input.case_id, "spleen_12");
    }

    #[test]
    fn validate_rejects_empty_case_id() {
        assert!(request("").validate().is_err());
        assert!(request("   ").validate().is_err());
    }

    #[test]
    fn validate_rejects_path_traversal() {
        assert!(request("../etc/passwd").validate().is_err());
        assert!(request("a/b").validate().is_err());
        assert!(request("case..01").validate().is_err());
    }

    #[test]
    fn validate_rejects_overlong_case_id() {
        let long = "x".repeat(200);
        assert!(request(&long).validate().is_err());
    }

    #[test]
    fn result_and_error_are_state_exclusive() {
        let id = crate::types::new_job_id();
        let input = request("liver_003").validate().unwrap();
        let mut job = Job::new(id, input, chrono::Utc::now());

        assert!(job.result().is_none());
        assert!(job.error().is_none());

        job.state = JobState::Completed {
            result: serde_json::json!({"dice": 0.8}),
        };
        assert!(job.result().is_some());
        assert!(job.error().is_none());

        job.state = JobState::Failed {
            error: "inference failed".into(),
        };
        assert!(job.result().is_none());
        assert_eq!(job.error(), Some("inference failed"));
    }

    #[test]
    fn status_strings_match_wire_format() {
        assert_eq!(JobStatus::Pending.as_str(), "pending");
        assert_eq!(JobStatus::Running.as_str(), "running");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
    }
}
