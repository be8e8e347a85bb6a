/// Job identifiers are UUIDv7: time-ordered, collision-free under
/// concurrent submission, and opaque to callers.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::now_v7()
}
