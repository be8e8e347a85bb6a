use std::path::PathBuf;

/// Errors from the inference runner.
///
/// These carry full internal detail (paths, exit codes, stderr excerpts)
/// for server-side logs. Callers of the job API never see them directly;
/// the dispatcher converts them into fixed, sanitized failure strings.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("unknown case '{0}'")]
    UnknownCase(String),

    #[error("failed to spawn segmentation process '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during inference: {0}")]
    Io(#[from] std::io::Error),

    #[error("segmentation process exited with code {exit_code}: {detail}")]
    Inference { exit_code: i32, detail: String },

    #[error("segmentation process produced no parseable result: {0}")]
    MalformedOutput(String),
}
