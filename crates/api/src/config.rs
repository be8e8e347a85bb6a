use std::path::PathBuf;
use std::time::Duration;

use crate::background::job_gc::GcConfig;
use crate::engine::dispatcher::DispatcherConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory holding the imaging cases the registry indexes.
    pub data_dir: PathBuf,
    /// Root directory for per-job output artifacts.
    pub artifact_dir: PathBuf,
    /// The external segmentation command invoked per job.
    pub segment_command: PathBuf,
    /// Simultaneous inference executions (bounded by accelerator memory).
    pub max_concurrent_jobs: usize,
    /// Jobs allowed to wait for a free slot before submissions are rejected.
    pub job_queue_capacity: usize,
    /// Wall-clock budget per inference run, in seconds.
    pub job_timeout_secs: u64,
    /// How often the reclamation sweep runs, in seconds.
    pub gc_interval_secs: u64,
    /// Retention window for terminal jobs, in seconds.
    pub job_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATA_DIR`             | `./data/cases`             |
    /// | `ARTIFACT_DIR`         | `./data/artifacts`         |
    /// | `SEGMENT_COMMAND`      | `segment-infer`            |
    /// | `MAX_CONCURRENT_JOBS`  | `1`                        |
    /// | `JOB_QUEUE_CAPACITY`   | `8`                        |
    /// | `JOB_TIMEOUT_SECS`     | `300`                      |
    /// | `GC_INTERVAL_SECS`     | `600`                      |
    /// | `JOB_TTL_SECS`         | `3600`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let data_dir = PathBuf::from(
            std::env::var("DATA_DIR").unwrap_or_else(|_| "./data/cases".into()),
        );
        let artifact_dir = PathBuf::from(
            std::env::var("ARTIFACT_DIR").unwrap_or_else(|_| "./data/artifacts".into()),
        );
        let segment_command = PathBuf::from(
            std::env::var("SEGMENT_COMMAND").unwrap_or_else(|_| "segment-infer".into()),
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 30),
            data_dir,
            artifact_dir,
            segment_command,
            max_concurrent_jobs: env_u64("MAX_CONCURRENT_JOBS", 1) as usize,
            job_queue_capacity: env_u64("JOB_QUEUE_CAPACITY", 8) as usize,
            job_timeout_secs: env_u64("JOB_TIMEOUT_SECS", 300),
            gc_interval_secs: env_u64("GC_INTERVAL_SECS", 600),
            job_ttl_secs: env_u64("JOB_TTL_SECS", 3600),
        }
    }

    /// Dispatcher knobs derived from this configuration.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent: self.max_concurrent_jobs,
            queue_capacity: self.job_queue_capacity,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }

    /// Reclamation knobs derived from this configuration.
    pub fn gc_config(&self) -> GcConfig {
        GcConfig {
            interval: Duration::from_secs(self.gc_interval_secs),
            ttl: Duration::from_secs(self.job_ttl_secs),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid u64"))
}
