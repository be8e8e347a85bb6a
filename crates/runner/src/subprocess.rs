//! Subprocess-backed segmentation runner.
//!
//! Invokes the external segmentation command once per job:
//!
//! ```text
//! <program> --input <case volume> --output <job artifact dir> --mode <mode>
//! ```
//!
//! The process reports progress on stdout as `PROGRESS <pct> <message>`
//! lines and prints a single JSON object as its final line; that object is
//! the opaque result payload. Stderr is captured (bounded) for server-side
//! logs and error detail only.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use mediseg_core::job::JobInput;

use crate::cases::CaseRegistry;
use crate::error::RunnerError;
use crate::SegmentationRunner;

/// Maximum stderr bytes captured per run. Detail beyond this is dropped
/// to keep a runaway process from exhausting memory.
const MAX_STDERR_BYTES: usize = 64 * 1024;

pub struct SubprocessRunner {
    program: PathBuf,
    registry: Arc<CaseRegistry>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<PathBuf>, registry: Arc<CaseRegistry>) -> Self {
        Self {
            program: program.into(),
            registry,
        }
    }
}

impl SegmentationRunner for SubprocessRunner {
    fn run(
        &self,
        input: &JobInput,
        output_dir: &Path,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<serde_json::Value, RunnerError> {
        let case_path = self
            .registry
            .case_path(&input.case_id)
            .ok_or_else(|| RunnerError::UnknownCase(input.case_id.clone()))?;

        std::fs::create_dir_all(output_dir)?;

        let mut child = Command::new(&self.program)
            .arg("--input")
            .arg(case_path)
            .arg("--output")
            .arg(output_dir)
            .arg("--mode")
            .arg(input.mode.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain stderr on its own thread so a chatty process cannot
        // deadlock against our sequential stdout reads.
        let stderr_handle = child.stderr.take();
        let stderr_thread =
            std::thread::spawn(move || read_capped(stderr_handle, MAX_STDERR_BYTES));

        // Stdout is read line by line as the process runs, so progress
        // callbacks fire live rather than after the fact.
        let mut last_line = String::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                match parse_progress_line(&line) {
                    Some((percent, message)) => on_progress(percent, message),
                    None if !line.trim().is_empty() => last_line = line,
                    None => {}
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr_thread.join().unwrap_or_default();

        if !status.success() {
            return Err(RunnerError::Inference {
                exit_code: status.code().unwrap_or(-1),
                detail: stderr,
            });
        }

        if !stderr.is_empty() {
            tracing::debug!(
                case_id = %input.case_id,
                stderr_len = stderr.len(),
                "Segmentation process wrote to stderr on success",
            );
        }

        serde_json::from_str(last_line.trim()).map_err(|e| {
            RunnerError::MalformedOutput(format!(
                "final stdout line is not valid JSON ({e}): {last_line:.120}"
            ))
        })
    }
}

/// Parse a `PROGRESS <pct> <message>` line. Any other line returns `None`.
fn parse_progress_line(line: &str) -> Option<(u8, &str)> {
    let rest = line.strip_prefix("PROGRESS ")?;
    let (pct, message) = match rest.split_once(' ') {
        Some((pct, message)) => (pct, message.trim()),
        None => (rest, ""),
    };
    let percent: u32 = pct.trim().parse().ok()?;
    Some((percent.min(100) as u8, message))
}

/// Read at most `cap` bytes from `source` into a lossy UTF-8 string.
fn read_capped(source: Option<impl Read>, cap: usize) -> String {
    let Some(source) = source else {
        return String::new();
    };
    let mut buf = Vec::with_capacity(1024);
    // take() bounds the read; anything past the cap is discarded by
    // continuing to drain so the child never blocks on a full pipe.
    let mut limited = source.take(cap as u64);
    if limited.read_to_end(&mut buf).is_err() {
        return String::from_utf8_lossy(&buf).into_owned();
    }
    let mut rest = limited.into_inner();
    let _ = std::io::copy(&mut rest, &mut std::io::sink());
    String::from_utf8_lossy(&buf).into_owned()
}
