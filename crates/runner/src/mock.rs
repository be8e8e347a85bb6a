//! Scripted runner for tests.
//!
//! Stands in for the real segmentation process so engine and API tests can
//! exercise progress reporting, failures, panics, and slow runs without a
//! model or GPU. Behavior is fixed at construction; each `run` replays it.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mediseg_core::job::JobInput;

use crate::error::RunnerError;
use crate::SegmentationRunner;

enum Outcome {
    Complete(serde_json::Value),
    Fail(String),
    Panic,
}

pub struct MockRunner {
    progress_steps: Vec<(u8, String)>,
    step_delay: Duration,
    outcome: Outcome,
    calls: AtomicUsize,
}

impl MockRunner {
    /// A runner that succeeds with `result`, writing one marker artifact
    /// into the job's output directory.
    pub fn completing(result: serde_json::Value) -> Self {
        Self::new(Outcome::Complete(result))
    }

    /// A runner that fails with an internal error carrying `detail`.
    /// The detail must never surface to API callers.
    pub fn failing(detail: impl Into<String>) -> Self {
        Self::new(Outcome::Fail(detail.into()))
    }

    /// A runner that panics mid-run.
    pub fn panicking() -> Self {
        Self::new(Outcome::Panic)
    }

    fn new(outcome: Outcome) -> Self {
        Self {
            progress_steps: Vec::new(),
            step_delay: Duration::ZERO,
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report these `(percent, message)` steps, in order, before finishing.
    pub fn with_progress<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = (u8, S)>,
        S: Into<String>,
    {
        self.progress_steps = steps.into_iter().map(|(p, m)| (p, m.into())).collect();
        self
    }

    /// Sleep this long before each progress step and before finishing.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// How many times `run` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SegmentationRunner for MockRunner {
    fn run(
        &self,
        _input: &JobInput,
        output_dir: &Path,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<serde_json::Value, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        for (percent, message) in &self.progress_steps {
            if !self.step_delay.is_zero() {
                std::thread::sleep(self.step_delay);
            }
            on_progress(*percent, message);
        }
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }

        match &self.outcome {
            Outcome::Complete(result) => {
                std::fs::create_dir_all(output_dir)?;
                std::fs::write(output_dir.join("mask.nii.gz"), b"mock mask")?;
                Ok(result.clone())
            }
            Outcome::Fail(detail) => Err(RunnerError::Inference {
                exit_code: 1,
                detail: detail.clone(),
            }),
            Outcome::Panic => panic!("mock runner panic"),
        }
    }
}
