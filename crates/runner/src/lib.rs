//! Segmentation inference collaborator.
//!
//! The engine treats inference as an opaque, blocking computation: hand it
//! a validated input, get back a result payload or an error, with optional
//! progress callbacks along the way. This crate owns that boundary -- the
//! [`SegmentationRunner`] trait, the subprocess-backed production
//! implementation, the case registry consulted at submit time, and the
//! on-disk artifact conventions the garbage collector cleans up.

pub mod artifacts;
pub mod cases;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod subprocess;

use std::path::Path;

use mediseg_core::job::JobInput;

pub use crate::error::RunnerError;

/// Blocking segmentation inference call.
///
/// `on_progress(percent, message)` may be invoked zero or more times with
/// monotonically increasing percent before the call returns. The call runs
/// for tens of seconds and must therefore be executed on a blocking-capable
/// thread, never on an async worker; the dispatcher owns that offloading
/// and the wall-clock timeout.
pub trait SegmentationRunner: Send + Sync {
    /// Run inference for `input`, writing any mask artifacts under
    /// `output_dir`. Returns the opaque result payload re-exposed verbatim
    /// to pollers.
    fn run(
        &self,
        input: &JobInput,
        output_dir: &Path,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<serde_json::Value, RunnerError>;
}
