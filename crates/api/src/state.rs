use std::sync::Arc;

use mediseg_runner::artifacts::ArtifactStore;
use mediseg_runner::cases::CaseRegistry;

use crate::config::ServerConfig;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::store::JobStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// The single authority over job records.
    pub store: Arc<JobStore>,
    /// Admission control and background execution.
    pub dispatcher: Arc<Dispatcher>,
    /// Imaging cases available for segmentation.
    pub registry: Arc<CaseRegistry>,
    /// Per-job artifact path conventions.
    pub artifacts: ArtifactStore,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
