//! Transport-agnostic interface to the field-execution backend.
//!
//! Every mutating route/transfer call returns the refreshed authoritative
//! object; the engine always swaps its snapshot for the server's answer
//! rather than patching locally. Mutating calls are never retried
//! automatically — a `Transport` error means the call may not have run,
//! and the caller decides whether to reissue it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fex_core::types::{
    ActivityResult, ActivityStatus, ActivityType, GeoPoint, MediaId, Route, RouteId,
    StopDescriptor, Transfer, TransferId, Visit, VisitId,
};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The call did not complete; server state is unknown but local state
    /// is unchanged. Safe to retry explicitly.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server processed and refused the request.
    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("malformed server response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Outcome of `finalize_visit`. A response carrying warnings means the
/// server processed some side effects but the visit is NOT finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FinalizeResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            warnings: Vec::new(),
        }
    }

    pub fn warnings(warnings: Vec<String>) -> Self {
        Self {
            success: false,
            warnings,
        }
    }
}

/// Payload for `mark_activity_completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityReport {
    pub activity_type: ActivityType,
    pub name: String,
    pub status: ActivityStatus,
    pub result: Option<ActivityResult>,
}

/// The logical remote operations the engine consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    // Route lifecycle
    async fn fetch_route(&self, route: &RouteId) -> BackendResult<Route>;
    async fn start_route(&self, route: &RouteId, loc: GeoPoint) -> BackendResult<Route>;
    async fn end_route(&self, route: &RouteId, loc: GeoPoint) -> BackendResult<Route>;
    async fn arrive_at_stop(
        &self,
        route: &RouteId,
        stop_seq: u32,
        loc: GeoPoint,
    ) -> BackendResult<Route>;
    async fn complete_stop(&self, route: &RouteId, stop_seq: u32) -> BackendResult<Route>;
    async fn skip_stop(&self, route: &RouteId, stop_seq: u32, reason: &str)
        -> BackendResult<Route>;
    async fn add_unplanned_stop(
        &self,
        route: &RouteId,
        descriptor: &StopDescriptor,
    ) -> BackendResult<Route>;

    // Visit execution
    async fn fetch_visit(&self, visit: &VisitId) -> BackendResult<Visit>;
    async fn get_visit_media(&self, visit: &VisitId) -> BackendResult<Vec<MediaId>>;
    async fn mark_activity_completed(
        &self,
        visit: &VisitId,
        report: &ActivityReport,
    ) -> BackendResult<()>;
    async fn finalize_visit(&self, visit: &VisitId) -> BackendResult<FinalizeResponse>;

    // Transfer lifecycle
    async fn fetch_transfer(&self, transfer: &TransferId) -> BackendResult<Transfer>;
    async fn start_loading_check(&self, transfer: &TransferId) -> BackendResult<Transfer>;
    async fn verify_all_items(&self, transfer: &TransferId) -> BackendResult<Transfer>;
    async fn complete_loading(&self, transfer: &TransferId) -> BackendResult<Transfer>;
    async fn arrive_at_destination(
        &self,
        transfer: &TransferId,
        loc: GeoPoint,
    ) -> BackendResult<Transfer>;
    async fn upload_handoff_photo(
        &self,
        transfer: &TransferId,
        photo: &MediaId,
    ) -> BackendResult<()>;
    async fn complete_handoff(
        &self,
        transfer: &TransferId,
        received_by: &str,
        photo: Option<&MediaId>,
        notes: Option<&str>,
    ) -> BackendResult<Transfer>;
    async fn return_transfer(&self, transfer: &TransferId, reason: &str)
        -> BackendResult<Transfer>;
}
