//! Completion coordinator: the only path to a visit's terminal status.
//!
//! Every finalize attempt resolves to exactly one of committed,
//! blocked-with-reasons, or retry-needed — nothing is swallowed here.

use fex_core::types::{Route, VisitStatus};
use fex_core::FexError;

use crate::backend::BackendError;
use crate::reconcile::VisitSession;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeResult {
    /// Visit finalized, progress record purged, parent stop completed.
    Committed,
    /// The server flagged blocking conditions; the visit remains in
    /// progress and the warnings are surfaced verbatim. Retry after
    /// remediation.
    Blocked(Vec<String>),
    /// The call did not complete; local state is untouched. Retrying is
    /// safe: a repeated finalize of an already-committed visit is a no-op
    /// success on the server.
    RetryNeeded(String),
}

impl Session {
    /// Drive the visit to its terminal state.
    pub async fn finalize_visit(
        &mut self,
        vs: &mut VisitSession,
    ) -> anyhow::Result<FinalizeResult> {
        if vs.visit().status == VisitStatus::Cancelled {
            return Err(
                FexError::InvalidTransition("visit is cancelled".to_string()).into(),
            );
        }

        // Client-side guard; the authoritative rejection is always the
        // server's.
        let pending = vs.gate().mandatory_pending();
        if !pending.is_empty() {
            return Err(FexError::ValidationFailed(
                pending
                    .into_iter()
                    .map(|name| format!("mandatory activity pending: {name}"))
                    .collect(),
            )
            .into());
        }

        let visit_id = vs.visit_id().clone();
        let response = match self.backend().finalize_visit(&visit_id).await {
            Ok(response) => response,
            Err(BackendError::Transport(msg)) => {
                tracing::warn!("finalize did not complete, retry needed: {msg}");
                return Ok(FinalizeResult::RetryNeeded(msg));
            }
            Err(e) => return Err(e.into()),
        };

        if !response.success || !response.warnings.is_empty() {
            // Not finalized: record retained, stop untouched.
            let warnings = if response.warnings.is_empty() {
                vec!["finalize not committed".to_string()]
            } else {
                response.warnings
            };
            tracing::warn!("finalize blocked: {}", warnings.join("; "));
            return Ok(FinalizeResult::Blocked(warnings));
        }

        self.clear_record_best_effort(&visit_id.0);
        vs.mark_committed();

        // The visit is committed from here on. If completing the stop
        // fails in transit, a retried finalize no-ops on the server and
        // reaches this call again.
        let route_id = self.current_route()?.id.clone();
        let route = self
            .backend()
            .complete_stop(&route_id, vs.stop_seq())
            .await?;
        self.apply_route(route);
        tracing::info!("visit {visit_id} finalized, stop {} completed", vs.stop_seq());
        Ok(FinalizeResult::Committed)
    }

    /// Abandon a visit without completing it. Only legal while no progress
    /// has been recorded — completed or skipped activities and captured
    /// media all disable it, so partial field work is never silently
    /// discarded.
    pub async fn skip_visit(
        &mut self,
        vs: &VisitSession,
        reason: &str,
    ) -> anyhow::Result<&Route> {
        if reason.trim().is_empty() {
            return Err(
                FexError::ValidationFailed(vec!["skip reason must not be empty".into()]).into(),
            );
        }
        if !vs.record().is_empty() {
            return Err(FexError::ProgressExists.into());
        }

        let visit_id = vs.visit_id().clone();
        let route_id = self.current_route()?.id.clone();
        let route = self
            .backend()
            .skip_stop(&route_id, vs.stop_seq(), reason)
            .await?;
        self.clear_record_best_effort(&visit_id.0);
        tracing::info!("visit {visit_id} abandoned: {reason}");
        Ok(self.apply_route(route))
    }
}
