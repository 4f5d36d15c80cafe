//! Session context: the single object a field-agent session drives the
//! engine through. No ambient state — every operation is a method here or
//! on the visit/transfer sessions it hands out.

use std::sync::Arc;
use std::time::Duration;

use fex_core::progress::{ProgressRecord, ProgressStore};
use fex_core::types::{GeoPoint, Route, RouteId, RouteStatus, StopDescriptor, StopKind};
use fex_core::FexError;

use crate::backend::Backend;
use crate::location::{capture_best_effort, LocationProvider};
use crate::sequencer;

pub struct Session {
    backend: Arc<dyn Backend>,
    store: ProgressStore,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
    route: Option<Route>,
}

impl Session {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: ProgressStore,
        location: Arc<dyn LocationProvider>,
        location_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            location,
            location_timeout,
            route: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn location(&self) -> &Arc<dyn LocationProvider> {
        &self.location
    }

    pub fn location_timeout(&self) -> Duration {
        self.location_timeout
    }

    /// The cached authoritative route snapshot.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Swap in a fresh server-returned route. Every mutating route call
    /// goes through here so the snapshot is never patched locally.
    pub(crate) fn apply_route(&mut self, route: Route) -> &Route {
        self.route.insert(route)
    }

    pub(crate) fn current_route(&self) -> Result<&Route, FexError> {
        self.route
            .as_ref()
            .ok_or_else(|| FexError::InvalidTransition("no route loaded".to_string()))
    }

    /// Persist a progress record, degrading to server-only operation when
    /// local storage is unavailable.
    pub(crate) fn save_record_best_effort(&self, record: &ProgressRecord) {
        if let Err(e) = self.store.save(record) {
            tracing::warn!("progress store unavailable, continuing without cache: {e}");
        }
    }

    pub(crate) fn clear_record_best_effort(&self, key: &str) {
        if let Err(e) = self.store.clear(key) {
            tracing::warn!("could not clear progress record {key}: {e}");
        }
    }

    pub(crate) async fn capture_location(&self) -> GeoPoint {
        capture_best_effort(self.location.as_ref(), self.location_timeout).await
    }

    pub async fn load_route(&mut self, id: &RouteId) -> anyhow::Result<&Route> {
        let route = self.backend.fetch_route(id).await?;
        Ok(self.apply_route(route))
    }

    /// Start (or resume from paused) the day's route.
    pub async fn start_route(&mut self, id: &RouteId) -> anyhow::Result<&Route> {
        if let Some(route) = &self.route {
            if matches!(
                route.status,
                RouteStatus::Completed | RouteStatus::Cancelled
            ) {
                return Err(FexError::InvalidTransition(
                    "route already finished".to_string(),
                )
                .into());
            }
        }
        let loc = self.capture_location().await;
        let route = self.backend.start_route(id, loc).await?;
        tracing::info!("route {id} started");
        Ok(self.apply_route(route))
    }

    pub async fn end_route(&mut self, id: &RouteId) -> anyhow::Result<&Route> {
        let current = self.current_route()?;
        if !matches!(
            current.status,
            RouteStatus::InProgress | RouteStatus::Paused
        ) {
            return Err(
                FexError::InvalidTransition("route is not in progress".to_string()).into(),
            );
        }
        let loc = self.capture_location().await;
        let route = self.backend.end_route(id, loc).await?;
        tracing::info!("route {id} ended");
        Ok(self.apply_route(route))
    }

    /// Check into an eligible stop. Captures a best-effort location and
    /// clears any stale local progress for the stop's unit of work before
    /// activating it.
    pub async fn check_in(&mut self, seq: u32) -> anyhow::Result<&Route> {
        let route = self.current_route()?;
        sequencer::check_in_allowed(route, seq)?;

        let route_id = route.id.clone();
        let stale_key = route.stop(seq).and_then(|stop| {
            stop.visit_id
                .as_ref()
                .map(|v| v.0.clone())
                .or_else(|| stop.transfer_id.as_ref().map(|t| t.0.clone()))
        });

        let loc = self.capture_location().await;

        // Defensive reset: a leftover record from an earlier aborted
        // attempt must not leak into the fresh unit of work.
        if let Some(key) = stale_key {
            self.clear_record_best_effort(&key);
        }

        let route = self.backend.arrive_at_stop(&route_id, seq, loc).await?;
        tracing::info!("checked into stop {seq}");
        Ok(self.apply_route(route))
    }

    /// Break stops carry no visit; they complete directly.
    pub async fn complete_break(&mut self, seq: u32) -> anyhow::Result<&Route> {
        let route = self.current_route()?;
        let stop = route.stop(seq).ok_or(FexError::StopNotFound(seq))?;
        if stop.kind != StopKind::Break {
            return Err(FexError::InvalidTransition(format!(
                "stop {seq} is not a break stop"
            ))
            .into());
        }
        if !stop.status.is_active() {
            return Err(
                FexError::InvalidTransition(format!("stop {seq} is not active")).into(),
            );
        }
        let route_id = route.id.clone();
        let route = self.backend.complete_stop(&route_id, seq).await?;
        Ok(self.apply_route(route))
    }

    /// Skip a stop without visiting it. Distinct from abandoning an
    /// in-progress visit, which goes through the completion coordinator.
    pub async fn skip_stop(&mut self, seq: u32, reason: &str) -> anyhow::Result<&Route> {
        if reason.trim().is_empty() {
            return Err(
                FexError::ValidationFailed(vec!["skip reason must not be empty".into()]).into(),
            );
        }
        let route = self.current_route()?;
        let stop = route.stop(seq).ok_or(FexError::StopNotFound(seq))?;
        if stop.status.is_closed() {
            return Err(
                FexError::InvalidTransition(format!("stop {seq} is already closed")).into(),
            );
        }
        let route_id = route.id.clone();
        let route = self.backend.skip_stop(&route_id, seq, reason).await?;
        tracing::info!("stop {seq} skipped: {reason}");
        Ok(self.apply_route(route))
    }

    /// Append an unplanned stop at the end of the sequence.
    pub async fn add_unplanned_stop(
        &mut self,
        descriptor: &StopDescriptor,
    ) -> anyhow::Result<&Route> {
        let route = self.current_route()?;
        let route_id = route.id.clone();
        let route = self.backend.add_unplanned_stop(&route_id, descriptor).await?;
        tracing::info!("unplanned stop added for {}", descriptor.customer);
        Ok(self.apply_route(route))
    }
}
