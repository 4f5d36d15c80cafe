//! In-memory backend with scriptable failure modes, for engine tests.
//!
//! Models just enough server behavior for the coordinators to be driven
//! end to end: single-active-stop enforcement, loading-check gating, and
//! idempotent finalize.

use std::collections::{HashMap, VecDeque};
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use fex_core::types::{
    CheckStatus, GeoPoint, MediaId, Route, RouteId, RouteStatus, Stop, StopDescriptor,
    StopStatus, Transfer, TransferId, TransferStatus, Visit, VisitId, VisitStatus,
};

use crate::backend::{
    ActivityReport, Backend, BackendError, BackendResult, FinalizeResponse,
};

#[derive(Default)]
struct MemoryState {
    route: Option<Route>,
    visits: HashMap<String, Visit>,
    media: HashMap<String, Vec<MediaId>>,
    transfers: HashMap<String, Transfer>,
    finalize_script: HashMap<String, VecDeque<FinalizeResponse>>,
    finalized: HashSet<String>,
    finalize_calls: usize,
    finalize_effects: usize,
    activity_reports: usize,
    fail_activity_sync: bool,
    transport_down: bool,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_route(&self, route: Route) {
        self.state.lock().unwrap().route = Some(route);
    }

    pub fn put_visit(&self, visit: Visit) {
        let mut state = self.state.lock().unwrap();
        state.visits.insert(visit.id.0.clone(), visit);
    }

    pub fn put_media(&self, visit: &VisitId, media: Vec<MediaId>) {
        self.state.lock().unwrap().media.insert(visit.0.clone(), media);
    }

    pub fn put_transfer(&self, transfer: Transfer) {
        let mut state = self.state.lock().unwrap();
        state.transfers.insert(transfer.id.0.clone(), transfer);
    }

    /// Queue a response for the next finalize call on this visit.
    pub fn script_finalize(&self, visit: &VisitId, response: FinalizeResponse) {
        self.state
            .lock()
            .unwrap()
            .finalize_script
            .entry(visit.0.clone())
            .or_default()
            .push_back(response);
    }

    /// Make every call fail with a transport error.
    pub fn set_transport_down(&self, down: bool) {
        self.state.lock().unwrap().transport_down = down;
    }

    /// Make `mark_activity_completed` fail with a transport error.
    pub fn set_fail_activity_sync(&self, fail: bool) {
        self.state.lock().unwrap().fail_activity_sync = fail;
    }

    pub fn finalize_calls(&self) -> usize {
        self.state.lock().unwrap().finalize_calls
    }

    /// Times a finalize actually transitioned a visit to completed.
    pub fn finalize_effects(&self) -> usize {
        self.state.lock().unwrap().finalize_effects
    }

    pub fn activity_reports(&self) -> usize {
        self.state.lock().unwrap().activity_reports
    }

    pub fn visit(&self, id: &VisitId) -> Option<Visit> {
        self.state.lock().unwrap().visits.get(&id.0).cloned()
    }
}

fn check_up(state: &MemoryState) -> BackendResult<()> {
    if state.transport_down {
        return Err(BackendError::Transport("connection refused".into()));
    }
    Ok(())
}

fn route_mut<'a>(state: &'a mut MemoryState) -> BackendResult<&'a mut Route> {
    state
        .route
        .as_mut()
        .ok_or_else(|| BackendError::Rejected("no such route".into()))
}

fn stop_mut<'a>(route: &'a mut Route, seq: u32) -> BackendResult<&'a mut Stop> {
    route
        .stops
        .iter_mut()
        .find(|s| s.seq == seq)
        .ok_or_else(|| BackendError::Rejected(format!("no such stop: {seq}")))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_route(&self, _route: &RouteId) -> BackendResult<Route> {
        let state = self.state.lock().unwrap();
        check_up(&state)?;
        state
            .route
            .clone()
            .ok_or_else(|| BackendError::Rejected("no such route".into()))
    }

    async fn start_route(&self, _route: &RouteId, _loc: GeoPoint) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        route.status = RouteStatus::InProgress;
        Ok(route.clone())
    }

    async fn end_route(&self, _route: &RouteId, _loc: GeoPoint) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        route.status = RouteStatus::Completed;
        Ok(route.clone())
    }

    async fn arrive_at_stop(
        &self,
        _route: &RouteId,
        stop_seq: u32,
        loc: GeoPoint,
    ) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        if route.status != RouteStatus::InProgress {
            return Err(BackendError::Rejected("route not in progress".into()));
        }
        if let Some(active) = route.active_stop() {
            return Err(BackendError::Rejected(format!(
                "stop {} is already active",
                active.seq
            )));
        }
        let stop = stop_mut(route, stop_seq)?;
        if stop.status.is_closed() {
            return Err(BackendError::Rejected(format!("stop {stop_seq} is closed")));
        }
        stop.status = StopStatus::Arrived;
        stop.arrived_at = Some(Utc::now());
        stop.arrival_location = Some(loc);
        let visit_id = stop.visit_id.clone();
        let route = route.clone();
        if let Some(visit_id) = visit_id {
            if let Some(visit) = state.visits.get_mut(&visit_id.0) {
                if visit.status == VisitStatus::Planned {
                    visit.status = VisitStatus::InProgress;
                    visit.check_in_at = Some(Utc::now());
                    visit.check_in_location = Some(loc);
                }
            }
        }
        Ok(route)
    }

    async fn complete_stop(&self, _route: &RouteId, stop_seq: u32) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        let stop = stop_mut(route, stop_seq)?;
        stop.status = StopStatus::Completed;
        stop.departed_at = Some(Utc::now());
        Ok(route.clone())
    }

    async fn skip_stop(
        &self,
        _route: &RouteId,
        stop_seq: u32,
        _reason: &str,
    ) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        let stop = stop_mut(route, stop_seq)?;
        if stop.status.is_closed() {
            return Err(BackendError::Rejected(format!("stop {stop_seq} is closed")));
        }
        stop.status = StopStatus::Skipped;
        let visit_id = stop.visit_id.clone();
        let route = route.clone();
        if let Some(visit_id) = visit_id {
            if let Some(visit) = state.visits.get_mut(&visit_id.0) {
                visit.status = VisitStatus::Cancelled;
            }
        }
        Ok(route)
    }

    async fn add_unplanned_stop(
        &self,
        _route: &RouteId,
        descriptor: &StopDescriptor,
    ) -> BackendResult<Route> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let route = route_mut(&mut state)?;
        let seq = route.stops.iter().map(|s| s.seq).max().unwrap_or(0) + 1;
        route.stops.push(Stop {
            seq,
            kind: descriptor.kind,
            status: StopStatus::Pending,
            customer: descriptor.customer.clone(),
            visit_id: None,
            transfer_id: None,
            arrived_at: None,
            departed_at: None,
            arrival_location: None,
            unplanned: true,
        });
        Ok(route.clone())
    }

    async fn fetch_visit(&self, visit: &VisitId) -> BackendResult<Visit> {
        let state = self.state.lock().unwrap();
        check_up(&state)?;
        state
            .visits
            .get(&visit.0)
            .cloned()
            .ok_or_else(|| BackendError::Rejected(format!("no such visit: {visit}")))
    }

    async fn get_visit_media(&self, visit: &VisitId) -> BackendResult<Vec<MediaId>> {
        let state = self.state.lock().unwrap();
        check_up(&state)?;
        Ok(state.media.get(&visit.0).cloned().unwrap_or_default())
    }

    async fn mark_activity_completed(
        &self,
        visit: &VisitId,
        report: &ActivityReport,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        if state.fail_activity_sync {
            return Err(BackendError::Transport("sync endpoint unreachable".into()));
        }
        let visit = state
            .visits
            .get_mut(&visit.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such visit: {visit}")))?;
        if let Some(activity) = visit.activities.iter_mut().find(|a| a.name == report.name) {
            activity.status = report.status;
            activity.result = report.result.clone();
        }
        state.activity_reports += 1;
        Ok(())
    }

    async fn finalize_visit(&self, visit: &VisitId) -> BackendResult<FinalizeResponse> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        state.finalize_calls += 1;
        // Repeated finalize of an already-committed visit is a no-op
        // success.
        if state.finalized.contains(&visit.0) {
            return Ok(FinalizeResponse::success());
        }
        let scripted = state
            .finalize_script
            .get_mut(&visit.0)
            .and_then(|q| q.pop_front());
        let response = scripted.unwrap_or_else(FinalizeResponse::success);
        if response.success && response.warnings.is_empty() {
            state.finalized.insert(visit.0.clone());
            state.finalize_effects += 1;
            if let Some(v) = state.visits.get_mut(&visit.0) {
                v.status = VisitStatus::Completed;
                v.check_out_at = Some(Utc::now());
            }
        }
        Ok(response)
    }

    async fn fetch_transfer(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        let state = self.state.lock().unwrap();
        check_up(&state)?;
        state
            .transfers
            .get(&transfer.0)
            .cloned()
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))
    }

    async fn start_loading_check(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        self.transfer_transition(transfer, TransferStatus::Pending, TransferStatus::Loading)
    }

    async fn verify_all_items(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        for item in t.items.iter_mut() {
            if item.status == CheckStatus::Pending {
                item.verified = item.expected;
                item.status = CheckStatus::Verified;
            }
        }
        Ok(t.clone())
    }

    async fn complete_loading(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        if t.status != TransferStatus::Loading {
            return Err(BackendError::Rejected("transfer is not loading".into()));
        }
        if !t.checks_complete() {
            return Err(BackendError::Rejected("item checks pending".into()));
        }
        t.status = TransferStatus::InTransit;
        Ok(t.clone())
    }

    async fn arrive_at_destination(
        &self,
        transfer: &TransferId,
        loc: GeoPoint,
    ) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        if t.status != TransferStatus::InTransit {
            return Err(BackendError::Rejected("transfer is not in transit".into()));
        }
        t.status = TransferStatus::Arrived;
        t.arrived_at = Some(Utc::now());
        t.arrival_location = Some(loc);
        Ok(t.clone())
    }

    async fn upload_handoff_photo(
        &self,
        _transfer: &TransferId,
        _photo: &MediaId,
    ) -> BackendResult<()> {
        let state = self.state.lock().unwrap();
        check_up(&state)?;
        Ok(())
    }

    async fn complete_handoff(
        &self,
        transfer: &TransferId,
        received_by: &str,
        photo: Option<&MediaId>,
        _notes: Option<&str>,
    ) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        if t.status != TransferStatus::Arrived {
            return Err(BackendError::Rejected("transfer has not arrived".into()));
        }
        t.status = TransferStatus::Completed;
        t.received_by = Some(received_by.to_string());
        t.handoff_photo = photo.cloned();
        Ok(t.clone())
    }

    async fn return_transfer(
        &self,
        transfer: &TransferId,
        reason: &str,
    ) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        if !t.status.can_return() {
            return Err(BackendError::Rejected("transfer cannot be returned".into()));
        }
        t.status = TransferStatus::Returned;
        t.return_reason = Some(reason.to_string());
        Ok(t.clone())
    }
}

impl MemoryBackend {
    fn transfer_transition(
        &self,
        transfer: &TransferId,
        from: TransferStatus,
        to: TransferStatus,
    ) -> BackendResult<Transfer> {
        let mut state = self.state.lock().unwrap();
        check_up(&state)?;
        let t = state
            .transfers
            .get_mut(&transfer.0)
            .ok_or_else(|| BackendError::Rejected(format!("no such transfer: {transfer}")))?;
        if t.status != from {
            return Err(BackendError::Rejected(format!(
                "transfer is {:?}, expected {from:?}",
                t.status
            )));
        }
        t.status = to;
        Ok(t.clone())
    }
}
