//! Reconciliation: two-tier progress state for a visit.
//!
//! The server snapshot is authoritative for everything it already knows;
//! the local progress record is a provisional overlay that survives
//! restarts and connectivity loss. Merging applies the overlay only where
//! the server still says pending — server wins on conflict.

use std::sync::Arc;

use fex_core::progress::{ProgressRecord, ProgressStore};
use fex_core::types::{
    Activity, ActivityResult, ActivityStatus, MediaId, Visit, VisitId,
};
use fex_core::FexError;

use crate::backend::{ActivityReport, Backend};
use crate::gate::ActivityGate;
use crate::session::Session;

/// Outcome of a local mutation's remote write-through. `LocalOnly` is the
/// non-blocking warning: the activity stays resolved locally and the agent
/// proceeds; the fact syncs at finalize time at the latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    LocalOnly(String),
}

/// Merge server truth with the local overlay into the working visit,
/// returning the merged progress record. Server-resolved activities keep
/// their server status; local-only facts are applied where the server
/// still reports pending. Local skips of mandatory activities are
/// discarded as inconsistent.
pub fn merge_progress(
    visit: &mut Visit,
    server_media: Vec<MediaId>,
    local: Option<ProgressRecord>,
) -> ProgressRecord {
    let mut merged = ProgressRecord::new(visit.id.0.clone());

    for activity in &visit.activities {
        match activity.status {
            ActivityStatus::Completed => {
                merged.completed.insert(activity.name.clone());
            }
            ActivityStatus::Skipped => {
                merged.skipped.insert(activity.name.clone());
            }
            ActivityStatus::Pending => {}
        }
    }
    for media in server_media {
        merged.add_media(media);
    }

    let Some(local) = local else {
        return merged;
    };

    for activity in visit.activities.iter_mut() {
        if activity.status != ActivityStatus::Pending {
            continue;
        }
        if local.completed.contains(&activity.name) {
            activity.status = ActivityStatus::Completed;
            merged.completed.insert(activity.name.clone());
        } else if local.skipped.contains(&activity.name) {
            if activity.mandatory {
                tracing::warn!(
                    "discarding local skip of mandatory activity {}",
                    activity.name
                );
                continue;
            }
            activity.status = ActivityStatus::Skipped;
            merged.skipped.insert(activity.name.clone());
        }
    }
    for media in local.media {
        merged.add_media(media);
    }

    merged
}

/// An activated visit: working copy of the server visit with the local
/// overlay applied, plus the gate computed over the merged view.
pub struct VisitSession {
    backend: Arc<dyn Backend>,
    store: ProgressStore,
    stop_seq: u32,
    visit: Visit,
    gate: ActivityGate,
    record: ProgressRecord,
}

impl Session {
    /// Activate the visit behind a stop: load local progress, fetch server
    /// truth, merge, and build the gate over the merged view. Stops whose
    /// visit is already terminal come back as read-only views.
    pub async fn activate_visit(&mut self, seq: u32) -> anyhow::Result<VisitSession> {
        let route = self.current_route()?;
        let stop = route.stop(seq).ok_or(FexError::StopNotFound(seq))?;
        let visit_id = stop
            .visit_id
            .clone()
            .ok_or_else(|| FexError::InvalidTransition(format!("stop {seq} has no visit")))?;
        let read_only = stop.status.is_closed();
        if !read_only && !stop.status.is_active() {
            return Err(FexError::InvalidTransition(format!(
                "stop {seq} is not checked in"
            ))
            .into());
        }

        let mut visit = self.backend().fetch_visit(&visit_id).await?;
        let server_media = self.backend().get_visit_media(&visit_id).await?;
        let local = match self.store().load(&visit_id.0) {
            Ok(record) => record,
            Err(e) => {
                // Cache failure degrades to server-only operation.
                tracing::warn!("progress store read failed, using server state only: {e}");
                None
            }
        };

        let record = merge_progress(&mut visit, server_media, local);

        let read_only = read_only || visit.status.is_terminal();
        let gate = if read_only {
            ActivityGate::read_only_view(&visit.activities)
        } else {
            self.save_record_best_effort(&record);
            ActivityGate::new(&visit.activities)
        };

        Ok(VisitSession {
            backend: Arc::clone(self.backend()),
            store: self.store().clone(),
            stop_seq: seq,
            visit,
            gate,
            record,
        })
    }
}

impl VisitSession {
    pub fn visit(&self) -> &Visit {
        &self.visit
    }

    pub fn visit_id(&self) -> &VisitId {
        &self.visit.id
    }

    pub fn stop_seq(&self) -> u32 {
        self.stop_seq
    }

    pub fn gate(&self) -> &ActivityGate {
        &self.gate
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn is_read_only(&self) -> bool {
        self.gate.is_read_only()
    }

    /// The sole currently-unlockable activity.
    pub fn current_activity(&self) -> Option<&Activity> {
        let name = self.gate.current()?;
        self.activity(name)
    }

    pub fn activity(&self, name: &str) -> Option<&Activity> {
        self.visit.activities.iter().find(|a| a.name == name)
    }

    fn activity_mut(&mut self, name: &str) -> Result<&mut Activity, FexError> {
        self.visit
            .activities
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| FexError::ActivityNotFound(name.to_string()))
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.record) {
            tracing::warn!("progress store unavailable, continuing without cache: {e}");
        }
    }

    /// Report a resolved activity to the server. A failure here never
    /// rolls back local state — eventual consistency is acceptable before
    /// finalize.
    async fn report(&self, name: &str, status: ActivityStatus) -> SyncStatus {
        let Some(activity) = self.activity(name) else {
            return SyncStatus::LocalOnly("activity missing from working copy".into());
        };
        let report = ActivityReport {
            activity_type: activity.activity_type.clone(),
            name: activity.name.clone(),
            status,
            result: activity.result.clone(),
        };
        match self
            .backend
            .mark_activity_completed(&self.visit.id, &report)
            .await
        {
            Ok(()) => SyncStatus::Synced,
            Err(e) => {
                tracing::warn!("activity sync failed, kept locally: {e}");
                SyncStatus::LocalOnly(e.to_string())
            }
        }
    }

    /// Complete the current activity: gate transition, synchronous local
    /// write-through, then remote report.
    pub async fn complete_activity(
        &mut self,
        name: &str,
        result: Option<ActivityResult>,
    ) -> anyhow::Result<SyncStatus> {
        self.gate.complete(name)?;
        {
            let activity = self.activity_mut(name)?;
            activity.status = ActivityStatus::Completed;
            activity.result = result;
        }
        self.record.mark_completed(name);
        self.persist();
        Ok(self.report(name, ActivityStatus::Completed).await)
    }

    /// Skip the current, non-mandatory activity.
    pub async fn skip_activity(&mut self, name: &str) -> anyhow::Result<SyncStatus> {
        self.gate.skip(name)?;
        self.activity_mut(name)?.status = ActivityStatus::Skipped;
        self.record.mark_skipped(name);
        self.persist();
        Ok(self.report(name, ActivityStatus::Skipped).await)
    }

    /// Overwrite a completed activity's captured data while the visit is
    /// still non-terminal. The activity stays completed and the cursor is
    /// untouched; downstream unlock state is not re-validated.
    pub async fn amend_activity(
        &mut self,
        name: &str,
        result: Option<ActivityResult>,
    ) -> anyhow::Result<SyncStatus> {
        if !self.gate.can_amend(name) {
            return Err(FexError::ActivityLocked(name.to_string()).into());
        }
        self.activity_mut(name)?.result = result;
        self.persist();
        Ok(self.report(name, ActivityStatus::Completed).await)
    }

    /// Record a captured media reference. Local-only: upload is outside
    /// the engine; the reference rides along until finalize.
    pub fn capture_media(&mut self, media: MediaId) -> anyhow::Result<()> {
        if self.is_read_only() {
            return Err(FexError::InvalidTransition("visit is read-only".to_string()).into());
        }
        self.record.add_media(media);
        self.persist();
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.visit.status = fex_core::types::VisitStatus::Completed;
        self.gate = ActivityGate::read_only_view(&self.visit.activities);
    }
}
