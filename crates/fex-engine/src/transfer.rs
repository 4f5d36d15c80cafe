//! Transfer sequencer: the goods-movement sibling of the visit engine.
//!
//! Linear machine pending → loading → in_transit → arrived → completed,
//! with returned as a side exit from loading/in_transit/arrived. Every
//! state change swaps in the refetched transfer, because downstream
//! delivery records derive their readiness from it.

use std::sync::Arc;
use std::time::Duration;

use fex_core::progress::{ProgressRecord, ProgressStore};
use fex_core::types::{MediaId, Transfer, TransferStatus};
use fex_core::FexError;

use crate::backend::Backend;
use crate::location::{capture_best_effort, LocationProvider};
use crate::session::Session;

pub struct TransferSession {
    backend: Arc<dyn Backend>,
    store: ProgressStore,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
    transfer: Transfer,
    record: ProgressRecord,
}

impl Session {
    /// Open a transfer for execution, restoring any local progress record.
    pub async fn open_transfer(
        &mut self,
        id: &fex_core::types::TransferId,
    ) -> anyhow::Result<TransferSession> {
        let transfer = self.backend().fetch_transfer(id).await?;
        let record = match self.store().load(&id.0) {
            Ok(Some(record)) => record,
            Ok(None) => ProgressRecord::new(id.0.clone()),
            Err(e) => {
                tracing::warn!("progress store read failed, using server state only: {e}");
                ProgressRecord::new(id.0.clone())
            }
        };
        Ok(TransferSession {
            backend: Arc::clone(self.backend()),
            store: self.store().clone(),
            location: Arc::clone(self.location()),
            location_timeout: self.location_timeout(),
            transfer,
            record,
        })
    }
}

impl TransferSession {
    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    fn apply(&mut self, transfer: Transfer) -> &Transfer {
        if transfer.status.is_terminal() {
            if let Err(e) = self.store.clear(&transfer.id.0) {
                tracing::warn!("could not clear progress record {}: {e}", transfer.id);
            }
        }
        self.transfer = transfer;
        &self.transfer
    }

    fn guard_status(&self, expected: TransferStatus, action: &str) -> Result<(), FexError> {
        if self.transfer.status != expected {
            return Err(FexError::InvalidTransition(format!(
                "cannot {action}: transfer is {:?}, expected {:?}",
                self.transfer.status, expected
            )));
        }
        Ok(())
    }

    /// pending → loading. Always allowed from pending.
    pub async fn start_loading(&mut self) -> anyhow::Result<&Transfer> {
        self.guard_status(TransferStatus::Pending, "start loading")?;
        let transfer = self.backend.start_loading_check(&self.transfer.id).await?;
        tracing::info!("transfer {} loading check started", transfer.id);
        Ok(self.apply(transfer))
    }

    /// Bulk-verify every pending item check at its expected quantity.
    pub async fn verify_all(&mut self) -> anyhow::Result<&Transfer> {
        self.guard_status(TransferStatus::Loading, "verify items")?;
        let transfer = self.backend.verify_all_items(&self.transfer.id).await?;
        Ok(self.apply(transfer))
    }

    /// loading → in_transit. Requires every item check to be terminal —
    /// 100% of expected quantity accounted for, not necessarily 100%
    /// verified-undamaged.
    pub async fn depart(&mut self) -> anyhow::Result<&Transfer> {
        self.guard_status(TransferStatus::Loading, "depart")?;
        if !self.transfer.checks_complete() {
            let pending: Vec<String> = self
                .transfer
                .items
                .iter()
                .filter(|i| !i.status.is_terminal())
                .map(|i| format!("item check pending: {}", i.product))
                .collect();
            return Err(FexError::ValidationFailed(pending).into());
        }
        let transfer = self.backend.complete_loading(&self.transfer.id).await?;
        tracing::info!("transfer {} departed", transfer.id);
        Ok(self.apply(transfer))
    }

    /// in_transit → arrived. Location capture is best effort and never
    /// blocks the transition.
    pub async fn arrive(&mut self) -> anyhow::Result<&Transfer> {
        self.guard_status(TransferStatus::InTransit, "arrive")?;
        let loc = capture_best_effort(self.location.as_ref(), self.location_timeout).await;
        let transfer = self
            .backend
            .arrive_at_destination(&self.transfer.id, loc)
            .await?;
        tracing::info!("transfer {} arrived", transfer.id);
        Ok(self.apply(transfer))
    }

    /// Record a handoff photo reference locally before the handoff call.
    pub fn capture_handoff_photo(&mut self, media: MediaId) -> anyhow::Result<()> {
        if self.transfer.status.is_terminal() {
            return Err(
                FexError::InvalidTransition("transfer is already closed".to_string()).into(),
            );
        }
        self.record.add_media(media);
        if let Err(e) = self.store.save(&self.record) {
            tracing::warn!("progress store unavailable, continuing without cache: {e}");
        }
        Ok(())
    }

    /// arrived → completed. Requires a receiver identity; the optional
    /// photo is uploaded before the status call.
    pub async fn handoff(
        &mut self,
        received_by: &str,
        photo: Option<MediaId>,
        notes: Option<&str>,
    ) -> anyhow::Result<&Transfer> {
        self.guard_status(TransferStatus::Arrived, "hand off")?;
        if received_by.trim().is_empty() {
            return Err(
                FexError::ValidationFailed(vec!["receiver name must not be empty".into()])
                    .into(),
            );
        }
        if let Some(photo) = &photo {
            self.backend
                .upload_handoff_photo(&self.transfer.id, photo)
                .await?;
        }
        let transfer = self
            .backend
            .complete_handoff(&self.transfer.id, received_by, photo.as_ref(), notes)
            .await?;
        tracing::info!("transfer {} handed off to {received_by}", transfer.id);
        Ok(self.apply(transfer))
    }

    /// Side exit: return the goods. Requires a reason and is irreversible.
    pub async fn return_transfer(&mut self, reason: &str) -> anyhow::Result<&Transfer> {
        if reason.trim().is_empty() {
            return Err(
                FexError::ValidationFailed(vec!["return reason must not be empty".into()])
                    .into(),
            );
        }
        if !self.transfer.status.can_return() {
            return Err(FexError::InvalidTransition(format!(
                "cannot return a transfer that is {:?}",
                self.transfer.status
            ))
            .into());
        }
        let transfer = self.backend.return_transfer(&self.transfer.id, reason).await?;
        tracing::info!("transfer {} returned: {reason}", transfer.id);
        Ok(self.apply(transfer))
    }
}
