//! Activity gate: the per-visit state machine deciding which activity is
//! currently unlockable.
//!
//! The gate keeps a cursor instead of rescanning the activity list on
//! every check: the cursor always points at the first activity that is
//! neither completed nor skipped, and is recomputed only on transition.

use std::collections::BTreeSet;

use fex_core::types::{Activity, ActivityStatus};
use fex_core::FexError;

#[derive(Debug, Clone)]
struct GateEntry {
    name: String,
    mandatory: bool,
}

#[derive(Debug, Clone)]
pub struct ActivityGate {
    entries: Vec<GateEntry>,
    completed: BTreeSet<String>,
    skipped: BTreeSet<String>,
    cursor: Option<usize>,
    read_only: bool,
}

impl ActivityGate {
    /// Build a live gate from activities in sequence order. Completion and
    /// skip state is seeded from the activities' statuses (the merged
    /// server + local view).
    pub fn new(activities: &[Activity]) -> Self {
        let mut gate = Self::build(activities, false);
        gate.recompute_cursor();
        gate
    }

    /// Build a read-only view: everything viewable, nothing transitionable.
    /// Used when the parent visit is already terminal.
    pub fn read_only_view(activities: &[Activity]) -> Self {
        Self::build(activities, true)
    }

    fn build(activities: &[Activity], read_only: bool) -> Self {
        let mut sorted: Vec<&Activity> = activities.iter().collect();
        sorted.sort_by_key(|a| a.seq);

        let mut completed = BTreeSet::new();
        let mut skipped = BTreeSet::new();
        let entries = sorted
            .iter()
            .map(|a| {
                match a.status {
                    ActivityStatus::Completed => {
                        completed.insert(a.name.clone());
                    }
                    ActivityStatus::Skipped => {
                        skipped.insert(a.name.clone());
                    }
                    ActivityStatus::Pending => {}
                }
                GateEntry {
                    name: a.name.clone(),
                    mandatory: a.mandatory,
                }
            })
            .collect();

        Self {
            entries,
            completed,
            skipped,
            cursor: None,
            read_only,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The sole currently-unlockable activity, if any.
    pub fn current(&self) -> Option<&str> {
        self.cursor.map(|i| self.entries[i].name.as_str())
    }

    pub fn is_unlockable(&self, name: &str) -> bool {
        self.current() == Some(name)
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }

    /// Names of mandatory activities still pending, in sequence order.
    /// Non-empty blocks finalize.
    pub fn mandatory_pending(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                e.mandatory && !self.completed.contains(&e.name) && !self.skipped.contains(&e.name)
            })
            .map(|e| e.name.clone())
            .collect()
    }

    /// A completed activity's captured data may be amended while the visit
    /// is non-terminal. Amending never reopens the activity.
    pub fn can_amend(&self, name: &str) -> bool {
        !self.read_only && self.completed.contains(name)
    }

    pub fn complete(&mut self, name: &str) -> Result<(), FexError> {
        self.guard_transition(name)?;
        self.completed.insert(name.to_string());
        self.recompute_cursor();
        Ok(())
    }

    /// Skip is legal only on the current unlockable activity, and never on
    /// a mandatory one. Skip is terminal within this visit.
    pub fn skip(&mut self, name: &str) -> Result<(), FexError> {
        self.guard_transition(name)?;
        if self.entry(name).is_some_and(|e| e.mandatory) {
            return Err(FexError::MandatorySkip(name.to_string()));
        }
        self.skipped.insert(name.to_string());
        self.recompute_cursor();
        Ok(())
    }

    fn guard_transition(&self, name: &str) -> Result<(), FexError> {
        if self.read_only {
            return Err(FexError::InvalidTransition(
                "visit is read-only".to_string(),
            ));
        }
        if self.entry(name).is_none() {
            return Err(FexError::ActivityNotFound(name.to_string()));
        }
        if self.completed.contains(name) || self.skipped.contains(name) {
            return Err(FexError::InvalidTransition(format!(
                "activity already resolved: {name}"
            )));
        }
        if !self.is_unlockable(name) {
            return Err(FexError::ActivityLocked(name.to_string()));
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> Option<&GateEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn recompute_cursor(&mut self) {
        self.cursor = self
            .entries
            .iter()
            .position(|e| !self.completed.contains(&e.name) && !self.skipped.contains(&e.name));
    }
}
