//! Stop sequencer: decides which stops on a route may be interacted with.
//!
//! Classification is a pure function of the authoritative route snapshot.
//! Out-of-order check-in is deliberate: when nothing is active, every
//! non-closed stop is eligible, not just the next one in sequence.

use fex_core::types::{Route, RouteStatus};
use fex_core::FexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopGate {
    /// Not interactable.
    Locked,
    /// May be checked into.
    Eligible,
    /// The one stop currently locked for exclusive work.
    Active,
}

/// Classify every stop on the route, in stop-list order.
pub fn classify_stops(route: &Route) -> Vec<StopGate> {
    if route.status != RouteStatus::InProgress {
        return vec![StopGate::Locked; route.stops.len()];
    }

    if let Some(active_seq) = route.active_stop().map(|s| s.seq) {
        // One stop is being worked: it is active, everything else locked.
        return route
            .stops
            .iter()
            .map(|s| {
                if s.seq == active_seq {
                    StopGate::Active
                } else {
                    StopGate::Locked
                }
            })
            .collect();
    }

    route
        .stops
        .iter()
        .map(|s| {
            if s.status.is_closed() {
                StopGate::Locked
            } else {
                StopGate::Eligible
            }
        })
        .collect()
}

/// Gate for a single stop, by sequence number.
pub fn gate_for(route: &Route, seq: u32) -> Option<StopGate> {
    let gates = classify_stops(route);
    route
        .stops
        .iter()
        .position(|s| s.seq == seq)
        .map(|i| gates[i])
}

/// Check-in is the only transition authorized from `Eligible`.
pub fn check_in_allowed(route: &Route, seq: u32) -> Result<(), FexError> {
    match gate_for(route, seq) {
        None => Err(FexError::StopNotFound(seq)),
        Some(StopGate::Eligible) => Ok(()),
        Some(StopGate::Active) => Err(FexError::InvalidTransition(format!(
            "stop {seq} is already active"
        ))),
        Some(StopGate::Locked) => Err(FexError::InvalidTransition(format!(
            "stop {seq} is locked"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fex_core::types::{RouteId, Stop, StopKind, StopStatus, VisitId};

    fn stop(seq: u32, status: StopStatus) -> Stop {
        Stop {
            seq,
            kind: StopKind::Visit,
            status,
            customer: format!("customer-{seq}"),
            visit_id: Some(VisitId(format!("vs-{seq}"))),
            transfer_id: None,
            arrived_at: None,
            departed_at: None,
            arrival_location: None,
            unplanned: false,
        }
    }

    fn route(status: RouteStatus, stops: Vec<Stop>) -> Route {
        Route {
            id: RouteId("rt-test".into()),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            agent: "agent-1".into(),
            status,
            stops,
        }
    }

    #[test]
    fn route_not_in_progress_locks_everything() {
        let r = route(
            RouteStatus::NotStarted,
            vec![stop(1, StopStatus::Pending), stop(2, StopStatus::Pending)],
        );
        assert_eq!(classify_stops(&r), vec![StopGate::Locked, StopGate::Locked]);
    }

    #[test]
    fn no_active_stop_means_all_open_stops_eligible() {
        let r = route(
            RouteStatus::InProgress,
            vec![
                stop(1, StopStatus::Completed),
                stop(2, StopStatus::Pending),
                stop(3, StopStatus::Pending),
            ],
        );
        assert_eq!(
            classify_stops(&r),
            vec![StopGate::Locked, StopGate::Eligible, StopGate::Eligible]
        );
    }

    // Checking into stop 2 out of sequence makes it active and locks the
    // others; stop 1 stays pending, not skipped.
    #[test]
    fn out_of_order_check_in_locks_the_rest() {
        let r = route(
            RouteStatus::InProgress,
            vec![
                stop(1, StopStatus::Pending),
                stop(2, StopStatus::Arrived),
                stop(3, StopStatus::Pending),
            ],
        );
        assert_eq!(
            classify_stops(&r),
            vec![StopGate::Locked, StopGate::Active, StopGate::Locked]
        );
        assert_eq!(r.stops[0].status, StopStatus::Pending);
    }

    #[test]
    fn at_most_one_stop_is_active() {
        let r = route(
            RouteStatus::InProgress,
            vec![
                stop(1, StopStatus::Pending),
                stop(2, StopStatus::InProgress),
                stop(3, StopStatus::Failed),
            ],
        );
        let active = classify_stops(&r)
            .into_iter()
            .filter(|g| *g == StopGate::Active)
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn failed_and_partial_stops_are_re_enterable() {
        let r = route(
            RouteStatus::InProgress,
            vec![stop(1, StopStatus::Failed), stop(2, StopStatus::Partial)],
        );
        assert_eq!(
            classify_stops(&r),
            vec![StopGate::Eligible, StopGate::Eligible]
        );
    }

    #[test]
    fn check_in_rules() {
        let r = route(
            RouteStatus::InProgress,
            vec![stop(1, StopStatus::Pending), stop(2, StopStatus::Arrived)],
        );
        assert!(matches!(
            check_in_allowed(&r, 1),
            Err(FexError::InvalidTransition(_))
        ));
        assert!(matches!(
            check_in_allowed(&r, 2),
            Err(FexError::InvalidTransition(_))
        ));
        assert!(matches!(
            check_in_allowed(&r, 9),
            Err(FexError::StopNotFound(9))
        ));

        let open = route(RouteStatus::InProgress, vec![stop(1, StopStatus::Pending)]);
        assert!(check_in_allowed(&open, 1).is_ok());
    }
}
