//! End-to-end engine tests driving the coordinators against the
//! in-memory backend and a real on-disk progress store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use fex_core::progress::ProgressStore;
use fex_core::types::{
    Activity, ActivityResult, ActivityStatus, ActivityType, CheckStatus, GeoPoint, MediaId,
    Route, RouteId, RouteStatus, Stop, StopDescriptor, StopKind, StopStatus, Transfer,
    TransferId, TransferItemCheck, TransferStatus, TransferType, Visit, VisitId, VisitStatus,
};
use fex_core::FexError;

use fex_engine::backend::{Backend, FinalizeResponse};
use fex_engine::completion::FinalizeResult;
use fex_engine::location::FixedLocation;
use fex_engine::reconcile::SyncStatus;
use fex_engine::sequencer::{classify_stops, StopGate};
use fex_engine::session::Session;
use fex_engine::testing::MemoryBackend;

fn activity(name: &str, seq: u32, mandatory: bool, activity_type: ActivityType) -> Activity {
    Activity {
        name: name.into(),
        activity_type,
        seq,
        mandatory,
        status: ActivityStatus::Pending,
        result: None,
    }
}

fn standard_visit(id: &str) -> Visit {
    Visit {
        id: VisitId(id.into()),
        status: VisitStatus::Planned,
        activities: vec![
            activity("photo", 1, true, ActivityType::Photo),
            activity("stock", 2, true, ActivityType::StockCount),
            activity("payment", 3, false, ActivityType::Payment),
            activity("order", 4, false, ActivityType::Order),
            activity("survey", 5, false, ActivityType::Survey),
        ],
        check_in_at: None,
        check_in_location: None,
        check_out_at: None,
    }
}

fn visit_stop(seq: u32, visit: &str) -> Stop {
    Stop {
        seq,
        kind: StopKind::Visit,
        status: StopStatus::Pending,
        customer: format!("customer-{seq}"),
        visit_id: Some(VisitId(visit.into())),
        transfer_id: None,
        arrived_at: None,
        departed_at: None,
        arrival_location: None,
        unplanned: false,
    }
}

fn three_stop_route() -> Route {
    Route {
        id: RouteId("rt-1".into()),
        date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        agent: "agent-1".into(),
        status: RouteStatus::NotStarted,
        stops: vec![
            visit_stop(1, "vs-1"),
            visit_stop(2, "vs-2"),
            visit_stop(3, "vs-3"),
        ],
    }
}

fn transfer_with_items(pending: usize, verified: usize) -> Transfer {
    let mut items = Vec::new();
    for i in 0..verified {
        items.push(TransferItemCheck {
            product: format!("SKU-{i}"),
            expected: 10,
            verified: 10,
            damaged: 0,
            missing: 0,
            status: CheckStatus::Verified,
        });
    }
    for i in 0..pending {
        items.push(TransferItemCheck {
            product: format!("SKU-p{i}"),
            expected: 10,
            verified: 0,
            damaged: 0,
            missing: 0,
            status: CheckStatus::Pending,
        });
    }
    Transfer {
        id: TransferId("tr-1".into()),
        transfer_type: TransferType::WhToDc,
        status: TransferStatus::Pending,
        origin: "WH-A".into(),
        destination: "DC-B".into(),
        items,
        deliveries: vec![],
        received_by: None,
        handoff_photo: None,
        return_reason: None,
        arrived_at: None,
        arrival_location: None,
    }
}

struct Harness {
    backend: Arc<MemoryBackend>,
    session: Session,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    backend.put_route(three_stop_route());
    for id in ["vs-1", "vs-2", "vs-3"] {
        backend.put_visit(standard_visit(id));
    }
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(
        Arc::clone(&backend) as Arc<dyn Backend>,
        ProgressStore::new(dir.path()),
        Arc::new(FixedLocation(GeoPoint::new(52.0, 4.0))),
        Duration::from_millis(200),
    );
    Harness {
        backend,
        session,
        _dir: dir,
    }
}

// Scenario A: out-of-sequence check-in activates stop 2 and locks the
// others; stop 1 stays pending.
#[tokio::test]
async fn out_of_order_check_in() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(2).await.unwrap();

    let route = h.session.route().unwrap();
    assert_eq!(
        classify_stops(route),
        vec![StopGate::Locked, StopGate::Active, StopGate::Locked]
    );
    assert_eq!(route.stop(1).unwrap().status, StopStatus::Pending);
    assert_eq!(route.stop(2).unwrap().status, StopStatus::Arrived);
}

#[tokio::test]
async fn check_in_is_refused_while_another_stop_is_active() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(2).await.unwrap();

    let err = h.session.check_in(1).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::InvalidTransition(_))
    ));
}

// Scenario B: completing both mandatory activities and skipping the two
// optional ones leaves survey as the sole unlockable activity.
#[tokio::test]
async fn gate_reaches_the_tail_activity() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity(
        "photo",
        Some(ActivityResult::Photo {
            media: vec![MediaId("md-1".into())],
        }),
    )
    .await
    .unwrap();
    vs.complete_activity(
        "stock",
        Some(ActivityResult::StockCount {
            lines: vec![fex_core::types::StockLine {
                item: "SKU-1".into(),
                counted: 12.0,
            }],
        }),
    )
    .await
    .unwrap();
    vs.skip_activity("payment").await.unwrap();
    vs.skip_activity("order").await.unwrap();

    assert_eq!(vs.current_activity().unwrap().name, "survey");
    assert!(vs.gate().mandatory_pending().is_empty());
}

// Scenario C: a finalize response with warnings leaves the visit in
// progress, the parent stop unchanged, and the progress record retained.
#[tokio::test]
async fn finalize_with_warnings_commits_nothing() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let visit_id = VisitId("vs-1".into());
    h.backend.script_finalize(
        &visit_id,
        FinalizeResponse::warnings(vec!["order sync failed".into()]),
    );

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();
    vs.complete_activity("stock", None).await.unwrap();
    vs.skip_activity("payment").await.unwrap();
    vs.skip_activity("order").await.unwrap();
    vs.complete_activity("survey", None).await.unwrap();

    let result = h.session.finalize_visit(&mut vs).await.unwrap();
    assert_eq!(
        result,
        FinalizeResult::Blocked(vec!["order sync failed".into()])
    );

    assert_eq!(
        h.backend.visit(&visit_id).unwrap().status,
        VisitStatus::InProgress
    );
    assert_eq!(
        h.session.route().unwrap().stop(1).unwrap().status,
        StopStatus::Arrived
    );
    assert!(h.session.store().load("vs-1").unwrap().is_some());

    // After remediation the retry commits.
    let result = h.session.finalize_visit(&mut vs).await.unwrap();
    assert_eq!(result, FinalizeResult::Committed);
    assert_eq!(
        h.session.route().unwrap().stop(1).unwrap().status,
        StopStatus::Completed
    );
    assert!(h.session.store().load("vs-1").unwrap().is_none());
}

#[tokio::test]
async fn finalize_rejects_pending_mandatory_activities_before_any_call() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();

    let err = h.session.finalize_visit(&mut vs).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::ValidationFailed(_))
    ));
    assert_eq!(h.backend.finalize_calls(), 0);
}

// Finalize idempotence: a second finalize of a committed visit succeeds
// and duplicates no side effects.
#[tokio::test]
async fn finalize_is_idempotent() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();
    vs.complete_activity("stock", None).await.unwrap();
    vs.skip_activity("payment").await.unwrap();
    vs.skip_activity("order").await.unwrap();
    vs.complete_activity("survey", None).await.unwrap();

    assert_eq!(
        h.session.finalize_visit(&mut vs).await.unwrap(),
        FinalizeResult::Committed
    );
    assert_eq!(
        h.session.finalize_visit(&mut vs).await.unwrap(),
        FinalizeResult::Committed
    );
    assert_eq!(h.backend.finalize_calls(), 2);
    assert_eq!(h.backend.finalize_effects(), 1);
}

#[tokio::test]
async fn transport_failure_on_finalize_asks_for_retry() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();
    vs.complete_activity("stock", None).await.unwrap();
    vs.skip_activity("payment").await.unwrap();
    vs.skip_activity("order").await.unwrap();
    vs.complete_activity("survey", None).await.unwrap();

    h.backend.set_transport_down(true);
    let result = h.session.finalize_visit(&mut vs).await.unwrap();
    assert!(matches!(result, FinalizeResult::RetryNeeded(_)));
    assert!(h.session.store().load("vs-1").unwrap().is_some());

    h.backend.set_transport_down(false);
    assert_eq!(
        h.session.finalize_visit(&mut vs).await.unwrap(),
        FinalizeResult::Committed
    );
}

// Scenario E: skip-whole-visit is rejected once any progress exists.
#[tokio::test]
async fn skip_visit_is_disabled_after_progress() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();

    let err = h.session.skip_visit(&vs, "customer closed").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::ProgressExists)
    ));
}

#[tokio::test]
async fn skip_visit_without_progress_closes_the_stop() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let vs = h.session.activate_visit(1).await.unwrap();
    h.session.skip_visit(&vs, "customer closed").await.unwrap();
    assert_eq!(
        h.session.route().unwrap().stop(1).unwrap().status,
        StopStatus::Skipped
    );
}

// A failed activity sync keeps local progress; re-activating the visit
// (as after a restart) restores it from the store and the merged gate
// resumes where the agent left off.
#[tokio::test]
async fn offline_progress_survives_reactivation() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    h.backend.set_fail_activity_sync(true);
    let mut vs = h.session.activate_visit(1).await.unwrap();
    let sync = vs.complete_activity("photo", None).await.unwrap();
    assert!(matches!(sync, SyncStatus::LocalOnly(_)));
    drop(vs);

    // Server never heard about photo.
    assert_eq!(
        h.backend.visit(&VisitId("vs-1".into())).unwrap().activities[0].status,
        ActivityStatus::Pending
    );

    h.backend.set_fail_activity_sync(false);
    let vs = h.session.activate_visit(1).await.unwrap();
    assert_eq!(vs.current_activity().unwrap().name, "stock");
    assert!(vs.record().completed.contains("photo"));
}

#[tokio::test]
async fn check_in_clears_stale_progress() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());

    // Leftover record from an earlier aborted attempt.
    let mut stale = fex_core::progress::ProgressRecord::new("vs-1");
    stale.mark_completed("photo");
    h.session.store().save(&stale).unwrap();

    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();
    assert!(h.session.store().load("vs-1").unwrap().is_none());
}

#[tokio::test]
async fn unplanned_stop_is_appended_and_eligible() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    let route = h
        .session
        .add_unplanned_stop(&StopDescriptor {
            kind: StopKind::Visit,
            customer: "walk-in".into(),
        })
        .await
        .unwrap();
    let added = route.stops.last().unwrap();
    assert_eq!(added.seq, 4);
    assert!(added.unplanned);
    assert_eq!(classify_stops(route)[3], StopGate::Eligible);
}

#[tokio::test]
async fn completed_visit_reopens_read_only() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity("photo", None).await.unwrap();
    vs.complete_activity("stock", None).await.unwrap();
    vs.skip_activity("payment").await.unwrap();
    vs.skip_activity("order").await.unwrap();
    vs.complete_activity("survey", None).await.unwrap();
    h.session.finalize_visit(&mut vs).await.unwrap();

    let vs = h.session.activate_visit(1).await.unwrap();
    assert!(vs.is_read_only());
    assert_eq!(vs.current_activity(), None);
}

#[tokio::test]
async fn amend_overwrites_without_moving_the_cursor() {
    let mut h = harness();
    let route_id = RouteId("rt-1".into());
    h.session.start_route(&route_id).await.unwrap();
    h.session.check_in(1).await.unwrap();

    let mut vs = h.session.activate_visit(1).await.unwrap();
    vs.complete_activity(
        "photo",
        Some(ActivityResult::Photo {
            media: vec![MediaId("md-1".into())],
        }),
    )
    .await
    .unwrap();

    vs.amend_activity(
        "photo",
        Some(ActivityResult::Photo {
            media: vec![MediaId("md-2".into())],
        }),
    )
    .await
    .unwrap();

    assert_eq!(vs.current_activity().unwrap().name, "stock");
    assert_eq!(
        vs.activity("photo").unwrap().result,
        Some(ActivityResult::Photo {
            media: vec![MediaId("md-2".into())]
        })
    );
}

// Scenario D: depart is refused while an item check is pending and
// succeeds once every check is terminal.
#[tokio::test]
async fn transfer_depart_requires_complete_checks() {
    let mut h = harness();
    h.backend.put_transfer(transfer_with_items(1, 4));
    let id = TransferId("tr-1".into());

    let mut ts = h.session.open_transfer(&id).await.unwrap();
    ts.start_loading().await.unwrap();

    let err = ts.depart().await.unwrap_err();
    match err.downcast_ref::<FexError>() {
        Some(FexError::ValidationFailed(reasons)) => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("SKU-p0"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    ts.verify_all().await.unwrap();
    ts.depart().await.unwrap();
    assert_eq!(ts.transfer().status, TransferStatus::InTransit);
}

#[tokio::test]
async fn transfer_handoff_requires_receiver() {
    let mut h = harness();
    h.backend.put_transfer(transfer_with_items(0, 2));
    let id = TransferId("tr-1".into());

    let mut ts = h.session.open_transfer(&id).await.unwrap();
    ts.start_loading().await.unwrap();
    ts.depart().await.unwrap();
    ts.arrive().await.unwrap();

    let err = ts.handoff("  ", None, None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::ValidationFailed(_))
    ));

    ts.capture_handoff_photo(MediaId("md-h".into())).unwrap();
    ts.handoff("J. Receiver", Some(MediaId("md-h".into())), Some("dock 3"))
        .await
        .unwrap();
    assert_eq!(ts.transfer().status, TransferStatus::Completed);
    assert_eq!(ts.transfer().received_by.as_deref(), Some("J. Receiver"));
    // Terminal state purges the local record.
    assert!(h.session.store().load("tr-1").unwrap().is_none());
}

#[tokio::test]
async fn transfer_return_needs_reason_and_is_state_limited() {
    let mut h = harness();
    h.backend.put_transfer(transfer_with_items(0, 1));
    let id = TransferId("tr-1".into());

    let mut ts = h.session.open_transfer(&id).await.unwrap();

    // Not returnable from pending.
    let err = ts.return_transfer("damaged truck").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::InvalidTransition(_))
    ));

    ts.start_loading().await.unwrap();
    let err = ts.return_transfer("").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FexError>(),
        Some(FexError::ValidationFailed(_))
    ));

    ts.return_transfer("damaged truck").await.unwrap();
    assert_eq!(ts.transfer().status, TransferStatus::Returned);
    assert_eq!(ts.transfer().return_reason.as_deref(), Some("damaged truck"));
}
