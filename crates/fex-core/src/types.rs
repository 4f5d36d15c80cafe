use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// --- ID types ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaId(pub String);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for VisitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// --- Location ---

/// A captured coordinate pair. Location capture is best effort: when the
/// reading is unavailable the engine records `GeoPoint::unknown()` instead
/// of blocking the transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// The degraded "no reading" value.
    pub fn unknown() -> Self {
        Self { lat: 0.0, lng: 0.0 }
    }

    pub fn is_unknown(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

// --- Route ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

/// One agent-day of field work: an ordered list of stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub date: NaiveDate,
    pub agent: String,
    pub status: RouteStatus,
    pub stops: Vec<Stop>,
}

impl Route {
    /// Look up a stop by its 1-based sequence number.
    pub fn stop(&self, seq: u32) -> Option<&Stop> {
        self.stops.iter().find(|s| s.seq == seq)
    }

    /// The single stop currently being worked, if any. The server enforces
    /// that at most one stop is in an active sub-status at a time.
    pub fn active_stop(&self) -> Option<&Stop> {
        self.stops.iter().find(|s| s.status.is_active())
    }

    pub fn total_stops(&self) -> usize {
        self.stops.len()
    }

    pub fn completed_stops(&self) -> usize {
        self.stops
            .iter()
            .filter(|s| s.status == StopStatus::Completed)
            .count()
    }

    pub fn skipped_stops(&self) -> usize {
        self.stops
            .iter()
            .filter(|s| s.status == StopStatus::Skipped)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Visit,
    Delivery,
    Transfer,
    Pickup,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    Arrived,
    InProgress,
    Completed,
    Skipped,
    Partial,
    Failed,
}

impl StopStatus {
    /// Arrived or in-progress: the stop is locked for exclusive work.
    pub fn is_active(&self) -> bool {
        matches!(self, StopStatus::Arrived | StopStatus::InProgress)
    }

    /// Completed and skipped stops are immutable.
    pub fn is_closed(&self) -> bool {
        matches!(self, StopStatus::Completed | StopStatus::Skipped)
    }
}

/// An ordered element of a route. `seq` is 1-based and defines the planned
/// visiting order; unplanned insertions are appended at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub seq: u32,
    pub kind: StopKind,
    pub status: StopStatus,
    pub customer: String,
    pub visit_id: Option<VisitId>,
    pub transfer_id: Option<TransferId>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub arrival_location: Option<GeoPoint>,
    #[serde(default)]
    pub unplanned: bool,
}

/// Payload for inserting an unplanned stop at the end of the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDescriptor {
    pub kind: StopKind,
    pub customer: String,
}

// --- Visit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Cancelled)
    }
}

/// The work unit created when a visit-kind stop is checked into. Owned by
/// its parent stop; never deleted independently once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub status: VisitStatus,
    pub activities: Vec<Activity>,
    pub check_in_at: Option<DateTime<Utc>>,
    pub check_in_location: Option<GeoPoint>,
    pub check_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Photo,
    StockCount,
    Payment,
    Order,
    Survey,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Completed,
    Skipped,
}

/// One gated unit of work inside a visit. `name` is unique within the
/// visit and is the key used by the progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    pub activity_type: ActivityType,
    pub seq: u32,
    pub mandatory: bool,
    pub status: ActivityStatus,
    pub result: Option<ActivityResult>,
}

/// Result payload, tagged by activity type. `Opaque` is the
/// forward-compatibility escape hatch for activity types this build does
/// not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityResult {
    Photo { media: Vec<MediaId> },
    StockCount { lines: Vec<StockLine> },
    Payment { amount: f64, method: String },
    Order { order_ref: String, total: f64 },
    Survey { answers: Vec<SurveyAnswer> },
    Opaque { data: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub item: String,
    pub counted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub question: String,
    pub answer: String,
}

// --- Transfer ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    WhToDc,
    DcToDc,
    ReturnToWh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Loading,
    InTransit,
    Arrived,
    Completed,
    Returned,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Returned | TransferStatus::Cancelled
        )
    }

    /// Returned is a side exit reachable only from these states.
    pub fn can_return(&self) -> bool {
        matches!(
            self,
            TransferStatus::Loading | TransferStatus::InTransit | TransferStatus::Arrived
        )
    }
}

/// A goods movement between two warehouses, sequenced independently of
/// visits: pending → loading → in_transit → arrived → completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub origin: String,
    pub destination: String,
    pub items: Vec<TransferItemCheck>,
    #[serde(default)]
    pub deliveries: Vec<String>,
    pub received_by: Option<String>,
    pub handoff_photo: Option<MediaId>,
    pub return_reason: Option<String>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub arrival_location: Option<GeoPoint>,
}

impl Transfer {
    /// True when every item check has reached a terminal check status,
    /// i.e. 100% of expected quantity is accounted for.
    pub fn checks_complete(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }

    pub fn pending_checks(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == CheckStatus::Pending)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Verified,
    Partial,
    Damaged,
    Missing,
    Rejected,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        *self != CheckStatus::Pending
    }
}

/// One line per product in a transfer's load/delivery/return check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItemCheck {
    pub product: String,
    pub expected: u32,
    pub verified: u32,
    pub damaged: u32,
    pub missing: u32,
    pub status: CheckStatus,
}

impl TransferItemCheck {
    pub fn accounted(&self) -> u32 {
        self.verified + self.damaged + self.missing
    }

    /// Invariant: verified + damaged + missing never exceeds expected.
    pub fn is_consistent(&self) -> bool {
        self.accounted() <= self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_status_classification() {
        assert!(StopStatus::Arrived.is_active());
        assert!(StopStatus::InProgress.is_active());
        assert!(!StopStatus::Pending.is_active());
        assert!(StopStatus::Completed.is_closed());
        assert!(StopStatus::Skipped.is_closed());
        assert!(!StopStatus::Failed.is_closed());
    }

    #[test]
    fn item_check_accounting() {
        let check = TransferItemCheck {
            product: "SKU-1".into(),
            expected: 10,
            verified: 7,
            damaged: 2,
            missing: 1,
            status: CheckStatus::Partial,
        };
        assert_eq!(check.accounted(), 10);
        assert!(check.is_consistent());
    }

    #[test]
    fn activity_result_round_trips_tagged() {
        let result = ActivityResult::Payment {
            amount: 125.50,
            method: "cash".into(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""type":"payment""#));
        let back: ActivityResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn opaque_result_accepts_unknown_shapes() {
        let json = r#"{"type":"opaque","data":{"anything":[1,2,3]}}"#;
        let result: ActivityResult = serde_json::from_str(json).unwrap();
        assert!(matches!(result, ActivityResult::Opaque { .. }));
    }
}
