//! Best-effort location capture.
//!
//! A missing or slow reading never blocks a transition: past the cap the
//! engine records `GeoPoint::unknown()` and moves on.

use std::time::Duration;

use async_trait::async_trait;

use fex_core::types::GeoPoint;

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Return a reading, or `None` when unavailable or denied.
    async fn current_location(&self) -> Option<GeoPoint>;
}

/// Fixed reading. Backs the CLI's `--lat/--lng` flags and tests.
pub struct FixedLocation(pub GeoPoint);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Option<GeoPoint> {
        Some(self.0)
    }
}

/// Device without a positioning source.
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_location(&self) -> Option<GeoPoint> {
        None
    }
}

/// Capture a reading, degrading to the unknown point on timeout, denial
/// or absence.
pub async fn capture_best_effort(provider: &dyn LocationProvider, cap: Duration) -> GeoPoint {
    match tokio::time::timeout(cap, provider.current_location()).await {
        Ok(Some(point)) => point,
        Ok(None) => {
            tracing::warn!("location unavailable, recording unknown reading");
            GeoPoint::unknown()
        }
        Err(_) => {
            tracing::warn!("location capture timed out after {cap:?}");
            GeoPoint::unknown()
        }
    }
}
