use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use fex_core::config::{load_config, FexConfig};
use fex_core::dirs;
use fex_core::progress::ProgressStore;
use fex_core::types::{GeoPoint, RouteId};
use fex_engine::backend::Backend;
use fex_engine::http::HttpBackend;
use fex_engine::location::{FixedLocation, LocationProvider, NoLocation};
use fex_engine::session::Session;

/// Build a session from ~/.fex/config.toml. Manual `--lat/--lng` flags
/// stand in for a positioning source.
pub fn open_session(lat: Option<f64>, lng: Option<f64>) -> anyhow::Result<Session> {
    let config_path = dirs::config_path();
    let config: FexConfig = load_config(&config_path)
        .with_context(|| format!("could not load config from {}", config_path.display()))?;

    if let Err(e) = dirs::ensure_base_dirs() {
        tracing::warn!("could not create {}: {e} (offline cache disabled)", dirs::fex_root().display());
    }

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config.backend_url));
    let location: Arc<dyn LocationProvider> = match (lat, lng) {
        (Some(lat), Some(lng)) => Arc::new(FixedLocation(GeoPoint::new(lat, lng))),
        _ => Arc::new(NoLocation),
    };

    Ok(Session::new(
        backend,
        ProgressStore::default_location(),
        location,
        Duration::from_secs(config.location_timeout_secs),
    ))
}

/// Resolve a route ID from an argument or the FEX_ROUTE env var.
pub fn resolve_route(arg: &Option<String>) -> anyhow::Result<RouteId> {
    arg.clone()
        .or_else(|| std::env::var("FEX_ROUTE").ok())
        .map(RouteId)
        .ok_or_else(|| anyhow::anyhow!("no route ID given (pass one or set FEX_ROUTE)"))
}

/// Render a snake_case status word the way the wire format spells it.
pub fn word<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "?".into(),
    }
}
