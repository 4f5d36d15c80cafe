//! HTTP implementation of the backend interface. JSON bodies over a
//! plain REST surface; rustls, no system OpenSSL.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use fex_core::types::{
    GeoPoint, MediaId, Route, RouteId, StopDescriptor, Transfer, TransferId, Visit, VisitId,
};

use crate::backend::{
    ActivityReport, Backend, BackendError, BackendResult, FinalizeResponse,
};

pub struct HttpBackend {
    base: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct LocBody {
    lat: f64,
    lng: f64,
}

impl From<GeoPoint> for LocBody {
    fn from(p: GeoPoint) -> Self {
        Self { lat: p.lat, lng: p.lng }
    }
}

#[derive(Serialize)]
struct ReasonBody<'a> {
    reason: &'a str,
}

#[derive(Serialize)]
struct PhotoBody<'a> {
    media: &'a MediaId,
}

#[derive(Serialize)]
struct HandoffBody<'a> {
    received_by: &'a str,
    photo: Option<&'a MediaId>,
    notes: Option<&'a str>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn transport_err(e: reqwest::Error) -> BackendError {
        BackendError::Transport(e.to_string())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected(format!("{status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::transport_err)?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> BackendResult<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(Self::transport_err)?;
        Self::decode(response).await
    }

    async fn post_unit<B: Serialize + Sync>(&self, path: &str, body: &B) -> BackendResult<()> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected(format!("{status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_route(&self, route: &RouteId) -> BackendResult<Route> {
        self.get_json(&format!("/routes/{route}")).await
    }

    async fn start_route(&self, route: &RouteId, loc: GeoPoint) -> BackendResult<Route> {
        self.post_json(&format!("/routes/{route}/start"), &LocBody::from(loc))
            .await
    }

    async fn end_route(&self, route: &RouteId, loc: GeoPoint) -> BackendResult<Route> {
        self.post_json(&format!("/routes/{route}/end"), &LocBody::from(loc))
            .await
    }

    async fn arrive_at_stop(
        &self,
        route: &RouteId,
        stop_seq: u32,
        loc: GeoPoint,
    ) -> BackendResult<Route> {
        self.post_json(
            &format!("/routes/{route}/stops/{stop_seq}/arrive"),
            &LocBody::from(loc),
        )
        .await
    }

    async fn complete_stop(&self, route: &RouteId, stop_seq: u32) -> BackendResult<Route> {
        self.post_json(
            &format!("/routes/{route}/stops/{stop_seq}/complete"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn skip_stop(
        &self,
        route: &RouteId,
        stop_seq: u32,
        reason: &str,
    ) -> BackendResult<Route> {
        self.post_json(
            &format!("/routes/{route}/stops/{stop_seq}/skip"),
            &ReasonBody { reason },
        )
        .await
    }

    async fn add_unplanned_stop(
        &self,
        route: &RouteId,
        descriptor: &StopDescriptor,
    ) -> BackendResult<Route> {
        self.post_json(&format!("/routes/{route}/stops"), descriptor)
            .await
    }

    async fn fetch_visit(&self, visit: &VisitId) -> BackendResult<Visit> {
        self.get_json(&format!("/visits/{visit}")).await
    }

    async fn get_visit_media(&self, visit: &VisitId) -> BackendResult<Vec<MediaId>> {
        self.get_json(&format!("/visits/{visit}/media")).await
    }

    async fn mark_activity_completed(
        &self,
        visit: &VisitId,
        report: &ActivityReport,
    ) -> BackendResult<()> {
        self.post_unit(&format!("/visits/{visit}/activities"), report)
            .await
    }

    async fn finalize_visit(&self, visit: &VisitId) -> BackendResult<FinalizeResponse> {
        self.post_json(&format!("/visits/{visit}/finalize"), &serde_json::json!({}))
            .await
    }

    async fn fetch_transfer(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        self.get_json(&format!("/transfers/{transfer}")).await
    }

    async fn start_loading_check(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        self.post_json(
            &format!("/transfers/{transfer}/loading/start"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn verify_all_items(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        self.post_json(
            &format!("/transfers/{transfer}/loading/verify-all"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn complete_loading(&self, transfer: &TransferId) -> BackendResult<Transfer> {
        self.post_json(
            &format!("/transfers/{transfer}/loading/complete"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn arrive_at_destination(
        &self,
        transfer: &TransferId,
        loc: GeoPoint,
    ) -> BackendResult<Transfer> {
        self.post_json(
            &format!("/transfers/{transfer}/arrive"),
            &LocBody::from(loc),
        )
        .await
    }

    async fn upload_handoff_photo(
        &self,
        transfer: &TransferId,
        photo: &MediaId,
    ) -> BackendResult<()> {
        self.post_unit(&format!("/transfers/{transfer}/photo"), &PhotoBody { media: photo })
            .await
    }

    async fn complete_handoff(
        &self,
        transfer: &TransferId,
        received_by: &str,
        photo: Option<&MediaId>,
        notes: Option<&str>,
    ) -> BackendResult<Transfer> {
        self.post_json(
            &format!("/transfers/{transfer}/handoff"),
            &HandoffBody {
                received_by,
                photo,
                notes,
            },
        )
        .await
    }

    async fn return_transfer(
        &self,
        transfer: &TransferId,
        reason: &str,
    ) -> BackendResult<Transfer> {
        self.post_json(&format!("/transfers/{transfer}/return"), &ReasonBody { reason })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let backend = HttpBackend::new("http://localhost:8080/");
        assert_eq!(backend.url("/routes/rt-1"), "http://localhost:8080/routes/rt-1");
    }
}
