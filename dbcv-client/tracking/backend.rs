use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::types::{SessionSummary, StartSession, TrackingEvent, TrackingSession, TrackingStep};
use crate::api::ApiClient;
use crate::socket::encode_component;

/// Request/response half of the tracking service. `None` means the call
/// failed; the transport has already reported why.
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    async fn start_session(&self, request: &StartSession) -> Option<TrackingSession>;
    async fn session_status(&self, session_id: &str) -> Option<TrackingSession>;
    async fn session_steps(&self, session_id: &str) -> Option<Vec<TrackingStep>>;
    async fn session_summary(&self, session_id: &str) -> Option<SessionSummary>;
    async fn session_events(&self, session_id: &str) -> Option<Vec<TrackingEvent>>;
    async fn apply_changes(&self, session_id: &str) -> Option<Value>;
    async fn rollback_changes(&self, session_id: &str) -> Option<Value>;
}

#[derive(Debug, Default, Deserialize)]
struct EventsPage {
    #[serde(default)]
    events: Vec<TrackingEvent>,
}

pub struct RestTracking {
    api: ApiClient,
}

impl RestTracking {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn session_path(session_id: &str, tail: &str) -> String {
        format!("/tracking/sessions/{}/{tail}", encode_component(session_id))
    }
}

#[async_trait]
impl TrackingBackend for RestTracking {
    async fn start_session(&self, request: &StartSession) -> Option<TrackingSession> {
        self.api
            .safe_call(self.api.post_json("/tracking/sessions/start", request))
            .await
    }

    async fn session_status(&self, session_id: &str) -> Option<TrackingSession> {
        let path = Self::session_path(session_id, "status");
        self.api.safe_call(self.api.get_json(&path, &[])).await
    }

    async fn session_steps(&self, session_id: &str) -> Option<Vec<TrackingStep>> {
        let path = Self::session_path(session_id, "steps");
        self.api.safe_call(self.api.get_json(&path, &[])).await
    }

    async fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        let path = Self::session_path(session_id, "summary");
        self.api.safe_call(self.api.get_json(&path, &[])).await
    }

    async fn session_events(&self, session_id: &str) -> Option<Vec<TrackingEvent>> {
        let path = Self::session_path(session_id, "events");
        let page: Option<EventsPage> = self.api.safe_call(self.api.get_json(&path, &[])).await?;
        Some(page.unwrap_or_default().events)
    }

    async fn apply_changes(&self, session_id: &str) -> Option<Value> {
        let path = Self::session_path(session_id, "apply");
        self.api
            .safe_call(self.api.post_json(&path, &json!({})))
            .await
    }

    async fn rollback_changes(&self, session_id: &str) -> Option<Value> {
        let path = Self::session_path(session_id, "rollback");
        self.api
            .safe_call(self.api.post_json(&path, &json!({})))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_paths_are_relative_to_api_base() {
        assert_eq!(
            RestTracking::session_path("t 1", "summary"),
            "/tracking/sessions/t%201/summary"
        );
    }

    #[test]
    fn test_events_page_tolerates_missing_list() {
        let page: EventsPage = serde_json::from_str("{}").unwrap();
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_none() {
        let (api, _) = crate::api::tests::test_client();
        let api = ApiClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/api/v1",
            api.credentials().clone(),
            api.notices().clone(),
        );
        let tracking = RestTracking::new(api);
        assert!(tracking.session_summary("t1").await.is_none());
    }
}
