//! Non-CRUD endpoints: step runs, request execution, channel subscriptions
//! and messages, template-group membership, credential catalogues and the
//! one-shot generation calls.

use reqwest::multipart::Form;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{ApiClient, ResourceKind};
use crate::socket::{encode_component, with_query};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStepRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpRequest {
    pub prompt: String,
    pub context: Value,
    pub bot_id: String,
}

impl ApiClient {
    pub async fn run_step(&self, step_id: &str, request: &RunStepRequest) -> Option<Value> {
        let path = format!("{}/run", ResourceKind::Steps.item_path(step_id));
        self.safe_call(self.post_json(&path, request)).await
    }

    pub async fn execute_request(
        &self,
        request_id: &str,
        bot_id: &str,
        variables: Option<Map<String, Value>>,
        dry_run: bool,
    ) -> Option<Value> {
        let path = format!("{}/execute", ResourceKind::Requests.item_path(request_id));
        let body = execute_body(bot_id, variables, dry_run);
        self.safe_call(self.post_json(&path, &body)).await
    }

    /// A page of the channel's messages; unset bounds are left to the server.
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        skip: Option<u32>,
        limit: Option<u32>,
    ) -> Option<Vec<Value>> {
        let path = format!("{}/messages", ResourceKind::Channels.item_path(channel_id));
        self.safe_call(self.get_json(&path, &page_query(skip, limit)))
            .await
    }

    /// Subscribe `bot_ids` to the channel. The body is the bare id array.
    pub async fn subscribe_channel(&self, channel_id: &str, bot_ids: &[String]) -> Option<Value> {
        let path = format!("{}/subscribe", ResourceKind::Channels.item_path(channel_id));
        self.safe_call(self.post_json(&path, bot_ids)).await
    }

    pub async fn unsubscribe_channel(&self, channel_id: &str, bot_ids: &[String]) -> Option<Value> {
        let path = format!("{}/unsubscribe", ResourceKind::Channels.item_path(channel_id));
        self.safe_call(self.post_json(&path, bot_ids)).await
    }

    /// Post `text` into a channel as the signed-in user (multipart form).
    pub async fn send_message(&self, text: &str, channel_id: &str) -> Option<Value> {
        let form = Form::new()
            .text("text", text.to_string())
            .text("channel_id", channel_id.to_string());
        self.safe_call(self.post_multipart("/messages/send_message", form))
            .await
    }

    pub async fn add_template_to_group(&self, group_id: &str, template_id: &str) -> Option<Value> {
        let path = membership_path(group_id, "add_template", template_id);
        self.safe_call(self.post_empty(&path)).await
    }

    pub async fn remove_template_from_group(
        &self,
        group_id: &str,
        template_id: &str,
    ) -> Option<Value> {
        let path = membership_path(group_id, "remove_template", template_id);
        self.safe_call(self.post_empty(&path)).await
    }

    /// Instantiate a template inside `bot_id`.
    pub async fn create_template_instance(&self, bot_id: &str, data: &Value) -> Option<Value> {
        let path = with_query(
            &ResourceKind::TemplateInstances.collection_path(),
            &[("bot_id", bot_id)],
        );
        self.safe_call(self.post_json(&path, data)).await
    }

    pub async fn credential_providers(&self) -> Option<Value> {
        self.safe_call(self.get_json("/credentials/providers", &[])).await
    }

    /// Auth strategies, optionally only those of `provider`.
    pub async fn credential_strategies(&self, provider: Option<&str>) -> Option<Value> {
        let query: Vec<(String, String)> = provider
            .filter(|p| !p.is_empty())
            .map(|p| ("provider".to_string(), p.to_string()))
            .into_iter()
            .collect();
        self.safe_call(self.get_json("/credentials/strategies", &query))
            .await
    }

    pub async fn mcp_build(&self, request: &McpRequest) -> Option<Value> {
        self.safe_call(self.post_json("/mcp/build", request)).await
    }

    pub async fn mcp_draft(&self, request: &McpRequest) -> Option<Value> {
        self.safe_call(self.post_json("/mcp/draft", request)).await
    }
}

fn page_query(skip: Option<u32>, limit: Option<u32>) -> Vec<(String, String)> {
    [("skip", skip), ("limit", limit)]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.to_string())))
        .collect()
}

fn membership_path(group_id: &str, action: &str, template_id: &str) -> String {
    format!(
        "{}/{action}/{}",
        ResourceKind::TemplateGroups.item_path(group_id),
        encode_component(template_id)
    )
}

fn execute_body(bot_id: &str, variables: Option<Map<String, Value>>, dry_run: bool) -> Value {
    json!({
        "variables": variables.unwrap_or_default(),
        "bot_id": bot_id,
        "dry_run": dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{serve, test_client_at};

    #[test]
    fn test_run_step_request_omits_unset_fields() {
        let req = RunStepRequest {
            bot_id: Some("b1".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"bot_id": "b1"}));
    }

    #[test]
    fn test_execute_body_defaults_variables() {
        assert_eq!(
            execute_body("b1", None, true),
            json!({"variables": {}, "bot_id": "b1", "dry_run": true})
        );
    }

    #[test]
    fn test_page_query_keeps_only_given_bounds() {
        assert!(page_query(None, None).is_empty());
        assert_eq!(
            page_query(Some(20), None),
            vec![("skip".to_string(), "20".to_string())]
        );
    }

    #[tokio::test]
    async fn test_channel_calls_carry_bot_ids_and_paging() {
        let (url, server) = serve(vec!["[]", "{}", "{}"]).await;
        let (api, _) = test_client_at(&url);
        let bots = vec!["b1".to_string(), "b2".to_string()];

        assert_eq!(api.channel_messages("c1", Some(10), Some(5)).await, Some(vec![]));
        assert!(api.subscribe_channel("c1", &bots).await.is_some());
        assert!(api.unsubscribe_channel("c1", &bots[..1]).await.is_some());

        let seen = server.await.unwrap();
        assert_eq!(
            seen[0].request_line(),
            "GET /api/v1/channels/c1/messages?skip=10&limit=5 HTTP/1.1"
        );
        assert_eq!(seen[1].request_line(), "POST /api/v1/channels/c1/subscribe HTTP/1.1");
        assert_eq!(seen[1].json(), json!(["b1", "b2"]));
        assert_eq!(seen[2].request_line(), "POST /api/v1/channels/c1/unsubscribe HTTP/1.1");
        assert_eq!(seen[2].json(), json!(["b1"]));
    }

    #[tokio::test]
    async fn test_credential_strategies_filters_by_provider() {
        let (url, server) = serve(vec!["[]", "[]"]).await;
        let (api, _) = test_client_at(&url);

        assert!(api.credential_strategies(Some("google")).await.is_some());
        assert!(api.credential_strategies(None).await.is_some());

        let seen = server.await.unwrap();
        assert_eq!(
            seen[0].request_line(),
            "GET /api/v1/credentials/strategies?provider=google HTTP/1.1"
        );
        assert_eq!(seen[1].request_line(), "GET /api/v1/credentials/strategies HTTP/1.1");
    }

    #[tokio::test]
    async fn test_send_message_posts_multipart_fields() {
        let (url, server) = serve(vec![r#"{"id":"m1"}"#]).await;
        let (api, _) = test_client_at(&url);

        let reply = api.send_message("hello", "c1").await;
        assert_eq!(reply, Some(json!({"id": "m1"})));

        let seen = server.await.unwrap();
        assert_eq!(seen[0].request_line(), "POST /api/v1/messages/send_message HTTP/1.1");
        assert!(seen[0].head.to_ascii_lowercase().contains("multipart/form-data"));
        assert!(seen[0].body.contains(r#"name="text""#));
        assert!(seen[0].body.contains("hello"));
        assert!(seen[0].body.contains(r#"name="channel_id""#));
    }

    #[tokio::test]
    async fn test_template_membership_and_instance_paths() {
        let (url, server) = serve(vec!["true", "true", r#"{"id":"ti1"}"#]).await;
        let (api, _) = test_client_at(&url);

        assert!(api.add_template_to_group("g1", "t 1").await.is_some());
        assert!(api.remove_template_from_group("g1", "t2").await.is_some());
        assert!(api
            .create_template_instance("bot/1", &json!({"template_id": "t2"}))
            .await
            .is_some());

        let seen = server.await.unwrap();
        assert_eq!(
            seen[0].request_line(),
            "POST /api/v1/template_group/g1/add_template/t%201 HTTP/1.1"
        );
        assert_eq!(
            seen[1].request_line(),
            "POST /api/v1/template_group/g1/remove_template/t2 HTTP/1.1"
        );
        assert_eq!(
            seen[2].request_line(),
            "POST /api/v1/template_instance/?bot_id=bot%2F1 HTTP/1.1"
        );
        assert_eq!(seen[2].json(), json!({"template_id": "t2"}));
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_none() {
        let (api, _) = crate::api::tests::test_client();
        let api = ApiClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            api.credentials().clone(),
            api.notices().clone(),
        );
        assert!(api.run_step("s1", &RunStepRequest::default()).await.is_none());
    }
}
