//! Autonomous assistant: one-shot plan and build requests over REST, with a
//! client-side registry of build sessions.

pub mod backend;
pub mod types;

pub use backend::{AssistantBackend, RestAssistant};
pub use types::{
    AssistantSession, AssistantStats, AssistantStatus, GenerateRequest, GenerateResponse,
    PlanRequest, PlanResponse, PlanStep, ToolCall,
};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::auth::Credentials;
use crate::error::ClientError;
use crate::generation::prefixed_id;

#[derive(Debug, Clone, Default)]
pub struct PlanState {
    pub plan: Option<PlanResponse>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct AssistantState {
    sessions: HashMap<String, AssistantSession>,
    plan: PlanState,
}

/// Session registry plus the latest plan. Every backend call needs a
/// stored credential and fails with `NotAuthenticated` before any request
/// goes out when there is none.
pub struct AssistantStore {
    backend: Arc<dyn AssistantBackend>,
    credentials: Arc<Credentials>,
    state: RwLock<AssistantState>,
}

impl AssistantStore {
    pub fn new(backend: Arc<dyn AssistantBackend>, credentials: Arc<Credentials>) -> Self {
        Self {
            backend,
            credentials,
            state: RwLock::new(AssistantState::default()),
        }
    }

    fn require_token(&self) -> Result<(), ClientError> {
        match self.credentials.token() {
            Some(_) => Ok(()),
            None => Err(ClientError::NotAuthenticated),
        }
    }

    pub async fn plan(&self) -> PlanState {
        self.state.read().await.plan.clone()
    }

    /// Ask for a build plan. The stored plan is replaced only on success;
    /// a failure leaves the previous plan and records the error.
    pub async fn generate_plan(
        &self,
        prompt: &str,
        context: Map<String, Value>,
    ) -> Result<PlanResponse, ClientError> {
        if let Err(err) = self.require_token() {
            self.state.write().await.plan.error = Some(err.to_string());
            return Err(err);
        }
        {
            let mut state = self.state.write().await;
            state.plan.loading = true;
            state.plan.error = None;
        }

        let result = self.backend.plan(&PlanRequest::new(prompt, context)).await;

        let mut state = self.state.write().await;
        state.plan.loading = false;
        match &result {
            Ok(plan) => {
                tracing::info!(steps = plan.steps.len(), "assistant plan ready");
                state.plan.plan = Some(plan.clone());
            }
            Err(err) => state.plan.error = Some(err.to_string()),
        }
        result
    }

    pub async fn clear_plan(&self) {
        self.state.write().await.plan = PlanState::default();
    }

    /// Register an idle session and return its id (`autonomous-<ms>-<rand>`).
    pub async fn create_session(
        &self,
        prompt: &str,
        bot_id: Option<&str>,
        context: Map<String, Value>,
    ) -> String {
        let id = prefixed_id("autonomous");
        let session = AssistantSession::new(id.clone(), prompt, bot_id, context);
        self.state.write().await.sessions.insert(id.clone(), session);
        tracing::debug!(session_id = %id, "assistant session created");
        id
    }

    /// Run the build for `session_id`. The session ends `Completed` or
    /// `Error`; an unsuccessful reply comes back as `ClientError::Assistant`.
    pub async fn generate_bot(&self, session_id: &str) -> Result<GenerateResponse, ClientError> {
        let request = {
            let mut state = self.state.write().await;
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| ClientError::SessionNotFound(session_id.to_string()))?;
            if let Err(err) = self.require_token() {
                session.fail(err.to_string());
                return Err(err);
            }
            session.status = AssistantStatus::Generating;
            session.error = None;
            session.request()
        };

        let result = self.backend.generate(&request).await;

        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(session_id) else {
            tracing::debug!(session_id, "assistant session removed while generating");
            return result;
        };
        match result {
            Ok(response) => match session.absorb(response.clone()) {
                None => {
                    let tools = response.tool_calls.len();
                    tracing::info!(session_id, tools, "assistant build completed");
                    Ok(response)
                }
                Some(message) => {
                    tracing::warn!(session_id, error = %message, "assistant build failed");
                    Err(ClientError::Assistant(message))
                }
            },
            Err(err) => {
                session.fail(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn check_status(&self) -> Result<Value, ClientError> {
        self.require_token()?;
        self.backend.status().await
    }

    pub async fn test_assistant(&self) -> Result<Value, ClientError> {
        self.require_token()?;
        self.backend.test().await
    }

    pub async fn get_session(&self, session_id: &str) -> Option<AssistantSession> {
        self.state.read().await.sessions.get(session_id).cloned()
    }

    /// All sessions, oldest first.
    pub async fn all_sessions(&self) -> Vec<AssistantSession> {
        let mut sessions: Vec<_> = self.state.read().await.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn sessions_for_bot(&self, bot_id: &str) -> Vec<AssistantSession> {
        self.all_sessions()
            .await
            .into_iter()
            .filter(|s| s.bot_id.as_deref() == Some(bot_id))
            .collect()
    }

    pub async fn last_session_for_bot(&self, bot_id: &str) -> Option<AssistantSession> {
        self.sessions_for_bot(bot_id)
            .await
            .into_iter()
            .max_by_key(|s| s.created_at)
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<AssistantSession> {
        self.state.write().await.sessions.remove(session_id)
    }

    pub async fn clear_sessions(&self) {
        self.state.write().await.sessions.clear();
    }

    pub async fn stats(&self) -> AssistantStats {
        let state = self.state.read().await;
        let count = |status: AssistantStatus| {
            state.sessions.values().filter(|s| s.status == status).count()
        };
        AssistantStats {
            total: state.sessions.len(),
            completed: count(AssistantStatus::Completed),
            error: count(AssistantStatus::Error),
            generating: count(AssistantStatus::Generating),
        }
    }

    /// Tool calls recorded for the session; empty when it is unknown.
    pub async fn tool_history(&self, session_id: &str) -> Vec<ToolCall> {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map(|s| s.tool_calls.clone())
            .unwrap_or_default()
    }

    pub async fn is_session_active(&self, session_id: &str) -> bool {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .is_some_and(|s| s.status == AssistantStatus::Generating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_KEY;
    use crate::storage::{LocalStorage, MemoryStorage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeAssistant {
        generate_reply: Mutex<Option<GenerateResponse>>,
        requests: Mutex<Vec<GenerateRequest>>,
        calls: Mutex<usize>,
        release: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl AssistantBackend for FakeAssistant {
        async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ClientError> {
            *self.calls.lock().unwrap() += 1;
            if request.prompt.is_empty() {
                return Err(ClientError::Status {
                    status: 422,
                    body: "empty prompt".into(),
                });
            }
            Ok(PlanResponse {
                steps: vec![PlanStep {
                    name: "Create bot".into(),
                    action: "create_bot".into(),
                    required_data: vec![],
                    notes: None,
                }],
                missing_data: vec!["channel".into()],
                prompt_suggestion: None,
            })
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError> {
            *self.calls.lock().unwrap() += 1;
            self.requests.lock().unwrap().push(request.clone());
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.generate_reply
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ClientError::Transport("connection refused".into()))
        }

        async fn status(&self) -> Result<Value, ClientError> {
            *self.calls.lock().unwrap() += 1;
            Ok(json!({"ready": true}))
        }

        async fn test(&self) -> Result<Value, ClientError> {
            *self.calls.lock().unwrap() += 1;
            Ok(json!({"ok": true}))
        }
    }

    fn store_with(fake: FakeAssistant, signed_in: bool) -> (Arc<AssistantStore>, Arc<FakeAssistant>) {
        let storage = Arc::new(MemoryStorage::new());
        if signed_in {
            storage.set(TOKEN_KEY, "secret").unwrap();
        }
        let fake = Arc::new(fake);
        let store = AssistantStore::new(fake.clone(), Credentials::load(storage));
        (Arc::new(store), fake)
    }

    fn succeeded(output: &str) -> GenerateResponse {
        GenerateResponse {
            success: true,
            output_text: output.into(),
            tool_calls: vec![ToolCall {
                tool: "create_bot".into(),
                arguments: json!({"name": "Greeter"}),
                result: json!({"id": "b9"}),
                success: true,
                timestamp: None,
            }],
            session_id: Some("srv-1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generate_bot_completes_session_and_records_tools() {
        let fake = FakeAssistant::default();
        *fake.generate_reply.lock().unwrap() = Some(succeeded("built"));
        let (store, fake) = store_with(fake, true);

        let mut context = Map::new();
        context.insert("channel".into(), json!("c1"));
        let id = store.create_session("greet users", Some("b1"), context).await;
        assert!(id.starts_with("autonomous-"));

        let response = store.generate_bot(&id).await.unwrap();
        assert_eq!(response.output_text, "built");

        let session = store.get_session(&id).await.unwrap();
        assert_eq!(session.status, AssistantStatus::Completed);
        assert_eq!(session.session_id.as_deref(), Some("srv-1"));
        assert!(session.completed_at.is_some());
        assert_eq!(store.tool_history(&id).await[0].tool, "create_bot");

        let sent = fake.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.bot_id.as_deref(), Some("b1"));
        assert_eq!(sent.context.get("channel"), Some(&json!("c1")));
    }

    #[tokio::test]
    async fn test_unsuccessful_reply_marks_session_error() {
        let fake = FakeAssistant::default();
        *fake.generate_reply.lock().unwrap() = Some(GenerateResponse {
            error: Some("no channel".into()),
            ..Default::default()
        });
        let (store, _) = store_with(fake, true);
        let id = store.create_session("p", None, Map::new()).await;

        let err = store.generate_bot(&id).await.unwrap_err();
        assert!(matches!(err, ClientError::Assistant(ref m) if m == "no channel"));
        let session = store.get_session(&id).await.unwrap();
        assert_eq!(session.status, AssistantStatus::Error);
        assert_eq!(session.error.as_deref(), Some("no channel"));
    }

    #[tokio::test]
    async fn test_transport_failure_marks_session_error() {
        let (store, _) = store_with(FakeAssistant::default(), true);
        let id = store.create_session("p", None, Map::new()).await;

        assert!(matches!(
            store.generate_bot(&id).await,
            Err(ClientError::Transport(_))
        ));
        let session = store.get_session(&id).await.unwrap();
        assert_eq!(session.status, AssistantStatus::Error);
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_any_request() {
        let (store, fake) = store_with(FakeAssistant::default(), false);
        let id = store.create_session("p", None, Map::new()).await;

        assert!(matches!(
            store.generate_bot(&id).await,
            Err(ClientError::NotAuthenticated)
        ));
        assert!(matches!(
            store.generate_plan("p", Map::new()).await,
            Err(ClientError::NotAuthenticated)
        ));
        assert!(store.check_status().await.is_err());
        assert!(store.test_assistant().await.is_err());
        assert_eq!(*fake.calls.lock().unwrap(), 0);
        assert_eq!(
            store.get_session(&id).await.unwrap().status,
            AssistantStatus::Error
        );
        assert!(store.plan().await.error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_session_is_reported() {
        let (store, _) = store_with(FakeAssistant::default(), true);
        assert!(matches!(
            store.generate_bot("autonomous-0-missing").await,
            Err(ClientError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_is_active_only_while_generating() {
        let release = Arc::new(Notify::new());
        let fake = FakeAssistant {
            release: Some(release.clone()),
            ..Default::default()
        };
        *fake.generate_reply.lock().unwrap() = Some(succeeded("ok"));
        let (store, _) = store_with(fake, true);
        let id = store.create_session("p", Some("b1"), Map::new()).await;
        assert!(!store.is_session_active(&id).await);

        let task = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.generate_bot(&id).await })
        };
        for _ in 0..100 {
            if store.is_session_active(&id).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.is_session_active(&id).await);
        assert_eq!(store.stats().await.generating, 1);

        release.notify_one();
        task.await.unwrap().unwrap();
        assert!(!store.is_session_active(&id).await);
        assert_eq!(
            store.stats().await,
            AssistantStats {
                total: 1,
                completed: 1,
                error: 0,
                generating: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_sessions_for_bot_and_latest() {
        let (store, _) = store_with(FakeAssistant::default(), true);
        let first = store.create_session("one", Some("b1"), Map::new()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.create_session("other", Some("b2"), Map::new()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let last = store.create_session("two", Some("b1"), Map::new()).await;

        let for_bot: Vec<_> = store
            .sessions_for_bot("b1")
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(for_bot, vec![first.clone(), last.clone()]);
        assert_eq!(store.last_session_for_bot("b1").await.unwrap().id, last);
        assert!(store.last_session_for_bot("b3").await.is_none());

        assert!(store.remove_session(&first).await.is_some());
        assert_eq!(store.all_sessions().await.len(), 2);
        store.clear_sessions().await;
        assert_eq!(store.stats().await, AssistantStats::default());
        assert!(store.tool_history(&last).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_plan_keeps_previous_plan() {
        let (store, _) = store_with(FakeAssistant::default(), true);
        let plan = store.generate_plan("build", Map::new()).await.unwrap();
        assert_eq!(plan.missing_data, vec!["channel"]);

        assert!(store.generate_plan("", Map::new()).await.is_err());
        let state = store.plan().await;
        assert!(!state.loading);
        assert_eq!(state.plan, Some(plan));
        assert!(state.error.unwrap().contains("422"));

        store.clear_plan().await;
        assert!(store.plan().await.plan.is_none());
    }

    #[tokio::test]
    async fn test_status_calls_pass_through() {
        let (store, _) = store_with(FakeAssistant::default(), true);
        assert_eq!(store.check_status().await.unwrap(), json!({"ready": true}));
        assert_eq!(store.test_assistant().await.unwrap(), json!({"ok": true}));
    }
}
