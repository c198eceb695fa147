use async_trait::async_trait;
use serde_json::{Value, json};

use super::types::{GenerateRequest, GenerateResponse, PlanRequest, PlanResponse};
use crate::api::ApiClient;
use crate::error::ClientError;

const BASE: &str = "/autonomous-assistant";

/// The assistant's REST surface. Errors come back intact so the store can
/// record why a plan or session failed; they have already been reported.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ClientError>;
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError>;
    async fn status(&self) -> Result<Value, ClientError>;
    async fn test(&self) -> Result<Value, ClientError>;
}

pub struct RestAssistant {
    api: ApiClient,
}

impl RestAssistant {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn path(tail: &str) -> String {
        format!("{BASE}/{tail}")
    }
}

#[async_trait]
impl AssistantBackend for RestAssistant {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ClientError> {
        let path = Self::path("plan");
        self.api
            .reported_call(self.api.post_json(&path, request))
            .await
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError> {
        let path = Self::path("generate");
        self.api
            .reported_call(self.api.post_json(&path, request))
            .await
    }

    async fn status(&self) -> Result<Value, ClientError> {
        let path = Self::path("status");
        self.api.reported_call(self.api.get_json(&path, &[])).await
    }

    async fn test(&self) -> Result<Value, ClientError> {
        let path = Self::path("test");
        self.api
            .reported_call(self.api.post_json(&path, &json!({})))
            .await
    }
}
