use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantStatus {
    #[default]
    Idle,
    Generating,
    Completed,
    Error,
}

/// One tool invocation the assistant made while building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default)]
    pub output_text: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl PlanRequest {
    /// An empty context is left out of the request entirely.
    pub fn new(prompt: &str, context: Map<String, Value>) -> Self {
        Self {
            prompt: prompt.to_string(),
            context: (!context.is_empty()).then_some(context),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub required_data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    pub steps: Vec<PlanStep>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub missing_data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_suggestion: Option<String>,
}

/// Anything other than an array (null, an object, a string) reads as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => {
            serde_json::from_value(Value::Array(items)).map_err(serde::de::Error::custom)
        }
        _ => Ok(Vec::new()),
    }
}

/// Client-side record of one generation request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantSession {
    pub id: String,
    pub bot_id: Option<String>,
    pub status: AssistantStatus,
    pub prompt: String,
    pub context: Map<String, Value>,
    pub result: Option<GenerateResponse>,
    pub error: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub output_text: String,
    /// Server-side session id, once the backend has answered.
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssistantSession {
    pub fn new(
        id: String,
        prompt: &str,
        bot_id: Option<&str>,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            bot_id: bot_id.map(String::from),
            status: AssistantStatus::Idle,
            prompt: prompt.to_string(),
            context,
            result: None,
            error: None,
            tool_calls: Vec::new(),
            output_text: String::new(),
            session_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn request(&self) -> GenerateRequest {
        GenerateRequest {
            prompt: self.prompt.clone(),
            context: self.context.clone(),
            bot_id: self.bot_id.clone(),
        }
    }

    /// Fold a backend answer in. Returns the failure message when the
    /// backend reported `success: false`.
    pub fn absorb(&mut self, response: GenerateResponse) -> Option<String> {
        self.completed_at = Some(Utc::now());
        self.output_text = response.output_text.clone();
        self.tool_calls = response.tool_calls.clone();
        self.session_id = response.session_id.clone();
        let failure = (!response.success).then(|| {
            response
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Generation failed".to_string())
        });
        self.status = match failure {
            Some(_) => AssistantStatus::Error,
            None => AssistantStatus::Completed,
        };
        self.error = failure.clone();
        self.result = Some(response);
        failure
    }

    pub fn fail(&mut self, message: String) {
        self.status = AssistantStatus::Error;
        self.error = Some(message);
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssistantStats {
    pub total: usize,
    pub completed: usize,
    pub error: usize,
    pub generating: usize,
}
