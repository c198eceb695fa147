use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::execution::session::message_text;

pub const SOCKET_ERROR: &str = "WebSocket connection error";
pub const NOT_AUTHENTICATED: &str = "User not authenticated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Connecting,
    Connected,
    Generating,
    Completed,
    Error,
}

impl GenerationStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStep {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tool_used: String,
    pub reasoning: String,
    pub status: StepStatus,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub input_data: Value,
    pub output_data: Option<Value>,
}

/// Payload shared by the `ai_*` frames; every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AiEvent {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub success: Option<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub step: Option<Value>,
    #[serde(default)]
    pub total_steps: Option<Value>,
}

impl AiEvent {
    /// `message` as display text; non-string payloads are rendered as JSON.
    pub fn message_text(&self) -> String {
        self.message.as_ref().map(message_text).unwrap_or_default()
    }
}

/// Inbound frame on the generation socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationFrame {
    Status {
        #[serde(default)]
        message: Option<Value>,
    },
    AiThinking(AiEvent),
    AiAction(AiEvent),
    AiResult(AiEvent),
    AiWarning(AiEvent),
    AiError(AiEvent),
    AiCompletion(AiEvent),
    Completion {
        #[serde(default)]
        result: Value,
    },
    Error {
        #[serde(default)]
        error: Value,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSession {
    pub session_id: String,
    pub bot_id: String,
    /// Correlation id sent to the backend, distinct from `session_id`.
    pub backend_session_id: Option<String>,
    pub steps: Vec<GenerationStep>,
    /// Index into `steps` of the step awaiting its `ai_result`.
    pub current_step: Option<usize>,
    pub connected: bool,
    pub status: GenerationStatus,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl GenerationSession {
    pub fn new(session_id: &str, bot_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            bot_id: bot_id.to_string(),
            ..Default::default()
        }
    }

    pub fn current_step(&self) -> Option<&GenerationStep> {
        self.current_step.and_then(|i| self.steps.get(i))
    }

    pub fn fail(&mut self, error: impl Into<Value>) {
        self.status = GenerationStatus::Error;
        self.error = Some(error.into());
    }

    pub fn apply(&mut self, frame: GenerationFrame) {
        match frame {
            GenerationFrame::Status { message } => {
                tracing::debug!(session_id = %self.session_id, ?message, "generation status");
                self.status = GenerationStatus::Generating;
            }
            GenerationFrame::AiThinking(ev) => {
                let step = GenerationStep {
                    id: step_id("ai-thinking"),
                    name: "AI analysis".to_string(),
                    description: ev.message_text(),
                    tool_used: "ai_brain".to_string(),
                    reasoning: reasoning_or(&ev, "AI is analysing the request"),
                    status: StepStatus::Running,
                    progress: 25,
                    start_time: Utc::now(),
                    end_time: None,
                    input_data: json!({
                        "reasoning": ev.reasoning,
                        "timestamp": ev.timestamp,
                    }),
                    output_data: None,
                };
                self.open_step(step);
            }
            GenerationFrame::AiAction(ev) => {
                let step = GenerationStep {
                    id: step_id("ai-action"),
                    name: ev.tool_used.clone().unwrap_or_else(|| "AI action".to_string()),
                    description: ev.message_text(),
                    tool_used: ev.tool_used.clone().unwrap_or_else(|| "ai_tool".to_string()),
                    reasoning: reasoning_or(&ev, "AI is performing an action"),
                    status: StepStatus::Running,
                    progress: 50,
                    start_time: Utc::now(),
                    end_time: None,
                    input_data: json!({
                        "tool_used": ev.tool_used,
                        "reasoning": ev.reasoning,
                        "step": ev.step,
                        "total_steps": ev.total_steps,
                        "timestamp": ev.timestamp,
                    }),
                    output_data: None,
                };
                self.open_step(step);
            }
            GenerationFrame::AiResult(ev) => {
                let Some(step) = self.current_step.and_then(|i| self.steps.get_mut(i)) else {
                    tracing::debug!(session_id = %self.session_id, "ai_result with no open step");
                    return;
                };
                step.status = StepStatus::Completed;
                step.progress = 100;
                step.end_time = Some(Utc::now());
                step.output_data = Some(json!({
                    "tool_result": ev.tool_result,
                    "success": ev.success,
                    "message": ev.message,
                    "timestamp": ev.timestamp,
                }));
                self.current_step = None;
            }
            GenerationFrame::AiWarning(ev) => {
                let now = Utc::now();
                self.steps.push(GenerationStep {
                    id: step_id("ai-warning"),
                    name: "AI warning".to_string(),
                    description: ev.message_text(),
                    tool_used: "ai_warning".to_string(),
                    reasoning: reasoning_or(&ev, "AI detected a problem"),
                    status: StepStatus::Completed,
                    progress: 100,
                    start_time: now,
                    end_time: Some(now),
                    input_data: json!({
                        "reasoning": ev.reasoning,
                        "timestamp": ev.timestamp,
                    }),
                    output_data: Some(json!({
                        "warning": ev.message,
                        "reasoning": ev.reasoning,
                    })),
                });
            }
            GenerationFrame::AiError(ev) => {
                let error = ev
                    .error
                    .clone()
                    .filter(|e| !e.is_null())
                    .or_else(|| ev.message.clone().filter(|m| !m.is_null()))
                    .unwrap_or(Value::Null);
                self.fail(error);

                let now = Utc::now();
                self.steps.push(GenerationStep {
                    id: step_id("ai-error"),
                    name: "AI error".to_string(),
                    description: ev.message_text(),
                    tool_used: "ai_error".to_string(),
                    reasoning: "AI encountered an error".to_string(),
                    status: StepStatus::Completed,
                    progress: 100,
                    start_time: now,
                    end_time: Some(now),
                    input_data: json!({
                        "error": ev.error,
                        "timestamp": ev.timestamp,
                    }),
                    output_data: Some(json!({
                        "error": ev.error,
                        "message": ev.message,
                    })),
                });
            }
            GenerationFrame::AiCompletion(ev) => {
                self.status = GenerationStatus::Completed;
                self.result = Some(completion_result(&ev));
            }
            GenerationFrame::Completion { result } => {
                self.status = GenerationStatus::Completed;
                self.result = Some(result);
            }
            GenerationFrame::Error { error } => self.fail(error),
            GenerationFrame::Unrecognized => {}
        }
    }

    /// Thinking and action events each start an independent step; the
    /// previous current step stays as it was.
    fn open_step(&mut self, step: GenerationStep) {
        self.steps.push(step);
        self.current_step = Some(self.steps.len() - 1);
    }
}

fn step_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

fn reasoning_or(ev: &AiEvent, default: &str) -> String {
    ev.reasoning
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn completion_result(ev: &AiEvent) -> Value {
    let summary = ev.summary.clone().unwrap_or(Value::Null);
    let count = |key: &str| summary.get(key).and_then(Value::as_u64).unwrap_or(0);
    json!({
        "success": summary.get("overall_success").and_then(Value::as_bool).unwrap_or(true),
        "message": ev.message,
        "summary": summary,
        "ai_reasoning": summary.get("ai_reasoning"),
        "tool_history": summary.get("tool_history").cloned().unwrap_or_else(|| json!([])),
        "total_actions": count("total_actions"),
        "successful_actions": count("successful_actions"),
        "failed_actions": count("failed_actions"),
    })
}
