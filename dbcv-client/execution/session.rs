use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_LEVEL: &str = "INFO";

/// Inbound frame on the bot execution socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionFrame {
    Variables {
        #[serde(default)]
        message: Value,
    },
    Logs {
        #[serde(default)]
        message: Value,
        #[serde(default)]
        step_id: Option<Value>,
        #[serde(default)]
        level: Option<String>,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSession {
    pub bot_id: String,
    pub variables: Map<String, Value>,
    pub logs: Vec<String>,
    pub step_logs: HashMap<String, Vec<StepLogEntry>>,
    pub connected: bool,
}

impl ExecutionSession {
    pub fn new(bot_id: &str, initial_variables: Map<String, Value>) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            variables: initial_variables,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, frame: ExecutionFrame) {
        match frame {
            ExecutionFrame::Variables { message } => {
                // Full replacement: keys missing from the snapshot are gone.
                self.variables = match message {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
            }
            ExecutionFrame::Logs {
                message,
                step_id,
                level,
            } => {
                let message = message_text(&message);
                self.logs.push(message.clone());

                if let Some(step_id) = step_id.as_ref().and_then(step_key) {
                    let level = level
                        .filter(|l| !l.is_empty())
                        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
                    self.step_logs.entry(step_id).or_default().push(StepLogEntry {
                        level,
                        message,
                        timestamp: Utc::now(),
                    });
                }
            }
            ExecutionFrame::Unrecognized => {
                tracing::debug!(bot_id = %self.bot_id, "ignoring unrecognized execution frame");
            }
        }
    }

    pub fn step_logs(&self, step_id: &str) -> &[StepLogEntry] {
        self.step_logs.get(step_id).map(Vec::as_slice).unwrap_or_default()
    }
}

pub(crate) fn message_text(message: &Value) -> String {
    match message {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Step ids arrive as strings or numbers; empty and null mean "no step".
fn step_key(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(v: Value) -> ExecutionFrame {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_variables_are_replaced_not_merged() {
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(frame(json!({"type": "variables", "message": {"a": 1}})));
        s.apply(frame(json!({"type": "variables", "message": {"b": 2}})));
        assert_eq!(Value::Object(s.variables), json!({"b": 2}));
    }

    #[test]
    fn test_non_object_variables_clear_mapping() {
        let mut initial = Map::new();
        initial.insert("x".into(), json!(1));
        let mut s = ExecutionSession::new("b1", initial);
        s.apply(frame(json!({"type": "variables", "message": null})));
        assert!(s.variables.is_empty());
    }

    #[test]
    fn test_logs_without_step_only_go_to_session_log() {
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(frame(json!({"type": "logs", "message": "started"})));
        assert_eq!(s.logs, vec!["started"]);
        assert!(s.step_logs.is_empty());
    }

    #[test]
    fn test_step_logs_created_lazily_with_default_level() {
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(frame(json!({"type": "logs", "message": "one", "step_id": "s1"})));
        s.apply(frame(
            json!({"type": "logs", "message": "two", "step_id": "s1", "level": "ERROR"}),
        ));
        s.apply(frame(json!({"type": "logs", "message": "three", "step_id": 7})));

        let s1 = s.step_logs("s1");
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].level, "INFO");
        assert_eq!(s1[1].level, "ERROR");
        assert_eq!(s1[1].message, "two");
        assert_eq!(s.step_logs("7").len(), 1);
        assert_eq!(s.logs.len(), 3);
    }

    #[test]
    fn test_empty_step_id_is_ignored() {
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(frame(json!({"type": "logs", "message": "m", "step_id": ""})));
        s.apply(frame(json!({"type": "logs", "message": "m", "step_id": null})));
        assert!(s.step_logs.is_empty());
    }

    #[test]
    fn test_unknown_step_has_no_logs() {
        let s = ExecutionSession::new("b1", Map::new());
        assert!(s.step_logs("missing").is_empty());
    }

    #[test]
    fn test_unknown_frame_type_is_unrecognized() {
        let f = frame(json!({"type": "heartbeat", "message": 1}));
        assert_eq!(f, ExecutionFrame::Unrecognized);
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(f);
        assert!(s.logs.is_empty());
    }

    #[test]
    fn test_structured_log_message_is_serialized() {
        let mut s = ExecutionSession::new("b1", Map::new());
        s.apply(frame(json!({"type": "logs", "message": {"k": "v"}})));
        assert_eq!(s.logs, vec![r#"{"k":"v"}"#]);
    }
}
