//! AI bot-generation sessions over the `/ws/mcp` socket.
//!
//! Each session is keyed by a caller-chosen id. Inbound frames are decoded
//! into [`GenerationFrame`] and applied in arrival order by one pump task
//! per connection; outbound prompts go through the session's socket writer.

pub mod session;

pub use session::{
    AiEvent, GenerationFrame, GenerationSession, GenerationStatus, GenerationStep, StepStatus,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};

use crate::auth::Credentials;
use crate::error::ClientError;
use crate::socket::{Connector, Link, SocketEvent, redact, with_query};
use session::{NOT_AUTHENTICATED, SOCKET_ERROR};

pub const BUILD_MODE: &str = "build";

struct Entry {
    session: GenerationSession,
    link: Link,
}

type Sessions = Arc<RwLock<HashMap<String, Entry>>>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    Generate {
        prompt: &'a str,
        context: &'a Value,
    },
    Modify {
        prompt: &'a str,
        context: &'a Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<&'a str>,
    },
}

pub struct GenerationManager {
    connector: Arc<dyn Connector>,
    base_url: String,
    credentials: Arc<Credentials>,
    sessions: Sessions,
    next_conn: AtomicU64,
}

impl GenerationManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        base_url: impl Into<String>,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            connector,
            base_url: base_url.into(),
            credentials,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_conn: AtomicU64::new(1),
        }
    }

    /// Open a generation socket for `session_id`. A no-op while the session
    /// has a live socket; otherwise the session starts over.
    ///
    /// Failures (no credential, socket refused) are recorded on the session
    /// as status `error` and reported by returning `false`.
    pub async fn connect(&self, session_id: &str, bot_id: &str) -> bool {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let token = self.credentials.token();

        let backend_session_id = {
            let mut sessions = self.sessions.write().await;
            if sessions.get(session_id).is_some_and(|e| e.link.is_live()) {
                tracing::debug!(session_id, "generation socket already live");
                return true;
            }

            let mut session = GenerationSession::new(session_id, bot_id);
            if token.is_none() {
                tracing::error!(session_id, "cannot open generation socket without a token");
                session.fail(NOT_AUTHENTICATED);
                sessions.insert(
                    session_id.to_string(),
                    Entry {
                        session,
                        link: Link::Idle,
                    },
                );
                return false;
            }

            let backend_session_id = correlation_id();
            session.backend_session_id = Some(backend_session_id.clone());
            sessions.insert(
                session_id.to_string(),
                Entry {
                    session,
                    link: Link::Connecting(conn_id),
                },
            );
            backend_session_id
        };

        let token = token.unwrap_or_default();
        let url = with_query(
            &self.base_url,
            &[
                ("session_id", backend_session_id.as_str()),
                ("bot_id", bot_id),
                ("token", token.as_str()),
            ],
        );
        tracing::info!(session_id, %backend_session_id, url = redact(&url), "connecting generation socket");

        let conn = match self.connector.connect(&url).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(session_id, error = %e, "generation socket failed to open");
                let mut sessions = self.sessions.write().await;
                if let Some(entry) = sessions.get_mut(session_id) {
                    if entry.link.conn_id() == Some(conn_id) {
                        entry.link = Link::Idle;
                        entry.session.fail(SOCKET_ERROR);
                    }
                }
                return false;
            }
        };

        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(session_id) {
                Some(entry) if entry.link.conn_id() == Some(conn_id) => {
                    entry.link = Link::Open {
                        conn_id,
                        outbound: conn.outbound,
                    };
                }
                _ => {
                    tracing::debug!(session_id, "session dropped while connecting");
                    return false;
                }
            }
        }

        tokio::spawn(pump(
            self.sessions.clone(),
            session_id.to_string(),
            conn_id,
            conn.inbound,
        ));
        true
    }

    /// Ask for a new bot (`mode == "build"`) or a change to an existing one.
    pub async fn send_prompt(
        &self,
        session_id: &str,
        prompt: &str,
        context: &Value,
        mode: &str,
    ) -> Result<(), ClientError> {
        let frame = if mode == BUILD_MODE {
            OutboundFrame::Generate { prompt, context }
        } else {
            OutboundFrame::Modify {
                prompt,
                context,
                mode: None,
            }
        };
        self.send(session_id, &frame).await
    }

    pub async fn send_modification_prompt(
        &self,
        session_id: &str,
        prompt: &str,
        context: &Value,
        mode: &str,
    ) -> Result<(), ClientError> {
        let frame = OutboundFrame::Modify {
            prompt,
            context,
            mode: Some(mode),
        };
        self.send(session_id, &frame).await
    }

    /// Hand `frame` to the socket writer; the session only moves to
    /// `generating` once the writer has accepted it.
    async fn send(&self, session_id: &str, frame: &OutboundFrame<'_>) -> Result<(), ClientError> {
        let (conn_id, outbound) = {
            let sessions = self.sessions.read().await;
            let Some(entry) = sessions.get(session_id) else {
                tracing::error!(session_id, "no generation session");
                return Err(ClientError::SessionNotFound(session_id.to_string()));
            };
            match (entry.link.conn_id(), entry.link.outbound()) {
                (Some(conn_id), Some(outbound)) => (conn_id, outbound.clone()),
                _ => {
                    tracing::error!(session_id, "generation socket not connected");
                    return Err(ClientError::NotConnected(session_id.to_string()));
                }
            }
        };

        let text = serde_json::to_string(frame)?;
        if outbound.send(text).await.is_err() {
            tracing::error!(session_id, "generation socket writer closed");
            return Err(ClientError::NotConnected(session_id.to_string()));
        }

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            if entry.link.conn_id() == Some(conn_id) {
                entry.session.status = GenerationStatus::Generating;
            }
        }
        Ok(())
    }

    pub async fn disconnect(&self, session_id: &str) {
        if let Some(entry) = self.sessions.write().await.remove(session_id) {
            if entry.link.is_live() {
                tracing::info!(session_id, "closing generation socket");
            }
        }
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn get_session(&self, session_id: &str) -> Option<GenerationSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|e| e.session.clone())
    }

    pub async fn get_steps(&self, session_id: &str) -> Vec<GenerationStep> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|e| e.session.steps.clone())
            .unwrap_or_default()
    }
}

/// `mcp-session-{millis}-{8 base36 chars}`.
fn correlation_id() -> String {
    prefixed_id("mcp-session")
}

/// `{prefix}-{millis}-{8 base36 chars}`.
pub(crate) fn prefixed_id(prefix: &str) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut bytes = [0u8; 8];
    if let Err(e) = getrandom::fill(&mut bytes) {
        tracing::warn!(error = %e, "os randomness unavailable, using uuid bytes");
        bytes.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
    }
    let suffix: String = bytes
        .iter()
        .map(|b| ALPHABET[usize::from(*b) % ALPHABET.len()] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}

async fn pump(
    sessions: Sessions,
    session_id: String,
    conn_id: u64,
    mut inbound: mpsc::Receiver<SocketEvent>,
) {
    while let Some(event) = inbound.recv().await {
        if !handle_event(&sessions, &session_id, conn_id, event).await {
            return;
        }
    }
    handle_event(&sessions, &session_id, conn_id, SocketEvent::Closed).await;
}

async fn handle_event(
    sessions: &Sessions,
    session_id: &str,
    conn_id: u64,
    event: SocketEvent,
) -> bool {
    let mut sessions = sessions.write().await;
    let Some(entry) = sessions.get_mut(session_id) else {
        return false;
    };
    if entry.link.conn_id() != Some(conn_id) {
        return false;
    }
    let session = &mut entry.session;

    match event {
        SocketEvent::Opened => {
            session.connected = true;
            // A prompt may already have been accepted by the writer.
            if session.status == GenerationStatus::Connecting {
                session.status = GenerationStatus::Connected;
            }
            tracing::info!(session_id, "generation socket connected");
        }
        SocketEvent::Frame(text) => match decode(&text) {
            Ok(GenerationFrame::Unrecognized) => {
                let kind = serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned));
                tracing::debug!(session_id, ?kind, "ignoring unknown generation frame");
            }
            Ok(frame) => session.apply(frame),
            Err(e) => tracing::warn!(session_id, error = %e, "failed to parse generation frame"),
        },
        SocketEvent::Error(e) => {
            tracing::error!(session_id, error = %e, "generation socket error");
            session.fail(SOCKET_ERROR);
        }
        SocketEvent::Closed => {
            session.connected = false;
            entry.link = Link::Idle;
            tracing::info!(session_id, "generation socket closed");
            return false;
        }
    }
    true
}

fn decode(text: &str) -> Result<GenerationFrame, serde_json::Error> {
    serde_json::from_str(text)
}
