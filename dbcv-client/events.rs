use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

pub const INSUFFICIENT_RIGHTS: &str = "Insufficient rights!";
pub const REQUEST_FAILED: &str = "Request failed!";

/// Cross-cutting notices raised at the transport boundary and by the
/// route guard. A front-end subscribes and renders them.
#[derive(Debug, Clone, Serialize)]
pub struct ClientNotice {
    pub kind: NoticeKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The stored credential was rejected; the front-end should show login.
    LoginRequired,
    Error,
}

impl ClientNotice {
    pub fn login_required() -> Self {
        Self {
            kind: NoticeKind::LoginRequired,
            message: "/login".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

pub type NoticeSender = broadcast::Sender<ClientNotice>;

pub fn notice_channel() -> NoticeSender {
    let (tx, _) = broadcast::channel(64);
    tx
}

/// Publish without caring whether anyone listens.
pub fn publish(tx: &NoticeSender, notice: ClientNotice) {
    if tx.send(notice).is_err() {
        tracing::trace!("no notice subscribers");
    }
}
