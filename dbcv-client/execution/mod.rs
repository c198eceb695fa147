//! Live execution logs and variables per bot, fed by the `/ws/bot` socket.

pub mod session;

pub use session::{ExecutionFrame, ExecutionSession, StepLogEntry};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tokio::sync::{RwLock, mpsc};

use crate::socket::{Connector, Link, SocketEvent, redact, with_query};

struct Entry {
    session: ExecutionSession,
    link: Link,
}

type Sessions = Arc<RwLock<HashMap<String, Entry>>>;

pub struct ExecutionLogManager {
    connector: Arc<dyn Connector>,
    base_url: String,
    sessions: Sessions,
    next_conn: AtomicU64,
}

impl ExecutionLogManager {
    pub fn new(connector: Arc<dyn Connector>, base_url: impl Into<String>) -> Self {
        Self {
            connector,
            base_url: base_url.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_conn: AtomicU64::new(1),
        }
    }

    /// Open the execution socket for `bot_id`.
    ///
    /// A no-op while the bot already has a connecting or open socket. A bot
    /// whose socket closed reconnects: its logs are kept and its variables
    /// reset to `initial_variables`. Returns whether a socket is live.
    pub async fn connect(
        &self,
        bot_id: &str,
        token: &str,
        initial_variables: Map<String, Value>,
    ) -> bool {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(bot_id) {
                Some(entry) if entry.link.is_live() => {
                    tracing::debug!(bot_id, "execution socket already live");
                    return true;
                }
                Some(entry) => {
                    entry.session.variables = initial_variables;
                    entry.link = Link::Connecting(conn_id);
                }
                None => {
                    sessions.insert(
                        bot_id.to_string(),
                        Entry {
                            session: ExecutionSession::new(bot_id, initial_variables),
                            link: Link::Connecting(conn_id),
                        },
                    );
                }
            }
        }

        let url = with_query(&self.base_url, &[("bot_id", bot_id), ("token", token)]);
        tracing::info!(bot_id, url = redact(&url), "connecting execution socket");

        let conn = match self.connector.connect(&url).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(bot_id, error = %e, "execution socket failed to open");
                let mut sessions = self.sessions.write().await;
                if let Some(entry) = sessions.get_mut(bot_id) {
                    if entry.link.conn_id() == Some(conn_id) {
                        entry.link = Link::Idle;
                        entry.session.connected = false;
                    }
                }
                return false;
            }
        };

        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(bot_id) {
                Some(entry) if entry.link.conn_id() == Some(conn_id) => {
                    entry.link = Link::Open {
                        conn_id,
                        outbound: conn.outbound,
                    };
                }
                _ => {
                    tracing::debug!(bot_id, "session dropped while connecting");
                    return false;
                }
            }
        }

        tokio::spawn(pump(
            self.sessions.clone(),
            bot_id.to_string(),
            conn_id,
            conn.inbound,
        ));
        true
    }

    /// Close the socket (if any) and forget the session.
    pub async fn disconnect(&self, bot_id: &str) {
        if let Some(entry) = self.sessions.write().await.remove(bot_id) {
            if entry.link.is_live() {
                tracing::info!(bot_id, "closing execution socket");
            }
        }
    }

    pub async fn remove_bot(&self, bot_id: &str) {
        self.sessions.write().await.remove(bot_id);
    }

    /// Snapshot of the bot's session.
    pub async fn get_bot(&self, bot_id: &str) -> Option<ExecutionSession> {
        self.sessions
            .read()
            .await
            .get(bot_id)
            .map(|e| e.session.clone())
    }

    pub async fn get_step_logs(&self, bot_id: &str, step_id: &str) -> Vec<StepLogEntry> {
        self.sessions
            .read()
            .await
            .get(bot_id)
            .map(|e| e.session.step_logs(step_id).to_vec())
            .unwrap_or_default()
    }

    pub async fn is_connected(&self, bot_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(bot_id)
            .is_some_and(|e| e.session.connected)
    }
}

async fn pump(
    sessions: Sessions,
    bot_id: String,
    conn_id: u64,
    mut inbound: mpsc::Receiver<SocketEvent>,
) {
    while let Some(event) = inbound.recv().await {
        if !handle_event(&sessions, &bot_id, conn_id, event).await {
            return;
        }
    }
    handle_event(&sessions, &bot_id, conn_id, SocketEvent::Closed).await;
}

/// Apply one socket event; `false` once the pump should stop.
async fn handle_event(sessions: &Sessions, bot_id: &str, conn_id: u64, event: SocketEvent) -> bool {
    let mut sessions = sessions.write().await;
    let Some(entry) = sessions.get_mut(bot_id) else {
        return false;
    };
    if entry.link.conn_id() != Some(conn_id) {
        return false;
    }

    match event {
        SocketEvent::Opened => {
            entry.session.connected = true;
            tracing::info!(bot_id, "execution socket connected");
        }
        SocketEvent::Frame(text) => match serde_json::from_str::<ExecutionFrame>(&text) {
            Ok(frame) => entry.session.apply(frame),
            Err(e) => tracing::warn!(bot_id, error = %e, "failed to parse execution frame"),
        },
        SocketEvent::Error(e) => {
            tracing::error!(bot_id, error = %e, "execution socket error");
        }
        SocketEvent::Closed => {
            entry.session.connected = false;
            entry.link = Link::Idle;
            tracing::info!(bot_id, "execution socket closed");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::tests::{ChannelConnector, eventually};
    use serde_json::json;

    const WS: &str = "ws://localhost:8003/ws/bot";

    fn manager() -> (ExecutionLogManager, Arc<ChannelConnector>) {
        let connector = Arc::new(ChannelConnector::default());
        (ExecutionLogManager::new(connector.clone(), WS), connector)
    }

    fn vars(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_connect_builds_encoded_url() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        assert!(mgr.connect("bot 1", "t&k", Map::new()).await);
        assert_eq!(
            connector.last_url(),
            "ws://localhost:8003/ws/bot?bot_id=bot%201&token=t%26k"
        );
    }

    #[tokio::test]
    async fn test_connect_twice_opens_one_socket() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", vars(json!({"a": 1}))).await;
        mgr.connect("b1", "t", vars(json!({"z": 9}))).await;

        assert_eq!(connector.connects(), 1);
        let bot = mgr.get_bot("b1").await.unwrap();
        assert_eq!(Value::Object(bot.variables), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_frames_flow_through_pump() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", Map::new()).await;
        let peer = connector.take_peer();

        peer.events.send(SocketEvent::Opened).await.unwrap();
        for frame in [
            json!({"type": "variables", "message": {"a": 1}}),
            json!({"type": "variables", "message": {"b": 2}}),
            json!({"type": "logs", "message": "hello", "step_id": "s1"}),
        ] {
            peer.events
                .send(SocketEvent::Frame(frame.to_string()))
                .await
                .unwrap();
        }
        peer.events
            .send(SocketEvent::Frame("not json".into()))
            .await
            .unwrap();
        peer.events
            .send(SocketEvent::Frame(
                json!({"type": "logs", "message": "after"}).to_string(),
            ))
            .await
            .unwrap();

        assert!(eventually(|| async move { mgr.get_bot("b1").await.is_some_and(|b| b.logs.len() == 2) }).await);
        let bot = mgr.get_bot("b1").await.unwrap();
        assert!(bot.connected);
        assert_eq!(Value::Object(bot.variables), json!({"b": 2}));
        assert_eq!(mgr.get_step_logs("b1", "s1").await.len(), 1);
        assert!(mgr.get_step_logs("b1", "nope").await.is_empty());
        assert!(mgr.get_step_logs("unknown-bot", "s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_socket_error_changes_nothing() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", Map::new()).await;
        let peer = connector.take_peer();
        peer.events.send(SocketEvent::Opened).await.unwrap();
        peer.events
            .send(SocketEvent::Error("boom".into()))
            .await
            .unwrap();

        assert!(eventually(|| async move { mgr.is_connected("b1").await }).await);
        assert!(mgr.is_connected("b1").await);
    }

    #[tokio::test]
    async fn test_close_keeps_session_and_allows_reconnect() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", vars(json!({"a": 1}))).await;
        let peer = connector.take_peer();
        peer.events.send(SocketEvent::Opened).await.unwrap();
        peer.events
            .send(SocketEvent::Frame(
                json!({"type": "logs", "message": "kept"}).to_string(),
            ))
            .await
            .unwrap();
        peer.events.send(SocketEvent::Closed).await.unwrap();

        assert!(eventually(|| async move {
            mgr.get_bot("b1").await.is_some_and(|b| !b.connected && b.logs.len() == 1)
        })
        .await);

        assert!(mgr.connect("b1", "t", vars(json!({"fresh": true}))).await);
        assert_eq!(connector.connects(), 2);
        let bot = mgr.get_bot("b1").await.unwrap();
        assert_eq!(bot.logs, vec!["kept"]);
        assert_eq!(Value::Object(bot.variables), json!({"fresh": true}));
    }

    #[tokio::test]
    async fn test_dropped_peer_marks_closed() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", Map::new()).await;
        let peer = connector.take_peer();
        peer.events.send(SocketEvent::Opened).await.unwrap();
        assert!(eventually(|| async move { mgr.is_connected("b1").await }).await);

        drop(peer);

        assert!(eventually(|| async move { !mgr.is_connected("b1").await }).await);
        assert!(mgr.get_bot("b1").await.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_removes_session_and_closes_socket() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", Map::new()).await;
        let mut peer = connector.take_peer();

        mgr.disconnect("b1").await;

        assert!(mgr.get_bot("b1").await.is_none());
        assert!(peer.sent.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_idle_session() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        connector.fail.store(true, Ordering::SeqCst);

        assert!(!mgr.connect("b1", "t", Map::new()).await);
        assert!(!mgr.is_connected("b1").await);

        connector.fail.store(false, Ordering::SeqCst);
        assert!(mgr.connect("b1", "t", Map::new()).await);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_stale_pump_cannot_touch_new_connection() {
        let (mgr, connector) = manager();
        let mgr = &mgr;
        mgr.connect("b1", "t", Map::new()).await;
        let old = connector.take_peer();
        mgr.remove_bot("b1").await;
        mgr.connect("b1", "t", Map::new()).await;
        let new = connector.take_peer();

        new.events.send(SocketEvent::Opened).await.unwrap();
        assert!(eventually(|| async move { mgr.is_connected("b1").await }).await);

        let _ = old.events.send(SocketEvent::Closed).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(mgr.is_connected("b1").await);
    }
}
