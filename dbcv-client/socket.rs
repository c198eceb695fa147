use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

const OUTBOUND_CAPACITY: usize = 32;
const INBOUND_CAPACITY: usize = 256;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Append percent-encoded query parameters to `base`.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        return base.to_string();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{query}")
}

/// Strip the query string (it carries the bearer token) before logging.
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// Both halves of one live socket. Dropping `outbound` closes the socket;
/// `inbound` yields events in transport order and ends after `Closed`.
pub struct Connection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<SocketEvent>,
}

/// Socket state of one managed session. `conn_id` tells a pump for an
/// earlier connection that it has been superseded.
#[derive(Debug, Default)]
pub(crate) enum Link {
    #[default]
    Idle,
    Connecting(u64),
    Open {
        conn_id: u64,
        outbound: mpsc::Sender<String>,
    },
}

impl Link {
    pub(crate) fn conn_id(&self) -> Option<u64> {
        match self {
            Link::Idle => None,
            Link::Connecting(id) | Link::Open { conn_id: id, .. } => Some(*id),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        !matches!(self, Link::Idle)
    }

    pub(crate) fn outbound(&self) -> Option<&mpsc::Sender<String>> {
        match self {
            Link::Open { outbound, .. } => Some(outbound),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError>;
}

#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Socket(e.to_string()))?;

        tracing::debug!(url = redact(url), "websocket connected");

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let _ = in_tx.send(SocketEvent::Opened).await;

        tokio::spawn(run_socket(ws_stream, out_rx, in_tx));

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

async fn run_socket<S>(
    ws_stream: S,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<SocketEvent>,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        tracing::warn!(error = %e, "failed to send websocket frame");
                        let _ = inbound.send(SocketEvent::Error(e.to_string())).await;
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(SocketEvent::Frame(text.as_str().to_owned())).await.is_err() {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        tracing::warn!(error = %e, "failed to send pong");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket read error");
                    let _ = inbound.send(SocketEvent::Error(e.to_string())).await;
                    break;
                }
            },
        }
    }

    let _ = inbound.send(SocketEvent::Closed).await;
}
