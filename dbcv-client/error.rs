use std::io;

/// Errors raised below the transport boundary.
///
/// Resource stores never see these directly: `ApiClient::safe_call` reports
/// them as notices and reduces them to `None`. Session managers return
/// `NotConnected` / `SessionNotFound` for operations on absent sockets.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("server error: status={status}, body={body}")]
    Status { status: u16, body: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("socket: {0}")]
    Socket(String),

    #[error("assistant: {0}")]
    Assistant(String),

    #[error("storage: {0}")]
    Storage(#[from] io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_displays_code_and_body() {
        let err = ClientError::Status {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "server error: status=500, body=boom");
    }

    #[test]
    fn not_connected_displays_session() {
        let err = ClientError::NotConnected("mcp-1".into());
        assert_eq!(err.to_string(), "not connected: mcp-1");
    }

    #[test]
    fn assistant_displays_reason() {
        let err = ClientError::Assistant("Generation failed".into());
        assert_eq!(err.to_string(), "assistant: Generation failed");
    }

    #[test]
    fn serde_error_becomes_decode() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ClientError = serde_err.into();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        let err: ClientError = io_err.into();
        assert!(err.to_string().contains("read-only"));
        assert!(matches!(err, ClientError::Storage(_)));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientError>();
    }
}
