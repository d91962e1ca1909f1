use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{JsonRpcRequest, TerminalFrame};

/// Errors raised below the JSON-RPC layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Session expired or not found")]
    SessionExpired,

    #[error("Invalid MCP endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport was not connected or is already closed")]
    NotConnected,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and network-level failures may succeed on a later attempt.
    /// Everything else is a statement by the server or a local bug and will
    /// not change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Network(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// What came back from one POST: the session header (if any) and the first
/// terminal frame of the body (if any).
#[derive(Debug, Clone, Default)]
pub struct TransportReply {
    pub session_id: Option<String>,
    pub terminal: Option<TerminalFrame>,
}

/// A transport that can be started to produce a connected handle.
#[async_trait]
pub trait Transport: Send + Sync {
    type Handle: TransportHandle;

    /// Validate configuration and build the underlying connection.
    async fn start(&self) -> Result<Self::Handle, TransportError>;
}

#[async_trait]
pub trait TransportHandle: Send + Sync + 'static {
    /// Send one request and wait for its terminal frame.
    async fn send(
        &self,
        request: &JsonRpcRequest,
        session_id: Option<&str>,
    ) -> Result<TransportReply, TransportError>;

    /// Release the connection. Best effort, never fails.
    async fn close(&self, session_id: Option<&str>);
}

pub mod streamable_http;
pub use streamable_http::{StreamableHttpTransport, StreamableHttpTransportHandle};
