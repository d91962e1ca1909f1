use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};
use url::Url;

use super::{Transport, TransportError, TransportHandle, TransportReply};
use crate::protocol::{JsonRpcRequest, TerminalFrame};

/// Default overall timeout for one request, stream included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the session token. Servers disagree on casing, so both
/// spellings are looked up on responses.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const SESSION_ID_HEADER_LOWER: &str = "mcp-session-id";

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Streamable HTTP transport: every JSON-RPC message is an HTTP POST whose
/// response is either a single JSON document or a `text/event-stream` of
/// `data: <json>` lines.
#[derive(Clone)]
pub struct StreamableHttpTransport {
    mcp_endpoint: String,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new<S: Into<String>>(mcp_endpoint: S) -> Self {
        Self {
            mcp_endpoint: mcp_endpoint.into(),
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.mcp_endpoint
    }

    /// Validate that the URL is a valid MCP endpoint
    pub fn validate_endpoint(endpoint: &str) -> Result<(), TransportError> {
        Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    type Handle = StreamableHttpTransportHandle;

    async fn start(&self) -> Result<Self::Handle, TransportError> {
        Self::validate_endpoint(&self.mcp_endpoint)?;

        let http_client = HttpClient::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(StreamableHttpTransportHandle {
            http_client,
            mcp_endpoint: self.mcp_endpoint.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
        })
    }
}

#[derive(Clone)]
pub struct StreamableHttpTransportHandle {
    http_client: HttpClient,
    mcp_endpoint: String,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl StreamableHttpTransportHandle {
    async fn exchange(
        &self,
        body: String,
        session_id: Option<&str>,
    ) -> Result<TransportReply, TransportError> {
        let mut request = self
            .http_client
            .post(&self.mcp_endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_VALUE)
            .body(body);

        if let Some(session_id) = session_id {
            request = request.header(SESSION_ID_HEADER, session_id);
        }

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::NOT_FOUND && session_id.is_some() {
                return Err(TransportError::SessionExpired);
            }
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::HttpError {
                status: status.as_u16(),
                message,
            });
        }

        let returned_session = session_id_from_headers(response.headers());
        if let Some(id) = &returned_session {
            debug!(session_id = %id, "Received session ID");
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();

        let terminal = if content_type.starts_with("application/json") {
            let text = response.text().await?;
            read_json_body(&text)
        } else {
            let stream = response
                .bytes_stream()
                .map_err(std::io::Error::other);
            let reader = tokio::io::BufReader::new(StreamReader::new(stream));
            read_event_stream(reader).await?
        };

        Ok(TransportReply {
            session_id: returned_session,
            terminal,
        })
    }
}

#[async_trait]
impl TransportHandle for StreamableHttpTransportHandle {
    async fn send(
        &self,
        request: &JsonRpcRequest,
        session_id: Option<&str>,
    ) -> Result<TransportReply, TransportError> {
        let body = serde_json::to_string(request)?;
        debug!(method = %request.method, id = request.id, "Sending message to MCP endpoint");

        match tokio::time::timeout(self.timeout, self.exchange(body, session_id)).await {
            Ok(reply) => reply,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Ask the server to drop the session with an HTTP DELETE.
    async fn close(&self, session_id: Option<&str>) {
        let Some(session_id) = session_id else {
            return;
        };

        let mut request = self
            .http_client
            .delete(&self.mcp_endpoint)
            .header(SESSION_ID_HEADER, session_id);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!("Server doesn't support session termination");
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to terminate session: {}", e),
        }
    }
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    [SESSION_ID_HEADER, SESSION_ID_HEADER_LOWER]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn read_json_body(text: &str) -> Option<TerminalFrame> {
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(frame) => TerminalFrame::from_frame(&frame),
        Err(err) => {
            warn!("Failed to parse JSON response body: {}", err);
            None
        }
    }
}

/// Consume `data:` lines until the first terminal frame. Lines that are not
/// data, or data that is not JSON, are skipped. Anything after the terminal
/// frame is never read.
pub(crate) async fn read_event_stream<R>(reader: R) -> Result<Option<TerminalFrame>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(e) => return Err(TransportError::Network(e.to_string())),
        };

        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();

        match serde_json::from_str::<Value>(data) {
            Ok(frame) => {
                if let Some(terminal) = TerminalFrame::from_frame(&frame) {
                    return Ok(Some(terminal));
                }
                debug!("Skipping non-terminal frame");
            }
            Err(err) => warn!("Failed to parse streaming HTTP response message: {}", err),
        }
    }
}
