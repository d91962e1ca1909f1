use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, JsonRpcRequest, TerminalFrame,
    ToolArguments, ToolDescriptor, METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use crate::transport::{Transport, TransportError, TransportHandle};

/// The session cannot be established or used.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Server did not provide a session ID")]
    MissingSessionId,

    #[error("MCP session is not initialized")]
    NotInitialized,

    #[error("Initialization stream ended without a result")]
    NoInitializeResult,

    #[error("Initialization rejected: code={code}, message={message}")]
    InitializeRejected { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

/// The server answered, but not with a usable result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{tool}' failed: code={code}, message={message}")]
    Rpc {
        tool: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("No result received from MCP server for '{tool}'")]
    NoResult { tool: String },

    #[error("Malformed response for '{tool}': {reason}")]
    Malformed { tool: String, reason: String },

    #[error("Tool '{tool}' reported an error: {message}")]
    Reported { tool: String, message: String },
}

impl ToolError {
    pub fn code(&self) -> Option<i64> {
        match self {
            ToolError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Error type for MCP session operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Connection(ConnectionError::Transport(err))
    }
}

impl Error {
    /// A transport fault worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::Transport(err)) if err.is_transient()
        )
    }

    /// The session is unusable and should be discarded.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// One logical session with an MCP server.
#[async_trait::async_trait]
pub trait McpSessionTrait: Send + Sync {
    async fn initialize(&self) -> Result<(), Error>;

    async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Result<Value, Error>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error>;

    /// Idempotent. Safe after a failed `initialize`.
    async fn close(&self);

    async fn is_initialized(&self) -> bool;
}

struct SessionState<H> {
    handle: Option<Arc<H>>,
    session_id: Option<String>,
    initialized: bool,
}

impl<H> Default for SessionState<H> {
    fn default() -> Self {
        Self {
            handle: None,
            session_id: None,
            initialized: false,
        }
    }
}

/// Session over any [`Transport`]; in practice the streamable HTTP one.
pub struct McpSession<T>
where
    T: Transport,
{
    transport: T,
    client_info: ClientInfo,
    state: RwLock<SessionState<T::Handle>>,
    next_id_counter: AtomicU64,
}

impl<T> McpSession<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Self::with_client_info(transport, ClientInfo::default())
    }

    pub fn with_client_info(transport: T, client_info: ClientInfo) -> Self {
        Self {
            transport,
            client_info,
            state: RwLock::new(SessionState::default()),
            next_id_counter: AtomicU64::new(1),
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.state.read().await.session_id.clone()
    }

    fn next_request(&self, method: &str, params: Value) -> JsonRpcRequest {
        let id = self.next_id_counter.fetch_add(1, Ordering::SeqCst);
        JsonRpcRequest::new(id, method, params)
    }

    /// Snapshot what a call needs without holding the lock across I/O.
    async fn connected(&self) -> Result<(Arc<T::Handle>, String), Error> {
        let state = self.state.read().await;
        match (&state.handle, &state.session_id, state.initialized) {
            (Some(handle), Some(session_id), true) => Ok((handle.clone(), session_id.clone())),
            _ => Err(ConnectionError::NotInitialized.into()),
        }
    }

    /// Send a request on the live session and return the `result` payload.
    async fn send_request(&self, method: &str, label: &str, params: Value) -> Result<Value, Error> {
        let (handle, session_id) = self.connected().await?;
        let request = self.next_request(method, params);

        let reply = handle.send(&request, Some(&session_id)).await?;

        match reply.terminal {
            Some(TerminalFrame::Result(result)) => Ok(result),
            Some(TerminalFrame::Error(error)) => Err(ToolError::Rpc {
                tool: label.to_string(),
                code: error.code,
                message: error.message,
                data: error.data,
            }
            .into()),
            None => Err(ToolError::NoResult {
                tool: label.to_string(),
            }
            .into()),
        }
    }

    async fn handshake(&self, handle: &T::Handle) -> Result<String, Error> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: self.client_info.clone(),
        };
        let request = self.next_request(
            METHOD_INITIALIZE,
            serde_json::to_value(params).map_err(TransportError::from)?,
        );

        let reply = handle.send(&request, None).await?;

        let session_id = reply.session_id.ok_or(ConnectionError::MissingSessionId)?;

        match reply.terminal {
            Some(TerminalFrame::Result(result)) => {
                debug!(result = %result, "MCP initialized");
                Ok(session_id)
            }
            Some(TerminalFrame::Error(error)) => Err(ConnectionError::InitializeRejected {
                code: error.code,
                message: error.message,
            }
            .into()),
            None => Err(ConnectionError::NoInitializeResult.into()),
        }
    }
}

#[async_trait::async_trait]
impl<T> McpSessionTrait for McpSession<T>
where
    T: Transport,
{
    async fn initialize(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.initialized {
            return Ok(());
        }

        let handle = Arc::new(self.transport.start().await?);

        match self.handshake(&handle).await {
            Ok(session_id) => {
                info!(session_id = %session_id, "MCP session established");
                state.handle = Some(handle);
                state.session_id = Some(session_id);
                state.initialized = true;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize MCP session");
                handle.close(None).await;
                *state = SessionState::default();
                self.next_id_counter.store(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Result<Value, Error> {
        debug!(tool_name = %name, "Calling MCP tool");
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.send_request(METHOD_TOOLS_CALL, name, params).await?;
        debug!(
            tool_name = %name,
            has_content = result.get("content").is_some(),
            "MCP tool result"
        );
        Ok(result)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let result = self
            .send_request(METHOD_TOOLS_LIST, METHOD_TOOLS_LIST, json!({}))
            .await?;

        let tools = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools).map_err(|e| {
            ToolError::Malformed {
                tool: METHOD_TOOLS_LIST.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn close(&self) {
        let mut state = self.state.write().await;
        if let Some(handle) = state.handle.take() {
            handle.close(state.session_id.as_deref()).await;
        }
        *state = SessionState::default();
        self.next_id_counter.store(1, Ordering::SeqCst);
        debug!("MCP session closed");
    }

    async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }
}
