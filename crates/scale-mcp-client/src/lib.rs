pub mod client;
pub mod content;
pub mod pool;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use client::{ConnectionError, Error, McpSession, McpSessionTrait, ToolError};
pub use content::ToolContent;
pub use pool::{ConnectionPool, SessionFactory};
pub use protocol::{ClientInfo, ToolArguments, ToolDescriptor};
pub use retry::{RetryConfig, RetryingInvoker};
pub use transport::{StreamableHttpTransport, Transport, TransportError, TransportHandle};
