use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::{ConnectionError, Error, McpSessionTrait};
use crate::protocol::ToolArguments;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier for backoff (exponential)
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay
    pub max_interval: Duration,
    /// Scale each delay by a random factor in [0.8, 1.2)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = (retry - 1) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        let delay = if self.jitter {
            capped * (0.8 + rand::random::<f64>() * 0.4)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Runs one tool call, retrying transient transport faults with exponential
/// backoff. Server-reported failures go straight back to the caller.
#[derive(Debug, Clone, Default)]
pub struct RetryingInvoker {
    config: RetryConfig,
}

impl RetryingInvoker {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn call_tool(
        &self,
        session: &dyn McpSessionTrait,
        name: &str,
        arguments: &ToolArguments,
    ) -> Result<Value, Error> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match session.call_tool(name, arguments).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let transport_err = match err {
                Error::Connection(ConnectionError::Transport(e)) if e.is_transient() => e,
                other => return Err(other),
            };

            if attempt >= max_attempts {
                warn!(
                    tool_name = %name,
                    attempts = attempt,
                    error = %transport_err,
                    "Tool call failed after all retries"
                );
                return Err(ConnectionError::RetriesExhausted {
                    attempts: attempt,
                    source: transport_err,
                }
                .into());
            }

            let delay = self.config.delay_for_retry(attempt);
            warn!(
                tool_name = %name,
                attempt,
                max_attempts,
                error = %transport_err,
                "Transient failure calling tool. Retrying after backoff..."
            );
            info!("Backing off for {:?} before retry", delay);
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ToolError;
    use crate::protocol::ToolDescriptor;
    use crate::transport::TransportError;
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out scripted results in order and counts calls.
    struct ScriptedSession {
        script: Mutex<VecDeque<Result<Value, Error>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSession {
        fn new(script: Vec<Result<Value, Error>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl McpSessionTrait for ScriptedSession {
        async fn initialize(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn call_tool(&self, _name: &str, _arguments: &ToolArguments) -> Result<Value, Error> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!("unscripted")))
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
            Ok(vec![])
        }

        async fn close(&self) {}

        async fn is_initialized(&self) -> bool {
            true
        }
    }

    fn fast_invoker() -> RetryingInvoker {
        RetryingInvoker::new(RetryConfig {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            ..RetryConfig::default()
        })
    }

    fn timeout() -> Result<Value, Error> {
        Err(TransportError::Timeout.into())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_retry(0), Duration::ZERO);
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_retry(6), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let delay = config.delay_for_retry(2);
            assert!(delay >= Duration::from_millis(1600));
            assert!(delay < Duration::from_millis(2400));
        }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let session = ScriptedSession::new(vec![
            timeout(),
            Err(TransportError::Network("connection reset".into()).into()),
            Ok(json!({"ok": true})),
        ]);

        let result = fast_invoker()
            .call_tool(&session, "get_version", &Map::new())
            .await
            .unwrap();

        assert_eq!(result, json!({"ok": true}));
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let session = ScriptedSession::new(vec![timeout(), timeout(), timeout(), Ok(json!(1))]);

        let err = fast_invoker()
            .call_tool(&session, "get_version", &Map::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Connection(ConnectionError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn tool_errors_are_not_retried() {
        let session = ScriptedSession::new(vec![Err(ToolError::Rpc {
            tool: "delete_fileset".into(),
            code: -32000,
            message: "fileset busy".into(),
            data: None,
        }
        .into())]);

        let err = fast_invoker()
            .call_tool(&session, "delete_fileset", &Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool(ToolError::Rpc { code: -32000, .. })));
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn non_transient_connection_errors_are_not_retried() {
        let session = ScriptedSession::new(vec![Err(TransportError::SessionExpired.into())]);

        let err = fast_invoker()
            .call_tool(&session, "get_version", &Map::new())
            .await
            .unwrap_err();

        assert!(err.is_connection());
        assert_eq!(session.calls(), 1);
    }
}
