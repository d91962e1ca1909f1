use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{Error, McpSessionTrait};

/// Builds a fresh, not yet initialized session.
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn McpSessionTrait> + Send + Sync>;

/// Shares one lazily created session between concurrent callers.
///
/// The slot is guarded by a single async mutex held across `initialize`, so
/// the check-then-create sequence is atomic: concurrent first callers wait on
/// the one handshake instead of racing their own.
pub struct ConnectionPool {
    factory: SessionFactory,
    slot: Mutex<Option<Arc<dyn McpSessionTrait>>>,
}

impl ConnectionPool {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
        }
    }

    pub fn from_fn<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn McpSessionTrait> + Send + Sync + 'static,
    {
        Self::new(Arc::new(factory))
    }

    /// Return the live session, creating and initializing one if needed.
    pub async fn acquire(&self) -> Result<Arc<dyn McpSessionTrait>, Error> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = (self.factory)();
        if let Err(e) = session.initialize().await {
            session.close().await;
            return Err(e);
        }

        info!("Created pooled MCP session");
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Drop `session` from the pool if it is still the pooled one. A caller
    /// holding a stale session cannot evict a newer replacement.
    pub async fn invalidate(&self, session: &Arc<dyn McpSessionTrait>) {
        let evicted = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, session) => slot.take(),
                _ => None,
            }
        };

        if let Some(session) = evicted {
            warn!("Invalidating pooled MCP session");
            session.close().await;
        }
    }

    /// Run `f` with a pooled session. A connection error coming out of `f`
    /// invalidates the session before the error is returned.
    pub async fn run<F, Fut, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(Arc<dyn McpSessionTrait>) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let session = self.acquire().await?;
        let result = f(session.clone()).await;

        if let Err(e) = &result {
            if e.is_connection() {
                debug!(error = %e, "Connection error on pooled session");
                self.invalidate(&session).await;
            }
        }
        result
    }

    pub async fn has_session(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Close and forget the pooled session, if any.
    pub async fn close(&self) {
        let session = self.slot.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }
}
