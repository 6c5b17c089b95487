//! In-process publish/subscribe between booking, payment and ticketing.
//!
//! [`EventBus`] is best-effort fan-out: every handler registered for an
//! event name runs on each publish, a failing handler is logged and counted
//! without affecting the others, and nothing is persisted or replayed.
//! Share it as `Arc<EventBus>`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::WorkflowError;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<(), WorkflowError>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> Result<(), WorkflowError> {
        (self)(payload).await
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Handlers invoked
    pub handlers: usize,
    /// Handlers that returned an error
    pub failed: usize,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Handlers run in registration order.
    pub async fn subscribe<H>(&self, event: &str, handler: H)
    where
        H: EventHandler + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
        debug!(event, "Handler subscribed");
    }

    pub async fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Run every handler for `event` and wait for all of them.
    pub async fn publish(&self, event: &str, payload: Value) -> PublishReport {
        let handlers = {
            let handlers = self.handlers.read().await;
            handlers.get(event).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(event, "No subscribers");
            return PublishReport::default();
        }

        let results = join_all(handlers.iter().map(|h| h.handle(payload.clone()))).await;

        let mut report = PublishReport {
            handlers: results.len(),
            failed: 0,
        };
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                report.failed += 1;
                warn!(event, handler = index, error = %e, "Event handler failed");
            }
        }

        debug!(event, handlers = report.handlers, failed = report.failed, "Event published");
        report
    }

    /// Serialize a typed payload and publish it.
    pub async fn publish_event<T: Serialize>(&self, event: &str, payload: &T) -> PublishReport {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(event, value).await,
            Err(e) => {
                warn!(event, error = %e, "Dropping unserializable event payload");
                PublishReport::default()
            }
        }
    }
}
