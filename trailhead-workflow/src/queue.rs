use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::WorkflowError;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<(), WorkflowError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> Result<(), WorkflowError> {
        (self)(payload).await
    }
}

/// Background queue running at most `concurrency` jobs at a time.
///
/// The dispatcher stops once every `JobQueue` handle is dropped and the
/// jobs already admitted have finished.
#[derive(Clone)]
pub struct JobQueue {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Value>,
}

impl JobQueue {
    pub fn start<H>(name: &str, concurrency: usize, handler: H) -> (Self, JoinHandle<()>)
    where
        H: JobHandler + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let name: Arc<str> = Arc::from(name);
        let dispatcher = tokio::spawn(dispatch(
            name.clone(),
            concurrency.max(1),
            Arc::new(handler),
            receiver,
        ));
        (Self { name, sender }, dispatcher)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enqueue(&self, payload: Value) -> Result<(), WorkflowError> {
        self.sender
            .send(payload)
            .map_err(|_| WorkflowError::QueueClosed(self.name.to_string()))
    }
}

async fn dispatch(
    name: Arc<str>,
    concurrency: usize,
    handler: Arc<dyn JobHandler>,
    mut receiver: mpsc::UnboundedReceiver<Value>,
) {
    info!(queue = %name, concurrency, "Job queue started");
    let semaphore = Arc::new(Semaphore::new(concurrency));

    while let Some(payload) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let handler = handler.clone();
        let name = name.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match handler.handle(payload).await {
                Ok(()) => debug!(queue = %name, "Job finished"),
                Err(e) => warn!(queue = %name, error = %e, "Job failed"),
            }
        });
    }

    // Drain in-flight jobs
    let _ = semaphore.acquire_many(concurrency as u32).await;
    info!(queue = %name, "Job queue stopped");
}
