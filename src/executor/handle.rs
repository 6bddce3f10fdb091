use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::ExecutorConfig;
use crate::core::{MediaPayload, Result, UploadError, UploadId, UploadRequest};
use crate::uploaders::MultipartTransport;
use crate::validation::ValidationPolicy;
use super::messages::{WorkerRequest, WorkerResponse};
use super::registry::ActiveUpload;
use super::worker::{ExecutorMessage, ExecutorWorker};

/// Cloneable sender side of the executor channel
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    command_tx: mpsc::Sender<ExecutorMessage>,
}

/// Executor task plus the channel its uncorrelated responses arrive on
pub struct UploadExecutor {
    pub handle: ExecutorHandle,
    pub responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pub worker_handle: JoinHandle<()>,
}

impl UploadExecutor {
    pub fn spawn(config: ExecutorConfig, transport: MultipartTransport) -> Self {
        let policy = ValidationPolicy::new(config.validation.clone());
        Self::with_policy(config, policy, transport)
    }

    pub fn with_policy(config: ExecutorConfig, policy: ValidationPolicy, transport: MultipartTransport) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.queue_size.max(1));
        let (response_tx, responses) = mpsc::unbounded_channel();

        let worker_handle = tokio::spawn(ExecutorWorker::run(
            config,
            policy,
            transport,
            command_rx,
            response_tx,
        ));

        Self {
            handle: ExecutorHandle { command_tx },
            responses,
            worker_handle,
        }
    }

    /// Stop the actor, cancelling whatever is still registered
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.worker_handle.await.map_err(|err| {
            tracing::error!(error = %err, "Executor task panicked");
            UploadError::ExecutorShutdown
        })
    }
}

impl std::fmt::Debug for ExecutorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorMessage::Request { request, .. } => f.debug_tuple("Request").field(&request.action).finish(),
            ExecutorMessage::Snapshot { .. } => f.write_str("Snapshot"),
            ExecutorMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl ExecutorHandle {
    /// Fire and forget, the response is delivered on [`UploadExecutor::responses`]
    pub async fn send(&self, request: WorkerRequest) -> Result<()> {
        self.command_tx
            .send(ExecutorMessage::Request { request, reply: None })
            .await
            .map_err(|_| UploadError::ExecutorShutdown)
    }

    /// Send a command and wait for its single terminal response
    pub async fn call(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ExecutorMessage::Request { request, reply: Some(reply_tx) })
            .await
            .map_err(|_| UploadError::ExecutorShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ExecutorShutdown)
    }

    pub async fn validate(&self, id: UploadId, payload: MediaPayload) -> Result<WorkerResponse> {
        self.call(WorkerRequest::validate(id, payload)).await
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<WorkerResponse> {
        self.call(WorkerRequest::upload(request)).await
    }

    pub async fn cancel(&self, id: UploadId) -> Result<WorkerResponse> {
        self.call(WorkerRequest::cancel(id)).await
    }

    pub async fn complete(&self, id: UploadId) -> Result<WorkerResponse> {
        self.call(WorkerRequest::complete(id)).await
    }

    /// Registry snapshot, for diagnostics
    pub async fn active_uploads(&self) -> Result<Vec<ActiveUpload>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ExecutorMessage::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| UploadError::ExecutorShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ExecutorShutdown)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ExecutorMessage::Shutdown)
            .await
            .map_err(|_| UploadError::ExecutorShutdown)
    }
}
