//! Host-side upload orchestrator
//!
//! Runs in the caller's context and drives one logical upload slot at a
//! time. Small payloads go through the in-process transport; when an
//! executor is attached, payloads at or above the offload threshold are
//! handed to it instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::core::{
    FormFields,
    MediaPayload,
    ProgressFn,
    Result,
    UploadCallbacks,
    UploadError,
    UploadProgress,
    UploadRequest,
};
use crate::executor::ExecutorHandle;
use crate::uploaders::MultipartTransport;
use crate::validation::ValidationPolicy;

#[derive(Default)]
struct SlotState {
    is_uploading: AtomicBool,
    progress: Mutex<Option<UploadProgress>>,
    last_error: Mutex<Option<String>>,
    cancellation_token: Mutex<Option<CancellationToken>>,
}

/// Releases the upload slot on every exit path, including a dropped future
struct SlotGuard<'a> {
    state: &'a SlotState,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.state.cancellation_token.lock().take() {
            token.cancel();
        }
        *self.state.progress.lock() = None;
        self.state.is_uploading.store(false, Ordering::SeqCst);
    }
}

pub struct UploadOrchestrator {
    config: OrchestratorConfig,
    policy: ValidationPolicy,
    transport: MultipartTransport,
    callbacks: Arc<dyn UploadCallbacks>,
    executor: Option<ExecutorHandle>,
    state: Arc<SlotState>,
}

impl UploadOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        transport: MultipartTransport,
        callbacks: Arc<dyn UploadCallbacks>,
    ) -> Self {
        let policy = ValidationPolicy::new(config.validation.clone());

        Self {
            config,
            policy,
            transport,
            callbacks,
            executor: None,
            state: Arc::new(SlotState::default()),
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorHandle) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Full validation detail, for callers that need more than a boolean
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn is_uploading(&self) -> bool {
        self.state.is_uploading.load(Ordering::SeqCst)
    }

    pub fn upload_progress(&self) -> Option<UploadProgress> {
        *self.state.progress.lock()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().clone()
    }

    pub async fn validate_media(&self, payload: &MediaPayload) -> bool {
        self.policy.validate(payload).await.is_valid
    }

    /// Abort the in-flight upload, if any
    pub fn cancel(&self) -> bool {
        match self.state.cancellation_token.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn upload_file(&self, payload: MediaPayload, endpoint: &str, fields: FormFields) -> bool {
        let request = UploadRequest::new(payload, endpoint).with_fields(fields);
        self.upload_request(request).await
    }

    /// Run one upload and report the outcome through the callbacks
    pub async fn upload_request(&self, request: UploadRequest) -> bool {
        match self.try_upload(request).await {
            Ok(body) => {
                self.callbacks.on_success(&body);
                true
            }
            Err(err) if err.is_cancelled() => false,
            Err(err) => {
                let retryable = err.is_retryable_with(self.config.classification);
                self.callbacks.on_error(&err.to_string(), retryable);
                false
            }
        }
    }

    /// Same pipeline as [`upload_request`](Self::upload_request) but hands the
    /// outcome back instead of invoking `on_success` / `on_error`.
    pub async fn try_upload(&self, request: UploadRequest) -> Result<Value> {
        if self.state.is_uploading.swap(true, Ordering::SeqCst) {
            return Err(UploadError::AlreadyInFlight(request.id));
        }
        let _slot = SlotGuard { state: &self.state };

        *self.state.progress.lock() = None;
        *self.state.last_error.lock() = None;
        let token = CancellationToken::new();
        *self.state.cancellation_token.lock() = Some(token.clone());

        tracing::info!(id = %request.id, size = request.payload.size(), mime_type = %request.payload.mime_type, "Upload requested");
        let result = self.run(&request, &token).await;

        match &result {
            Ok(_) => tracing::info!(id = %request.id, "Upload finished"),
            Err(err) if err.is_cancelled() => tracing::info!(id = %request.id, "Upload cancelled"),
            Err(err) => {
                tracing::warn!(id = %request.id, error = %err, "Upload failed");
                *self.state.last_error.lock() = Some(err.to_string());
            }
        }

        result
    }

    async fn run(&self, request: &UploadRequest, token: &CancellationToken) -> Result<Value> {
        let validation = self.policy.validate(&request.payload).await;
        if !validation.is_valid {
            return Err(UploadError::Validation(validation.error.unwrap_or_default()));
        }
        if !validation.warnings.is_empty() {
            self.callbacks.on_warning(&validation.warnings);
        }

        if let (Some(executor), Some(threshold)) = (&self.executor, self.config.offload_threshold) {
            if request.payload.size() >= threshold {
                return self.offload(executor, request, token).await;
            }
        }

        let state = self.state.clone();
        let callbacks = self.callbacks.clone();
        let on_progress: ProgressFn = Arc::new(move |progress: UploadProgress| {
            *state.progress.lock() = Some(progress);
            callbacks.on_progress(&progress);
        });

        self.transport.send(request, Some(on_progress), token).await
    }

    async fn offload(
        &self,
        executor: &ExecutorHandle,
        request: &UploadRequest,
        token: &CancellationToken,
    ) -> Result<Value> {
        tracing::debug!(id = %request.id, "Offloading upload to executor");

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                // the UPLOAD may already be registered on the executor side
                if let Err(err) = executor.cancel(request.id.clone()).await {
                    tracing::warn!(id = %request.id, error = %err, "Failed to forward cancellation");
                }
                return Err(UploadError::Cancelled);
            }
            response = executor.upload(request.clone()) => response?,
        };

        if response.success {
            let total = request.payload.size();
            let progress = UploadProgress::new(total, total);
            *self.state.progress.lock() = Some(progress);
            self.callbacks.on_progress(&progress);

            if let Err(err) = executor.complete(request.id.clone()).await {
                tracing::warn!(id = %request.id, error = %err, "Failed to acknowledge executor upload");
            }
            return Ok(response.data.unwrap_or(Value::Null));
        }

        if response.is_cancellation() {
            return Err(UploadError::Cancelled);
        }

        Err(UploadError::Remote {
            message: response.error.unwrap_or_else(|| "Upload failed".to_string()),
            retryable: response.retryable.unwrap_or(true),
        })
    }
}
