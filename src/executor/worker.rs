use std::time::Duration;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use crate::config::ExecutorConfig;
use crate::core::{Result, UploadError, UploadId, UploadPhase, UploadRequest};
use crate::uploaders::MultipartTransport;
use crate::validation::ValidationPolicy;
use super::messages::{Action, WorkerRequest, WorkerResponse};
use super::registry::{ActiveUpload, UploadRegistry};

pub(crate) type Reply = Option<oneshot::Sender<WorkerResponse>>;

pub(crate) enum ExecutorMessage {
    Request {
        request: WorkerRequest,
        reply: Reply,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ActiveUpload>>,
    },
    Shutdown,
}

/// Reports from spawned command tasks back to the actor
enum TaskEvent {
    Phase {
        id: UploadId,
        generation: u64,
        phase: UploadPhase,
    },
    Finished {
        generation: Option<u64>,
        reply: Reply,
        response: WorkerResponse,
    },
}

/// Actor state, never shared with the host
pub(crate) struct ExecutorWorker {
    config: ExecutorConfig,
    policy: ValidationPolicy,
    transport: MultipartTransport,
    registry: UploadRegistry,
    response_tx: mpsc::UnboundedSender<WorkerResponse>,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
    event_rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl ExecutorWorker {
    pub(crate) async fn run(
        config: ExecutorConfig,
        policy: ValidationPolicy,
        transport: MultipartTransport,
        mut command_rx: mpsc::Receiver<ExecutorMessage>,
        response_tx: mpsc::UnboundedSender<WorkerResponse>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            config,
            policy,
            transport,
            registry: UploadRegistry::new(),
            response_tx,
            event_tx,
            event_rx,
        };

        // interval_at panics on a zero period
        let period = worker.config.sweep_interval.max(Duration::from_millis(10));
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // 主事件循环
        loop {
            tokio::select! {
                message = command_rx.recv() => match message {
                    Some(ExecutorMessage::Request { request, reply }) => worker.handle_request(request, reply),
                    Some(ExecutorMessage::Snapshot { reply }) => {
                        let _ = reply.send(worker.registry.snapshot(Instant::now()));
                    }
                    Some(ExecutorMessage::Shutdown) | None => break,
                },
                Some(event) = worker.event_rx.recv() => {
                    worker.handle_event(event);
                }
                _ = sweep.tick() => {
                    worker.sweep();
                }
            }
        }

        let cancelled = worker.registry.cancel_all();
        tracing::info!(cancelled, "Upload executor stopped");
    }

    fn handle_request(&mut self, request: WorkerRequest, reply: Reply) {
        tracing::debug!(id = %request.id, action = ?request.action, "Executor command");

        match request.action {
            Action::Validate => self.validate(request, reply),
            Action::Upload => self.upload(request, reply),
            Action::Cancel => {
                if self.registry.cancel(&request.id) {
                    tracing::info!(id = %request.id, "Upload cancelled");
                }
                self.respond(reply, WorkerResponse::cancelled(request.id));
            }
            Action::Complete => {
                // a still-running transfer would otherwise be left untracked
                if self.registry.cancel(&request.id) {
                    tracing::warn!(id = %request.id, "Completed upload still had live state");
                }
                self.respond(reply, WorkerResponse::ok(request.id, json!({ "completed": true })));
            }
            Action::Unknown => {
                tracing::warn!(id = %request.id, "Unknown executor action");
                self.respond(reply, WorkerResponse::unknown_action(request.id));
            }
        }
    }

    fn validate(&mut self, request: WorkerRequest, reply: Reply) {
        let id = request.id;
        let Some(data) = request.data else {
            let error = UploadError::invalid_request("VALIDATE requires a payload");
            self.respond(reply, WorkerResponse::failure(id, &error, false));
            return;
        };

        let policy = self.policy.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = policy.validate(&data.payload).await;
            let response = WorkerResponse {
                id,
                success: result.is_valid,
                progress: 100,
                error: result.error.clone(),
                data: serde_json::to_value(&result).ok(),
                retryable: None,
            };
            let _ = event_tx.send(TaskEvent::Finished { generation: None, reply, response });
        });
    }

    fn upload(&mut self, request: WorkerRequest, reply: Reply) {
        let id = request.id;
        let request = match request.data {
            Some(data) => match data.endpoint {
                Some(endpoint) => UploadRequest {
                    id: id.clone(),
                    payload: data.payload,
                    endpoint,
                    fields: data.fields,
                },
                None => {
                    let error = UploadError::invalid_request("UPLOAD requires an endpoint");
                    self.respond(reply, WorkerResponse::failure(id, &error, false));
                    return;
                }
            },
            None => {
                let error = UploadError::invalid_request("UPLOAD requires a payload");
                self.respond(reply, WorkerResponse::failure(id, &error, false));
                return;
            }
        };

        let (cancellation_token, generation) = match self.registry.register(id.clone(), Instant::now()) {
            Ok(registered) => registered,
            Err(error) => {
                tracing::warn!(id = %id, "Rejected duplicate upload");
                let retryable = error.is_retryable_with(self.config.classification);
                self.respond(reply, WorkerResponse::failure(id, &error, retryable));
                return;
            }
        };

        tracing::info!(id = %id, size = request.payload.size(), endpoint = %request.endpoint, "Upload started");

        let policy = self.policy.clone();
        let transport = self.transport.clone();
        let event_tx = self.event_tx.clone();
        let mode = self.config.classification;

        tokio::spawn(async move {
            let result = execute_upload(&policy, &transport, &request, &cancellation_token, generation, &event_tx).await;
            let response = match result {
                Ok(body) => WorkerResponse::ok(id, body),
                Err(error) => {
                    let retryable = error.is_retryable_with(mode);
                    WorkerResponse::failure(id, &error, retryable)
                }
            };
            let _ = event_tx.send(TaskEvent::Finished {
                generation: Some(generation),
                reply,
                response,
            });
        });
    }

    fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Phase { id, generation, phase } => {
                self.registry.set_phase(&id, generation, phase);
            }
            TaskEvent::Finished { generation, reply, response } => {
                // terminal state: drop registry entry before responding
                if let Some(generation) = generation {
                    self.registry.finish(&response.id, generation);

                    if response.success {
                        tracing::info!(id = %response.id, "Upload succeeded");
                    } else if response.is_cancellation() {
                        tracing::info!(id = %response.id, "Upload aborted");
                    } else {
                        tracing::warn!(
                            id = %response.id,
                            error = response.error.as_deref().unwrap_or_default(),
                            retryable = response.retryable.unwrap_or_default(),
                            "Upload failed"
                        );
                    }
                }
                self.respond(reply, response);
            }
        }
    }

    fn sweep(&mut self) {
        let evicted = self.registry.sweep(Instant::now(), self.config.state_ttl);
        for id in evicted {
            tracing::warn!(id = %id, ttl_secs = self.config.state_ttl.as_secs(), "Evicted stale upload state");
        }
    }

    fn respond(&self, reply: Reply, response: WorkerResponse) {
        match reply {
            Some(reply) => {
                let _ = reply.send(response);
            }
            None => {
                let _ = self.response_tx.send(response);
            }
        }
    }
}

async fn execute_upload(
    policy: &ValidationPolicy,
    transport: &MultipartTransport,
    request: &UploadRequest,
    cancellation_token: &CancellationToken,
    generation: u64,
    event_tx: &mpsc::UnboundedSender<TaskEvent>,
) -> Result<serde_json::Value> {
    let validation = tokio::select! {
        biased;
        _ = cancellation_token.cancelled() => return Err(UploadError::Cancelled),
        result = policy.validate(&request.payload) => result,
    };

    if !validation.warnings.is_empty() {
        tracing::warn!(id = %request.id, warnings = ?validation.warnings, "Upload validation advisories");
    }
    if !validation.is_valid {
        return Err(UploadError::Validation(validation.error.unwrap_or_default()));
    }

    let _ = event_tx.send(TaskEvent::Phase {
        id: request.id.clone(),
        generation,
        phase: UploadPhase::Uploading,
    });

    transport.send(request, None, cancellation_token).await
}
