use std::sync::Arc;
use anyhow::Context;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use keepsake::config::Config;
use keepsake::core::{MediaPayload, UploadCallbacks, UploadError, UploadProgress, UploadRequest};
use keepsake::utils::format_bytes;
use keepsake::utils::retry::{RetryConfig, retry_with_config};
use keepsake::{MultipartTransport, UploadExecutor, UploadOrchestrator};

struct LogCallbacks;

impl UploadCallbacks for LogCallbacks {
    fn on_progress(&self, progress: &UploadProgress) {
        tracing::info!(
            "Uploaded {} / {} ({}%)",
            format_bytes(progress.loaded),
            format_bytes(progress.total),
            progress.percentage
        );
    }

    fn on_warning(&self, warnings: &[String]) {
        for warning in warnings {
            tracing::warn!("{}", warning);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load_config(&path)?;

    let mut payload = MediaPayload::from_path(&config.file_path)
        .await
        .with_context(|| format!("Failed to read {}", config.file_path))?;
    if let Some(mime_type) = &config.mime_type {
        payload.mime_type = mime_type.clone();
    }

    let transport = MultipartTransport::new(config.transport.clone()).context("Failed to build transport")?;

    let executor = config
        .orchestrator
        .offload_threshold
        .map(|_| UploadExecutor::spawn(config.executor.clone(), transport.clone()));

    let mut orchestrator = UploadOrchestrator::new(config.orchestrator.clone(), transport, Arc::new(LogCallbacks));
    if let Some(executor) = &executor {
        orchestrator = orchestrator.with_executor(executor.handle.clone());
    }

    let mut request = UploadRequest::new(payload, config.endpoint.clone()).with_fields(config.fields.clone());
    if let Some(id) = &config.upload_id {
        request = request.with_id(id.as_str());
    }

    let mode = config.orchestrator.classification;
    let retry = RetryConfig {
        should_retry: Box::new(move |err: &UploadError| err.is_retryable_with(mode)),
        ..RetryConfig::default()
    }
    .max_attempts(config.max_attempts);

    let result = retry_with_config(retry, || orchestrator.try_upload(request.clone())).await;

    if let Some(executor) = executor {
        executor.shutdown().await.context("Executor did not shut down cleanly")?;
    }

    let body: Value = result.context("Upload failed")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}
