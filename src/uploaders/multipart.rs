use bytes::Bytes;
use futures_util::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::config::TransportConfig;
use crate::core::{ProgressFn, Result, UploadError, UploadRequest};
use super::generate_file_name;
use super::progress_stream::ProgressStream;

pub const UPLOAD_ID_HEADER: &str = "X-Upload-Id";

/// Single-request multipart transfer
///
/// Shared by the host-side orchestrator and the executor worker.
#[derive(Debug, Clone)]
pub struct MultipartTransport {
    client: Client,
    config: TransportConfig,
}

impl MultipartTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| UploadError::invalid_request(format!("failed to build HTTP client: {}", err)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// POST the payload plus fields, returning the decoded JSON body.
    ///
    /// Cancellation wins over a transfer that has not completed yet, including
    /// one that never got to send a byte.
    pub async fn send(
        &self,
        request: &UploadRequest,
        on_progress: Option<ProgressFn>,
        cancellation_token: &CancellationToken,
    ) -> Result<Value> {
        let url = Url::parse(&request.endpoint)
            .map_err(|err| UploadError::invalid_request(format!("invalid endpoint {:?}: {}", request.endpoint, err)))?;
        let form = self.build_form(request, on_progress)?;

        let future = async {
            let response = self.client
                .post(url)
                .header(UPLOAD_ID_HEADER, request.id.as_str())
                .multipart(form)
                .send()
                .await?;

            Self::read_response(response).await
        };

        // 执行
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => Err(UploadError::Cancelled),
            result = future => result,
        }
    }

    fn build_form(&self, request: &UploadRequest, on_progress: Option<ProgressFn>) -> Result<Form> {
        let payload = &request.payload;
        let total = payload.size();
        let chunk_size = self.config.chunk_size.max(1);

        let chunks: Vec<std::io::Result<Bytes>> = (0..payload.data.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(payload.data.len());
                Ok(payload.data.slice(start..end))
            })
            .collect();

        let body = match on_progress {
            Some(on_progress) => Body::wrap_stream(ProgressStream::new(stream::iter(chunks), total, on_progress)),
            None => Body::wrap_stream(stream::iter(chunks)),
        };

        let part = Part::stream_with_length(body, total)
            .file_name(generate_file_name(payload))
            .mime_str(&payload.mime_type)
            .map_err(|_| UploadError::invalid_request(format!("invalid MIME type {:?}", payload.mime_type)))?;

        let mut form = Form::new().part(self.config.file_field.clone(), part);
        for (key, value) in &request.fields {
            form = form.text(key.clone(), field_text(value));
        }

        Ok(form)
    }

    async fn read_response(response: Response) -> Result<Value> {
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|_| UploadError::InvalidResponse);
        }

        let message = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|value| error_message(&value))
            .unwrap_or_else(|| format!("Upload failed with status {}", status.as_u16()));

        Err(UploadError::server_error(status.as_u16(), message))
    }
}

/// Strings go as-is, anything else as compact JSON
fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `{"error": "..."}`, `{"error": {"message": "..."}}` or `{"message": "..."}`
fn error_message(body: &Value) -> Option<String> {
    let candidate = match body.get("error") {
        Some(Value::Object(inner)) => inner.get("message"),
        Some(error) => Some(error),
        None => body.get("message"),
    };

    candidate
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!({"error": "disk full"})).as_deref(), Some("disk full"));
        assert_eq!(error_message(&json!({"error": {"message": "quota"}})).as_deref(), Some("quota"));
        assert_eq!(error_message(&json!({"message": "bad gateway"})).as_deref(), Some("bad gateway"));
        assert_eq!(error_message(&json!({"error": ""})), None);
        assert_eq!(error_message(&json!({"error": 42})), None);
        assert_eq!(error_message(&json!([1, 2])), None);
    }

    #[test]
    fn test_field_text() {
        assert_eq!(field_text(&json!("birthday")), "birthday");
        assert_eq!(field_text(&json!({"tags": ["a"]})), r#"{"tags":["a"]}"#);
        assert_eq!(field_text(&json!(42)), "42");
        assert_eq!(field_text(&json!(true)), "true");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_never_sends() {
        let transport = MultipartTransport::new(TransportConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        // unroutable port: would fail with a network error if a request went out
        let request = UploadRequest::new(
            crate::core::MediaPayload::new(vec![1u8, 2, 3], "image/png"),
            "http://127.0.0.1:9/upload",
        );
        let result = transport.send(&request, None, &token).await;
        assert!(matches!(result, Err(UploadError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let transport = MultipartTransport::new(TransportConfig::default()).unwrap();
        let request = UploadRequest::new(crate::core::MediaPayload::new(vec![1u8], "image/png"), "::nope");
        let result = transport.send(&request, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(UploadError::InvalidRequest(_))));
    }
}
