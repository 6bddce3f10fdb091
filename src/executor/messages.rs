use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use crate::core::{FormFields, MediaPayload, UploadError, UploadId, UploadRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Validate,
    Upload,
    Cancel,
    Complete,
    /// Any action string this executor does not understand
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestData {
    pub payload: MediaPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub fields: FormFields,
}

/// Inbound envelope `{ id, action, data? }`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerRequest {
    pub id: UploadId,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestData>,
}

impl WorkerRequest {
    pub fn validate(id: UploadId, payload: MediaPayload) -> Self {
        Self {
            id,
            action: Action::Validate,
            data: Some(RequestData {
                payload,
                endpoint: None,
                fields: FormFields::new(),
            }),
        }
    }

    pub fn upload(request: UploadRequest) -> Self {
        Self {
            id: request.id,
            action: Action::Upload,
            data: Some(RequestData {
                payload: request.payload,
                endpoint: Some(request.endpoint),
                fields: request.fields,
            }),
        }
    }

    pub fn cancel(id: UploadId) -> Self {
        Self { id, action: Action::Cancel, data: None }
    }

    pub fn complete(id: UploadId) -> Self {
        Self { id, action: Action::Complete, data: None }
    }
}

/// Outbound envelope `{ id, success, progress, error?, data?, retryable? }`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerResponse {
    pub id: UploadId,
    pub success: bool,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl WorkerResponse {
    pub fn ok(id: UploadId, data: Value) -> Self {
        Self {
            id,
            success: true,
            progress: 100,
            error: None,
            data: Some(data),
            retryable: None,
        }
    }

    pub fn failure(id: UploadId, error: &UploadError, retryable: bool) -> Self {
        Self {
            id,
            success: false,
            progress: 0,
            error: Some(error.to_string()),
            data: error.is_cancelled().then(|| json!({ "cancelled": true })),
            retryable: Some(retryable),
        }
    }

    pub fn cancelled(id: UploadId) -> Self {
        Self {
            id,
            success: true,
            progress: 0,
            error: None,
            data: Some(json!({ "cancelled": true })),
            retryable: None,
        }
    }

    pub fn unknown_action(id: UploadId) -> Self {
        Self {
            id,
            success: false,
            progress: 0,
            error: Some("Unknown action".to_string()),
            data: None,
            retryable: Some(false),
        }
    }

    /// True when this is the terminal response of an aborted upload
    pub fn is_cancellation(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|data| data.get("cancelled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
