use std::path::Path;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::Result;

/// Auxiliary form fields, sent in insertion order
pub type FormFields = serde_json::Map<String, serde_json::Value>;

/// Logical upload identifier
///
/// Callers may supply their own token; [`UploadId::new`] generates one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    Video,
    Audio,
    Other,
}

impl MediaFamily {
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
        match essence.split('/').next().map(str::to_ascii_lowercase).as_deref() {
            Some("image") => MediaFamily::Image,
            Some("video") => MediaFamily::Video,
            Some("audio") => MediaFamily::Audio,
            _ => MediaFamily::Other,
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, MediaFamily::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFamily::Image => "image",
            MediaFamily::Video => "video",
            MediaFamily::Audio => "audio",
            MediaFamily::Other => "file",
        }
    }
}

/// Binary payload handed over by the capture side
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MediaPayload {
    pub data: Bytes,
    pub mime_type: String,
}

impl MediaPayload {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Read a file from disk, guessing the MIME type from its extension
    /// and falling back to content sniffing.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let mime_type = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(crate::uploaders::mime_for_file_name)
            .map(String::from)
            .or_else(|| infer::get(&data).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(Self::new(data, mime_type))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn family(&self) -> MediaFamily {
        MediaFamily::from_mime(&self.mime_type)
    }

    /// MIME type without parameters, lowercased
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or(&self.mime_type)
            .trim()
            .to_ascii_lowercase()
    }
}

/// One logical transfer attempt
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadRequest {
    pub id: UploadId,
    pub payload: MediaPayload,
    pub endpoint: String,
    #[serde(default)]
    pub fields: FormFields,
}

impl UploadRequest {
    pub fn new(payload: MediaPayload, endpoint: impl Into<String>) -> Self {
        Self {
            id: UploadId::new(),
            payload,
            endpoint: endpoint.into(),
            fields: FormFields::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<UploadId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_fields(mut self, fields: FormFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Live phase of a registered executor upload
///
/// Terminal outcomes are never stored: the registry entry is dropped instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadPhase {
    Validating,
    Uploading,
}

/// 上传进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percentage: u8,
}

impl UploadProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };

        Self { loaded, total, percentage }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.loaded >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid(warnings: Vec<String>) -> Self {
        Self { is_valid: true, error: None, warnings }
    }

    pub fn invalid(error: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            warnings,
        }
    }
}

// 静态断言确保类型是 Send 的
const _: () = {
    fn assert_send<T: Send + Sync>() {}
    fn assert_types() {
        assert_send::<UploadRequest>();
        assert_send::<UploadProgress>();
        assert_send::<ValidationResult>();
    }
};
