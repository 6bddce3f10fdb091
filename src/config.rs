use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use crate::core::{ClassificationMode, FormFields};
use crate::utils::MB;

// 用于序列化 Duration
mod duration_secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "audio/webm",
    "audio/mpeg",
    "audio/mp4",
    "audio/ogg",
    "audio/wav",
    "audio/x-wav",
];

/// Limits enforced by the validation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
    #[serde(rename = "max_video_duration_secs", with = "duration_secs")]
    pub max_video_duration: Duration,
    #[serde(rename = "max_audio_duration_secs", with = "duration_secs")]
    pub max_audio_duration: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size: 50 * MB,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_video_duration: Duration::from_secs(300),
            max_audio_duration: Duration::from_secs(600),
        }
    }
}

impl ValidationLimits {
    /// Looser size ceiling used inside the executor
    pub fn executor_default() -> Self {
        Self {
            max_file_size: 100 * MB,
            ..Self::default()
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Multipart field the payload is attached under
    pub file_field: String,
    /// Size of the body chunks progress is reported on
    pub chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 分钟
            file_field: "file".to_string(),
            chunk_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Keys missing here fall back to [`ValidationLimits::executor_default`]
    #[serde(deserialize_with = "executor_limits")]
    pub validation: ValidationLimits,
    /// Command channel capacity
    pub queue_size: usize,
    #[serde(rename = "sweep_interval_secs", with = "duration_secs")]
    pub sweep_interval: Duration,
    #[serde(rename = "state_ttl_secs", with = "duration_secs")]
    pub state_ttl: Duration,
    pub classification: ClassificationMode,
}

/// Partial `[*.validation]` table layered over a base set of limits
#[derive(Deserialize, Default)]
#[serde(default)]
struct LimitsOverride {
    max_file_size: Option<u64>,
    allowed_types: Option<Vec<String>>,
    max_video_duration_secs: Option<u64>,
    max_audio_duration_secs: Option<u64>,
}

impl LimitsOverride {
    fn apply(self, mut limits: ValidationLimits) -> ValidationLimits {
        if let Some(max_file_size) = self.max_file_size {
            limits.max_file_size = max_file_size;
        }
        if let Some(allowed_types) = self.allowed_types {
            limits.allowed_types = allowed_types;
        }
        if let Some(secs) = self.max_video_duration_secs {
            limits.max_video_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_audio_duration_secs {
            limits.max_audio_duration = Duration::from_secs(secs);
        }
        limits
    }
}

fn executor_limits<'de, D>(deserializer: D) -> Result<ValidationLimits, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(LimitsOverride::deserialize(deserializer)?.apply(ValidationLimits::executor_default()))
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            validation: ValidationLimits::executor_default(),
            queue_size: 64,
            sweep_interval: Duration::from_secs(60),
            state_ttl: Duration::from_secs(5 * 60),
            classification: ClassificationMode::Structured,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub validation: ValidationLimits,
    /// Payloads at or above this size go to the executor when one is attached
    pub offload_threshold: Option<u64>,
    pub classification: ClassificationMode,
}

/// File based configuration for the command line uploader
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub file_path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub fields: FormFields,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Attempts made by the command line uploader for retryable failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl Config {
    pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&config_str).with_context(|| format!("Can't load {}", path.display()))
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(config_str)?;
        url::Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid endpoint: {}", config.endpoint))?;
        Ok(config)
    }
}
