//! Pre-flight checks run before any network activity

mod probe;

use std::sync::Arc;
use crate::config::ValidationLimits;
use crate::core::{MediaFamily, MediaPayload, ValidationResult};
use crate::utils::{format_bytes, format_duration};

pub use probe::{DurationProbe, HeaderDurationProbe, ProbeError, wav_duration};
#[cfg(test)]
pub(crate) use probe::wav_bytes;

#[derive(Clone)]
pub struct ValidationPolicy {
    limits: ValidationLimits,
    probe: Arc<dyn DurationProbe>,
}

impl std::fmt::Debug for ValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPolicy")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::new(ValidationLimits::default())
    }
}

impl ValidationPolicy {
    pub fn new(limits: ValidationLimits) -> Self {
        Self {
            limits,
            probe: Arc::new(HeaderDurationProbe),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Run every rule and collect the outcome.
    ///
    /// Fatal causes are joined into `error`; advisories never affect validity.
    pub async fn validate(&self, payload: &MediaPayload) -> ValidationResult {
        let errors = self.fatal_errors(payload);
        let warnings = self.duration_warnings(payload).await;

        if !warnings.is_empty() {
            tracing::debug!(mime_type = %payload.mime_type, ?warnings, "Validation advisories");
        }

        if errors.is_empty() {
            ValidationResult::valid(warnings)
        } else {
            ValidationResult::invalid(errors.join("; "), warnings)
        }
    }

    /// Size, type and integrity rules
    pub fn fatal_errors(&self, payload: &MediaPayload) -> Vec<String> {
        let mut errors = Vec::new();
        let size = payload.size();

        if size > self.limits.max_file_size {
            errors.push(format!(
                "File size {} ({} bytes) exceeds the maximum allowed size of {}",
                format_bytes(size),
                size,
                format_bytes(self.limits.max_file_size),
            ));
        }

        let essence = payload.essence();
        if !self.limits.allowed_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&essence)) {
            errors.push(format!(
                "Unsupported file type: {}. Allowed types: {}",
                payload.mime_type,
                self.limits.allowed_types.join(", "),
            ));
        }

        if size == 0 {
            errors.push("File is empty".to_string());
        } else if payload.family().is_media() && !is_openable_media(&payload.data) {
            errors.push(format!(
                "Corrupted media: content is not a readable {} file",
                payload.family().as_str(),
            ));
        }

        errors
    }

    async fn duration_warnings(&self, payload: &MediaPayload) -> Vec<String> {
        let (label, max) = match payload.family() {
            MediaFamily::Video => ("Video", self.limits.max_video_duration),
            MediaFamily::Audio => ("Audio", self.limits.max_audio_duration),
            _ => return Vec::new(),
        };
        if payload.size() == 0 {
            return Vec::new();
        }

        match self.probe.probe(payload).await {
            Ok(Some(duration)) if duration > max => vec![format!(
                "{} duration {} exceeds the recommended {}; the upload may take longer",
                label,
                format_duration(duration),
                format_duration(max),
            )],
            Ok(_) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "Duration probe failed");
                vec![format!("Could not determine media duration: {}", err)]
            }
        }
    }
}

/// Structural check: the content sniffs as some image, video or audio container.
///
/// Family mismatches are tolerated, recorders commonly label audio-only WebM
/// as `audio/webm` while its signature reads as video.
fn is_openable_media(data: &[u8]) -> bool {
    infer::is_image(data) || infer::is_video(data) || infer::is_audio(data)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use async_trait::async_trait;
    use super::*;
    use crate::utils::MB;

    const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const WEBM: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

    fn sized(header: &[u8], size: usize, mime: &str) -> MediaPayload {
        let mut data = header.to_vec();
        data.resize(size, 0);
        MediaPayload::new(data, mime)
    }

    struct FixedProbe(Result<Option<Duration>, ProbeError>);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn probe(&self, _payload: &MediaPayload) -> Result<Option<Duration>, ProbeError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_valid_video_has_no_warnings() {
        let policy = ValidationPolicy::new(ValidationLimits::default());
        let result = policy.validate(&sized(&WEBM, 10_000_000, "video/webm")).await;

        assert!(result.is_valid);
        assert!(result.error.is_none());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_png_names_both_sizes() {
        let policy = ValidationPolicy::new(ValidationLimits::executor_default());
        let result = policy.validate(&sized(&PNG, 160_000_000, "image/png")).await;
        assert!(!result.is_valid);
        let error = result.error.unwrap();
        assert!(error.contains("160MB"), "{error}");
        assert!(error.contains("100MB"), "{error}");

        let policy = ValidationPolicy::new(ValidationLimits::default());
        let error = policy.validate(&sized(&PNG, 60_000_000, "image/png")).await.error.unwrap();
        assert!(error.contains("60MB") && error.contains("50MB"), "{error}");
    }

    #[tokio::test]
    async fn test_size_boundary() {
        let limits = ValidationLimits::default().with_max_file_size(1024);
        let policy = ValidationPolicy::new(limits);

        assert!(policy.validate(&sized(&PNG, 1024, "image/png")).await.is_valid);

        let over = policy.validate(&sized(&PNG, 1025, "image/png")).await;
        assert!(!over.is_valid);
        assert!(over.error.unwrap().contains("exceeds the maximum allowed size"));
    }

    #[tokio::test]
    async fn test_type_outside_allow_list_is_rejected_regardless_of_size() {
        let policy = ValidationPolicy::default();
        for size in [1, 1024, 10 * MB as usize] {
            let result = policy.validate(&sized(b"<html>", size, "text/html")).await;
            assert!(!result.is_valid);
            assert!(result.error.unwrap().contains("Unsupported file type: text/html"));
        }
    }

    #[tokio::test]
    async fn test_mime_parameters_do_not_bypass_allow_list() {
        let policy = ValidationPolicy::default();
        assert!(policy.validate(&sized(&WEBM, 100, "audio/webm;codecs=opus")).await.is_valid);
        assert!(!policy.validate(&sized(&WEBM, 100, "application/x-webm;x=audio/webm")).await.is_valid);
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let result = ValidationPolicy::default()
            .validate(&MediaPayload::new(Vec::<u8>::new(), "image/png"))
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.error.as_deref(), Some("File is empty"));
    }

    #[tokio::test]
    async fn test_unreadable_media_is_corrupted() {
        let result = ValidationPolicy::default()
            .validate(&sized(&[0u8; 4], 512, "image/jpeg"))
            .await;
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("Corrupted media"));
    }

    #[tokio::test]
    async fn test_all_fatal_rules_are_collected() {
        let policy = ValidationPolicy::new(ValidationLimits::default().with_max_file_size(10));
        let error = policy.validate(&sized(&[0u8; 4], 64, "video/x-msvideo")).await.error.unwrap();

        assert!(error.contains("exceeds the maximum"));
        assert!(error.contains("Unsupported file type"));
        assert!(error.contains("Corrupted media"));
    }

    #[tokio::test]
    async fn test_long_recording_is_a_warning_only() {
        let limits = ValidationLimits {
            max_audio_duration: Duration::from_secs(2),
            ..ValidationLimits::default()
        };
        let payload = MediaPayload::new(wav_bytes(3), "audio/wav");
        let result = ValidationPolicy::new(limits).validate(&payload).await;

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Audio duration 3s exceeds the recommended 2s"));
    }

    #[tokio::test]
    async fn test_probe_failure_never_fails_validation() {
        let policy = ValidationPolicy::default()
            .with_probe(Arc::new(FixedProbe(Err(ProbeError::Failed("decoder missing".into())))));
        let result = policy.validate(&sized(&WEBM, 100, "video/webm")).await;

        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["Could not determine media duration: probe failed: decoder missing"]);
    }

    #[tokio::test]
    async fn test_video_duration_limit_uses_probe() {
        let policy = ValidationPolicy::default()
            .with_probe(Arc::new(FixedProbe(Ok(Some(Duration::from_secs(400))))));

        let video = policy.validate(&sized(&WEBM, 100, "video/webm")).await;
        assert_eq!(video.warnings.len(), 1);

        // audio ceiling is 600s
        let audio = policy.validate(&sized(&WEBM, 100, "audio/webm")).await;
        assert!(audio.warnings.is_empty());

        // images are never probed
        let image = policy.validate(&sized(&PNG, 100, "image/png")).await;
        assert!(image.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_validation_is_deterministic() {
        let policy = ValidationPolicy::default();
        let payload = sized(&PNG, 64, "image/gif");
        let first = policy.validate(&payload).await;
        let second = policy.validate(&payload).await;
        assert_eq!(first, second);
    }
}
