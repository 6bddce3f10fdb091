use std::sync::Arc;
use serde_json::Value;
use super::types::UploadProgress;

/// Progress sink handed to the transport
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Callbacks the orchestrator reports through
///
/// Every method has a no-op default so callers only implement what they
/// care about. `on_progress` runs on the task driving the request body and
/// must not block.
pub trait UploadCallbacks: Send + Sync {
    /// 上传完成回调
    fn on_success(&self, _body: &Value) {}

    /// 上传失败回调, exactly once per failed attempt
    fn on_error(&self, _message: &str, _retryable: bool) {}

    /// 进度更新回调
    fn on_progress(&self, _progress: &UploadProgress) {}

    /// Non-blocking validation advisories
    fn on_warning(&self, _warnings: &[String]) {}
}

pub struct NoopCallbacks;

impl UploadCallbacks for NoopCallbacks {}
