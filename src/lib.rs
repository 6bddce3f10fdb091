pub mod capture;
pub mod config;
pub mod core;
pub mod executor;
pub mod orchestrator;
pub mod uploaders;
pub mod utils;
pub mod validation;

// 重新导出核心类型
pub use crate::core::{
    ClassificationMode,
    ErrorKind,
    MediaPayload,
    NoopCallbacks,
    Result,
    UploadCallbacks,
    UploadError,
    UploadId,
    UploadProgress,
    UploadRequest,
    ValidationResult,
};

pub use executor::{ExecutorHandle, UploadExecutor, WorkerRequest, WorkerResponse};
pub use orchestrator::UploadOrchestrator;
pub use uploaders::MultipartTransport;
pub use validation::ValidationPolicy;
