mod errors;
mod traits;
mod types;

pub use errors::{ClassificationMode, ErrorKind, Result, UploadError, looks_like_validation_rejection};
pub use traits::{NoopCallbacks, ProgressFn, UploadCallbacks};
pub use types::{
    FormFields,
    MediaFamily,
    MediaPayload,
    UploadId,
    UploadPhase,
    UploadProgress,
    UploadRequest,
    ValidationResult,
};
