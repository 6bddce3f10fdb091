//! Off-main-thread upload executor
//!
//! A message-passing actor with private state. Commands come in as
//! [`WorkerRequest`] envelopes, each one answered by exactly one
//! [`WorkerResponse`]. The actor keeps at most one in-flight entry per
//! upload id and periodically evicts entries nobody cleaned up.

mod handle;
mod messages;
mod registry;
mod worker;

pub use handle::{ExecutorHandle, UploadExecutor};
pub use messages::{Action, RequestData, WorkerRequest, WorkerResponse};
pub use registry::ActiveUpload;
