pub mod aws;
pub mod config;
pub mod enqueuer;
pub mod errors;
pub mod job;
pub mod joblog;
pub mod liveness;
pub mod sink;
pub mod source;
pub mod splitter;
pub mod storage;
pub mod telemetry;

pub use config::{EnqueueConfig, load_config};
pub use enqueuer::Enqueuer;
pub use errors::{EnqueueError, Result};
pub use job::{JobKey, JobSpec, JobSubmission};
