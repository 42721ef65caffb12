pub mod delimited_files;
pub mod item_list;
pub mod path_lister;

use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::config::EnqueueConfig;
use crate::errors::Result;
use crate::job::JobSpec;
use crate::joblog::{JobLogSink, write_to_job_log};
use crate::sink::{BatchUploader, QueueBackend};
use crate::storage::BlobStore;

pub use delimited_files::DelimitedFilesSource;
pub use item_list::ItemListSource;
pub use path_lister::PathListerSource;

/// Identity length. The backend allows up to 80 characters but the id can show
/// up in user facing error messages.
const MESSAGE_ID_LENGTH: usize = 40;

/// Random, content independent message identity.
pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Everything an input source needs to turn a submission into queued batches.
pub struct EnqueueContext<'a> {
    pub job: &'a JobSpec,
    pub config: &'a EnqueueConfig,
    pub queue: Arc<dyn QueueBackend>,
    pub storage: &'a dyn BlobStore,
    pub job_log: &'a dyn JobLogSink,
}

impl EnqueueContext<'_> {
    /// A fresh uploader for one ingestion run.
    pub fn uploader(&self) -> BatchUploader {
        BatchUploader::from_config(self.queue.clone(), &self.job.queue_url, &self.config.queue)
    }

    pub async fn log(&self, line: impl Into<String>) {
        write_to_job_log(self.job_log, &self.job.job_key, line).await;
    }
}

/// One ingestion mode of a job submission.
///
/// `enqueue` drives a single uploader to completion and returns the number of
/// batches the queue acknowledged.
pub(crate) trait Source {
    async fn enqueue(&self, ctx: &EnqueueContext<'_>) -> Result<usize>;
}

/// Reports `enqueued N batches` to the job log every time the batch count
/// passes another multiple of the configured interval.
pub(crate) struct Progress {
    every: usize,
    last_reported: usize,
}

impl Progress {
    pub(crate) fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            last_reported: 0,
        }
    }

    pub(crate) async fn observe(&mut self, ctx: &EnqueueContext<'_>, total_batches: usize) {
        if total_batches / self.every > self.last_reported / self.every {
            ctx.log(format!("enqueued {total_batches} batches")).await;
        }
        self.last_reported = total_batches;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::job::JobKey;
    use crate::joblog::MemoryJobLog;
    use crate::sink::MemoryQueue;
    use crate::storage::MemoryBlobStore;

    pub(crate) struct Fixture {
        pub job: JobSpec,
        pub config: EnqueueConfig,
        pub queue: MemoryQueue,
        pub storage: MemoryBlobStore,
        pub job_log: MemoryJobLog,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let mut config = EnqueueConfig::default();
            config.storage.bucket = "cluster-bucket".to_string();
            Self {
                job: JobSpec {
                    job_key: JobKey::new("test-api", "job-1"),
                    queue_url: "https://sqs.local/queue.fifo".to_string(),
                },
                config,
                queue: MemoryQueue::new(),
                storage: MemoryBlobStore::new(),
                job_log: MemoryJobLog::new(),
            }
        }

        pub(crate) fn context(&self) -> EnqueueContext<'_> {
            EnqueueContext {
                job: &self.job,
                config: &self.config,
                queue: Arc::new(self.queue.clone()),
                storage: &self.storage,
                job_log: &self.job_log,
            }
        }

        pub(crate) fn log_lines(&self) -> Vec<String> {
            self.job_log.lines(&self.job.job_key)
        }
    }
}
