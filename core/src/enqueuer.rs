use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::EnqueueConfig;
use crate::errors::{Result, ResultExt};
use crate::job::{Input, JobSpec, JobSubmission};
use crate::joblog::JobLogSink;
use crate::liveness::{Heartbeat, LivenessStore};
use crate::sink::{QueueBackend, QueueMessage};
use crate::source::{
    DelimitedFilesSource, EnqueueContext, ItemListSource, PathListerSource, Source, random_id,
};
use crate::storage::BlobStore;

/// Body of the message appended after the last batch of a job.
pub const JOB_COMPLETE_BODY: &str = "\"job_complete\"";
pub const JOB_COMPLETE_ATTRIBUTE: &str = "job_complete";

/// The enqueuer drives a job submission from input to queue.
///
/// High-level:
/// 1. Record liveness and start the heartbeat.
/// 2. Run the ingestion mode picked by the submission.
/// 3. Append the job complete sentinel.
/// 4. Stop the heartbeat, whatever happened above.
pub struct Enqueuer {
    config: EnqueueConfig,
    queue: Arc<dyn QueueBackend>,
    storage: Arc<dyn BlobStore>,
    liveness: Arc<dyn LivenessStore>,
    job_log: Arc<dyn JobLogSink>,
}

impl Enqueuer {
    pub fn new(
        config: EnqueueConfig,
        queue: Arc<dyn QueueBackend>,
        storage: Arc<dyn BlobStore>,
        liveness: Arc<dyn LivenessStore>,
        job_log: Arc<dyn JobLogSink>,
    ) -> Self {
        Self {
            config,
            queue,
            storage,
            liveness,
            job_log,
        }
    }

    pub fn config(&self) -> &EnqueueConfig {
        &self.config
    }

    /// Enqueues every batch of `submission` followed by the sentinel and
    /// returns the number of batches the queue acknowledged.
    ///
    /// On error the queue keeps whatever was sent so far and no sentinel is sent.
    pub async fn enqueue(&self, job: &JobSpec, submission: &JobSubmission) -> Result<usize> {
        let started = Instant::now();
        submission.validate()?;

        if let Err(err) = self.job_log.create_channel(&job.job_key).await {
            warn!(
                job = %job.job_key.user_string(),
                error = %err,
                "Failed to create job log channel"
            );
        }

        self.liveness
            .update(&job.job_key)
            .await
            .with_context(|| {
                format!(
                    "failed to update liveness for {}",
                    job.job_key.user_string()
                )
            })?;

        let heartbeat = Heartbeat::start(
            self.liveness.clone(),
            job.job_key.clone(),
            Duration::from_millis(self.config.heartbeat.interval_ms),
        );

        let result = self.run(job, submission).await;
        heartbeat.stop().await;

        match &result {
            Ok(total_batches) => info!(
                job = %job.job_key.user_string(),
                total_batches,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job enqueued"
            ),
            Err(err) => warn!(
                job = %job.job_key.user_string(),
                error = %err,
                retryable = err.is_retryable(),
                "Job enqueue failed"
            ),
        }
        result
    }

    async fn run(&self, job: &JobSpec, submission: &JobSubmission) -> Result<usize> {
        let ctx = EnqueueContext {
            job,
            config: &self.config,
            queue: self.queue.clone(),
            storage: self.storage.as_ref(),
            job_log: self.job_log.as_ref(),
        };

        let total_batches = match submission.input() {
            Some(Input::Items(items)) => ItemListSource::new(items).enqueue(&ctx).await?,
            Some(Input::FilePaths(lister)) => PathListerSource::new(lister).enqueue(&ctx).await?,
            Some(Input::DelimitedFiles(files)) => {
                DelimitedFilesSource::new(files).enqueue(&ctx).await?
            }
            None => {
                info!(job = %job.job_key.user_string(), "Submission has no input to enqueue");
                0
            }
        };

        self.send_job_complete(job).await?;
        Ok(total_batches)
    }

    async fn send_job_complete(&self, job: &JobSpec) -> Result<()> {
        let sentinel = QueueMessage::new(random_id(), JOB_COMPLETE_BODY)
            .with_attribute(JOB_COMPLETE_ATTRIBUTE, "true");

        self.queue
            .send_message(&job.queue_url, &sentinel)
            .await
            .context("failed to enqueue job_complete placeholder")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EnqueueError, QueueError};
    use crate::job::{ItemList, JobKey};
    use crate::joblog::MemoryJobLog;
    use crate::liveness::MemoryLiveness;
    use crate::sink::{MemoryQueue, SendBatchOutput};
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Harness {
        queue: MemoryQueue,
        liveness: MemoryLiveness,
        job_log: MemoryJobLog,
        job: JobSpec,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                queue: MemoryQueue::new(),
                liveness: MemoryLiveness::new(),
                job_log: MemoryJobLog::new(),
                job: JobSpec {
                    job_key: JobKey::new("api", "job1"),
                    queue_url: "https://sqs.local/q.fifo".to_string(),
                },
            }
        }

        fn enqueuer_with_queue(&self, queue: Arc<dyn QueueBackend>) -> Enqueuer {
            let mut config = EnqueueConfig::default();
            config.storage.bucket = "cluster-bucket".to_string();
            Enqueuer::new(
                config,
                queue,
                Arc::new(MemoryBlobStore::new()),
                Arc::new(self.liveness.clone()),
                Arc::new(self.job_log.clone()),
            )
        }

        fn enqueuer(&self) -> Enqueuer {
            self.enqueuer_with_queue(Arc::new(self.queue.clone()))
        }
    }

    fn items(n: usize, batch_size: usize) -> JobSubmission {
        JobSubmission {
            item_list: Some(ItemList {
                items: (0..n).map(|i| json!(i)).collect(),
                batch_size,
            }),
            ..Default::default()
        }
    }

    /// Accepts batches but refuses the single message send.
    struct NoSentinelQueue;

    #[async_trait]
    impl QueueBackend for NoSentinelQueue {
        async fn send_batch(
            &self,
            _queue_url: &str,
            _messages: &[QueueMessage],
        ) -> std::result::Result<SendBatchOutput, QueueError> {
            Ok(SendBatchOutput::default())
        }

        async fn send_message(
            &self,
            _queue_url: &str,
            _message: &QueueMessage,
        ) -> std::result::Result<(), QueueError> {
            Err(QueueError::Transport {
                reason: "access denied".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_sentinel_follows_batches() {
        let harness = Harness::new();

        let total = harness
            .enqueuer()
            .enqueue(&harness.job, &items(25, 10))
            .await
            .unwrap();

        assert_eq!(total, 3);
        let singles = harness.queue.singles();
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].body, JOB_COMPLETE_BODY);
        assert_eq!(singles[0].attributes["job_complete"], "true");
        assert_eq!(singles[0].id.len(), 40);
        assert_eq!(harness.liveness.update_count(&harness.job.job_key), 1);
    }

    #[tokio::test]
    async fn test_empty_submission_sends_only_sentinel() {
        let harness = Harness::new();

        let total = harness
            .enqueuer()
            .enqueue(&harness.job, &JobSubmission::default())
            .await
            .unwrap();

        assert_eq!(total, 0);
        assert!(harness.queue.batches().is_empty());
        assert_eq!(harness.queue.singles().len(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_failure_is_reported() {
        let harness = Harness::new();

        let err = harness
            .enqueuer_with_queue(Arc::new(NoSentinelQueue))
            .enqueue(&harness.job, &items(3, 1))
            .await
            .unwrap_err();

        assert!(
            err.to_string()
                .starts_with("failed to enqueue job_complete placeholder: ")
        );
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected_before_any_side_effect() {
        let harness = Harness::new();

        let result = harness
            .enqueuer()
            .enqueue(&harness.job, &items(3, 0))
            .await;

        assert!(matches!(result, Err(EnqueueError::Config(_))));
        assert_eq!(harness.liveness.update_count(&harness.job.job_key), 0);
        assert!(harness.queue.singles().is_empty());
    }
}
