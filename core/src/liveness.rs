//! Liveness marker for running jobs.
//!
//! The enqueuer writes the current time to `<job prefix>/last_updated` in the
//! cluster bucket when it starts and then on a fixed interval until ingestion
//! finishes. Stall detectors outside this crate poll the marker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::EnqueueError;
use crate::job::JobKey;

const LAST_UPDATED_FILE: &str = "last_updated";

#[async_trait]
pub trait LivenessStore: Send + Sync {
    /// Records that the job is still making progress.
    async fn update(&self, job_key: &JobKey) -> Result<(), EnqueueError>;
}

pub fn liveness_key(job_key: &JobKey) -> String {
    format!("{}/{}", job_key.prefix_key(), LAST_UPDATED_FILE)
}

/// Stores the liveness marker as a JSON timestamp in the cluster bucket.
#[derive(Clone)]
pub struct S3Liveness {
    client: Client,
    bucket: String,
}

impl S3Liveness {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl LivenessStore for S3Liveness {
    async fn update(&self, job_key: &JobKey) -> Result<(), EnqueueError> {
        let key = liveness_key(job_key);
        let body = serde_json::to_vec(&Utc::now())?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| EnqueueError::Liveness {
                reason: format!(
                    "{}: {}",
                    job_key.user_string(),
                    DisplayErrorContext(&e)
                ),
            })?;

        debug!(bucket = %self.bucket, key = %key, "Updated liveness");
        Ok(())
    }
}

/// Keeps every liveness update in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLiveness {
    updates: Arc<Mutex<Vec<(JobKey, DateTime<Utc>)>>>,
}

impl MemoryLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_count(&self, job_key: &JobKey) -> usize {
        self.updates
            .lock()
            .map(|updates| updates.iter().filter(|(key, _)| key == job_key).count())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LivenessStore for MemoryLiveness {
    async fn update(&self, job_key: &JobKey) -> Result<(), EnqueueError> {
        let mut updates = self.updates.lock().map_err(|_| EnqueueError::Liveness {
            reason: "memory liveness lock poisoned".to_string(),
        })?;
        updates.push((job_key.clone(), Utc::now()));
        Ok(())
    }
}

/// Background task refreshing a job's liveness marker on a fixed interval.
///
/// Call [`Heartbeat::stop`] to cancel it and wait for any in-flight update.
/// Dropping a running heartbeat cancels and aborts the task.
pub struct Heartbeat {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Heartbeat {
    /// Starts the heartbeat. The first update happens one `interval` from now.
    pub fn start(store: Arc<dyn LivenessStore>, job_key: JobKey, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let first_tick = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // errors never stop the heartbeat
                        if let Err(err) = store.update(&job_key).await {
                            error!(
                                job = %job_key.user_string(),
                                error = %err,
                                "liveness check cron failed"
                            );
                        }
                    }
                }
            }

            debug!(job = %job_key.user_string(), "Heartbeat stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
            interval,
        }
    }

    /// Cancels future updates and waits for an in-flight one to finish.
    ///
    /// The wait is bounded by one heartbeat interval. An update still running
    /// after that is aborted.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(self.interval, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "Heartbeat task did not shut down cleanly"),
            Err(_) => {
                warn!(
                    timeout_ms = self.interval.as_millis() as u64,
                    "Heartbeat update still running at shutdown, aborting it"
                );
                handle.abort();
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
