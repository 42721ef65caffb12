use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{MAX_MESSAGES_PER_BATCH, MESSAGE_SIZE_LIMIT, QueueConfig};
use crate::errors::{EnqueueError, QueueError};
use crate::sink::{QueueBackend, QueueMessage};

const DEFAULT_RETRIES: u32 = 3;

/// Accumulates messages and sends them to the queue in groups that respect the
/// backend's per-call byte and entry limits.
///
/// Every accepted message is a batch from the job's point of view and gets a
/// 1-based batch number in the order it was added. `total_batches` counts the
/// batches the backend has acknowledged.
pub struct BatchUploader {
    queue: Arc<dyn QueueBackend>,
    queue_url: String,
    retries: u32,
    size_limit: usize,
    max_messages: usize,

    messages: Vec<QueueMessage>,
    batch_numbers: HashMap<String, usize>,
    total_bytes: usize,
    assigned_batches: usize,
    total_batches: usize,
}

impl BatchUploader {
    pub fn new(queue: Arc<dyn QueueBackend>, queue_url: impl Into<String>) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
            retries: DEFAULT_RETRIES,
            size_limit: MESSAGE_SIZE_LIMIT,
            max_messages: MAX_MESSAGES_PER_BATCH,
            messages: Vec::with_capacity(MAX_MESSAGES_PER_BATCH),
            batch_numbers: HashMap::new(),
            total_bytes: 0,
            assigned_batches: 0,
            total_batches: 0,
        }
    }

    pub fn from_config(
        queue: Arc<dyn QueueBackend>,
        queue_url: impl Into<String>,
        config: &QueueConfig,
    ) -> Self {
        Self::new(queue, queue_url)
            .with_retries(config.max_retries)
            .with_limits(config.message_size_limit, config.max_messages_per_batch)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_limits(mut self, size_limit: usize, max_messages: usize) -> Self {
        self.size_limit = size_limit;
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Batches acknowledged by the backend so far.
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    pub fn pending_messages(&self) -> usize {
        self.messages.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Queues `body` under `id`, flushing the already pending messages first if
    /// adding it would break the byte or entry limit.
    ///
    /// An oversized body is rejected without touching the pending set. If the
    /// flush fails the new message is not added.
    pub async fn add(&mut self, id: String, body: String) -> Result<(), EnqueueError> {
        if body.len() > self.size_limit {
            return Err(EnqueueError::PayloadTooLarge {
                size: body.len(),
                limit: self.size_limit,
            });
        }

        // a pending total exactly at the limit is still a valid send
        if self.total_bytes + body.len() > self.size_limit
            || self.messages.len() >= self.max_messages
        {
            self.flush().await?;
        }

        self.assigned_batches += 1;
        self.batch_numbers.insert(id.clone(), self.assigned_batches);
        self.total_bytes += body.len();
        self.messages.push(QueueMessage::new(id, body));
        Ok(())
    }

    /// Sends all pending messages, retrying immediately up to the configured
    /// number of attempts. Pending state is kept when every attempt fails.
    pub async fn flush(&mut self) -> Result<(), QueueError> {
        if self.messages.is_empty() {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 1..=self.retries {
            match self.send().await {
                Ok(()) => {
                    self.total_batches += self.messages.len();
                    debug!(
                        messages = self.messages.len(),
                        bytes = self.total_bytes,
                        total_batches = self.total_batches,
                        "Flushed pending messages to queue"
                    );
                    self.messages.clear();
                    self.batch_numbers.clear();
                    self.total_bytes = 0;
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        attempt,
                        retries = self.retries,
                        error = %err,
                        "Failed to send messages to queue"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(QueueError::FlushFailed {
            attempts: self.retries,
            source: Box::new(last_error.unwrap_or_else(|| QueueError::Transport {
                reason: "no send attempted".to_string(),
            })),
        })
    }

    async fn send(&self) -> Result<(), QueueError> {
        let output = self
            .queue
            .send_batch(&self.queue_url, &self.messages)
            .await?;

        match output.failed.first() {
            None => Ok(()),
            Some(failed) => Err(QueueError::PartialFailure {
                reason: failed.reason(),
                batch: self.batch_numbers.get(&failed.id).copied(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FailedEntry, MemoryQueue, SendBatchOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingQueue {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueBackend for FailingQueue {
        async fn send_batch(
            &self,
            _queue_url: &str,
            _messages: &[QueueMessage],
        ) -> Result<SendBatchOutput, QueueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Transport {
                reason: "connection refused".to_string(),
            })
        }

        async fn send_message(
            &self,
            _queue_url: &str,
            _message: &QueueMessage,
        ) -> Result<(), QueueError> {
            Ok(())
        }
    }

    struct RejectingQueue {
        reject_id: String,
    }

    #[async_trait]
    impl QueueBackend for RejectingQueue {
        async fn send_batch(
            &self,
            _queue_url: &str,
            messages: &[QueueMessage],
        ) -> Result<SendBatchOutput, QueueError> {
            let failed = messages
                .iter()
                .filter(|m| m.id == self.reject_id)
                .map(|m| FailedEntry {
                    id: m.id.clone(),
                    code: "InvalidMessageContents".to_string(),
                    message: Some("bad body".to_string()),
                    sender_fault: true,
                })
                .collect();
            Ok(SendBatchOutput { failed })
        }

        async fn send_message(
            &self,
            _queue_url: &str,
            _message: &QueueMessage,
        ) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn uploader(queue: &MemoryQueue) -> BatchUploader {
        BatchUploader::new(Arc::new(queue.clone()), "queue-url")
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let failing = Arc::new(FailingQueue {
            calls: AtomicUsize::new(0),
        });
        let mut uploader = BatchUploader::new(failing.clone(), "queue-url");

        uploader.flush().await.unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
        assert_eq!(uploader.total_batches(), 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_without_flush() {
        let queue = MemoryQueue::new();
        let mut uploader = uploader(&queue).with_limits(16, 10);

        uploader.add("a".into(), "0123456789".into()).await.unwrap();
        let err = uploader
            .add("b".into(), "x".repeat(17))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EnqueueError::PayloadTooLarge {
                size: 17,
                limit: 16
            }
        ));
        assert_eq!(uploader.pending_messages(), 1);
        assert_eq!(uploader.pending_bytes(), 10);
        assert!(queue.batches().is_empty());
    }

    #[tokio::test]
    async fn test_flushes_before_exceeding_byte_limit() {
        let queue = MemoryQueue::new();
        let mut uploader = uploader(&queue).with_limits(10, 10);

        uploader.add("a".into(), "aaaa".into()).await.unwrap();
        uploader.add("b".into(), "bbbbbb".into()).await.unwrap();
        // exactly at the limit, nothing sent yet
        assert!(queue.batches().is_empty());
        assert_eq!(uploader.pending_bytes(), 10);

        uploader.add("c".into(), "c".into()).await.unwrap();
        let batches = queue.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(uploader.pending_messages(), 1);
        assert_eq!(uploader.total_batches(), 2);

        uploader.flush().await.unwrap();
        assert_eq!(uploader.total_batches(), 3);
        assert_eq!(queue.bodies(), vec!["aaaa", "bbbbbb", "c"]);
    }

    #[tokio::test]
    async fn test_flushes_at_entry_limit() {
        let queue = MemoryQueue::new();
        let mut uploader = uploader(&queue);

        for i in 0..25 {
            uploader.add(format!("id-{i}"), format!("{i}")).await.unwrap();
        }
        uploader.flush().await.unwrap();

        let sizes: Vec<usize> = queue.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(uploader.total_batches(), 25);
    }

    #[tokio::test]
    async fn test_message_identity_used_for_dedup() {
        let queue = MemoryQueue::new();
        let mut uploader = uploader(&queue);

        uploader.add("first".into(), "same".into()).await.unwrap();
        uploader.add("second".into(), "same".into()).await.unwrap();
        uploader.flush().await.unwrap();

        let ids: Vec<String> = queue.batches()[0].iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_flush_retries_then_keeps_pending() {
        let failing = Arc::new(FailingQueue {
            calls: AtomicUsize::new(0),
        });
        let mut uploader = BatchUploader::new(failing.clone(), "queue-url").with_retries(4);

        uploader.add("a".into(), "[1]".into()).await.unwrap();
        let err = uploader.flush().await.unwrap_err();

        assert_eq!(failing.calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, QueueError::FlushFailed { attempts: 4, .. }));
        assert!(err.to_string().contains("failed after retrying 4 times"));
        assert_eq!(uploader.pending_messages(), 1);
        assert_eq!(uploader.pending_bytes(), 3);
        assert_eq!(uploader.total_batches(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_new_message() {
        let failing = Arc::new(FailingQueue {
            calls: AtomicUsize::new(0),
        });
        let mut uploader = BatchUploader::new(failing, "queue-url").with_limits(4, 10);

        uploader.add("a".into(), "aaa".into()).await.unwrap();
        let err = uploader.add("b".into(), "bb".into()).await.unwrap_err();

        assert!(matches!(
            err,
            EnqueueError::Queue(QueueError::FlushFailed { .. })
        ));
        assert_eq!(uploader.pending_messages(), 1);
        assert_eq!(uploader.pending_bytes(), 3);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_batch_number() {
        let queue = Arc::new(RejectingQueue {
            reject_id: "third".to_string(),
        });
        let mut uploader = BatchUploader::new(queue, "queue-url").with_retries(1);

        for id in ["first", "second", "third"] {
            uploader.add(id.into(), "{}".into()).await.unwrap();
        }
        let err = uploader.flush().await.unwrap_err();

        match err {
            QueueError::FlushFailed { attempts, source } => {
                assert_eq!(attempts, 1);
                assert!(matches!(
                    *source,
                    QueueError::PartialFailure {
                        batch: Some(3),
                        ..
                    }
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
