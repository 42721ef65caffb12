use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::QueueError;
use crate::sink::{QueueBackend, QueueMessage, SendBatchOutput};

/// Queue that keeps every send in memory. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    sent: Arc<Mutex<SentLog>>,
}

#[derive(Debug, Default)]
struct SentLog {
    batches: Vec<Vec<QueueMessage>>,
    singles: Vec<QueueMessage>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_batch` call in order, one inner vector per call.
    pub fn batches(&self) -> Vec<Vec<QueueMessage>> {
        self.sent.lock().map(|log| log.batches.clone()).unwrap_or_default()
    }

    /// Messages sent outside of a batch, such as the completion sentinel.
    pub fn singles(&self) -> Vec<QueueMessage> {
        self.sent.lock().map(|log| log.singles.clone()).unwrap_or_default()
    }

    /// All batched message bodies in send order.
    pub fn bodies(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flatten()
            .map(|message| message.body)
            .collect()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn send_batch(
        &self,
        _queue_url: &str,
        messages: &[QueueMessage],
    ) -> Result<SendBatchOutput, QueueError> {
        let mut log = self.sent.lock().map_err(|_| QueueError::Transport {
            reason: "memory queue lock poisoned".to_string(),
        })?;
        log.batches.push(messages.to_vec());
        Ok(SendBatchOutput::default())
    }

    async fn send_message(
        &self,
        _queue_url: &str,
        message: &QueueMessage,
    ) -> Result<(), QueueError> {
        let mut log = self.sent.lock().map_err(|_| QueueError::Transport {
            reason: "memory queue lock poisoned".to_string(),
        })?;
        log.singles.push(message.clone());
        Ok(())
    }
}
