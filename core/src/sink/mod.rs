pub mod memory;
pub mod sqs;
pub mod uploader;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::QueueError;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;
pub use uploader::BatchUploader;

/// A message handed to the queue backend.
///
/// `id` doubles as the deduplication id and the message group id so that two
/// messages with identical bodies are never merged by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// An entry the backend refused even though the send call itself went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    pub sender_fault: bool,
}

impl FailedEntry {
    pub fn reason(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.code, message),
            None => self.code.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchOutput {
    pub failed: Vec<FailedEntry>,
}

/// The `QueueBackend` trait is the contract for the durable work queue that batches land in.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Sends up to the backend's per-call limit of messages in one request.
    ///
    /// An `Err` means the request as a whole failed; rejected entries of an
    /// otherwise successful request are reported through `SendBatchOutput::failed`.
    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[QueueMessage],
    ) -> Result<SendBatchOutput, QueueError>;

    async fn send_message(&self, queue_url: &str, message: &QueueMessage)
    -> Result<(), QueueError>;
}
