use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageAttributeValue, SendMessageBatchRequestEntry};
use tracing::debug;

use crate::errors::QueueError;
use crate::sink::{FailedEntry, QueueBackend, QueueMessage, SendBatchOutput};

/// FIFO SQS queue backend.
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn message_attributes(
    message: &QueueMessage,
) -> Result<Option<HashMap<String, MessageAttributeValue>>, QueueError> {
    if message.attributes.is_empty() {
        return Ok(None);
    }

    let mut attributes = HashMap::with_capacity(message.attributes.len());
    for (key, value) in &message.attributes {
        let value = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| QueueError::InvalidEntry {
                reason: e.to_string(),
            })?;
        attributes.insert(key.clone(), value);
    }
    Ok(Some(attributes))
}

#[async_trait]
impl QueueBackend for SqsQueue {
    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[QueueMessage],
    ) -> Result<SendBatchOutput, QueueError> {
        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            let entry = SendMessageBatchRequestEntry::builder()
                .id(&message.id)
                .message_body(&message.body)
                // the id is random so identical bodies are never deduplicated
                .message_deduplication_id(&message.id)
                .message_group_id(&message.id)
                .set_message_attributes(message_attributes(message)?)
                .build()
                .map_err(|e| QueueError::InvalidEntry {
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }

        let output = self
            .client
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| QueueError::Transport {
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let failed: Vec<FailedEntry> = output
            .failed()
            .iter()
            .map(|entry| FailedEntry {
                id: entry.id().to_string(),
                code: entry.code().to_string(),
                message: entry.message().map(str::to_string),
                sender_fault: entry.sender_fault(),
            })
            .collect();

        debug!(
            sent = output.successful().len(),
            failed = failed.len(),
            "SQS send_message_batch completed"
        );

        Ok(SendBatchOutput { failed })
    }

    async fn send_message(
        &self,
        queue_url: &str,
        message: &QueueMessage,
    ) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(queue_url)
            .message_body(&message.body)
            .message_deduplication_id(&message.id)
            .message_group_id(&message.id)
            .set_message_attributes(message_attributes(message)?)
            .send()
            .await
            .map_err(|e| QueueError::Transport {
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}
