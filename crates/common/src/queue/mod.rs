//! SQS Queue integration for async job hand-off
//!
//! Provides:
//! - SQS client wrapper with retry logic
//! - Typed message serialization/deserialization
//! - Poison message handling (left for the dead letter queue)

use crate::errors::{AppError, Result};
use crate::retry::RetryPolicy;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// Dead letter queue URL (optional)
    pub dlq_url: Option<String>,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            dlq_url: None,
            visibility_timeout: 900,
            wait_time_seconds: 20,
            max_messages: 1,
        }
    }
}

/// A decoded message plus the handle needed to acknowledge it
#[derive(Debug, Clone)]
pub struct Received<T> {
    pub body: T,
    pub receipt_handle: String,
}

/// SQS Queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
    retry: RetryPolicy,
}

impl Queue {
    /// Create a new queue client from the ambient AWS configuration
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self::with_client(client, config))
    }

    /// Create with existing SQS client
    pub fn with_client(client: SqsClient, config: QueueConfig) -> Self {
        Self {
            client,
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Queue URL this client talks to
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Send a message to the queue
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<String> {
        let body = serde_json::to_string(message)
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to serialize message: {}", e)
            })?;

        let client = &self.client;
        let url = &self.config.url;
        let body = &body;

        let result = self.retry.run("sqs.send_message", || async move {
            client
                .send_message()
                .queue_url(url)
                .message_body(body)
                .send()
                .await
                .map_err(|e| AppError::Upstream {
                    service: "sqs".to_string(),
                    status: None,
                    message: format!("Failed to send message: {}", e),
                })
        })
        .await?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, "Message sent to queue");

        Ok(message_id)
    }

    /// Receive and decode messages from the queue.
    ///
    /// Messages that fail to decode are logged and skipped; they become visible
    /// again after the visibility timeout and eventually move to the DLQ.
    pub async fn receive<T: DeserializeOwned>(&self) -> Result<Vec<Received<T>>> {
        let result = self.client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        let mut decoded = Vec::with_capacity(messages.len());
        for message in &messages {
            let receipt_handle = match message.receipt_handle.as_deref() {
                Some(handle) => handle.to_string(),
                None => continue,
            };
            match Self::parse_message::<T>(message) {
                Ok(body) => decoded.push(Received { body, receipt_handle }),
                Err(e) => {
                    error!(
                        message_id = ?message.message_id,
                        error = %e,
                        "Skipping undecodable message"
                    );
                }
            }
        }

        Ok(decoded)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body.as_ref().ok_or_else(|| AppError::QueueError {
            message: "Message has no body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| AppError::QueueError {
            message: format!("Failed to parse message: {}", e),
        })
    }
}
