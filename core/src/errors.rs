use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("message size ({size} bytes) exceeds the maximum allowed size ({limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("Failed to update liveness: {reason}")]
    Liveness { reason: String },

    #[error("Failed to write to job log: {reason}")]
    JobLog { reason: String },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EnqueueError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed after retrying {attempts} times: {source}")]
    FlushFailed {
        attempts: u32,
        #[source]
        source: Box<QueueError>,
    },

    #[error("failed to enqueue message, {reason} (batch {})", batch_label(.batch))]
    PartialFailure { reason: String, batch: Option<usize> },

    #[error("Failed to send to queue: {reason}")]
    Transport { reason: String },

    #[error("Invalid queue entry: {reason}")]
    InvalidEntry { reason: String },
}

fn batch_label(batch: &Option<usize>) -> String {
    match batch {
        Some(batch) => batch.to_string(),
        None => "unknown".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to list objects under {path}: {reason}")]
    ListObjects { path: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid s3 path {path}")]
    InvalidPath { path: String },

    #[error("Invalid path pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {reason}")]
    Json { reason: String },

    #[error("YAML serialization failed: {reason}")]
    Yaml { reason: String },
}

pub type Result<T> = std::result::Result<T, EnqueueError>;

impl From<serde_json::Error> for EnqueueError {
    fn from(err: serde_json::Error) -> Self {
        EnqueueError::Serialization(SerializationError::Json {
            reason: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for EnqueueError {
    fn from(err: serde_yaml::Error) -> Self {
        EnqueueError::Serialization(SerializationError::Yaml {
            reason: err.to_string(),
        })
    }
}

impl EnqueueError {
    /// Wraps the error with a human readable position such as `item 3` or an s3 path.
    pub fn context(self, context: impl Into<String>) -> Self {
        EnqueueError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping over any positional context.
    pub fn root(&self) -> &EnqueueError {
        match self {
            EnqueueError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self.root() {
            EnqueueError::Queue(QueueError::Transport { .. }) => true,
            EnqueueError::Queue(QueueError::FlushFailed { .. }) => true,
            EnqueueError::Storage(StorageError::ListObjects { .. }) => true,
            EnqueueError::Storage(StorageError::Read { .. }) => true,
            EnqueueError::Liveness { .. } => true,
            EnqueueError::JobLog { .. } => true,
            EnqueueError::Config(_) => false,
            EnqueueError::PayloadTooLarge { .. } => false,
            EnqueueError::MalformedInput { .. } => false,
            EnqueueError::Serialization(_) => false,
            _ => false,
        }
    }
}

pub trait ResultExt<T> {
    /// Attaches a positional hint to the error, if any.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`] but only builds the hint on failure.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EnqueueError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|err| err.into().context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|err| err.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingField {
            field: "storage.bucket".to_string(),
        };
        assert_eq!(error.to_string(), "Missing required field: storage.bucket");
    }

    #[test]
    fn test_payload_too_large_display() {
        let error = EnqueueError::PayloadTooLarge {
            size: 300,
            limit: 256,
        };
        assert_eq!(
            error.to_string(),
            "message size (300 bytes) exceeds the maximum allowed size (256 bytes)"
        );
    }

    #[test]
    fn test_flush_failed_display() {
        let error = QueueError::FlushFailed {
            attempts: 3,
            source: Box::new(QueueError::Transport {
                reason: "connection reset".to_string(),
            }),
        };
        assert_eq!(
            error.to_string(),
            "failed after retrying 3 times: Failed to send to queue: connection reset"
        );
    }

    #[test]
    fn test_partial_failure_display() {
        let error = QueueError::PartialFailure {
            reason: "throttled".to_string(),
            batch: Some(4),
        };
        assert_eq!(
            error.to_string(),
            "failed to enqueue message, throttled (batch 4)"
        );

        let error = QueueError::PartialFailure {
            reason: "throttled".to_string(),
            batch: None,
        };
        assert!(error.to_string().ends_with("(batch unknown)"));
    }

    #[test]
    fn test_context_wraps_and_unwraps() {
        let error = EnqueueError::PayloadTooLarge {
            size: 10,
            limit: 5,
        }
        .context("document 7")
        .context("s3://bucket/file.json");

        assert!(error.to_string().starts_with("s3://bucket/file.json: document 7: "));
        assert!(matches!(error.root(), EnqueueError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_storage_error_display() {
        let error = StorageError::Read {
            path: "s3://test-bucket/a.json".to_string(),
            reason: "Access denied".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to read s3://test-bucket/a.json: Access denied"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let transport: EnqueueError = QueueError::Transport {
            reason: "timeout".to_string(),
        }
        .into();
        assert!(transport.is_retryable());
        assert!(transport.context("batch 2").is_retryable());

        let malformed = EnqueueError::MalformedInput {
            reason: "unexpected end of file".to_string(),
        };
        assert!(!malformed.is_retryable());

        let config: EnqueueError = ConfigError::ValidationFailed {
            reason: "Invalid field".to_string(),
        }
        .into();
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::result::Result<(), StorageError> = Err(StorageError::InvalidPath {
            path: "bucket".to_string(),
        });
        let err = result.context("listing").unwrap_err();
        assert_eq!(err.to_string(), "listing: Storage error: Invalid s3 path bucket");
    }
}
