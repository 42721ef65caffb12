use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, EnqueueError};

/// Backend limit on the size of a single message body.
pub const MESSAGE_SIZE_LIMIT: usize = 256 * 1024;
/// Backend limit on the number of entries in one send call.
pub const MAX_MESSAGES_PER_BATCH: usize = 10;
/// Size of each ranged read when streaming file contents.
pub const DEFAULT_FILE_CHUNK_SIZE: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnqueueConfig {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Overrides the service endpoints, e.g. for localstack.
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub message_size_limit: usize,
    pub max_messages_per_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            message_size_limit: MESSAGE_SIZE_LIMIT,
            max_messages_per_batch: MAX_MESSAGES_PER_BATCH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cluster bucket holding per-job state such as the liveness marker.
    pub bucket: String,
    pub file_chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            file_chunk_size: DEFAULT_FILE_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 20_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub log_every_batches: usize,
    pub log_group: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            log_every_batches: 10,
            log_group: "batch-jobs".to_string(),
        }
    }
}

pub async fn load_config(config_path: Option<&str>) -> Result<EnqueueConfig, EnqueueError> {
    let config = match config_path {
        Some(path) => EnqueueConfig::from_file(path)?,
        None => EnqueueConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

impl EnqueueConfig {
    pub fn from_file(path: &str) -> Result<Self, EnqueueError> {
        let content = std::fs::read_to_string(path)?;
        let config: EnqueueConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, EnqueueError> {
        let config_str = std::env::var("ENQUEUE_CONFIG").map_err(|_| ConfigError::MissingField {
            field: "ENQUEUE_CONFIG environment variable".to_string(),
        })?;
        let config: EnqueueConfig = serde_yaml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.message_size_limit == 0 || self.queue.message_size_limit > MESSAGE_SIZE_LIMIT
        {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "queue.message_size_limit must be between 1 and {MESSAGE_SIZE_LIMIT}"
                ),
            });
        }
        if self.queue.max_messages_per_batch == 0
            || self.queue.max_messages_per_batch > MAX_MESSAGES_PER_BATCH
        {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "queue.max_messages_per_batch must be between 1 and {MAX_MESSAGES_PER_BATCH}"
                ),
            });
        }
        if self.queue.max_retries == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "queue.max_retries must be at least 1".to_string(),
            });
        }
        if self.storage.file_chunk_size == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "storage.file_chunk_size cannot be zero".to_string(),
            });
        }
        if self.storage.bucket.is_empty() {
            return Err(ConfigError::MissingField {
                field: "storage.bucket".to_string(),
            });
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "heartbeat.interval_ms cannot be zero".to_string(),
            });
        }
        if self.progress.log_every_batches == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "progress.log_every_batches cannot be zero".to_string(),
            });
        }
        Ok(())
    }
}
