use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::EnqueueError;
use crate::job::JobKey;

/// User facing log for a single job, separate from the process log.
#[async_trait]
pub trait JobLogSink: Send + Sync {
    /// Prepares the job's log channel. Called once per job before any lines are appended.
    async fn create_channel(&self, job_key: &JobKey) -> Result<(), EnqueueError>;

    async fn append_lines(&self, job_key: &JobKey, lines: &[String]) -> Result<(), EnqueueError>;
}

/// Writes a line to the job log. Failures are logged and swallowed.
pub async fn write_to_job_log(sink: &dyn JobLogSink, job_key: &JobKey, line: impl Into<String>) {
    let lines = [line.into()];
    if let Err(err) = sink.append_lines(job_key, &lines).await {
        warn!(job = %job_key.user_string(), error = %err, "Failed to write to job log");
    }
}

/// Job log that emits every line as a tracing event tagged with the job's log group.
#[derive(Debug, Clone)]
pub struct TracingJobLog {
    log_group: String,
}

impl TracingJobLog {
    pub fn new(log_group: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
        }
    }

    pub fn log_group_name(&self, job_key: &JobKey) -> String {
        format!("{}/{}.{}", self.log_group, job_key.api_name, job_key.id)
    }
}

#[async_trait]
impl JobLogSink for TracingJobLog {
    async fn create_channel(&self, job_key: &JobKey) -> Result<(), EnqueueError> {
        info!(log_group = %self.log_group_name(job_key), "Created job log channel");
        Ok(())
    }

    async fn append_lines(&self, job_key: &JobKey, lines: &[String]) -> Result<(), EnqueueError> {
        let log_group = self.log_group_name(job_key);
        for line in lines {
            info!(log_group = %log_group, "{}", line);
        }
        Ok(())
    }
}

/// Job log that keeps lines in memory, per job.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobLog {
    lines: Arc<Mutex<Vec<(JobKey, String)>>>,
}

impl MemoryJobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self, job_key: &JobKey) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .filter(|(key, _)| key == job_key)
                    .map(|(_, line)| line.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobLogSink for MemoryJobLog {
    async fn create_channel(&self, _job_key: &JobKey) -> Result<(), EnqueueError> {
        Ok(())
    }

    async fn append_lines(&self, job_key: &JobKey, lines: &[String]) -> Result<(), EnqueueError> {
        let mut stored = self.lines.lock().map_err(|_| EnqueueError::JobLog {
            reason: "memory job log lock poisoned".to_string(),
        })?;
        stored.extend(lines.iter().map(|line| (job_key.clone(), line.clone())));
        Ok(())
    }
}
