use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use enqueue_core::aws::{aws_enqueuer, load_sdk_config};
use enqueue_core::config::{EnqueueConfig, load_config};
use enqueue_core::enqueuer::Enqueuer;
use enqueue_core::job::EnqueueRequest;
use enqueue_core::joblog::TracingJobLog;
use enqueue_core::liveness::MemoryLiveness;
use enqueue_core::sink::MemoryQueue;
use enqueue_core::storage::S3BlobStore;
use enqueue_core::telemetry::init_tracing_with;
use tracing::info;

/// This is the entry point for enqueueing a single job from a container on
/// hosting services like AWS EKS, ECS, etc.
///
/// What it does at a high-level:
///     Load config from `ENQUEUE_CONFIG_PATH`, falling back to `ENQUEUE_CONFIG`.
///     Load the job request from the JSON file at `ENQUEUE_REQUEST_PATH`.
///     Enqueue the job and exit. A failed enqueue exits non zero.
///
/// With `DRY_RUN=true` inputs are still read from S3 but batches are kept in
/// memory and the liveness marker is not written.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing_with("enqueue_core=info,runner_container=info");

    let config_path = env::var("ENQUEUE_CONFIG_PATH").ok();
    let config = load_config(config_path.as_deref())
        .await
        .context("Failed to load configuration")?;

    let request_path =
        env::var("ENQUEUE_REQUEST_PATH").context("ENQUEUE_REQUEST_PATH is not set")?;
    let request = read_request(&request_path)?;

    let dry_run = env::var("DRY_RUN").map(|v| v == "true").unwrap_or(false);
    let (enqueuer, dry_run_queue) = if dry_run {
        let queue = MemoryQueue::new();
        (dry_run_enqueuer(config, queue.clone()).await, Some(queue))
    } else {
        (aws_enqueuer(config).await, None)
    };

    let total_batches = enqueuer
        .enqueue(&request.job, &request.submission)
        .await
        .with_context(|| format!("Failed to enqueue {}", request.job.job_key.user_string()))?;

    if let Some(queue) = dry_run_queue {
        info!(
            total_batches,
            bytes = queue.bodies().iter().map(String::len).sum::<usize>(),
            "DRY RUN: batches kept in memory"
        );
    }
    info!(
        job = %request.job.job_key.user_string(),
        total_batches,
        "Enqueue completed"
    );
    Ok(())
}

fn read_request(path: &str) -> Result<EnqueueRequest> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid job request in {path}"))
}

async fn dry_run_enqueuer(config: EnqueueConfig, queue: MemoryQueue) -> Enqueuer {
    let sdk_config = load_sdk_config(&config.aws).await;
    let storage = S3BlobStore::new(&sdk_config, config.aws.endpoint_url.is_some());
    let job_log = TracingJobLog::new(config.progress.log_group.clone());

    Enqueuer::new(
        config,
        Arc::new(queue),
        Arc::new(storage),
        Arc::new(MemoryLiveness::new()),
        Arc::new(job_log),
    )
}
