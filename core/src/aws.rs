use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::{AwsConfig, EnqueueConfig};
use crate::enqueuer::Enqueuer;
use crate::joblog::TracingJobLog;
use crate::liveness::S3Liveness;
use crate::sink::SqsQueue;
use crate::storage::S3BlobStore;

/// Loads the shared AWS configuration used by the S3 and SQS clients.
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint_url) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}

/// Wires an [`Enqueuer`] to SQS, S3 and the tracing backed job log.
pub async fn aws_enqueuer(config: EnqueueConfig) -> Enqueuer {
    let sdk_config = load_sdk_config(&config.aws).await;
    let force_path_style = config.aws.endpoint_url.is_some();

    let storage = S3BlobStore::new(&sdk_config, force_path_style);
    let liveness = S3Liveness::new(storage.client().clone(), config.storage.bucket.clone());
    let job_log = TracingJobLog::new(config.progress.log_group.clone());

    info!(
        region = ?sdk_config.region(),
        bucket = %config.storage.bucket,
        force_path_style,
        "Initialized AWS clients"
    );

    Enqueuer::new(
        config,
        Arc::new(SqsQueue::new(&sdk_config)),
        Arc::new(storage),
        Arc::new(liveness),
        Arc::new(job_log),
    )
}
