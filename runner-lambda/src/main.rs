use std::time::{Duration, Instant};

use enqueue_core::aws::aws_enqueuer;
use enqueue_core::config::load_config;
use enqueue_core::job::EnqueueRequest;
use enqueue_core::telemetry::init_tracing_with;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct LambdaRequest {
    #[serde(flatten)]
    pub request: EnqueueRequest,
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub max_runtime_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct LambdaResponse {
    pub status: String,
    pub total_batches: usize,
    pub runtime_seconds: f64,
    pub errors: Vec<String>,
}

impl LambdaResponse {
    fn failed(status: &str, error_msg: String, start_time: Instant) -> Self {
        error!("{}", error_msg);
        Self {
            status: status.to_string(),
            total_batches: 0,
            runtime_seconds: start_time.elapsed().as_secs_f64(),
            errors: vec![error_msg],
        }
    }
}

async fn lambda_handler(event: LambdaEvent<LambdaRequest>) -> Result<LambdaResponse, Error> {
    let start_time = Instant::now();
    let LambdaRequest {
        request,
        config_path,
        max_runtime_seconds,
    } = event.payload;

    let config = match load_config(config_path.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            return Ok(LambdaResponse::failed(
                "error",
                format!("Failed to load configuration: {}", e),
                start_time,
            ));
        }
    };

    // 14 minutes leaves headroom under the 15 minute lambda limit
    let max_runtime = Duration::from_secs(max_runtime_seconds.unwrap_or(840));
    let enqueuer = aws_enqueuer(config).await;

    info!(
        job = %request.job.job_key.user_string(),
        queue_url = %request.job.queue_url,
        "Enqueueing job"
    );

    match timeout(max_runtime, enqueuer.enqueue(&request.job, &request.submission)).await {
        Ok(Ok(total_batches)) => Ok(LambdaResponse {
            status: "success".to_string(),
            total_batches,
            runtime_seconds: start_time.elapsed().as_secs_f64(),
            errors: Vec::new(),
        }),
        Ok(Err(e)) => Ok(LambdaResponse::failed(
            "error",
            format!("Enqueue failed: {}", e),
            start_time,
        )),
        Err(_) => Ok(LambdaResponse::failed(
            "timeout",
            "Lambda timeout exceeded".to_string(),
            start_time,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing_with("enqueue_core=info,bootstrap=info");
    lambda_runtime::run(service_fn(lambda_handler)).await
}
