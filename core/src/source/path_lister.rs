use futures::TryStreamExt;
use tracing::info;

use crate::errors::{ConfigError, Result, ResultExt};
use crate::job::FilePathLister;
use crate::sink::BatchUploader;
use crate::source::{EnqueueContext, Progress, Source, random_id};

/// Enqueues the s3 paths of listed objects, `batch_size` paths per batch.
pub struct PathListerSource<'a> {
    lister: &'a FilePathLister,
}

impl<'a> PathListerSource<'a> {
    pub fn new(lister: &'a FilePathLister) -> Self {
        Self { lister }
    }
}

impl Source for PathListerSource<'_> {
    async fn enqueue(&self, ctx: &EnqueueContext<'_>) -> Result<usize> {
        let batch_size = self.lister.batch_size;
        if batch_size == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "file_path_lister.batch_size must be greater than zero".to_string(),
            }
            .into());
        }

        let mut uploader = ctx.uploader();
        let mut progress = Progress::new(ctx.config.progress.log_every_batches);
        let mut paths: Vec<String> = Vec::with_capacity(batch_size);
        let mut listed = 0usize;

        let mut objects = ctx.storage.list_objects(&self.lister.s3_lister);
        while let Some(object) = objects.try_next().await? {
            listed += 1;
            paths.push(object.s3_path());

            if paths.len() == batch_size {
                add_paths(&mut uploader, &paths).await?;
                paths.clear();
                progress.observe(ctx, uploader.total_batches()).await;
            }
        }

        if !paths.is_empty() {
            add_paths(&mut uploader, &paths).await?;
        }

        uploader.flush().await?;
        progress.observe(ctx, uploader.total_batches()).await;

        info!(
            job = %ctx.job.job_key.user_string(),
            paths = listed,
            batches = uploader.total_batches(),
            "Enqueued file paths"
        );
        Ok(uploader.total_batches())
    }
}

async fn add_paths(uploader: &mut BatchUploader, paths: &[String]) -> Result<()> {
    let body =
        serde_json::to_string(paths).with_context(|| format!("paths starting at {}", paths[0]))?;
    uploader
        .add(random_id(), body)
        .await
        .with_context(|| format!("paths starting at {}", paths[0]))
}
