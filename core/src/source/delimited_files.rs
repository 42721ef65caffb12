use futures::TryStreamExt;
use tracing::{debug, info};

use crate::errors::{ConfigError, Result, ResultExt};
use crate::job::DelimitedFiles;
use crate::sink::BatchUploader;
use crate::source::{EnqueueContext, Progress, Source, random_id};
use crate::splitter::{Document, DocumentSplitter};
use crate::storage::ObjectRef;

/// Streams JSON documents out of every listed file and enqueues them
/// `batch_size` documents per batch.
pub struct DelimitedFilesSource<'a> {
    files: &'a DelimitedFiles,
}

/// State shared by every file of one run.
struct FileRun<'c, 'a> {
    ctx: &'c EnqueueContext<'a>,
    uploader: BatchUploader,
    progress: Progress,
    documents: Vec<Document>,
    batch_size: usize,
}

impl<'a> DelimitedFilesSource<'a> {
    pub fn new(files: &'a DelimitedFiles) -> Self {
        Self { files }
    }
}

impl Source for DelimitedFilesSource<'_> {
    async fn enqueue(&self, ctx: &EnqueueContext<'_>) -> Result<usize> {
        let batch_size = self.files.batch_size;
        if batch_size == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "delimited_files.batch_size must be greater than zero".to_string(),
            }
            .into());
        }

        let mut run = FileRun {
            ctx,
            uploader: ctx.uploader(),
            progress: Progress::new(ctx.config.progress.log_every_batches),
            documents: Vec::with_capacity(batch_size),
            batch_size,
        };

        let mut files = 0usize;
        let mut objects = ctx.storage.list_objects(&self.files.s3_lister);
        while let Some(object) = objects.try_next().await? {
            let s3_path = object.s3_path();
            ctx.log(format!("enqueuing contents from file {s3_path}")).await;

            run.enqueue_file(&object).await.context(s3_path)?;
            files += 1;
        }

        run.add_documents().await?;
        run.uploader.flush().await?;
        run.progress.observe(ctx, run.uploader.total_batches()).await;

        info!(
            job = %ctx.job.job_key.user_string(),
            files,
            batches = run.uploader.total_batches(),
            "Enqueued file contents"
        );
        Ok(run.uploader.total_batches())
    }
}

impl FileRun<'_, '_> {
    async fn enqueue_file(&mut self, object: &ObjectRef) -> Result<()> {
        let storage = self.ctx.storage;
        let chunk_size = self.ctx.config.storage.file_chunk_size;
        let mut splitter = DocumentSplitter::new(self.uploader.size_limit());
        let mut chunks = storage.read_chunks(object, chunk_size);

        let mut saw_last = false;
        while let Some(chunk) = chunks.try_next().await? {
            saw_last = chunk.is_last;
            for document in splitter.feed(&chunk.bytes, chunk.is_last)? {
                self.push(document).await?;
            }
            if saw_last {
                break;
            }
        }

        // the stream ended without flagging a last chunk, so settle what is buffered
        if !saw_last {
            for document in splitter.feed(&[], true)? {
                self.push(document).await?;
            }
        }

        debug!(
            file = %object.s3_path(),
            documents = splitter.documents_seen(),
            "Finished reading file"
        );

        self.add_documents().await
    }

    async fn push(&mut self, document: Document) -> Result<()> {
        self.documents.push(document);
        if self.documents.len() == self.batch_size {
            self.add_documents().await?;
            self.progress
                .observe(self.ctx, self.uploader.total_batches())
                .await;
        }
        Ok(())
    }

    async fn add_documents(&mut self) -> Result<()> {
        if self.documents.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_string(&self.documents)?;
        self.uploader.add(random_id(), body).await?;
        self.documents.clear();
        Ok(())
    }
}
