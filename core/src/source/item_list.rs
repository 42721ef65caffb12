use tracing::info;

use crate::errors::{ConfigError, EnqueueError, Result, ResultExt};
use crate::job::ItemList;
use crate::source::{EnqueueContext, Progress, Source, random_id};

/// Partitions an inline item list into contiguous slices of `batch_size` items.
pub struct ItemListSource<'a> {
    item_list: &'a ItemList,
}

impl<'a> ItemListSource<'a> {
    pub fn new(item_list: &'a ItemList) -> Self {
        Self { item_list }
    }
}

impl Source for ItemListSource<'_> {
    async fn enqueue(&self, ctx: &EnqueueContext<'_>) -> Result<usize> {
        let items = &self.item_list.items;
        let batch_size = self.item_list.batch_size;
        if batch_size == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "item_list.batch_size must be greater than zero".to_string(),
            }
            .into());
        }

        let batch_count = items.len().div_ceil(batch_size);
        ctx.log(format!(
            "partitioning {} items found in job submission into {} batches of size {}",
            items.len(),
            batch_count,
            batch_size
        ))
        .await;

        let mut uploader = ctx.uploader();
        let mut progress = Progress::new(ctx.config.progress.log_every_batches);

        for (i, slice) in items.chunks(batch_size).enumerate() {
            let start = i * batch_size;
            let body = serde_json::to_string(slice).with_context(|| format!("batch {i}"))?;

            uploader
                .add(random_id(), body)
                .await
                .map_err(|err| item_context(err, start, slice.len()))?;

            progress.observe(ctx, uploader.total_batches()).await;
        }

        uploader.flush().await?;
        progress.observe(ctx, uploader.total_batches()).await;

        info!(
            job = %ctx.job.job_key.user_string(),
            items = items.len(),
            batches = uploader.total_batches(),
            "Enqueued item list"
        );
        Ok(uploader.total_batches())
    }
}

fn item_context(err: EnqueueError, start: usize, len: usize) -> EnqueueError {
    if len == 1 {
        err.context(format!("item {start}"))
    } else {
        err.context(format!(
            "items with index between {} to {}",
            start,
            start + len - 1
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::Fixture;
    use serde_json::{Value, json};

    fn item_list(n: usize, batch_size: usize) -> ItemList {
        ItemList {
            items: (0..n).map(|i| json!({ "id": i })).collect(),
            batch_size,
        }
    }

    #[tokio::test]
    async fn test_partitions_losslessly_in_order() {
        for (n, batch_size) in [(1, 1), (7, 3), (10, 5), (25, 10), (3, 100)] {
            let fixture = Fixture::new();
            let list = item_list(n, batch_size);

            let total = ItemListSource::new(&list)
                .enqueue(&fixture.context())
                .await
                .unwrap();

            assert_eq!(total, n.div_ceil(batch_size));

            let rejoined: Vec<Value> = fixture
                .queue
                .bodies()
                .iter()
                .flat_map(|body| serde_json::from_str::<Vec<Value>>(body).unwrap())
                .collect();
            assert_eq!(rejoined, list.items);
        }
    }

    #[tokio::test]
    async fn test_logs_partitioning() {
        let fixture = Fixture::new();
        let list = item_list(25, 10);

        ItemListSource::new(&list)
            .enqueue(&fixture.context())
            .await
            .unwrap();

        assert_eq!(
            fixture.log_lines()[0],
            "partitioning 25 items found in job submission into 3 batches of size 10"
        );
    }

    #[tokio::test]
    async fn test_oversized_slice_reports_item_range() {
        let mut fixture = Fixture::new();
        fixture.config.queue.message_size_limit = 64;
        let list = ItemList {
            items: vec![json!("small"), json!("x".repeat(100)), json!("tail")],
            batch_size: 2,
        };

        let err = ItemListSource::new(&list)
            .enqueue(&fixture.context())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), EnqueueError::PayloadTooLarge { .. }));
        assert!(err.to_string().starts_with("items with index between 0 to 1"));
        assert!(fixture.queue.batches().is_empty());
    }

    #[tokio::test]
    async fn test_single_item_context() {
        let mut fixture = Fixture::new();
        fixture.config.queue.message_size_limit = 16;
        let list = ItemList {
            items: vec![json!(1), json!("x".repeat(100))],
            batch_size: 1,
        };

        let err = ItemListSource::new(&list)
            .enqueue(&fixture.context())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("item 1: "));
    }
}
