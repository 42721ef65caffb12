use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::errors::StorageError;
use crate::job::S3Lister;
use crate::storage::filter::filter_listing;
use crate::storage::paths::split_s3_path;
use crate::storage::{BlobStore, Chunk, ObjectRef};

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

struct PageCursor {
    root: String,
    bucket: String,
    prefix: String,
    continuation_token: Option<String>,
}

impl S3BlobStore {
    pub fn new(sdk_config: &SdkConfig, force_path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Pages through one `s3://bucket/prefix` root, one request per page.
    fn list_root<'a>(&'a self, root: &'a str) -> BoxStream<'a, Result<ObjectRef, StorageError>> {
        let cursor = match split_s3_path(root) {
            Ok((bucket, prefix)) => PageCursor {
                root: root.to_string(),
                bucket,
                prefix,
                continuation_token: None,
            },
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };

        stream::try_unfold(Some(cursor), move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok::<_, StorageError>(None);
            };

            let output = self
                .client
                .list_objects_v2()
                .bucket(&cursor.bucket)
                .prefix(&cursor.prefix)
                .set_continuation_token(cursor.continuation_token.clone())
                .send()
                .await
                .map_err(|e| StorageError::ListObjects {
                    path: cursor.root.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                })?;

            let page: Vec<ObjectRef> = output
                .contents()
                .iter()
                .filter_map(|object| {
                    let key = object.key()?;
                    // skip directory placeholders
                    if key.ends_with('/') {
                        return None;
                    }
                    Some(ObjectRef {
                        bucket: cursor.bucket.clone(),
                        key: key.to_string(),
                        size: object.size().unwrap_or_default().max(0) as u64,
                    })
                })
                .collect();

            debug!(root = %cursor.root, objects = page.len(), "Listed S3 page");

            let next = match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => Some(PageCursor {
                    continuation_token: Some(token.to_string()),
                    ..cursor
                }),
                _ => None,
            };

            Ok(Some((page, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}

impl BlobStore for S3BlobStore {
    fn list_objects<'a>(
        &'a self,
        lister: &'a S3Lister,
    ) -> BoxStream<'a, Result<ObjectRef, StorageError>> {
        let listing = stream::iter(lister.s3_paths.iter())
            .map(move |root| self.list_root(root))
            .flatten()
            .boxed();
        filter_listing(lister, listing)
    }

    fn read_chunks<'a>(
        &'a self,
        object: &'a ObjectRef,
        chunk_size: usize,
    ) -> BoxStream<'a, Result<Chunk, StorageError>> {
        let size = object.size;
        let chunk_size = chunk_size.max(1) as u64;

        stream::try_unfold(0u64, move |offset| async move {
            if offset >= size {
                return Ok::<_, StorageError>(None);
            }

            let end = (offset + chunk_size).min(size);
            let output = self
                .client
                .get_object()
                .bucket(&object.bucket)
                .key(&object.key)
                .range(format!("bytes={}-{}", offset, end - 1))
                .send()
                .await
                .map_err(|e| StorageError::Read {
                    path: object.s3_path(),
                    reason: DisplayErrorContext(&e).to_string(),
                })?;

            let bytes = output
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Read {
                    path: object.s3_path(),
                    reason: e.to_string(),
                })?
                .into_bytes()
                .to_vec();

            Ok(Some((
                Chunk {
                    bytes,
                    is_last: end == size,
                },
                end,
            )))
        })
        .boxed()
    }
}
