use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};

use crate::errors::StorageError;
use crate::job::S3Lister;
use crate::storage::filter::filter_listing;
use crate::storage::paths::split_s3_path;
use crate::storage::{BlobStore, Chunk, ObjectRef};

type ObjectKey = (String, String);

/// Blob store backed by an in-process map, keyed by bucket and key.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<BTreeMap<ObjectKey, Vec<u8>>>>,
    chunks_read: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, contents: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((bucket.to_string(), key.to_string()), contents.into());
        }
    }

    /// Number of chunks handed out by `read_chunks` so far.
    pub fn chunks_read(&self) -> usize {
        self.chunks_read.load(Ordering::SeqCst)
    }

    fn list_root(&self, root: &str) -> Result<Vec<ObjectRef>, StorageError> {
        let (bucket, prefix) = split_s3_path(root)?;
        let objects = self.objects.lock().map_err(|_| StorageError::ListObjects {
            path: root.to_string(),
            reason: "memory store lock poisoned".to_string(),
        })?;

        Ok(objects
            .iter()
            .filter(|((b, key), _)| *b == bucket && key.starts_with(&prefix))
            .map(|((b, key), contents)| ObjectRef {
                bucket: b.clone(),
                key: key.clone(),
                size: contents.len() as u64,
            })
            .collect())
    }

    fn contents(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().map_err(|_| StorageError::Read {
            path: object.s3_path(),
            reason: "memory store lock poisoned".to_string(),
        })?;

        objects
            .get(&(object.bucket.clone(), object.key.clone()))
            .cloned()
            .ok_or_else(|| StorageError::Read {
                path: object.s3_path(),
                reason: "object not found".to_string(),
            })
    }
}

impl BlobStore for MemoryBlobStore {
    fn list_objects<'a>(
        &'a self,
        lister: &'a S3Lister,
    ) -> BoxStream<'a, Result<ObjectRef, StorageError>> {
        let listing = stream::iter(lister.s3_paths.iter())
            .map(move |root| {
                let listed: Vec<Result<ObjectRef, StorageError>> = match self.list_root(root) {
                    Ok(objects) => objects.into_iter().map(Ok).collect(),
                    Err(err) => vec![Err(err)],
                };
                stream::iter(listed)
            })
            .flatten()
            .boxed();
        filter_listing(lister, listing)
    }

    fn read_chunks<'a>(
        &'a self,
        object: &'a ObjectRef,
        chunk_size: usize,
    ) -> BoxStream<'a, Result<Chunk, StorageError>> {
        let chunks: Vec<Result<Chunk, StorageError>> = match self.contents(object) {
            Ok(contents) => {
                let chunk_size = chunk_size.max(1);
                let total = contents.len();
                contents
                    .chunks(chunk_size)
                    .enumerate()
                    .map(|(i, bytes)| {
                        Ok(Chunk {
                            bytes: bytes.to_vec(),
                            is_last: (i + 1) * chunk_size >= total,
                        })
                    })
                    .collect()
            }
            Err(err) => vec![Err(err)],
        };

        let chunks_read = self.chunks_read.clone();
        stream::iter(chunks)
            .inspect(move |_| {
                chunks_read.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}
