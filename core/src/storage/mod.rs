//! Read access to the remote blob store holding job inputs.
//!
//! Listings and reads are exposed as lazy streams: nothing is fetched until the
//! consumer polls, and dropping the stream stops any further page or chunk requests.

pub mod filter;
pub mod memory;
pub mod paths;
pub mod s3;

use futures::stream::BoxStream;

use crate::errors::StorageError;
use crate::job::S3Lister;

pub use filter::ObjectFilter;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

impl ObjectRef {
    pub fn s3_path(&self) -> String {
        paths::s3_path(&self.bucket, &self.key)
    }
}

/// A contiguous slice of an object's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub bytes: Vec<u8>,
    pub is_last: bool,
}

pub trait BlobStore: Send + Sync {
    /// Lists every object under the lister's roots, in root order then key order,
    /// keeping only objects accepted by its include and exclude globs.
    fn list_objects<'a>(
        &'a self,
        lister: &'a S3Lister,
    ) -> BoxStream<'a, Result<ObjectRef, StorageError>>;

    /// Reads the object sequentially in chunks of at most `chunk_size` bytes.
    /// The final chunk is flagged with `is_last`. Empty objects yield nothing.
    fn read_chunks<'a>(
        &'a self,
        object: &'a ObjectRef,
        chunk_size: usize,
    ) -> BoxStream<'a, Result<Chunk, StorageError>>;
}
