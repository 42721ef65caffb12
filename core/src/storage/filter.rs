use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::StorageError;
use crate::job::S3Lister;
use crate::storage::ObjectRef;

/// Include and exclude globs of a lister, matched against full `s3://bucket/key` paths.
///
/// An object is kept when it matches any include (or there are none) and no exclude.
#[derive(Debug, Clone)]
pub struct ObjectFilter {
    includes: Option<GlobSet>,
    excludes: Option<GlobSet>,
}

impl ObjectFilter {
    pub fn new(lister: &S3Lister) -> Result<Self, StorageError> {
        Ok(Self {
            includes: build_set(&lister.includes)?,
            excludes: build_set(&lister.excludes)?,
        })
    }

    pub fn matches(&self, s3_path: &str) -> bool {
        if let Some(excludes) = &self.excludes {
            if excludes.is_match(s3_path) {
                return false;
            }
        }
        self.includes
            .as_ref()
            .is_none_or(|includes| includes.is_match(s3_path))
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, StorageError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| StorageError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| StorageError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })
}

/// Drops listed objects rejected by the lister's globs.
///
/// A bad pattern fails the listing before any object is yielded.
pub(crate) fn filter_listing<'a>(
    lister: &S3Lister,
    listing: BoxStream<'a, Result<ObjectRef, StorageError>>,
) -> BoxStream<'a, Result<ObjectRef, StorageError>> {
    if lister.includes.is_empty() && lister.excludes.is_empty() {
        return listing;
    }

    match ObjectFilter::new(lister) {
        Ok(filter) => listing
            .try_filter(move |object| future::ready(filter.matches(&object.s3_path())))
            .boxed(),
        Err(err) => stream::once(future::ready(Err(err))).boxed(),
    }
}
