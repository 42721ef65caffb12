use crate::errors::StorageError;

const S3_SCHEME: &str = "s3://";

pub fn s3_path(bucket: &str, key: &str) -> String {
    format!("{S3_SCHEME}{bucket}/{key}")
}

/// Splits `s3://bucket/some/prefix` into `("bucket", "some/prefix")`.
///
/// The prefix may be empty, in which case the whole bucket is addressed.
pub fn split_s3_path(path: &str) -> Result<(String, String), StorageError> {
    let invalid = || StorageError::InvalidPath {
        path: path.to_string(),
    };

    let rest = path.strip_prefix(S3_SCHEME).ok_or_else(invalid)?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(invalid());
    }

    Ok((bucket.to_string(), prefix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_s3_path() {
        assert_eq!(
            split_s3_path("s3://bucket/images/2020/").unwrap(),
            ("bucket".to_string(), "images/2020/".to_string())
        );
        assert_eq!(
            split_s3_path("s3://bucket").unwrap(),
            ("bucket".to_string(), String::new())
        );
    }

    #[test]
    fn test_split_s3_path_invalid() {
        assert!(split_s3_path("bucket/key").is_err());
        assert!(split_s3_path("s3:///key").is_err());
        assert!(matches!(
            split_s3_path("gs://bucket/key"),
            Err(StorageError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_s3_path() {
        assert_eq!(s3_path("bucket", "a/b.json"), "s3://bucket/a/b.json");
    }
}
