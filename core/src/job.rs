use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Identifies a job and the API that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct JobKey {
    pub id: String,
    pub api_name: String,
}

impl JobKey {
    pub fn new(api_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_name: api_name.into(),
        }
    }

    /// Prefix under which per-job state is stored in the cluster bucket.
    pub fn prefix_key(&self) -> String {
        format!("jobs/{}/{}", self.api_name, self.id)
    }

    pub fn user_string(&self) -> String {
        format!("{} job {}", self.api_name, self.id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobSpec {
    pub job_key: JobKey,
    pub queue_url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobSubmission {
    #[serde(default)]
    pub item_list: Option<ItemList>,
    #[serde(default)]
    pub file_path_lister: Option<FilePathLister>,
    #[serde(default)]
    pub delimited_files: Option<DelimitedFiles>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemList {
    pub items: Vec<serde_json::Value>,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilePathLister {
    #[serde(flatten)]
    pub s3_lister: S3Lister,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelimitedFiles {
    #[serde(flatten)]
    pub s3_lister: S3Lister,
    pub batch_size: usize,
}

/// A set of `s3://bucket/prefix` roots whose objects make up the job input.
///
/// `includes` and `excludes` are globs over the full `s3://bucket/key` path.
/// With no includes every listed object is a candidate; any exclude match drops it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S3Lister {
    pub s3_paths: Vec<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// What a job submission handler passes to the enqueuer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnqueueRequest {
    pub job: JobSpec,
    #[serde(default)]
    pub submission: JobSubmission,
}

/// The ingestion mode chosen for a submission.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Items(&'a ItemList),
    FilePaths(&'a FilePathLister),
    DelimitedFiles(&'a DelimitedFiles),
}

impl JobSubmission {
    /// First populated input in precedence order: item list, path lister, delimited files.
    pub fn input(&self) -> Option<Input<'_>> {
        if let Some(item_list) = self.item_list.as_ref().filter(|l| !l.items.is_empty()) {
            return Some(Input::Items(item_list));
        }
        if let Some(lister) = self
            .file_path_lister
            .as_ref()
            .filter(|l| !l.s3_lister.s3_paths.is_empty())
        {
            return Some(Input::FilePaths(lister));
        }
        if let Some(files) = self
            .delimited_files
            .as_ref()
            .filter(|f| !f.s3_lister.s3_paths.is_empty())
        {
            return Some(Input::DelimitedFiles(files));
        }
        None
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let batch_sizes = [
            ("item_list", self.item_list.as_ref().map(|l| l.batch_size)),
            (
                "file_path_lister",
                self.file_path_lister.as_ref().map(|l| l.batch_size),
            ),
            (
                "delimited_files",
                self.delimited_files.as_ref().map(|f| f.batch_size),
            ),
        ];
        for (field, batch_size) in batch_sizes {
            if batch_size == Some(0) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("{field}.batch_size must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}
