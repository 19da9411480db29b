//! Collaborator interfaces for the job lifecycle and deployment stages.
//!
//! The manager and deployer never talk to a database, a blob bucket, a user
//! service or the function executor directly; they go through these traits.
//! All methods are async, return boxed error trait objects, and the traits
//! are annotated for `mockall` so tests can run against deterministic mocks.
//! Implementors live outside this crate (or in the test suite).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::models::{TxJob, TxModule};

/// Uniform boxed error for collaborator failures.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// A user resolved from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub email: String,
}

/// Filter for job listings. Fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    pub user: Option<String>,
    pub job_id: Option<String>,
}

/// The job-record table.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job record.
    async fn insert(&self, job: &TxJob) -> Result<(), StoreError>;

    /// Fetch a job by id. Unknown ids are `None`, not an error.
    async fn get(&self, job_id: &str) -> Result<Option<TxJob>, StoreError>;

    /// Persist the record. `fields` names the columns that changed; an empty
    /// list means write everything. Implementors may ignore the hint and
    /// write the whole record.
    async fn update(&self, job: &TxJob, fields: Vec<String>) -> Result<(), StoreError>;

    /// Query job records by filter.
    async fn query(&self, filter: JobQuery) -> Result<Vec<TxJob>, StoreError>;

    /// Total number of job records. May lag behind reality depending on the
    /// backing store.
    async fn count(&self) -> Result<u64, StoreError>;
}

/// The converter-module registry. `list` returns modules in registration
/// order; the manager's capability match takes the first hit.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn insert(&self, module: &TxModule) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<TxModule>, StoreError>;
}

/// The user-token verification service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UserClient: Send + Sync {
    /// Resolve a token to a user. Unknown or revoked tokens are `None`.
    async fn get_user(&self, token: &str) -> Result<Option<User>, StoreError>;
}

/// Structured result a converter module reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterResult {
    pub success: bool,
    #[serde(default)]
    pub info: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// What the async executor hands back: an error envelope when the invoked
/// function blew up, a structured result when it ran to completion, or an
/// arbitrary document when it returned something unrecognizable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeResponse {
    ErrorEnvelope {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
    Payload(ConverterResult),
    Other(serde_json::Value),
}

/// The asynchronous function-invocation mechanism that runs converters.
/// Blocking call from the manager's perspective; the executor enforces its
/// own execution ceiling.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        function: &str,
        payload: serde_json::Value,
    ) -> Result<InvokeResponse, StoreError>;
}

/// A stored object listed from a bucket.
#[derive(Debug, Clone)]
pub struct BlobObject {
    pub key: String,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

/// Key-addressed blob storage (one trait instance per bucket).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch and parse a JSON document. Missing keys are `None`.
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn download_file(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Download every object under `prefix` into `path`, preserving the key
    /// hierarchy below the destination.
    async fn download_dir(&self, prefix: &str, path: &Path) -> Result<(), StoreError>;

    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), StoreError>;

    async fn copy(&self, from_key: &str, to_key: &str) -> Result<(), StoreError>;

    async fn delete_file(&self, key: &str) -> Result<(), StoreError>;

    /// Point `key` at `location` with a redirect object.
    async fn redirect(&self, key: &str, location: &str) -> Result<(), StoreError>;

    /// List objects under `prefix` whose keys end with `suffix`.
    async fn list_objects(&self, prefix: &str, suffix: &str)
        -> Result<Vec<BlobObject>, StoreError>;
}

/// Index a templating pass reports: per-file titles, chapter lists and book
/// codes, merged across multi-part builds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateIndex {
    #[serde(default)]
    pub titles: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub chapters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub book_codes: serde_json::Map<String, serde_json::Value>,
}

/// The HTML templating engine that wraps converted pages in the site chrome.
/// Rendering itself is outside this crate; the deployer only drives it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Templater: Send + Sync {
    /// Apply `template_file` over the HTML files in `source_dir`, writing to
    /// `output_dir`. A `seed` index carries titles/chapters/book codes from
    /// previous passes of a multi-part build; seeded files are not
    /// re-templated. Returns the merged index.
    fn apply(
        &self,
        source_dir: &Path,
        output_dir: &Path,
        template_file: &Path,
        seed: Option<TemplateIndex>,
    ) -> Result<TemplateIndex, StoreError>;
}
