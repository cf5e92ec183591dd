//! Transport seam between the replica client and the blob service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;
use walship_common::{BoxedReader, ReplicaError};

/// A blob as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// One page of a listing. `prefixes` is only populated for hierarchical
/// listings; `next_marker` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub blobs: Vec<RemoteObject>,
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
}

pub struct BlobDownload {
    pub content_length: u64,
    pub body: BoxedReader,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("HTTP {status} ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Convert to the store-agnostic error, tagging it with the failing
    /// operation and key. Not-found becomes `ReplicaError::NotExist`.
    pub fn into_replica(self, op: &'static str, key: &str) -> ReplicaError {
        match self {
            StoreError::NotFound(_) => ReplicaError::NotExist,
            other => ReplicaError::remote(op, key, other),
        }
    }
}

/// Raw blob operations against one container.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch one listing page of blobs whose names start with `prefix`.
    /// With a delimiter, names containing it past the prefix are rolled up
    /// into `ListPage::prefixes`.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    async fn get(&self, key: &str) -> Result<BlobDownload, StoreError>;

    /// Upload the whole of `body` as one blob, replacing any existing one.
    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Unpin + Send)) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
