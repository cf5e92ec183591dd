//! Lazily created, shared container handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use walship_common::{ReplicaError, Result};

use crate::access::{redact, AccessScope};
use crate::sas::{SasContainer, DEFAULT_BLOCK_SIZE};
use crate::store::BlobStore;

/// Per-operation transport timeout. Large snapshot transfers should finish
/// rather than fail fast.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Builds the store handle for an access scope.
pub trait Connector: Send + Sync {
    fn connect(&self, scope: &AccessScope) -> Result<Arc<dyn BlobStore>>;
}

/// Connects with an anonymous HTTP client; authorization is carried by the
/// capability URL itself.
#[derive(Debug, Clone)]
pub struct SasConnector {
    pub timeout: Duration,
    pub block_size: usize,
    pub page_size: Option<u32>,
}

impl Default for SasConnector {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: None,
        }
    }
}

impl Connector for SasConnector {
    fn connect(&self, scope: &AccessScope) -> Result<Arc<dyn BlobStore>> {
        let container_url = scope.container_url()?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ReplicaError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Arc::new(
            SasContainer::new(client, container_url)
                .with_block_size(self.block_size)
                .with_page_size(self.page_size),
        ))
    }
}

/// Creates the store handle on first use and hands out the same one
/// afterwards. Concurrent first callers serialize on the lock; a failed
/// attempt caches nothing, so the next call retries.
pub struct ConnectionHandle {
    scope: AccessScope,
    connector: Box<dyn Connector>,
    store: Mutex<Option<Arc<dyn BlobStore>>>,
}

impl ConnectionHandle {
    pub fn new(scope: AccessScope, connector: Box<dyn Connector>) -> Self {
        Self {
            scope,
            connector,
            store: Mutex::new(None),
        }
    }

    pub fn scope(&self) -> &AccessScope {
        &self.scope
    }

    pub async fn ensure_initialized(&self) -> Result<Arc<dyn BlobStore>> {
        let mut slot = self.store.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }

        let store = self.connector.connect(&self.scope)?;
        info!(
            url = %redact(self.scope.raw_url()),
            container = %self.scope.container,
            "Replica container handle initialized"
        );
        *slot = Some(store.clone());
        Ok(store)
    }
}
