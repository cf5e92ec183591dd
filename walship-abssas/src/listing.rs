//! Marker-driven listing over a `BlobStore`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use walship_common::metrics::{record_operation, Operation};

use crate::store::{BlobStore, ListPage, StoreError};
use crate::CLIENT_TYPE;

const DELIMITER: &str = "/";

/// Walks the pages of one listing until the service stops returning a
/// continuation marker.
pub struct PagedLister {
    store: Arc<dyn BlobStore>,
    prefix: String,
    delimiter: Option<&'static str>,
    marker: Option<String>,
    done: bool,
}

impl PagedLister {
    /// Every blob under `prefix`, at any depth.
    pub fn flat(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self::new(store, prefix.into(), None)
    }

    /// Immediate children of `prefix`; deeper names are rolled up into
    /// `ListPage::prefixes`.
    pub fn hierarchical(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self::new(store, prefix.into(), Some(DELIMITER))
    }

    fn new(store: Arc<dyn BlobStore>, prefix: String, delimiter: Option<&'static str>) -> Self {
        Self {
            store,
            prefix,
            delimiter,
            marker: None,
            done: false,
        }
    }

    /// Fetch the next page. Returns `None` once the listing is exhausted or
    /// `ctx` has been cancelled; a request already in flight is allowed to
    /// finish and its page is still returned.
    pub async fn next_page(&mut self, ctx: &CancellationToken) -> Result<Option<ListPage>, StoreError> {
        if self.done || ctx.is_cancelled() {
            return Ok(None);
        }

        record_operation(CLIENT_TYPE, Operation::List);
        let page = self
            .store
            .list_page(&self.prefix, self.delimiter, self.marker.as_deref())
            .await?;

        match &page.next_marker {
            Some(marker) if !marker.is_empty() => self.marker = Some(marker.clone()),
            _ => self.done = true,
        }
        Ok(Some(page))
    }
}
