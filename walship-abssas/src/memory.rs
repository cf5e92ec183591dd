//! In-memory blob store used by the client and iterator tests.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::access::AccessScope;
use crate::handle::Connector;
use crate::store::{BlobDownload, BlobStore, ListPage, RemoteObject, StoreError};

struct StoredBlob {
    data: Bytes,
    created_at: DateTime<Utc>,
}

pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredBlob>>,
    page_size: usize,
    list_calls: AtomicUsize,
    fail_list_from: Mutex<Option<usize>>,
    fail_put: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            fail_list_from: Mutex::new(None),
            fail_put: Mutex::new(HashSet::new()),
            fail_delete: Mutex::new(HashSet::new()),
        }
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredBlob {
                data: Bytes::copy_from_slice(data),
                created_at: Utc::now(),
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Fail every listing call from the `n`th (zero-based) onwards.
    pub fn fail_list_from(&self, n: usize) {
        *self.fail_list_from.lock().unwrap() = Some(n);
    }

    /// Uploads to `key` consume the body and then fail.
    pub fn fail_put_of(&self, key: &str) {
        self.fail_put.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.fail_delete.lock().unwrap().insert(key.to_string());
    }
}

/// Hands out one shared `MemoryStore` regardless of the access scope.
pub struct MemoryConnector(pub Arc<MemoryStore>);

impl Connector for MemoryConnector {
    fn connect(&self, _scope: &AccessScope) -> walship_common::Result<Arc<dyn BlobStore>> {
        Ok(self.0.clone())
    }
}

fn server_error(message: &str) -> StoreError {
    StoreError::Status {
        status: 500,
        code: Some("InternalError".to_string()),
        message: message.to_string(),
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if matches!(*self.fail_list_from.lock().unwrap(), Some(n) if call >= n) {
            return Err(server_error("listing failed"));
        }

        // Entry name -> blob (None for a rolled-up prefix), in key order.
        let mut entries: BTreeMap<String, Option<RemoteObject>> = BTreeMap::new();
        for (name, blob) in self.objects.lock().unwrap().iter() {
            let Some(rest) = name.strip_prefix(prefix) else {
                continue;
            };
            match delimiter.and_then(|d| rest.find(d).map(|i| i + d.len())) {
                Some(end) => {
                    entries.insert(format!("{}{}", prefix, &rest[..end]), None);
                }
                None => {
                    entries.insert(
                        name.clone(),
                        Some(RemoteObject {
                            name: name.clone(),
                            size: blob.data.len() as u64,
                            created_at: blob.created_at,
                        }),
                    );
                }
            }
        }

        let start = match marker {
            Some(m) => Bound::Excluded(m.to_string()),
            None => Bound::Unbounded,
        };
        let mut remaining = entries.range((start, Bound::Unbounded));
        let mut page = ListPage::default();
        let mut last = None;
        for (name, entry) in remaining.by_ref().take(self.page_size) {
            match entry {
                Some(blob) => page.blobs.push(blob.clone()),
                None => page.prefixes.push(name.clone()),
            }
            last = Some(name.clone());
        }
        if remaining.next().is_some() {
            page.next_marker = last;
        }
        Ok(page)
    }

    async fn get(&self, key: &str) -> Result<BlobDownload, StoreError> {
        let objects = self.objects.lock().unwrap();
        let blob = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(BlobDownload {
            content_length: blob.data.len() as u64,
            body: Box::new(std::io::Cursor::new(blob.data.to_vec())),
        })
    }

    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Unpin + Send)) -> Result<(), StoreError> {
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        if self.fail_put.lock().unwrap().contains(key) {
            return Err(server_error("upload failed"));
        }
        self.insert(key, &data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_delete.lock().unwrap().contains(key) {
            return Err(server_error("delete failed"));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paging_and_rollup() {
        let store = MemoryStore::with_page_size(2);
        store.insert("p/a/1", b"x");
        store.insert("p/a/2", b"x");
        store.insert("p/b/1", b"x");
        store.insert("p/c", b"xyz");
        store.insert("q/d", b"x");

        let page = store.list_page("p/", Some("/"), None).await.unwrap();
        assert_eq!(page.prefixes, vec!["p/a/", "p/b/"]);
        assert!(page.blobs.is_empty());
        let marker = page.next_marker.unwrap();

        let page = store.list_page("p/", Some("/"), Some(&marker)).await.unwrap();
        assert_eq!(page.blobs.len(), 1);
        assert_eq!(page.blobs[0].size, 3);
        assert_eq!(page.next_marker, None);

        let page = store.list_page("p/", None, None).await.unwrap();
        assert_eq!(page.blobs.len(), 2);
        assert!(page.next_marker.is_some());
        assert_eq!(store.list_calls(), 3);
    }
}
