//! `ReplicaClient` implementation for capability-URL blob containers.

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walship_common::metrics::{record_bytes, record_operation, Operation};
use walship_common::{
    paths, with_cancel, BoxedReader, Pos, ReplicaClient, ReplicaError, Result, SnapshotInfo,
    SnapshotIterator, WalSegmentInfo, WalSegmentIterator,
};

use crate::access::AccessScope;
use crate::counter::ReadCounter;
use crate::handle::{ConnectionHandle, Connector, SasConnector};
use crate::iterator::{snapshot_iterator, wal_segment_iterator};
use crate::listing::PagedLister;
use crate::store::BlobStore;
use crate::CLIENT_TYPE;

pub struct SasReplicaClient {
    handle: ConnectionHandle,
}

impl SasReplicaClient {
    /// Client for the container and key prefix named by `url`, using the
    /// default transport settings.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_connector(url, Box::new(SasConnector::default()))
    }

    pub fn with_connector(url: &str, connector: Box<dyn Connector>) -> Result<Self> {
        let scope = AccessScope::parse(url)?;
        Ok(Self {
            handle: ConnectionHandle::new(scope, connector),
        })
    }

    pub fn scope(&self) -> &AccessScope {
        self.handle.scope()
    }

    fn base(&self) -> &str {
        &self.handle.scope().path
    }

    async fn upload(
        &self,
        ctx: &CancellationToken,
        store: &dyn BlobStore,
        key: &str,
        rd: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let mut rc = ReadCounter::new(rd);
        with_cancel(ctx, async {
            store
                .put(key, &mut rc)
                .await
                .map_err(|e| e.into_replica("put", key))
        })
        .await?;

        record_operation(CLIENT_TYPE, Operation::Put);
        record_bytes(CLIENT_TYPE, Operation::Put, rc.n());
        debug!(key = %key, bytes = rc.n(), "Blob upload complete");
        Ok(rc.n())
    }

    async fn download(&self, ctx: &CancellationToken, store: &dyn BlobStore, key: &str) -> Result<BoxedReader> {
        let download = with_cancel(ctx, async {
            store.get(key).await.map_err(|e| e.into_replica("get", key))
        })
        .await?;

        record_operation(CLIENT_TYPE, Operation::Get);
        record_bytes(CLIENT_TYPE, Operation::Get, download.content_length);
        debug!(key = %key, bytes = download.content_length, "Blob download started");
        Ok(download.body)
    }

    /// Delete one blob; an already absent blob counts as deleted.
    async fn delete_blob(&self, ctx: &CancellationToken, store: &dyn BlobStore, key: &str) -> Result<()> {
        record_operation(CLIENT_TYPE, Operation::Delete);
        let res = with_cancel(ctx, async {
            store.delete(key).await.map_err(|e| e.into_replica("delete", key))
        })
        .await;

        match res {
            Ok(()) => {
                debug!(key = %key, "Blob delete complete");
                Ok(())
            }
            Err(e) if e.is_not_exist() => {
                debug!(key = %key, "Blob already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReplicaClient for SasReplicaClient {
    fn client_type(&self) -> &'static str {
        CLIENT_TYPE
    }

    async fn generations(&self, ctx: &CancellationToken) -> Result<Vec<String>> {
        let store = self.handle.ensure_initialized().await?;
        let prefix = paths::generations_prefix(self.base());

        let mut generations = Vec::new();
        let mut lister = PagedLister::hierarchical(store, prefix.as_str());
        while let Some(page) = lister
            .next_page(ctx)
            .await
            .map_err(|e| e.into_replica("list", &prefix))?
        {
            for sub in &page.prefixes {
                let name = paths::last_component(sub);
                if paths::is_generation_name(name) {
                    generations.push(name.to_string());
                }
            }
        }

        if ctx.is_cancelled() {
            return Err(ReplicaError::Cancelled);
        }
        Ok(generations)
    }

    async fn delete_generation(&self, ctx: &CancellationToken, generation: &str) -> Result<()> {
        let store = self.handle.ensure_initialized().await?;
        let prefix = paths::generation_prefix(self.base(), generation)?;

        let mut deleted = 0usize;
        let mut lister = PagedLister::flat(store.clone(), prefix.as_str());
        while let Some(page) = lister
            .next_page(ctx)
            .await
            .map_err(|e| e.into_replica("list", &prefix))?
        {
            for obj in &page.blobs {
                self.delete_blob(ctx, store.as_ref(), &obj.name).await?;
                deleted += 1;
            }
        }

        if ctx.is_cancelled() {
            return Err(ReplicaError::Cancelled);
        }
        debug!(generation = %generation, objects = deleted, "Generation deleted");
        Ok(())
    }

    async fn snapshots(&self, ctx: &CancellationToken, generation: &str) -> Result<SnapshotIterator> {
        let store = self.handle.ensure_initialized().await?;
        snapshot_iterator(ctx, store, self.base(), generation)
    }

    async fn write_snapshot(
        &self,
        ctx: &CancellationToken,
        generation: &str,
        index: u64,
        rd: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<SnapshotInfo> {
        let store = self.handle.ensure_initialized().await?;
        let key = paths::snapshot_key(self.base(), generation, index)?;
        let started = Utc::now();

        let size = self.upload(ctx, store.as_ref(), &key, rd).await?;
        Ok(SnapshotInfo {
            generation: generation.to_string(),
            index,
            size,
            created_at: started,
        })
    }

    async fn snapshot_reader(
        &self,
        ctx: &CancellationToken,
        generation: &str,
        index: u64,
    ) -> Result<BoxedReader> {
        let store = self.handle.ensure_initialized().await?;
        let key = paths::snapshot_key(self.base(), generation, index)?;
        self.download(ctx, store.as_ref(), &key).await
    }

    async fn delete_snapshot(&self, ctx: &CancellationToken, generation: &str, index: u64) -> Result<()> {
        let store = self.handle.ensure_initialized().await?;
        let key = paths::snapshot_key(self.base(), generation, index)?;
        self.delete_blob(ctx, store.as_ref(), &key).await
    }

    async fn wal_segments(&self, ctx: &CancellationToken, generation: &str) -> Result<WalSegmentIterator> {
        let store = self.handle.ensure_initialized().await?;
        wal_segment_iterator(ctx, store, self.base(), generation)
    }

    async fn write_wal_segment(
        &self,
        ctx: &CancellationToken,
        pos: &Pos,
        rd: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<WalSegmentInfo> {
        let store = self.handle.ensure_initialized().await?;
        let key = paths::wal_segment_key(self.base(), &pos.generation, pos.index, pos.offset)?;
        let started = Utc::now();

        let size = self.upload(ctx, store.as_ref(), &key, rd).await?;
        Ok(WalSegmentInfo {
            generation: pos.generation.clone(),
            index: pos.index,
            offset: pos.offset,
            size,
            created_at: started,
        })
    }

    async fn wal_segment_reader(&self, ctx: &CancellationToken, pos: &Pos) -> Result<BoxedReader> {
        let store = self.handle.ensure_initialized().await?;
        let key = paths::wal_segment_key(self.base(), &pos.generation, pos.index, pos.offset)?;
        self.download(ctx, store.as_ref(), &key).await
    }

    async fn delete_wal_segments(&self, ctx: &CancellationToken, positions: &[Pos]) -> Result<()> {
        let store = self.handle.ensure_initialized().await?;
        for pos in positions {
            let key = paths::wal_segment_key(self.base(), &pos.generation, pos.index, pos.offset)?;
            self.delete_blob(ctx, store.as_ref(), &key).await?;
        }
        Ok(())
    }
}
