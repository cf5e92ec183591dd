use std::future::Future;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{ReplicaError, Result};
use crate::iter::{SnapshotIterator, WalSegmentIterator};
use crate::types::{Pos, SnapshotInfo, WalSegmentInfo};

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Storage-backend contract consumed by the replication engine.
///
/// Each implementation handles raw I/O against one kind of remote store.
/// The engine owns snapshot scheduling, retention, and payload encoding;
/// the client only lists, reads, writes, and deletes opaque objects laid
/// out by `crate::paths`.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync {
    /// Fixed identifier of the backend, used as the metrics label.
    fn client_type(&self) -> &'static str;

    /// Names of every generation on the replica, in no particular order.
    async fn generations(&self, ctx: &CancellationToken) -> Result<Vec<String>>;

    /// Delete every snapshot and WAL segment of a generation.
    async fn delete_generation(&self, ctx: &CancellationToken, generation: &str) -> Result<()>;

    async fn snapshots(&self, ctx: &CancellationToken, generation: &str) -> Result<SnapshotIterator>;

    async fn write_snapshot(
        &self,
        ctx: &CancellationToken,
        generation: &str,
        index: u64,
        rd: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<SnapshotInfo>;

    /// Open a snapshot for reading. Returns `ReplicaError::NotExist` if absent.
    async fn snapshot_reader(
        &self,
        ctx: &CancellationToken,
        generation: &str,
        index: u64,
    ) -> Result<BoxedReader>;

    /// Delete a snapshot. Deleting an absent snapshot succeeds.
    async fn delete_snapshot(&self, ctx: &CancellationToken, generation: &str, index: u64) -> Result<()>;

    async fn wal_segments(&self, ctx: &CancellationToken, generation: &str) -> Result<WalSegmentIterator>;

    async fn write_wal_segment(
        &self,
        ctx: &CancellationToken,
        pos: &Pos,
        rd: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<WalSegmentInfo>;

    /// Open a WAL segment for reading. Returns `ReplicaError::NotExist` if absent.
    async fn wal_segment_reader(&self, ctx: &CancellationToken, pos: &Pos) -> Result<BoxedReader>;

    /// Delete WAL segments in order, stopping at the first failure other
    /// than not-found.
    async fn delete_wal_segments(&self, ctx: &CancellationToken, positions: &[Pos]) -> Result<()>;
}

/// Run `fut` unless `ctx` is cancelled first.
pub async fn with_cancel<T, F>(ctx: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ReplicaError::Cancelled),
        res = fut => res,
    }
}
