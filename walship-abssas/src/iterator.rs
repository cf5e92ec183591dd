//! Background fetch loops behind the snapshot and WAL segment iterators.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;
use walship_common::{
    paths, Feed, ListingIterator, Result, SnapshotInfo, SnapshotIterator, WalSegmentInfo,
    WalSegmentIterator,
};

use crate::listing::PagedLister;
use crate::store::{BlobStore, RemoteObject};

/// Iterate the snapshots of `generation`. An invalid generation name is
/// rejected here, before any task is spawned.
pub fn snapshot_iterator(
    ctx: &CancellationToken,
    store: Arc<dyn BlobStore>,
    base: &str,
    generation: &str,
) -> Result<SnapshotIterator> {
    let prefix = paths::snapshots_prefix(base, generation)?;
    let generation = generation.to_string();
    Ok(ListingIterator::spawn(ctx, move |feed| {
        fetch(feed, store, prefix, move |rel, obj| {
            let index = paths::parse_snapshot_key(rel).ok()?;
            Some(SnapshotInfo {
                generation: generation.clone(),
                index,
                size: obj.size,
                created_at: obj.created_at,
            })
        })
    }))
}

/// Iterate the WAL segments of `generation` in (index, offset) order.
pub fn wal_segment_iterator(
    ctx: &CancellationToken,
    store: Arc<dyn BlobStore>,
    base: &str,
    generation: &str,
) -> Result<WalSegmentIterator> {
    let prefix = paths::wal_prefix(base, generation)?;
    let generation = generation.to_string();
    Ok(ListingIterator::spawn(ctx, move |feed| {
        fetch(feed, store, prefix, move |rel, obj| {
            let (index, offset) = paths::parse_wal_segment_key(rel).ok()?;
            Some(WalSegmentInfo {
                generation: generation.clone(),
                index,
                offset,
                size: obj.size,
                created_at: obj.created_at,
            })
        })
    }))
}

/// List every blob under `prefix`, decode the ones that belong to the
/// layout, and hand them to the consumer one at a time. Unrecognized names
/// are skipped.
async fn fetch<T, D>(feed: Feed<T>, store: Arc<dyn BlobStore>, prefix: String, decode: D) -> Result<()>
where
    T: Send,
    D: Fn(&str, &RemoteObject) -> Option<T>,
{
    let mut lister = PagedLister::flat(store, prefix.as_str());
    loop {
        let page = lister
            .next_page(feed.token())
            .await
            .map_err(|e| e.into_replica("list", &prefix))?;
        let Some(page) = page else {
            return Ok(());
        };

        for obj in &page.blobs {
            let decoded = obj
                .name
                .strip_prefix(prefix.as_str())
                .and_then(|rel| decode(rel, obj));
            let Some(entry) = decoded else {
                trace!(key = %obj.name, "Skipping unrecognized key");
                continue;
            };
            if !feed.send(entry).await {
                return Ok(());
            }
        }
    }
}
