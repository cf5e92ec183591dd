pub mod error;
pub mod iter;
pub mod metrics;
pub mod paths;
pub mod replica;
pub mod types;

pub use error::{ReplicaError, Result};
pub use iter::{Feed, ListingIterator, SnapshotIterator, WalSegmentIterator};
pub use replica::{with_cancel, BoxedReader, ReplicaClient};
pub use types::{Pos, SnapshotInfo, WalSegmentInfo};
