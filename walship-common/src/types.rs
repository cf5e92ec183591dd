use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Location of a WAL segment: generation, segment index, and byte offset
/// within that index's stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pos {
    pub generation: String,
    pub index: u64,
    pub offset: u64,
}

impl Pos {
    pub fn new(generation: impl Into<String>, index: u64, offset: u64) -> Self {
        Self {
            generation: generation.into(),
            index,
            offset,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:016x}:{:016x}", self.generation, self.index, self.offset)
    }
}

/// A snapshot stored on a replica. Size and timestamp come from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub generation: String,
    pub index: u64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A WAL segment stored on a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalSegmentInfo {
    pub generation: String,
    pub index: u64,
    pub offset: u64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl WalSegmentInfo {
    pub fn pos(&self) -> Pos {
        Pos::new(self.generation.clone(), self.index, self.offset)
    }
}
