//! Operation counters shared by every replica client.
//!
//! Counters go through the `metrics` facade; the embedding process decides
//! which recorder (if any) receives them.

use metrics::counter;

pub const OPERATION_TOTAL: &str = "replica_operation_total";
pub const OPERATION_BYTES: &str = "replica_operation_bytes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Put,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "LIST",
            Operation::Get => "GET",
            Operation::Put => "PUT",
            Operation::Delete => "DELETE",
        }
    }
}

/// Count one logical operation. Listings count once per page.
pub fn record_operation(replica_type: &'static str, op: Operation) {
    counter!(OPERATION_TOTAL, "replica_type" => replica_type, "operation" => op.as_str())
        .increment(1);
}

pub fn record_bytes(replica_type: &'static str, op: Operation, bytes: u64) {
    counter!(OPERATION_BYTES, "replica_type" => replica_type, "operation" => op.as_str())
        .increment(bytes);
}
