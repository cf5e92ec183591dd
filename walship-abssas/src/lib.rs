//! Replica client for blob containers reached through a capability (SAS)
//! URL. Authorization travels in the URL's query string, so the client
//! needs no separate credentials.

pub mod access;
pub mod client;
pub mod config;
pub mod counter;
pub mod handle;
pub mod iterator;
pub mod listing;
pub mod sas;
pub mod store;

#[cfg(test)]
mod memory;

pub use access::AccessScope;
pub use client::SasReplicaClient;
pub use config::ReplicaConfig;
pub use handle::{ConnectionHandle, Connector, SasConnector};
pub use store::{BlobStore, StoreError};

/// Backend identifier reported by `ReplicaClient::client_type` and used as
/// the `replica_type` metrics label.
pub const CLIENT_TYPE: &str = "abssas";
