/// Errors surfaced by replica clients.
///
/// `NotExist` is the only variant callers may match on without knowing which
/// store sits behind the client; transport failures are carried opaquely in
/// `Remote` together with the operation and key that failed.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("invalid replica URL: {0}")]
    InvalidUrl(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid generation name: {0:?}")]
    InvalidGeneration(String),
    #[error("malformed key: {0:?}")]
    MalformedKey(String),
    #[error("object does not exist")]
    NotExist,
    #[error("operation canceled")]
    Cancelled,
    #[error("{op} {key:?}: {source}")]
    Remote {
        op: &'static str,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("background task failed: {0}")]
    Task(String),
}

impl ReplicaError {
    pub fn is_not_exist(&self) -> bool {
        matches!(self, ReplicaError::NotExist)
    }

    pub fn remote(
        op: &'static str,
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ReplicaError::Remote {
            op,
            key: key.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = ReplicaError> = std::result::Result<T, E>;
