use crate::models::{BatchError, PolicyKey};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("UnknownKey: key {key} is outside the pool of {capacity} slots")]
    UnknownKey { key: PolicyKey, capacity: usize },
    #[error("SchemaMismatch: the policy for slot {key} does not match the pool schema")]
    SchemaMismatch { key: PolicyKey },
    #[error("EmptyPool: a policy pool needs at least one slot")]
    Empty,
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}
