use crate::models::PolicyKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("UnknownKey: eval cache has no entry for key {key}")]
    UnknownKey { key: PolicyKey },
    #[error("ChildCountMismatch: expected {expected} children for {keys} keys, got {actual}")]
    ChildCountMismatch {
        keys: usize,
        expected: usize,
        actual: usize,
    },
    #[error("SchemaMismatch: child for key {key} does not match the cached schema")]
    SchemaMismatch { key: PolicyKey },
}
