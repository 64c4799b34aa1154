use crate::models::PolicyKey;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClaimError {
    #[error("AlreadyClaimed: keys {keys:?} are no longer free")]
    AlreadyClaimed { keys: Vec<PolicyKey> },
}
