use crate::models::{BreedError, SelectionError};
use crate::repositories::{eval_cache, free_keys::ClaimError, policies};

/// Errors that abort a variation round or the operator itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PolicyPoolError: {0}")]
    PolicyPoolError(#[from] policies::Error),
    #[error("EvalCacheError: {0}")]
    EvalCacheError(#[from] eval_cache::Error),
    #[error("BreedError: {0}")]
    BreedError(#[from] BreedError),
    #[error("SelectionError: {0}")]
    SelectionError(#[from] SelectionError),
    #[error("ClaimError: {0}")]
    ClaimError(#[from] ClaimError),
    #[error("CacheDepthMismatch: eval cache holds {depth} children per key, mutations_per_policy={mutations_per_policy}")]
    CacheDepthMismatch {
        depth: usize,
        mutations_per_policy: usize,
    },
    #[error("Disconnected: the {0} channel is closed")]
    Disconnected(&'static str),
}
