pub mod elites;
pub mod eval_cache;
pub mod free_keys;
pub mod policies;

pub use elites::{Elite, EliteSource, ElitesMap, Insertion};
pub use eval_cache::EvalCache;
pub use free_keys::{ClaimError, FreeKeySet};
pub use policies::PolicyPool;
