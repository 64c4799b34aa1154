//! Parent selection for a variation round.
//!
//! Parents are drawn uniformly without replacement from the candidate keys that are both
//! eligible for the current mode and free. A second, independent draw provides the crossover
//! partners. Each drawn parent is then replicated `mutations_per_policy` times so that one
//! parent yields several independent children from the same stochastic operators.
//!
//! ```rust
//! use fx_illumination::models::select_parents;
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let candidates: Vec<usize> = (0..10).collect();
//! let selection = select_parents(&mut StdRng::seed_from_u64(1), &candidates, 4, true, 2)?;
//!
//! assert_eq!(selection.parents().len(), 4);
//! assert_eq!(selection.replicated_x().len(), 8);
//! assert_eq!(selection.replicated_y().map(|y| y.len()), Some(8));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use super::PolicyKey;
use rand::Rng;
use rand::seq::index::sample;
use tracing::instrument;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SelectionError {
    #[error("InsufficientCandidates: requested {requested} parents but only {available} are available")]
    InsufficientCandidates { requested: usize, available: usize },
}

/// The parents drawn for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentSelection {
    x: Vec<PolicyKey>,
    y: Option<Vec<PolicyKey>>,
    replication: usize,
}

impl ParentSelection {
    /// Unique first parents. These are the keys claimed for the round and the eval cache
    /// slots the children are written to.
    pub fn parents(&self) -> &[PolicyKey] {
        &self.x
    }

    pub fn partners(&self) -> Option<&[PolicyKey]> {
        self.y.as_deref()
    }

    pub fn replication(&self) -> usize {
        self.replication
    }

    /// First parents with every key repeated `replication` times in place, e.g.
    /// `[3, 7]` with replication 2 becomes `[3, 3, 7, 7]`.
    pub fn replicated_x(&self) -> Vec<PolicyKey> {
        replicate(&self.x, self.replication)
    }

    pub fn replicated_y(&self) -> Option<Vec<PolicyKey>> {
        self.y.as_ref().map(|y| replicate(y, self.replication))
    }

    /// Number of children the round produces.
    pub fn children(&self) -> usize {
        self.x.len() * self.replication
    }
}

fn replicate(keys: &[PolicyKey], times: usize) -> Vec<PolicyKey> {
    keys.iter()
        .flat_map(|&key| std::iter::repeat_n(key, times))
        .collect()
}

fn draw<R: Rng>(rng: &mut R, candidates: &[PolicyKey], amount: usize) -> Vec<PolicyKey> {
    sample(rng, candidates.len(), amount)
        .into_iter()
        .map(|index| candidates[index])
        .collect()
}

/// Draws `batch_size` distinct first parents and, when `with_partners` is set, a second
/// independent set of `batch_size` distinct partners from `candidates`.
///
/// Fails without consuming any candidate when fewer than `batch_size` are available.
#[instrument(level = "debug", skip(rng, candidates), fields(available = candidates.len()))]
pub fn select_parents<R: Rng>(
    rng: &mut R,
    candidates: &[PolicyKey],
    batch_size: usize,
    with_partners: bool,
    mutations_per_policy: usize,
) -> Result<ParentSelection, SelectionError> {
    if candidates.len() < batch_size {
        return Err(SelectionError::InsufficientCandidates {
            requested: batch_size,
            available: candidates.len(),
        });
    }

    let x = draw(rng, candidates, batch_size);
    let y = with_partners.then(|| draw(rng, candidates, batch_size));

    Ok(ParentSelection {
        x,
        y,
        replication: mutations_per_policy,
    })
}
