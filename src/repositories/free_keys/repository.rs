use super::ClaimError;
use crate::models::PolicyKey;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Pool keys not currently claimed for mutation or evaluation.
///
/// The set is a shared handle: operator instances running side by side claim disjoint keys
/// through [`FreeKeySet::claim`], which checks and removes under one lock.
#[derive(Debug, Clone, Default)]
pub struct FreeKeySet {
    keys: Arc<Mutex<BTreeSet<PolicyKey>>>,
}

impl FreeKeySet {
    pub fn new(keys: impl IntoIterator<Item = PolicyKey>) -> Self {
        Self {
            keys: Arc::new(Mutex::new(keys.into_iter().collect())),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    pub fn contains(&self, key: PolicyKey) -> bool {
        self.keys.lock().contains(&key)
    }

    pub fn snapshot(&self) -> BTreeSet<PolicyKey> {
        self.keys.lock().clone()
    }

    /// The candidates that are currently free, ascending and without duplicates.
    pub fn intersection(&self, candidates: impl IntoIterator<Item = PolicyKey>) -> Vec<PolicyKey> {
        let keys = self.keys.lock();
        let free: BTreeSet<PolicyKey> = candidates
            .into_iter()
            .filter(|key| keys.contains(key))
            .collect();

        free.into_iter().collect()
    }

    /// Removes all of `keys` from the set, or none of them if any is no longer free.
    #[instrument(level = "debug", skip(self, keys), fields(claimed = keys.len()))]
    pub fn claim(&self, keys: &[PolicyKey]) -> Result<(), ClaimError> {
        let mut free = self.keys.lock();

        let taken: Vec<PolicyKey> = keys
            .iter()
            .copied()
            .filter(|key| !free.contains(key))
            .collect();
        if !taken.is_empty() {
            return Err(ClaimError::AlreadyClaimed { keys: taken });
        }

        for key in keys {
            free.remove(key);
        }

        Ok(())
    }

    /// Returns `keys` to the set and reports how many were not already free.
    #[instrument(level = "debug", skip(self, keys), fields(released = keys.len()))]
    pub fn release(&self, keys: &[PolicyKey]) -> usize {
        let mut free = self.keys.lock();
        let returned = keys.iter().filter(|&&key| free.insert(key)).count();

        if returned < keys.len() {
            tracing::warn!(
                released = keys.len(),
                already_free = keys.len() - returned,
                "Released keys that were already free"
            );
        }

        returned
    }
}
