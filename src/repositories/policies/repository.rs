use super::Error;
use crate::models::{Genotype, GenotypeBatch, Morphology, PolicyKey};
use parking_lot::RwLock;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use tracing::instrument;

/// Preallocated arena of policy parameter sets addressed by [`PolicyKey`].
///
/// Slots are never added or removed after construction. Cloning the pool clones the handle,
/// not the policies.
#[derive(Debug, Clone)]
pub struct PolicyPool {
    slots: Arc<RwLock<Vec<Genotype>>>,
}

impl PolicyPool {
    /// Creates a pool from existing policies. Every policy must share the schema of the first.
    pub fn new(slots: Vec<Genotype>) -> Result<Self, Error> {
        let first = slots.first().ok_or(Error::Empty)?;
        if let Some(key) = slots.iter().position(|slot| !slot.has_same_schema(first)) {
            return Err(Error::SchemaMismatch { key });
        }

        Ok(Self {
            slots: Arc::new(RwLock::new(slots)),
        })
    }

    /// Creates `capacity` freshly initialised policies of the given morphology.
    #[instrument(level = "debug", skip(morphology, rng), fields(capacity = capacity))]
    pub fn from_morphology<R: Rng>(
        morphology: &Morphology,
        capacity: usize,
        rng: &mut R,
    ) -> Result<Self, Error> {
        Self::new((0..capacity).map(|_| morphology.random(rng)).collect())
    }

    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    /// The full key space of the pool.
    pub fn keys(&self) -> Range<PolicyKey> {
        0..self.capacity()
    }

    pub fn get(&self, key: PolicyKey) -> Result<Genotype, Error> {
        let slots = self.slots.read();
        slots.get(key).cloned().ok_or(Error::UnknownKey {
            key,
            capacity: slots.len(),
        })
    }

    /// Overwrites slot `key` in place.
    pub fn store(&self, key: PolicyKey, genotype: &Genotype) -> Result<(), Error> {
        let mut slots = self.slots.write();
        let capacity = slots.len();
        let slot = slots
            .get_mut(key)
            .ok_or(Error::UnknownKey { key, capacity })?;

        if !slot.has_same_schema(genotype) {
            return Err(Error::SchemaMismatch { key });
        }

        slot.overwrite_from(genotype);
        Ok(())
    }

    /// Stacks the policies behind `keys` into one batch, in key order as given. Keys may repeat.
    #[instrument(level = "debug", skip(self, keys), fields(batch_size = keys.len()))]
    pub fn gather(&self, keys: &[PolicyKey]) -> Result<GenotypeBatch, Error> {
        let slots = self.slots.read();
        let views = keys
            .iter()
            .map(|&key| {
                slots.get(key).ok_or(Error::UnknownKey {
                    key,
                    capacity: slots.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenotypeBatch::stack(&views)?)
    }
}
