use super::Error;
use crate::models::{Genotype, GenotypeBatch, PolicyKey};
use crate::repositories::policies::PolicyPool;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Children awaiting evaluation, `depth` slots per pool key.
///
/// Every entry exists from construction on. Writers overwrite slot contents and never add,
/// remove or resize entries.
#[derive(Debug, Clone)]
pub struct EvalCache {
    entries: Arc<RwLock<HashMap<PolicyKey, Vec<Genotype>>>>,
    depth: usize,
}

impl EvalCache {
    /// Preallocates `depth` placeholders for every key of `pool`, initialised with the
    /// current contents of that key's slot.
    #[instrument(level = "debug", skip(pool), fields(capacity = pool.capacity(), depth = depth))]
    pub fn new(pool: &PolicyPool, depth: usize) -> Self {
        let entries = pool
            .keys()
            .filter_map(|key| pool.get(key).ok().map(|genotype| (key, vec![genotype; depth])))
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
            depth,
        }
    }

    /// Number of children held per key.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// A copy of the children currently cached for `key`.
    pub fn get(&self, key: PolicyKey) -> Option<Vec<Genotype>> {
        self.entries.read().get(&key).cloned()
    }

    /// Writes `children` into the entries of `keys`, `depth` consecutive children per key.
    ///
    /// Everything is validated before the first write, so a failed call leaves the cache
    /// untouched.
    #[instrument(level = "debug", skip(self, keys, children), fields(keys = keys.len(), children = children.len()))]
    pub fn write_batch(&self, keys: &[PolicyKey], children: &GenotypeBatch) -> Result<(), Error> {
        let expected = keys.len() * self.depth;
        if children.len() != expected {
            return Err(Error::ChildCountMismatch {
                keys: keys.len(),
                expected,
                actual: children.len(),
            });
        }

        let children = children.unstack();
        let mut entries = self.entries.write();

        for (&key, chunk) in keys.iter().zip(children.chunks(self.depth)) {
            let slots = entries.get(&key).ok_or(Error::UnknownKey { key })?;
            if slots
                .iter()
                .zip(chunk)
                .any(|(slot, child)| !slot.has_same_schema(child))
            {
                return Err(Error::SchemaMismatch { key });
            }
        }

        for (key, chunk) in keys.iter().zip(children.chunks(self.depth)) {
            if let Some(slots) = entries.get_mut(key) {
                for (slot, child) in slots.iter_mut().zip(chunk) {
                    slot.overwrite_from(child);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn constant(value: f32) -> Genotype {
        Genotype::from_tensors([("layers.0.bias", ArrayD::from_elem(IxDyn(&[3]), value))])
    }

    fn batch(values: &[f32]) -> GenotypeBatch {
        let genotypes: Vec<Genotype> = values.iter().map(|&v| constant(v)).collect();
        let refs: Vec<&Genotype> = genotypes.iter().collect();
        GenotypeBatch::stack(&refs).unwrap()
    }

    fn cache(depth: usize) -> EvalCache {
        let pool = PolicyPool::new((0..4).map(|key| constant(key as f32)).collect()).unwrap();
        EvalCache::new(&pool, depth)
    }

    #[test]
    fn it_preallocates_every_key() {
        let cache = cache(2);

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(3), Some(vec![constant(3.0), constant(3.0)]));
        assert_eq!(cache.get(4), None);
    }

    #[test]
    fn it_writes_depth_children_per_key() {
        let cache = cache(2);

        cache
            .write_batch(&[2, 0], &batch(&[10.0, 11.0, 20.0, 21.0]))
            .unwrap();

        assert_eq!(cache.get(2), Some(vec![constant(10.0), constant(11.0)]));
        assert_eq!(cache.get(0), Some(vec![constant(20.0), constant(21.0)]));
        assert_eq!(cache.get(1), Some(vec![constant(1.0), constant(1.0)]));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn it_rejects_wrong_child_counts() {
        let cache = cache(2);

        assert!(matches!(
            cache.write_batch(&[0, 1], &batch(&[1.0, 2.0, 3.0])),
            Err(Error::ChildCountMismatch {
                keys: 2,
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn a_failed_write_leaves_the_cache_untouched() {
        let cache = cache(1);

        let result = cache.write_batch(&[1, 7], &batch(&[5.0, 6.0]));

        assert!(matches!(result, Err(Error::UnknownKey { key: 7 })));
        assert_eq!(cache.get(1), Some(vec![constant(1.0)]));
    }
}
