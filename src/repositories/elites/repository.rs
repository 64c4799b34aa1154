use crate::models::PolicyKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Read access to the archive's elites, as seen by the variation operator.
pub trait EliteSource: Send + Sync {
    /// Pool keys backing the current elites.
    fn elite_keys(&self) -> Vec<PolicyKey>;

    /// Number of filled niches.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An archived policy and the behavior it was scored with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elite {
    pub key: PolicyKey,
    pub fitness: f64,
    pub descriptor: Vec<f64>,
}

/// Grid cell of behavior space.
pub type Niche = Vec<usize>;

/// Result of offering a candidate to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The candidate filled an empty niche.
    Inserted,
    /// The candidate beat the niche's elite, whose backing key is returned for reuse.
    Replaced { evicted: PolicyKey },
    /// The niche's elite is at least as fit.
    Rejected,
}

/// In-memory grid archive. Each behavior dimension spans `[lower, upper]` and is split into
/// `resolution` cells; descriptors outside the range fall into the edge cells.
#[derive(Debug, Clone)]
pub struct ElitesMap {
    cells: Arc<RwLock<HashMap<Niche, Elite>>>,
    resolution: Vec<usize>,
    lower: f64,
    upper: f64,
}

impl ElitesMap {
    pub fn new(resolution: Vec<usize>, lower: f64, upper: f64) -> Self {
        Self {
            cells: Arc::new(RwLock::new(HashMap::new())),
            resolution,
            lower,
            upper,
        }
    }

    pub fn capacity(&self) -> usize {
        self.resolution.iter().product()
    }

    pub fn niche(&self, descriptor: &[f64]) -> Niche {
        let span = self.upper - self.lower;
        descriptor
            .iter()
            .zip(&self.resolution)
            .map(|(&value, &cells)| {
                let unit = ((value - self.lower) / span).clamp(0.0, 1.0);
                ((unit * cells as f64).floor() as usize).min(cells.saturating_sub(1))
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self, elite), fields(key = elite.key, fitness = elite.fitness))]
    pub fn try_insert(&self, elite: Elite) -> Insertion {
        let niche = self.niche(&elite.descriptor);
        let mut cells = self.cells.write();

        match cells.get(&niche) {
            Some(existing) if existing.fitness >= elite.fitness => Insertion::Rejected,
            Some(existing) => {
                let evicted = existing.key;
                cells.insert(niche, elite);
                Insertion::Replaced { evicted }
            }
            None => {
                cells.insert(niche, elite);
                Insertion::Inserted
            }
        }
    }

    /// The niche currently backed by `key`, if any.
    pub fn niche_of(&self, key: PolicyKey) -> Option<Niche> {
        self.cells
            .read()
            .iter()
            .find(|(_, elite)| elite.key == key)
            .map(|(niche, _)| niche.clone())
    }

    pub fn elites(&self) -> Vec<Elite> {
        self.cells.read().values().cloned().collect()
    }

    pub fn best(&self) -> Option<Elite> {
        self.cells
            .read()
            .values()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .cloned()
    }
}

impl EliteSource for ElitesMap {
    fn elite_keys(&self) -> Vec<PolicyKey> {
        self.cells.read().values().map(|elite| elite.key).collect()
    }

    fn len(&self) -> usize {
        self.cells.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elite(key: PolicyKey, fitness: f64, descriptor: &[f64]) -> Elite {
        Elite {
            key,
            fitness,
            descriptor: descriptor.to_vec(),
        }
    }

    #[test]
    fn it_maps_descriptors_to_niches() {
        let map = ElitesMap::new(vec![10, 4], 0.0, 1.0);

        assert_eq!(map.niche(&[0.0, 0.0]), vec![0, 0]);
        assert_eq!(map.niche(&[0.55, 0.5]), vec![5, 2]);
        assert_eq!(map.niche(&[1.0, 7.0]), vec![9, 3]);
        assert_eq!(map.niche(&[-3.0, 0.99]), vec![0, 3]);
        assert_eq!(map.capacity(), 40);
    }

    #[test]
    fn it_keeps_the_fittest_elite_per_niche() {
        let map = ElitesMap::new(vec![10], 0.0, 1.0);

        assert_eq!(map.try_insert(elite(1, 0.5, &[0.12])), Insertion::Inserted);
        assert_eq!(map.try_insert(elite(2, 0.4, &[0.15])), Insertion::Rejected);
        assert_eq!(
            map.try_insert(elite(3, 0.9, &[0.11])),
            Insertion::Replaced { evicted: 1 }
        );
        assert_eq!(map.try_insert(elite(4, 0.1, &[0.95])), Insertion::Inserted);

        let mut keys = map.elite_keys();
        keys.sort();
        assert_eq!(keys, vec![3, 4]);
        assert_eq!(EliteSource::len(&map), 2);
        assert_eq!(map.best().map(|elite| elite.key), Some(3));
        assert_eq!(map.niche_of(3), Some(vec![1]));
        assert_eq!(map.niche_of(1), None);
    }
}
