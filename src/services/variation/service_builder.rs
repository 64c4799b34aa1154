use super::events::{Submission, VariationEvent};
use super::service::OperatorState;
use super::{Error, Service};
use crate::models::{Breeder, Schedule};
use crate::repositories::{EliteSource, EvalCache, FreeKeySet, PolicyPool};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::instrument;
use uuid::Uuid;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

pub struct ServiceBuilder {
    pub(super) pool: PolicyPool,
    pub(super) cache: EvalCache,
    pub(super) free_keys: FreeKeySet,
    pub(super) elites: Arc<dyn EliteSource>,
    pub(super) breeder: Breeder,
    pub(super) schedule: Schedule,
    pub(super) mutations_per_policy: usize,
    pub(super) seed: Option<u64>,
    pub(super) event_capacity: usize,
}

impl ServiceBuilder {
    pub(super) fn new(
        pool: PolicyPool,
        cache: EvalCache,
        free_keys: FreeKeySet,
        elites: Arc<dyn EliteSource>,
    ) -> Self {
        let mutations_per_policy = cache.depth();
        Self {
            pool,
            cache,
            free_keys,
            elites,
            breeder: Breeder::new(None, None),
            schedule: Schedule::new(100, 500, 100, 100, 0.5),
            mutations_per_policy,
            seed: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_breeder(mut self, breeder: Breeder) -> Self {
        self.breeder = breeder;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_mutations_per_policy(mut self, mutations_per_policy: usize) -> Self {
        self.mutations_per_policy = mutations_per_policy;
        self
    }

    /// Seeds the operator's random source. Without a seed it is drawn from the OS.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// The eval cache the operator writes children into. Evaluators read from a clone of it.
    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    pub fn free_keys(&self) -> &FreeKeySet {
        &self.free_keys
    }

    /// Builds the operator and the receiving end of its evaluation-submission queue.
    #[instrument(level = "debug", skip(self), fields(capacity = self.pool.capacity(), mutations_per_policy = self.mutations_per_policy))]
    pub fn build(self) -> Result<(Service, mpsc::UnboundedReceiver<Submission>), Error> {
        if self.mutations_per_policy == 0 || self.mutations_per_policy != self.cache.depth() {
            return Err(Error::CacheDepthMismatch {
                depth: self.cache.depth(),
                mutations_per_policy: self.mutations_per_policy,
            });
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (submissions, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel::<VariationEvent>(self.event_capacity);

        let service = Service {
            id: Uuid::now_v7(),
            pool: self.pool,
            cache: self.cache,
            free_keys: self.free_keys,
            elites: self.elites,
            breeder: self.breeder,
            schedule: self.schedule,
            mutations_per_policy: self.mutations_per_policy,
            rng,
            in_flight: 0,
            state: OperatorState::Idle,
            submissions,
            events,
        };

        tracing::info!(operator_id = %service.id, "Variation operator built");
        Ok((service, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genotype, Mutagen};
    use crate::repositories::ElitesMap;
    use ndarray::{ArrayD, IxDyn};

    fn builder(depth: usize) -> ServiceBuilder {
        let pool = PolicyPool::new(
            (0..4)
                .map(|_| Genotype::from_tensors([("layers.0.bias", ArrayD::zeros(IxDyn(&[3])))]))
                .collect(),
        )
        .unwrap();
        let cache = EvalCache::new(&pool, depth);
        let free_keys = FreeKeySet::new(pool.keys());

        Service::builder(pool, cache, free_keys, Arc::new(ElitesMap::new(vec![4], 0.0, 1.0)))
    }

    #[test]
    fn it_defaults_to_the_cache_depth() {
        let (service, _) = builder(3).build().unwrap();

        assert_eq!(service.mutations_per_policy, 3);
        assert_eq!(service.in_flight(), 0);
        assert_eq!(service.state(), OperatorState::Idle);
        assert_eq!(service.id().get_version_num(), 7);
    }

    #[test]
    fn it_rejects_a_mismatched_cache_depth() {
        assert!(matches!(
            builder(2).with_mutations_per_policy(3).build(),
            Err(Error::CacheDepthMismatch {
                depth: 2,
                mutations_per_policy: 3
            })
        ));
        assert!(builder(0).build().is_err());
    }

    #[test]
    fn seeded_operators_breed_identically() {
        let breeder = Breeder::new(None, Some(Mutagen::uniform(0.1, 1.0).unwrap()));
        let schedule = Schedule::new(4, 10, 2, 2, 0.5);

        let run = || {
            let builder = builder(1)
                .with_breeder(breeder.clone())
                .with_schedule(schedule)
                .with_seed(5);
            let cache = builder.cache().clone();
            let (mut service, mut submissions) = builder.build().unwrap();
            service.evolve_batch(true).unwrap();
            let keys = submissions.try_recv().unwrap().keys;
            keys.into_iter()
                .map(|key| (key, cache.get(key)))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}
