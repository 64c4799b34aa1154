use crate::config::VariationConfig;
use crate::repositories::{EliteSource, EvalCache, FreeKeySet, PolicyPool};
use crate::services::variation::{Service, ServiceBuilder};
use std::sync::Arc;

/// Wires a validated configuration and the shared stores into an operator builder.
///
/// The eval cache is created here with `mutations_per_policy` slots per pool key and can be
/// cloned from the returned builder for the evaluators.
pub fn bootstrap_operator(
    config: &VariationConfig,
    pool: PolicyPool,
    free_keys: FreeKeySet,
    elites: Arc<dyn EliteSource>,
) -> anyhow::Result<ServiceBuilder> {
    config.validate()?;

    let cache = EvalCache::new(&pool, config.mutations_per_policy);
    let builder = Service::builder(pool, cache, free_keys, elites)
        .with_breeder(config.breeder()?)
        .with_schedule(config.schedule())
        .with_mutations_per_policy(config.mutations_per_policy);

    Ok(match config.seed {
        Some(seed) => builder.with_seed(seed),
        None => builder,
    })
}
