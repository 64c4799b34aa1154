use anyhow::Context;
use fx_illumination::{
    VariationConfig, bootstrap_operator,
    models::{Genotype, Morphology, PolicyKey},
    repositories::{Elite, EliteSource, ElitesMap, EvalCache, FreeKeySet, Insertion, PolicyPool},
    services::variation::{EvalResults, Handle, Submission},
};
use ndarray::{Array1, Ix1, Ix2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const POOL_CAPACITY: usize = 256;
const ROUNDS: usize = 40;

// Runs a variation operator against a toy evaluator: each policy is scored by its response
// to a constant observation, and the two action outputs are its behavior descriptor.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_ids(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => VariationConfig::from_path(&path)
            .with_context(|| format!("failed to load variation config from {path}"))?,
        None => VariationConfig {
            mutation_op: "gaussian".to_string(),
            mutation_rate: 0.1,
            eval_batch_size: 32,
            random_init_batch: 32,
            random_init: 20,
            num_agents: 16,
            tick_period_ms: 100,
            seed: Some(0),
            ..Default::default()
        },
    };
    config.validate()?;

    let morphology = Morphology::mlp(4, &[16], 2, true);
    let pool = PolicyPool::from_morphology(
        &morphology,
        POOL_CAPACITY,
        &mut StdRng::seed_from_u64(config.seed.unwrap_or_default()),
    )?;
    let free_keys = FreeKeySet::new(pool.keys());
    let elites = ElitesMap::new(vec![10, 10], -1.0, 1.0);

    let builder = bootstrap_operator(&config, pool.clone(), free_keys.clone(), Arc::new(elites.clone()))?;
    let cache = builder.cache().clone();
    let (service, submissions) = builder.build()?;
    let (handle, operator) = fx_illumination::spawn(service, config.tick_period());

    let evaluator = Evaluator {
        id: Uuid::now_v7(),
        cache,
        pool,
        elites: elites.clone(),
        handle,
    };
    let evaluated = tokio::spawn(evaluator.run(submissions, ROUNDS));

    evaluated.await??;
    let service = operator.await??;

    let best = elites.best();
    tracing::info!(
        elites = EliteSource::len(&elites),
        capacity = elites.capacity(),
        best_fitness = best.as_ref().map(|elite| elite.fitness),
        free_keys = free_keys.len(),
        in_flight = service.in_flight(),
        "Illumination finished"
    );

    Ok(())
}

struct Evaluator {
    id: Uuid,
    cache: EvalCache,
    pool: PolicyPool,
    elites: ElitesMap,
    handle: Handle,
}

impl Evaluator {
    async fn run(
        self,
        mut submissions: UnboundedReceiver<Submission>,
        rounds: usize,
    ) -> anyhow::Result<()> {
        for _ in 0..rounds {
            let Some(submission) = submissions.recv().await else {
                break;
            };
            self.evaluate(submission)?;
        }

        self.handle.stop()?;
        Ok(())
    }

    fn evaluate(&self, submission: Submission) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut evaluated = Vec::new();

        for &key in &submission.keys {
            let children = self.cache.get(key).unwrap_or_default();
            evaluated.extend(std::iter::repeat_n(key, children.len()));

            let mut best: Option<(Genotype, f64, Vec<f64>)> = None;
            for child in children {
                let (fitness, descriptor) = score(&child)?;
                if best.as_ref().is_none_or(|(_, current, _)| fitness > *current) {
                    best = Some((child, fitness, descriptor));
                }
            }

            if let Some((child, fitness, descriptor)) = best {
                self.archive(key, child, fitness, descriptor)?;
            }
        }

        let frames = evaluated.len() as u64;
        self.handle.report(
            EvalResults::new(self.id, evaluated).with_metrics(frames, started.elapsed(), 1.0),
        )?;
        self.handle.release(submission.keys)?;

        Ok(())
    }

    // A child is stored into its parent's slot. A parent already backing an elite may only
    // be improved within its own niche.
    fn archive(
        &self,
        key: PolicyKey,
        child: Genotype,
        fitness: f64,
        descriptor: Vec<f64>,
    ) -> anyhow::Result<()> {
        if let Some(niche) = self.elites.niche_of(key)
            && niche != self.elites.niche(&descriptor)
        {
            return Ok(());
        }

        match self.elites.try_insert(Elite {
            key,
            fitness,
            descriptor,
        }) {
            Insertion::Rejected => {}
            Insertion::Inserted | Insertion::Replaced { .. } => self.pool.store(key, &child)?,
        }

        Ok(())
    }
}

/// Fitness prefers small weights; the descriptor is the squashed action for an all-ones
/// observation.
fn score(policy: &Genotype) -> anyhow::Result<(f64, Vec<f64>)> {
    let layer = |name: &str| {
        policy
            .get(name)
            .with_context(|| format!("policy has no tensor {name}"))
    };

    let w0 = layer("layers.0.weight")?.view().into_dimensionality::<Ix2>()?;
    let b0 = layer("layers.0.bias")?.view().into_dimensionality::<Ix1>()?;
    let w1 = layer("layers.1.weight")?.view().into_dimensionality::<Ix2>()?;
    let b1 = layer("layers.1.bias")?.view().into_dimensionality::<Ix1>()?;

    let observation = Array1::<f32>::ones(w0.ncols());
    let hidden = (w0.dot(&observation) + b0).mapv(f32::tanh);
    let action = (w1.dot(&hidden) + b1).mapv(f32::tanh);

    let magnitude: f32 = policy
        .tensors()
        .map(|(_, tensor)| tensor.iter().map(|value| value * value).sum::<f32>())
        .sum();

    Ok((
        -f64::from(magnitude),
        action.iter().map(|&value| f64::from(value)).collect(),
    ))
}
