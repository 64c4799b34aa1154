use super::batch::BatchError;
use super::tensor::OperatorError;
use super::{Crossover, GeneBounds, GenotypeBatch, Mutagen, ParameterScope};
use rand::Rng;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum BreedError {
    #[error("Operator error: {0}")]
    Operator(#[from] OperatorError),
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
    #[error("MissingSecondParent: crossover is configured but no second parent batch was given")]
    MissingSecondParent,
    #[error("BatchLengthMismatch: first parents={x}, second parents={y}")]
    BatchLengthMismatch { x: usize, y: usize },
}

/// The configured variation pipeline: optional crossover followed by optional mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Breeder {
    crossover: Option<Crossover>,
    mutagen: Option<Mutagen>,
    bounds: Option<GeneBounds>,
    scope: ParameterScope,
}

impl Breeder {
    pub fn new(crossover: Option<Crossover>, mutagen: Option<Mutagen>) -> Self {
        Self {
            crossover,
            mutagen,
            bounds: None,
            scope: ParameterScope::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: Option<GeneBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_scope(mut self, scope: ParameterScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn crossover(&self) -> Option<&Crossover> {
        self.crossover.as_ref()
    }

    pub fn mutagen(&self) -> Option<&Mutagen> {
        self.mutagen.as_ref()
    }

    /// Crossover needs a second parent for every child.
    pub fn requires_second_parent(&self) -> bool {
        self.crossover.is_some()
    }

    /// Produces one child per individual of `x`.
    ///
    /// The child starts as a copy of `x`. With crossover configured, every in-scope tensor
    /// is replaced by the crossover of the matching `x`/`y` tensors and then mutated if a
    /// mutagen is configured too. With only a mutagen, the copied tensors are mutated
    /// directly. Out-of-scope tensors always pass through from `x`.
    #[instrument(
        level = "debug",
        skip(self, rng, x, y),
        fields(
            batch_size = x.len(),
            crossover = self.crossover.as_ref().map(Crossover::name),
            mutation = self.mutagen.as_ref().map(Mutagen::name)
        )
    )]
    pub fn evolve<R: Rng>(
        &self,
        rng: &mut R,
        x: &GenotypeBatch,
        y: Option<&GenotypeBatch>,
    ) -> Result<GenotypeBatch, BreedError> {
        let started = Instant::now();
        let mut child = x.clone();
        let bounds = self.bounds.as_ref();

        if let Some(crossover) = &self.crossover {
            let y = y.ok_or(BreedError::MissingSecondParent)?;
            if y.len() != x.len() {
                return Err(BreedError::BatchLengthMismatch {
                    x: x.len(),
                    y: y.len(),
                });
            }

            for (name, tensor_x) in x.tensors().filter(|(name, _)| self.scope.includes(name)) {
                let tensor_y = y.get(name).ok_or_else(|| BatchError::MissingTensor {
                    name: name.to_string(),
                })?;

                let mut z = crossover.apply(rng, tensor_x, tensor_y, bounds)?;
                if let Some(mutagen) = &self.mutagen {
                    z = mutagen.apply(rng, &z, bounds)?;
                }
                child.replace(name, z)?;
            }
        } else if let Some(mutagen) = &self.mutagen {
            for (name, tensor_x) in x.tensors().filter(|(name, _)| self.scope.includes(name)) {
                child.replace(name, mutagen.apply(rng, tensor_x, bounds)?)?;
            }
        }

        tracing::debug!(
            "Mutated {} policies in {:.3} seconds",
            x.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Genotype;
    use ndarray::{ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    fn genotype(value: f32) -> Genotype {
        Genotype::from_tensors([
            ("layers.0.weight", ArrayD::from_elem(IxDyn(&[4, 3]), value)),
            ("layers.0.bias", ArrayD::from_elem(IxDyn(&[4]), value)),
            ("action_log_std", ArrayD::from_elem(IxDyn(&[2]), value)),
        ])
    }

    fn batch(values: &[f32]) -> GenotypeBatch {
        let genotypes: Vec<Genotype> = values.iter().map(|&v| genotype(v)).collect();
        let refs: Vec<&Genotype> = genotypes.iter().collect();
        GenotypeBatch::stack(&refs).unwrap()
    }

    #[test]
    fn it_copies_parents_when_no_operator_is_configured() {
        let breeder = Breeder::new(None, None);
        let x = batch(&[0.1, 0.2, 0.3]);

        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(0), &x, None)
            .unwrap();

        assert_eq!(child, x);
    }

    #[test]
    fn mutation_only_changes_nothing_but_mutated_elements() {
        // A rate of zero turns the mutation stage into the identity.
        let identity = Breeder::new(None, Some(Mutagen::gaussian(0.5, 0.0).unwrap()));
        let x = batch(&[0.1, 0.2]);
        assert_eq!(
            identity
                .evolve(&mut StdRng::seed_from_u64(0), &x, None)
                .unwrap(),
            x
        );

        let breeder = Breeder::new(None, Some(Mutagen::gaussian(0.5, 1.0).unwrap()));
        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(0), &x, None)
            .unwrap();
        assert_ne!(child, x);
        assert_eq!(child.len(), x.len());
    }

    #[test]
    fn crossover_only_pipeline_matches_the_bare_operator() {
        let crossover = Crossover::iso_dd(0.01, 0.2).unwrap();
        let breeder = Breeder::new(Some(crossover.clone()), None);
        let x = batch(&[0.0, 1.0]);
        let y = batch(&[2.0, 3.0]);

        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(12), &x, Some(&y))
            .unwrap();

        // Replaying the operator over the tensors in the same order reproduces the child.
        let mut rng = StdRng::seed_from_u64(12);
        for (name, tensor_x) in x.tensors() {
            let expected = crossover
                .apply(&mut rng, tensor_x, y.get(name).unwrap(), None)
                .unwrap();
            assert_eq!(child.get(name).unwrap(), &expected);
        }
    }

    #[test]
    fn crossover_requires_a_second_parent() {
        let breeder = Breeder::new(Some(Crossover::iso_dd(0.01, 0.2).unwrap()), None);
        let x = batch(&[0.0]);

        assert!(matches!(
            breeder.evolve(&mut StdRng::seed_from_u64(0), &x, None),
            Err(BreedError::MissingSecondParent)
        ));

        let y = batch(&[0.0, 1.0]);
        assert!(matches!(
            breeder.evolve(&mut StdRng::seed_from_u64(0), &x, Some(&y)),
            Err(BreedError::BatchLengthMismatch { x: 1, y: 2 })
        ));
    }

    #[test]
    fn crossover_then_mutation_respects_bounds() {
        let breeder = Breeder::new(
            Some(Crossover::iso_dd(0.5, 1.0).unwrap()),
            Some(Mutagen::gaussian(1.0, 1.0).unwrap()),
        )
        .with_bounds(Some(GeneBounds::new(-1.0, 1.0).unwrap()));
        let x = batch(&[-5.0, 5.0, 0.0]);
        let y = batch(&[5.0, -5.0, 0.0]);

        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(2), &x, Some(&y))
            .unwrap();

        for (_, tensor) in child.tensors() {
            assert!(tensor.iter().all(|value| (-1.0..=1.0).contains(value)));
        }
    }

    #[test]
    fn scope_limits_which_tensors_vary() {
        let breeder = Breeder::new(None, Some(Mutagen::gaussian(0.5, 1.0).unwrap()))
            .with_scope(ParameterScope::WeightsAndBiases);
        let x = batch(&[0.3, 0.6]);

        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(6), &x, None)
            .unwrap();

        assert_eq!(child.get("action_log_std"), x.get("action_log_std"));
        assert_ne!(child.get("layers.0.weight"), x.get("layers.0.weight"));
        assert_ne!(child.get("layers.0.bias"), x.get("layers.0.bias"));
    }

    #[test]
    fn default_scope_varies_every_tensor() {
        let breeder = Breeder::new(None, Some(Mutagen::gaussian(0.5, 1.0).unwrap()));
        let x = batch(&[0.3, 0.6]);

        let child = breeder
            .evolve(&mut StdRng::seed_from_u64(6), &x, None)
            .unwrap();

        for (name, tensor) in child.tensors() {
            assert_ne!(Some(tensor), x.get(name), "{name} was not varied");
        }
    }
}
