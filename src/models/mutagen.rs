use super::gene_bounds::clamp_optional;
use super::tensor::{OperatorError, Tensor, check_rank};
use super::GeneBounds;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::instrument;

// ============================================================
// MutationRate
// ============================================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct MutationRate {
    value: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("mutation_rate must be between 0.0 and 1.0, got: {0}")]
pub struct MutationRateOutOfRange(f64);

impl MutationRate {
    pub fn new(value: f64) -> Result<Self, MutationRateOutOfRange> {
        if !(0.0..=1.0).contains(&value) {
            return Err(MutationRateOutOfRange(value));
        }

        Ok(Self { value })
    }

    pub fn get(&self) -> f64 {
        self.value
    }
}

impl TryFrom<f64> for MutationRate {
    type Error = MutationRateOutOfRange;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MutationRate> for f64 {
    fn from(rate: MutationRate) -> Self {
        rate.value
    }
}

/// Draws the mask of coordinates to mutate, one uniform draw per element, and returns the
/// selected elements. The mask is complete before any noise is drawn.
fn select_elements<'t, R: Rng>(rng: &mut R, tensor: &'t mut Tensor, rate: f64) -> Vec<&'t mut f32> {
    tensor
        .iter_mut()
        .filter(|_| rng.random::<f64>() < rate)
        .collect()
}

#[instrument(level = "debug", skip(rng, tensor), fields(shape = ?tensor.shape()))]
fn gaussian_mutation<R: Rng>(
    rng: &mut R,
    tensor: &mut Tensor,
    sigma: f32,
    rate: f64,
) -> Result<usize, OperatorError> {
    let normal = Normal::new(0.0, sigma).map_err(|_| OperatorError::invalid_spread("sigma", sigma))?;

    let selected = select_elements(rng, tensor, rate);
    let mutated = selected.len();

    // One noise sample per selected coordinate, not per element.
    let delta: Vec<f32> = (0..mutated).map(|_| normal.sample(&mut *rng)).collect();
    for (value, delta) in selected.into_iter().zip(delta) {
        *value += delta;
    }

    Ok(mutated)
}

#[instrument(level = "debug", skip(rng, tensor), fields(shape = ?tensor.shape()))]
fn polynomial_mutation<R: Rng>(rng: &mut R, tensor: &mut Tensor, eta_m: f32, rate: f64) -> usize {
    let exponent = 1.0 / (eta_m + 1.0);

    let selected = select_elements(rng, tensor, rate);
    let mutated = selected.len();

    for value in selected {
        let r: f32 = rng.random();
        let delta = if r < 0.5 {
            (2.0 * r).powf(exponent) - 1.0
        } else {
            1.0 - (2.0 * (1.0 - r)).powf(exponent)
        };
        *value += delta;
    }

    mutated
}

#[instrument(level = "debug", skip(rng, tensor), fields(shape = ?tensor.shape()))]
fn uniform_mutation<R: Rng>(
    rng: &mut R,
    tensor: &mut Tensor,
    max_uniform: f32,
    rate: f64,
) -> Result<usize, OperatorError> {
    if !max_uniform.is_finite() || max_uniform < 0.0 {
        return Err(OperatorError::invalid_spread("max_uniform", max_uniform));
    }

    let selected = select_elements(rng, tensor, rate);
    let mutated = selected.len();

    for value in selected {
        *value += rng.random_range(-max_uniform..=max_uniform);
    }

    Ok(mutated)
}

// ============================================================
// Mutagen
// ============================================================

/// Mutation strategy applied to a policy's parameters.
///
/// Every strategy shares the same stochastic contract: each element is selected
/// independently with probability `mutation_rate`, only selected elements change, and
/// the result is clamped when gene bounds are configured.
///
/// - `Gaussian` adds `N(0, sigma²)` noise.
/// - `Polynomial` adds a polynomially distributed step in `[-1, 1]` shaped by `eta_m`.
/// - `Uniform` adds noise drawn uniformly from `[-max_uniform, max_uniform]`.
///
/// Only `Serialize` is derived; build strategies through the validating constructors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Mutagen {
    Gaussian { sigma: f32, mutation_rate: MutationRate },
    Polynomial { eta_m: f32, mutation_rate: MutationRate },
    Uniform { max_uniform: f32, mutation_rate: MutationRate },
}

#[derive(Debug, thiserror::Error)]
pub enum MutagenError {
    #[error("Mutation rate error: {0}")]
    MutationRate(#[from] MutationRateOutOfRange),
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidParameter { name: &'static str, value: f32 },
}

fn non_negative(name: &'static str, value: f32) -> Result<f32, MutagenError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MutagenError::InvalidParameter { name, value });
    }

    Ok(value)
}

impl Mutagen {
    pub fn gaussian(sigma: f32, mutation_rate: f64) -> Result<Self, MutagenError> {
        Ok(Self::Gaussian {
            sigma: non_negative("sigma", sigma)?,
            mutation_rate: MutationRate::new(mutation_rate)?,
        })
    }

    pub fn polynomial(eta_m: f32, mutation_rate: f64) -> Result<Self, MutagenError> {
        Ok(Self::Polynomial {
            eta_m: non_negative("eta_m", eta_m)?,
            mutation_rate: MutationRate::new(mutation_rate)?,
        })
    }

    pub fn uniform(max_uniform: f32, mutation_rate: f64) -> Result<Self, MutagenError> {
        Ok(Self::Uniform {
            max_uniform: non_negative("max_uniform", max_uniform)?,
            mutation_rate: MutationRate::new(mutation_rate)?,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gaussian { .. } => "gaussian",
            Self::Polynomial { .. } => "polynomial",
            Self::Uniform { .. } => "uniform",
        }
    }

    pub fn mutation_rate(&self) -> f64 {
        match self {
            Self::Gaussian { mutation_rate, .. }
            | Self::Polynomial { mutation_rate, .. }
            | Self::Uniform { mutation_rate, .. } => mutation_rate.get(),
        }
    }

    /// Returns a mutated copy of `x`, clamped when bounds are configured.
    #[instrument(level = "debug", skip(self, rng, x), fields(mutation_type = self.name(), shape = ?x.shape()))]
    pub(crate) fn apply<R: Rng>(
        &self,
        rng: &mut R,
        x: &Tensor,
        bounds: Option<&GeneBounds>,
    ) -> Result<Tensor, OperatorError> {
        check_rank(x)?;

        let mut y = x.clone();
        let rate = self.mutation_rate();
        let mutated = match self {
            Self::Gaussian { sigma, .. } => gaussian_mutation(rng, &mut y, *sigma, rate)?,
            Self::Polynomial { eta_m, .. } => polynomial_mutation(rng, &mut y, *eta_m, rate),
            Self::Uniform { max_uniform, .. } => uniform_mutation(rng, &mut y, *max_uniform, rate)?,
        };
        tracing::trace!(mutated, total = y.len(), "Mutated elements");

        clamp_optional(bounds, &mut y);
        Ok(y)
    }
}
