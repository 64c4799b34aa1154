use super::{Genotype, Tensor};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// How a tensor is filled when a fresh policy is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// Uniform in `[-a, a]` with `a = sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
    Zeros,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub init: Init,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: &[usize], init: Init) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            init,
        }
    }

    fn fans(&self) -> (usize, usize) {
        match self.shape.as_slice() {
            [] => (1, 1),
            [n] => (*n, *n),
            [fan_out, fan_in, rest @ ..] => {
                let receptive: usize = rest.iter().product();
                (fan_in * receptive, fan_out * receptive)
            }
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> Tensor {
        match self.init {
            Init::Zeros => ArrayD::zeros(IxDyn(&self.shape)),
            Init::XavierUniform => {
                let (fan_in, fan_out) = self.fans();
                let a = (6.0 / (fan_in + fan_out) as f32).sqrt();
                ArrayD::from_shape_simple_fn(IxDyn(&self.shape), || rng.random_range(-a..=a))
            }
        }
    }
}

/// The parameter-tensor schema of a policy network.
///
/// Every policy in the pool is created from the same morphology, so the genetic operators can
/// stack them into one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub(crate) tensors: Vec<TensorSpec>,
}

impl Morphology {
    #[instrument(level = "debug", skip(tensors), fields(tensor_count = tensors.len()))]
    pub fn new(tensors: Vec<TensorSpec>) -> Self {
        Self { tensors }
    }

    /// A fully connected policy `input -> hidden... -> output` with one weight `(out, in)` and
    /// one bias `(out,)` per layer, named `layers.{i}.weight` and `layers.{i}.bias`. With
    /// `with_log_std` the policy also carries a learnable `action_log_std` of size `output`.
    pub fn mlp(input: usize, hidden: &[usize], output: usize, with_log_std: bool) -> Self {
        let widths: Vec<usize> = std::iter::once(input)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(output))
            .collect();

        let mut tensors = Vec::with_capacity(2 * widths.len());
        for (i, pair) in widths.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            tensors.push(TensorSpec::new(
                format!("layers.{i}.weight"),
                &[fan_out, fan_in],
                Init::XavierUniform,
            ));
            tensors.push(TensorSpec::new(
                format!("layers.{i}.bias"),
                &[fan_out],
                Init::Zeros,
            ));
        }

        if with_log_std {
            tensors.push(TensorSpec::new("action_log_std", &[output], Init::Zeros));
        }

        Self::new(tensors)
    }

    pub fn tensors(&self) -> &[TensorSpec] {
        &self.tensors
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors
            .iter()
            .map(|spec| spec.shape.iter().product::<usize>())
            .sum()
    }

    /// Creates a freshly initialised policy.
    #[instrument(level = "debug", skip(self, rng), fields(tensor_count = self.tensors.len()))]
    pub fn random<R: Rng>(&self, rng: &mut R) -> Genotype {
        Genotype::from_tensors(
            self.tensors
                .iter()
                .map(|spec| (spec.name.clone(), spec.sample(rng))),
        )
    }
}
