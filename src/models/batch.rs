//! Batched parameter view.
//!
//! Gathers the named tensors of many genotypes into one stacked tensor per name, with the
//! leading axis indexing individuals. Operators then run once over the whole batch instead
//! of once per policy, and the result is split back into per-policy genotypes.

use super::{Genotype, Tensor};
use ndarray::Axis;
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("EmptyBatch: cannot stack zero genotypes")]
    Empty,
    #[error("SchemaMismatch: genotype at index {index} does not match the schema of the first genotype")]
    SchemaMismatch { index: usize },
    #[error("MissingTensor: tensor '{name}' is not part of the batch")]
    MissingTensor { name: String },
    #[error("ShapeMismatch: tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl BatchError {
    fn missing_tensor(name: &str) -> Self {
        Self::MissingTensor {
            name: name.to_string(),
        }
    }
}

/// A population of genotypes sharing one schema, stored as stacked tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeBatch {
    tensors: BTreeMap<String, Tensor>,
    len: usize,
}

impl GenotypeBatch {
    /// Stacks the given genotypes along a new leading axis. Every genotype must share the
    /// schema of the first one.
    #[instrument(level = "debug", skip(genotypes), fields(batch_size = genotypes.len()))]
    pub fn stack(genotypes: &[&Genotype]) -> Result<Self, BatchError> {
        let first = genotypes.first().ok_or(BatchError::Empty)?;

        if let Some(index) = genotypes
            .iter()
            .position(|genotype| !genotype.has_same_schema(first))
        {
            return Err(BatchError::SchemaMismatch { index });
        }

        let mut tensors = BTreeMap::new();
        for name in first.names() {
            let views = genotypes
                .iter()
                .map(|genotype| {
                    genotype
                        .get(name)
                        .map(|tensor| tensor.view())
                        .ok_or_else(|| BatchError::missing_tensor(name))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let stacked = ndarray::stack(Axis(0), &views)
                .map_err(|_| BatchError::SchemaMismatch { index: 0 })?;
            tensors.insert(name.to_string(), stacked);
        }

        Ok(Self {
            tensors,
            len: genotypes.len(),
        })
    }

    /// Number of individuals in the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn tensors(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
    }

    /// Replaces the stacked tensor `name` with a tensor of identical shape.
    pub(crate) fn replace(&mut self, name: &str, tensor: Tensor) -> Result<(), BatchError> {
        let current = self
            .tensors
            .get_mut(name)
            .ok_or_else(|| BatchError::missing_tensor(name))?;

        if current.shape() != tensor.shape() {
            return Err(BatchError::ShapeMismatch {
                name: name.to_string(),
                expected: current.shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }

        *current = tensor;
        Ok(())
    }

    /// Splits the batch back into one genotype per individual, in stacking order.
    pub fn unstack(&self) -> Vec<Genotype> {
        (0..self.len)
            .map(|index| {
                Genotype::from_tensors(self.tensors.iter().map(|(name, tensor)| {
                    (name.clone(), tensor.index_axis(Axis(0), index).to_owned())
                }))
            })
            .collect()
    }
}
