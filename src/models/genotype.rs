use super::Tensor;
use std::collections::BTreeMap;

/// Index of a slot in the shared policy pool. Stable for the lifetime of the process and
/// reused once released.
pub type PolicyKey = usize;

/// The parameter state of one policy: a mapping from parameter-tensor name
/// (`layers.0.weight`, `layers.0.bias`, ...) to its tensor.
///
/// Names are kept ordered so that every genotype sharing a schema iterates its tensors in
/// the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Genotype {
    tensors: BTreeMap<String, Tensor>,
}

impl Genotype {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tensors<N: Into<String>>(tensors: impl IntoIterator<Item = (N, Tensor)>) -> Self {
        Self {
            tensors: tensors
                .into_iter()
                .map(|(name, tensor)| (name.into(), tensor))
                .collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn tensors(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar parameters across all tensors.
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(Tensor::len).sum()
    }

    /// Two genotypes share a schema when they hold the same tensor names with the same shapes.
    pub fn has_same_schema(&self, other: &Genotype) -> bool {
        self.tensors.len() == other.tensors.len()
            && self
                .tensors
                .iter()
                .zip(other.tensors.iter())
                .all(|((lhs_name, lhs), (rhs_name, rhs))| {
                    lhs_name == rhs_name && lhs.shape() == rhs.shape()
                })
    }

    /// Copies `other`'s values into the existing buffers, keeping this genotype's allocations.
    /// Callers must check [`Genotype::has_same_schema`] first.
    pub(crate) fn overwrite_from(&mut self, other: &Genotype) {
        for (name, tensor) in self.tensors.iter_mut() {
            if let Some(source) = other.tensors.get(name) {
                tensor.assign(source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn tensor(shape: &[usize], value: f32) -> Tensor {
        ArrayD::from_elem(IxDyn(shape), value)
    }

    fn small_genotype(value: f32) -> Genotype {
        Genotype::from_tensors([
            ("layers.0.weight", tensor(&[3, 2], value)),
            ("layers.0.bias", tensor(&[3], value)),
        ])
    }

    #[test]
    fn it_iterates_tensors_in_name_order() {
        let genotype = small_genotype(1.0);
        let names: Vec<&str> = genotype.names().collect();

        assert_eq!(names, vec!["layers.0.bias", "layers.0.weight"]);
        assert_eq!(genotype.parameter_count(), 9);
    }

    #[test]
    fn it_compares_schemas_by_name_and_shape() {
        let genotype = small_genotype(1.0);

        assert!(genotype.has_same_schema(&small_genotype(5.0)));

        let mut reshaped = small_genotype(1.0);
        reshaped.insert("layers.0.bias", tensor(&[4], 1.0));
        assert!(!genotype.has_same_schema(&reshaped));

        let mut extended = small_genotype(1.0);
        extended.insert("action_log_std", tensor(&[2], 0.0));
        assert!(!genotype.has_same_schema(&extended));
    }

    #[test]
    fn it_overwrites_values_in_place() {
        let mut slot = small_genotype(0.0);
        let child = small_genotype(2.5);

        slot.overwrite_from(&child);

        assert_eq!(slot, child);
    }
}
