use ndarray::ArrayD;

/// Dense floating-point parameter tensor of arbitrary rank.
pub type Tensor = ArrayD<f32>;

/// Ranks the genetic operators know how to address: a plain vector, a matrix, or a
/// stack of matrices where the leading axis indexes individuals in a batch.
pub const SUPPORTED_RANKS: std::ops::RangeInclusive<usize> = 1..=3;

/// Errors raised by the genetic operators.
///
/// These indicate a schema mismatch between the policy model and the operator library
/// and are never recovered from locally.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("UnsupportedRank: tensors of rank {rank} cannot be varied, expected rank 1, 2 or 3")]
    UnsupportedRank { rank: usize },
    #[error("ShapeMismatch: parent shapes differ, lhs={lhs:?}, rhs={rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("InvalidSpread: {name} must be finite and non-negative, got {value}")]
    InvalidSpread { name: &'static str, value: f32 },
}

impl OperatorError {
    pub(crate) fn invalid_spread(name: &'static str, value: f32) -> Self {
        Self::InvalidSpread { name, value }
    }
}

pub(crate) fn check_rank(tensor: &Tensor) -> Result<(), OperatorError> {
    let rank = tensor.ndim();
    if !SUPPORTED_RANKS.contains(&rank) {
        return Err(OperatorError::UnsupportedRank { rank });
    }

    Ok(())
}

pub(crate) fn check_shapes(lhs: &Tensor, rhs: &Tensor) -> Result<(), OperatorError> {
    if lhs.shape() != rhs.shape() {
        return Err(OperatorError::ShapeMismatch {
            lhs: lhs.shape().to_vec(),
            rhs: rhs.shape().to_vec(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn it_accepts_ranks_one_to_three() {
        for shape in [vec![4], vec![2, 3], vec![2, 3, 4]] {
            assert!(check_rank(&Tensor::zeros(IxDyn(&shape))).is_ok());
        }
    }

    #[test]
    fn it_rejects_scalars_and_rank_four() {
        let scalar = Tensor::zeros(IxDyn(&[]));
        assert!(matches!(
            check_rank(&scalar),
            Err(OperatorError::UnsupportedRank { rank: 0 })
        ));

        let rank_four = Tensor::zeros(IxDyn(&[1, 2, 3, 4]));
        assert!(matches!(
            check_rank(&rank_four),
            Err(OperatorError::UnsupportedRank { rank: 4 })
        ));
    }

    #[test]
    fn it_reports_mismatched_shapes() {
        let lhs = Tensor::zeros(IxDyn(&[2, 3]));
        let rhs = Tensor::zeros(IxDyn(&[3, 2]));

        match check_shapes(&lhs, &rhs) {
            Err(OperatorError::ShapeMismatch { lhs, rhs }) => {
                assert_eq!(lhs, vec![2, 3]);
                assert_eq!(rhs, vec![3, 2]);
            }
            other => panic!("expected a shape mismatch, got {other:?}"),
        }
    }
}
