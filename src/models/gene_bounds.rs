use super::Tensor;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum GeneBoundError {
    #[error("InvalidBounds: lower bound must not exceed upper. lower = {lower}, upper={upper}")]
    InvalidBound { lower: f32, upper: f32 },
    #[error("IncompleteBounds: min_gene and max_gene must be set together. min={min:?}, max={max:?}")]
    Incomplete { min: Option<f32>, max: Option<f32> },
}

impl GeneBoundError {
    pub(crate) fn invalid_bound(lower: f32, upper: f32) -> Self {
        Self::InvalidBound { lower, upper }
    }
}

/// Inclusive clamp range applied to every varied parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "UncheckedBounds")]
pub struct GeneBounds {
    pub(crate) lower: f32,
    pub(crate) upper: f32,
}

#[derive(Deserialize)]
struct UncheckedBounds {
    lower: f32,
    upper: f32,
}

impl TryFrom<UncheckedBounds> for GeneBounds {
    type Error = GeneBoundError;

    fn try_from(bounds: UncheckedBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.lower, bounds.upper)
    }
}

impl GeneBounds {
    #[instrument(level = "debug", fields(lower = lower, upper = upper))]
    pub fn new(lower: f32, upper: f32) -> Result<Self, GeneBoundError> {
        // Also rejects NaN bounds.
        if !(lower <= upper) {
            return Err(GeneBoundError::invalid_bound(lower, upper));
        }

        Ok(Self { lower, upper })
    }

    /// Builds bounds from optional `min_gene`/`max_gene` settings. Both or neither must be set.
    pub fn from_options(min: Option<f32>, max: Option<f32>) -> Result<Option<Self>, GeneBoundError> {
        match (min, max) {
            (Some(lower), Some(upper)) => Self::new(lower, upper).map(Some),
            (None, None) => Ok(None),
            _ => Err(GeneBoundError::Incomplete { min, max }),
        }
    }

    pub fn lower(&self) -> f32 {
        self.lower
    }

    pub fn upper(&self) -> f32 {
        self.upper
    }

    pub fn clamp(&self, tensor: &mut Tensor) {
        let (lower, upper) = (self.lower, self.upper);
        // `f32::clamp` panics on inverted bounds; max/min never does.
        tensor.mapv_inplace(|value| value.max(lower).min(upper));
    }
}

/// Clamps `tensor` when bounds are configured and leaves it untouched otherwise.
pub(crate) fn clamp_optional(bounds: Option<&GeneBounds>, tensor: &mut Tensor) {
    if let Some(bounds) = bounds {
        bounds.clamp(tensor);
    }
}
