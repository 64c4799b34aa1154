use super::gene_bounds::clamp_optional;
use super::tensor::{OperatorError, Tensor, check_rank, check_shapes};
use super::GeneBounds;
use ndarray::Zip;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::instrument;

/// Iso+Line variation (Vassiliades & Mouret, GECCO 2018).
///
/// `z = x + N(0, iso_sigma²) + U·(y − x)` where the isotropic term is drawn per element and
/// the line coefficient `U ~ N(0, line_sigma²)` is drawn once per call. When `x` and `y` are
/// stacked batches the single coefficient is shared by every individual in the batch.
#[instrument(level = "debug", skip(rng, x, y), fields(shape = ?x.shape()))]
pub(crate) fn iso_dd<R: Rng>(
    rng: &mut R,
    x: &Tensor,
    y: &Tensor,
    iso_sigma: f32,
    line_sigma: f32,
) -> Result<Tensor, OperatorError> {
    check_shapes(x, y)?;

    let isotropic =
        Normal::new(0.0, iso_sigma).map_err(|_| OperatorError::invalid_spread("iso_sigma", iso_sigma))?;
    let line =
        Normal::new(0.0, line_sigma).map_err(|_| OperatorError::invalid_spread("line_sigma", line_sigma))?;

    let coefficient: f32 = line.sample(rng);

    let mut z = x.clone();
    Zip::from(&mut z).and(y).for_each(|z, &y| {
        let x = *z;
        *z = x + isotropic.sample(rng) + coefficient * (y - x);
    });

    Ok(z)
}

/// Simulated binary crossover (Deb & Agrawal).
///
/// Each element crosses independently with probability `crossover_rate`. A crossing element
/// draws a spread factor controlled by `eta_c` (larger values keep children closer to their
/// parents), forms the two SBX children and keeps one of them at random. Elements that do
/// not cross are copied from `x`.
#[instrument(level = "debug", skip(rng, x, y), fields(shape = ?x.shape()))]
pub(crate) fn sbx<R: Rng>(
    rng: &mut R,
    x: &Tensor,
    y: &Tensor,
    eta_c: f32,
    crossover_rate: f64,
) -> Result<Tensor, OperatorError> {
    check_shapes(x, y)?;

    let exponent = 1.0 / (eta_c + 1.0);

    let mut z = x.clone();
    Zip::from(&mut z).and(y).for_each(|z, &y| {
        if rng.random::<f64>() >= crossover_rate {
            return;
        }

        let x = *z;
        let u: f32 = rng.random();
        let beta_q = if u <= 0.5 {
            (2.0 * u).powf(exponent)
        } else {
            (1.0 / (2.0 * (1.0 - u))).powf(exponent)
        };

        let c1 = 0.5 * ((1.0 + beta_q) * x + (1.0 - beta_q) * y);
        let c2 = 0.5 * ((1.0 - beta_q) * x + (1.0 + beta_q) * y);

        *z = if rng.random_bool(0.5) { c1 } else { c2 };
    });

    Ok(z)
}

/// Crossover strategy for combining the parameters of two parent policies.
///
/// Both strategies operate element-wise on tensors of identical shape and therefore work
/// on a single policy's tensor as well as on a stacked batch of policies.
///
/// # Strategies
///
/// ## Iso+Line (`iso_dd`)
/// Adds small isotropic Gaussian noise to the first parent and moves it along the line
/// towards (or away from) the second parent. Works well in archives where elites of
/// neighbouring niches are correlated, which is the common case for policy search.
///
/// ## Simulated binary crossover (`sbx`)
/// Per-element crossover mimicking single-point crossover on binary strings. `eta_c`
/// controls how far children may land from their parents.
///
/// # Examples
///
/// ```rust
/// use fx_illumination::models::Crossover;
///
/// let iso = Crossover::iso_dd(0.01, 0.2)?;
/// let sbx = Crossover::sbx(10.0, 0.75)?;
///
/// assert_eq!(iso.name(), "iso_dd");
/// assert_eq!(sbx.name(), "sbx");
/// assert!(Crossover::sbx(10.0, 1.5).is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Only `Serialize` is derived; build strategies through the validating constructors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Crossover {
    /// Iso+Line variation with isotropic spread `iso_sigma` and line spread `line_sigma`.
    IsoDd { iso_sigma: f32, line_sigma: f32 },
    /// Simulated binary crossover with distribution index `eta_c`, applied to each element
    /// with probability `crossover_rate`.
    Sbx { eta_c: f32, crossover_rate: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CrossoverError {
    #[error("crossover_rate must be between 0.0 and 1.0, got {0}")]
    RateOutOfRange(f64),
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidParameter { name: &'static str, value: f32 },
}

fn non_negative(name: &'static str, value: f32) -> Result<f32, CrossoverError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CrossoverError::InvalidParameter { name, value });
    }

    Ok(value)
}

impl Crossover {
    pub fn iso_dd(iso_sigma: f32, line_sigma: f32) -> Result<Self, CrossoverError> {
        Ok(Self::IsoDd {
            iso_sigma: non_negative("iso_sigma", iso_sigma)?,
            line_sigma: non_negative("line_sigma", line_sigma)?,
        })
    }

    pub fn sbx(eta_c: f32, crossover_rate: f64) -> Result<Self, CrossoverError> {
        if !(0.0..=1.0).contains(&crossover_rate) {
            return Err(CrossoverError::RateOutOfRange(crossover_rate));
        }

        Ok(Self::Sbx {
            eta_c: non_negative("eta_c", eta_c)?,
            crossover_rate,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IsoDd { .. } => "iso_dd",
            Self::Sbx { .. } => "sbx",
        }
    }

    /// Crosses `x` with `y` and clamps the result when bounds are configured.
    #[instrument(level = "debug", skip(self, rng, x, y), fields(crossover_type = self.name(), shape = ?x.shape()))]
    pub(crate) fn apply<R: Rng>(
        &self,
        rng: &mut R,
        x: &Tensor,
        y: &Tensor,
        bounds: Option<&GeneBounds>,
    ) -> Result<Tensor, OperatorError> {
        check_rank(x)?;

        let mut z = match self {
            Self::IsoDd {
                iso_sigma,
                line_sigma,
            } => iso_dd(rng, x, y, *iso_sigma, *line_sigma)?,
            Self::Sbx {
                eta_c,
                crossover_rate,
            } => sbx(rng, x, y, *eta_c, *crossover_rate)?,
        };

        clamp_optional(bounds, &mut z);
        Ok(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    fn filled(shape: &[usize], value: f32) -> Tensor {
        ArrayD::from_elem(IxDyn(shape), value)
    }

    fn ramp(shape: &[usize]) -> Tensor {
        let len = shape.iter().product();
        ArrayD::from_shape_vec(IxDyn(shape), (0..len).map(|i| i as f32 * 0.1).collect()).unwrap()
    }

    #[test]
    fn iso_dd_is_deterministic_under_a_fixed_seed() {
        let crossover = Crossover::iso_dd(0.01, 0.2).unwrap();
        let x = ramp(&[4, 3, 5]);
        let y = filled(&[4, 3, 5], 1.0);

        let first = crossover
            .apply(&mut StdRng::seed_from_u64(7), &x, &y, None)
            .unwrap();
        let second = crossover
            .apply(&mut StdRng::seed_from_u64(7), &x, &y, None)
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, x);
    }

    #[test]
    fn iso_dd_respects_gene_bounds() {
        let bounds = GeneBounds::new(-0.25, 0.25).unwrap();
        let crossover = Crossover::iso_dd(1.0, 5.0).unwrap();
        let x = filled(&[16, 16], -3.0);
        let y = filled(&[16, 16], 3.0);

        let z = crossover
            .apply(&mut StdRng::seed_from_u64(3), &x, &y, Some(&bounds))
            .unwrap();

        assert!(z.iter().all(|&value| (-0.25..=0.25).contains(&value)));
    }

    #[test]
    fn iso_dd_uses_one_line_coefficient_per_call() {
        // Without isotropic noise every element moves by the same fraction of (y - x).
        let x = filled(&[3, 4], 0.0);
        let y = ramp(&[3, 4]) + 1.0;

        let z = iso_dd(&mut StdRng::seed_from_u64(11), &x, &y, 0.0, 0.3).unwrap();

        let ratios: Vec<f32> = z.iter().zip(y.iter()).map(|(z, y)| z / y).collect();
        assert!(ratios.windows(2).all(|pair| (pair[0] - pair[1]).abs() < 1e-6));
    }

    #[test]
    fn iso_dd_with_zero_spread_returns_the_first_parent() {
        let x = ramp(&[2, 5]);
        let y = filled(&[2, 5], 9.0);

        let z = iso_dd(&mut StdRng::seed_from_u64(1), &x, &y, 0.0, 0.0).unwrap();

        assert_eq!(z, x);
    }

    #[test]
    fn sbx_with_zero_rate_copies_the_first_parent() {
        let crossover = Crossover::sbx(10.0, 0.0).unwrap();
        let x = ramp(&[6, 2]);
        let y = filled(&[6, 2], -4.0);

        let z = crossover
            .apply(&mut StdRng::seed_from_u64(42), &x, &y, None)
            .unwrap();

        assert_eq!(z, x);
    }

    #[test]
    fn sbx_children_preserve_the_parent_midpoint_spread() {
        // Each SBX child lies on the line through x and y and is symmetric about their mean,
        // so c - mean is a multiple of (y - x) / 2 with factor ±beta_q.
        let x = filled(&[200], 0.0);
        let y = filled(&[200], 1.0);

        let z = sbx(&mut StdRng::seed_from_u64(5), &x, &y, 10.0, 1.0).unwrap();

        assert!(z.iter().all(|value| value.is_finite()));
        let mean_offset: f32 = z.iter().map(|value| value - 0.5).sum::<f32>() / 200.0;
        assert!(mean_offset.abs() < 0.2, "children drift from midpoint: {mean_offset}");
    }

    #[test]
    fn sbx_leaves_identical_parents_unchanged() {
        let x = filled(&[10], 0.7);

        let z = sbx(&mut StdRng::seed_from_u64(9), &x, &x, 2.0, 1.0).unwrap();

        assert!(z.iter().all(|&value| (value - 0.7).abs() < 1e-6));
    }

    #[test]
    fn it_rejects_mismatched_parents() {
        let crossover = Crossover::iso_dd(0.01, 0.2).unwrap();
        let result = crossover.apply(
            &mut StdRng::seed_from_u64(0),
            &filled(&[2, 3], 0.0),
            &filled(&[3, 2], 0.0),
            None,
        );

        assert!(matches!(result, Err(OperatorError::ShapeMismatch { .. })));
    }

    #[test]
    fn it_rejects_unsupported_ranks() {
        let crossover = Crossover::sbx(10.0, 0.5).unwrap();
        let x = filled(&[1, 2, 3, 4], 0.0);

        let result = crossover.apply(&mut StdRng::seed_from_u64(0), &x, &x, None);

        assert!(matches!(
            result,
            Err(OperatorError::UnsupportedRank { rank: 4 })
        ));
    }

    #[test]
    fn it_validates_parameters() {
        assert!(Crossover::iso_dd(-0.1, 0.2).is_err());
        assert!(Crossover::iso_dd(0.1, f32::NAN).is_err());
        assert!(Crossover::sbx(-1.0, 0.5).is_err());
        assert!(Crossover::sbx(10.0, -0.1).is_err());
        assert!(Crossover::sbx(10.0, 1.0).is_ok());
    }
}
