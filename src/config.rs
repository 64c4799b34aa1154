//! Variation operator settings.
//!
//! ```rust
//! use fx_illumination::config::VariationConfig;
//!
//! let config = VariationConfig::from_json_str(r#"{
//!     "crossover_op": "sbx",
//!     "mutation_op": "gaussian_mutation",
//!     "mutations_per_policy": 4
//! }"#)?;
//!
//! let breeder = config.breeder()?;
//! assert_eq!(breeder.crossover().map(|c| c.name()), Some("sbx"));
//! assert_eq!(breeder.mutagen().map(|m| m.name()), Some("gaussian"));
//! assert_eq!(config.eval_batch_size, 100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::models::{
    Breeder, Crossover, CrossoverError, GeneBoundError, GeneBounds, Mutagen, MutagenError,
    ParameterScope, Schedule,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("InvalidValue: {name} {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("GeneBoundError: {0}")]
    GeneBounds(#[from] GeneBoundError),
    #[error("CrossoverError: {0}")]
    Crossover(#[from] CrossoverError),
    #[error("MutagenError: {0}")]
    Mutagen(#[from] MutagenError),
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationConfig {
    /// `iso_dd`, `sbx` or `none`.
    pub crossover_op: String,
    /// `gaussian`, `polynomial`, `uniform` or `none`, optionally suffixed with `_mutation`.
    pub mutation_op: String,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub eta_m: f32,
    pub eta_c: f32,
    pub sigma: f32,
    pub max_uniform: f32,
    pub iso_sigma: f32,
    pub line_sigma: f32,
    pub min_gene: Option<f32>,
    pub max_gene: Option<f32>,
    pub mutations_per_policy: usize,
    pub eval_batch_size: usize,
    pub proportion_evo: f64,
    pub random_init_batch: usize,
    /// Archive size up to which rounds run in bootstrap mode.
    pub random_init: usize,
    pub num_agents: usize,
    pub tick_period_ms: u64,
    pub seed: Option<u64>,
    pub parameter_scope: ParameterScope,
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            crossover_op: "iso_dd".to_string(),
            mutation_op: "none".to_string(),
            mutation_rate: 0.05,
            crossover_rate: 0.75,
            eta_m: 5.0,
            eta_c: 10.0,
            sigma: 0.2,
            max_uniform: 0.1,
            iso_sigma: 0.01,
            line_sigma: 0.2,
            min_gene: None,
            max_gene: None,
            mutations_per_policy: 1,
            eval_batch_size: 100,
            proportion_evo: 0.5,
            random_init_batch: 100,
            random_init: 500,
            num_agents: 100,
            tick_period_ms: 3000,
            seed: None,
            parameter_scope: ParameterScope::All,
        }
    }
}

impl VariationConfig {
    /// Parses and validates a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
            ("proportion_evo", self.proportion_evo),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    name,
                    format!("must be between 0.0 and 1.0, got {value}"),
                ));
            }
        }

        for (name, value) in [
            ("eta_m", self.eta_m),
            ("eta_c", self.eta_c),
            ("sigma", self.sigma),
            ("max_uniform", self.max_uniform),
            ("iso_sigma", self.iso_sigma),
            ("line_sigma", self.line_sigma),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(
                    name,
                    format!("must be finite and non-negative, got {value}"),
                ));
            }
        }

        for (name, value) in [
            ("mutations_per_policy", self.mutations_per_policy),
            ("eval_batch_size", self.eval_batch_size),
            ("random_init_batch", self.random_init_batch),
            ("num_agents", self.num_agents),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(name, "must be greater than zero"));
            }
        }

        if self.tick_period_ms == 0 {
            return Err(ConfigError::invalid("tick_period_ms", "must be greater than zero"));
        }

        if self.schedule().steady_batch == 0 {
            return Err(ConfigError::invalid(
                "proportion_evo",
                format!(
                    "leaves no parents per round with eval_batch_size={}",
                    self.eval_batch_size
                ),
            ));
        }

        self.bounds()?;
        Ok(())
    }

    pub fn bounds(&self) -> Result<Option<GeneBounds>, ConfigError> {
        Ok(GeneBounds::from_options(self.min_gene, self.max_gene)?)
    }

    /// Resolves `crossover_op`. Unknown names disable the stage with a warning.
    pub fn crossover(&self) -> Result<Option<Crossover>, ConfigError> {
        let crossover = match self.crossover_op.trim_end_matches("_crossover") {
            "iso_dd" => Some(Crossover::iso_dd(self.iso_sigma, self.line_sigma)?),
            "sbx" => Some(Crossover::sbx(self.eta_c, self.crossover_rate)?),
            "none" | "" => None,
            unknown => {
                tracing::warn!(crossover_op = unknown, "Unknown crossover operator, crossover disabled");
                None
            }
        };

        Ok(crossover)
    }

    /// Resolves `mutation_op`. Unknown names disable the stage with a warning.
    pub fn mutagen(&self) -> Result<Option<Mutagen>, ConfigError> {
        let mutagen = match self.mutation_op.trim_end_matches("_mutation") {
            "gaussian" => Some(Mutagen::gaussian(self.sigma, self.mutation_rate)?),
            "polynomial" => Some(Mutagen::polynomial(self.eta_m, self.mutation_rate)?),
            "uniform" => Some(Mutagen::uniform(self.max_uniform, self.mutation_rate)?),
            "none" | "" => None,
            unknown => {
                tracing::warn!(mutation_op = unknown, "Unknown mutation operator, mutation disabled");
                None
            }
        };

        Ok(mutagen)
    }

    #[instrument(level = "debug", skip(self), fields(crossover_op = %self.crossover_op, mutation_op = %self.mutation_op))]
    pub fn breeder(&self) -> Result<Breeder, ConfigError> {
        let crossover = self.crossover()?;
        let mutagen = self.mutagen()?;

        if crossover.is_none() && mutagen.is_none() {
            tracing::warn!("No variation operator configured, children will copy their parents");
        }

        Ok(Breeder::new(crossover, mutagen)
            .with_bounds(self.bounds()?)
            .with_scope(self.parameter_scope))
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(
            self.num_agents,
            self.random_init,
            self.random_init_batch,
            self.eval_batch_size,
            self.proportion_evo,
        )
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_fills_missing_fields_with_defaults() {
        let config = VariationConfig::from_json_str("{}").unwrap();

        assert_eq!(config, VariationConfig::default());
        assert_eq!(config.tick_period(), Duration::from_secs(3));
        assert_eq!(config.schedule().watermark, 200);
        assert_eq!(config.schedule().steady_batch, 50);

        let breeder = config.breeder().unwrap();
        assert_eq!(
            breeder.crossover(),
            Some(&Crossover::IsoDd {
                iso_sigma: 0.01,
                line_sigma: 0.2
            })
        );
        assert!(breeder.mutagen().is_none());
    }

    #[test]
    fn it_accepts_suffixed_operator_names() {
        for name in ["polynomial", "polynomial_mutation"] {
            let config = VariationConfig {
                mutation_op: name.to_string(),
                ..Default::default()
            };
            assert_eq!(config.mutagen().unwrap().map(|m| m.name()), Some("polynomial"));
        }
    }

    #[test]
    fn unknown_operators_disable_their_stage() {
        let config = VariationConfig {
            crossover_op: "blend".to_string(),
            mutation_op: "uniform".to_string(),
            ..Default::default()
        };

        let breeder = config.breeder().unwrap();

        assert!(breeder.crossover().is_none());
        assert_eq!(breeder.mutagen().map(|m| m.name()), Some("uniform"));
        assert!(!breeder.requires_second_parent());
    }

    #[test]
    fn it_rejects_out_of_range_values() {
        let invalid = [
            r#"{"mutation_rate": 1.5}"#,
            r#"{"crossover_rate": -0.1}"#,
            r#"{"proportion_evo": 2.0}"#,
            r#"{"sigma": -1.0}"#,
            r#"{"mutations_per_policy": 0}"#,
            r#"{"eval_batch_size": 0}"#,
            r#"{"proportion_evo": 0.0}"#,
            r#"{"tick_period_ms": 0}"#,
        ];

        for json in invalid {
            assert!(
                matches!(
                    VariationConfig::from_json_str(json),
                    Err(ConfigError::InvalidValue { .. })
                ),
                "{json} was accepted"
            );
        }
    }

    #[test]
    fn clamp_bounds_are_both_or_neither() {
        assert!(matches!(
            VariationConfig::from_json_str(r#"{"min_gene": -1.0}"#),
            Err(ConfigError::GeneBounds(GeneBoundError::Incomplete { .. }))
        ));
        assert!(matches!(
            VariationConfig::from_json_str(r#"{"min_gene": 1.0, "max_gene": -1.0}"#),
            Err(ConfigError::GeneBounds(GeneBoundError::InvalidBound { .. }))
        ));

        let config =
            VariationConfig::from_json_str(r#"{"min_gene": -1.0, "max_gene": 1.0}"#).unwrap();
        assert_eq!(config.bounds().unwrap(), Some(GeneBounds::new(-1.0, 1.0).unwrap()));
    }

    #[test]
    fn it_reports_parse_and_io_errors() {
        assert!(matches!(
            VariationConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            VariationConfig::from_path("/nonexistent/variation.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
