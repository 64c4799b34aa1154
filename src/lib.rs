pub mod bootstrap;
pub mod config;
pub mod models;
pub mod repositories;
pub mod services;

pub use bootstrap::bootstrap_operator;
pub use config::{ConfigError, VariationConfig};
pub use services::variation::{Handle, RoundOutcome, Service, spawn};
