mod actor;
mod errors;
mod events;
mod service;
mod service_builder;

pub use actor::{Handle, spawn};
pub use errors::Error;
pub use events::{EvalResults, Message, Submission, VariationEvent};
pub use service::{OperatorState, RoundOutcome, Service};
pub use service_builder::ServiceBuilder;
