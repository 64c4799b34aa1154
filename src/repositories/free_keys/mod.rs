mod errors;
mod repository;

pub use errors::ClaimError;
pub use repository::FreeKeySet;
