mod repository;

pub use repository::{Elite, EliteSource, ElitesMap, Insertion, Niche};
