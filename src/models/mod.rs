mod batch;
mod breeder;
mod crossover;
mod gene_bounds;
mod genotype;
mod morphology;
mod mutagen;
mod schedule;
mod scope;
mod selector;
mod tensor;

pub use batch::{BatchError, GenotypeBatch};
pub use breeder::{BreedError, Breeder};
pub use crossover::{Crossover, CrossoverError};
pub use gene_bounds::{GeneBoundError, GeneBounds};
pub use genotype::{Genotype, PolicyKey};
pub use morphology::{Init, Morphology, TensorSpec};
pub use mutagen::{Mutagen, MutagenError, MutationRate, MutationRateOutOfRange};
pub use schedule::{Schedule, ScheduleDecision};
pub use scope::ParameterScope;
pub use selector::{ParentSelection, SelectionError, select_parents};
pub use tensor::{OperatorError, SUPPORTED_RANKS, Tensor};
