//! Run-level bookkeeping: identifier allocation, adaptation set grouping and
//! the context that threads them through a run.

pub mod context;
pub mod grouping;
pub mod ids;

pub use context::{IdentifiedRepresentation, RunContext};
pub use grouping::AdaptationSetGrouper;
pub use ids::IdentifierAllocator;
