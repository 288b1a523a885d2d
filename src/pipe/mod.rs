//! Pull-based evaluation machinery shared by every step.

pub mod context;
pub mod pipeline;
pub mod profile;
pub mod sinks;
pub mod step;
pub mod traverser;

pub use context::EvalContext;
pub use pipeline::{Pipeline, PipelineState};
pub use profile::{profile_snapshot, TraversalProfileSnapshot};
pub use sinks::{SideEffects, SinkId, Tree};
pub use step::{Chain, Predicate, Seed, Source, Step, Upstream};
pub use traverser::Traverser;
