//! Step implementations, one struct per step kind.

use crate::value::Value;

pub mod adjacency;
pub mod branch;
pub mod filter;
pub mod loops;
pub mod order;
pub mod path;
pub mod side_effect;
pub mod transform;

pub use adjacency::{Expand, ExpandStep};
pub use branch::{BackStep, IfThenElseStep, MemoizeStep};
pub use filter::{Compare, DedupStep, FilterStep, RandomStep, RangeStep, SimplePathStep};
pub use loops::{LoopPredicate, LoopState, LoopStep};
pub use order::{Order, OrderBy, OrderMapStep, OrderStep, ShuffleStep};
pub use path::{PathStep, SelectStep};
pub use side_effect::{
    AggregateStep, CountFn, DivertStep, GroupByStep, GroupCountStep, PropertySetStep,
    SideEffectStep, StoreStep, TableStep, TreeStep,
};
pub use transform::{AsStep, GatherScatterStep, IdentityStep, MapFn, MapStep};

/// Per-value function used for keys, projections and path decorations.
pub type ValueFn = Box<dyn FnMut(&Value) -> Value>;
