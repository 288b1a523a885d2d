//! Lazy, pull-based graph traversal pipelines.
//!
//! A traversal is an ordered chain of steps over a source of starting
//! values. Nothing runs until a terminal operation pulls: each pull asks
//! the last step for one traverser, which asks the step before it, down to
//! the source. Filters, transforms, side effects, branches and loops are
//! all steps; see [`steps`].
//!
//! Graphs are reached only through the [`graph::GraphAccess`] capability.
//! [`graph::MemoryGraph`] is the bundled in-memory backend.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod pipe;
pub mod steps;
pub mod traversal;
pub mod value;

pub use config::TraversalConfig;
pub use error::{Result, TraversalError};
pub use graph::{GraphAccess, MemoryGraph};
pub use model::{Direction, EdgeId, Element, VertexId};
pub use pipe::{Pipeline, SinkId};
pub use steps::{Compare, Order};
pub use traversal::{Edges, Traversal, TraversalSource, Values, Vertices};
pub use value::Value;
