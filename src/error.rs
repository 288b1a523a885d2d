use thiserror::Error;

use crate::model::Element;

pub type Result<T> = std::result::Result<T, TraversalError>;

/// Failures surfaced while building or pulling a traversal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraversalError {
    /// `next()` was called on an exhausted traversal.
    #[error("no such element: traversal is exhausted")]
    NoSuchElement,
    /// `back()`/`optional()` without a pending `mark()`.
    #[error("{op}() requires a pending mark() but the mark stack is empty")]
    MarkStackEmpty { op: &'static str },
    /// Path data was requested but path tracking was never enabled.
    #[error("path tracking is not enabled for this traversal")]
    PathNotEnabled,
    /// A function list does not line up with the columns it decorates.
    #[error("{step}() expects {expected} function(s) but got {found}")]
    ArgumentMismatch {
        step: &'static str,
        expected: usize,
        found: usize,
    },
    /// A referenced step name was never declared with `as_()`.
    #[error("unknown step name '{name}'")]
    UnknownStep { name: String },
    /// An element-only step received a plain value.
    #[error("{op}() requires a vertex or edge")]
    NotAnElement { op: &'static str },
    /// The backing graph no longer knows about the element.
    #[error("{0} not found")]
    NotFound(Element),
    /// Failure reported by the graph access capability.
    #[error("graph error: {0}")]
    Graph(String),
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl TraversalError {
    /// Builds a [`TraversalError::UnknownStep`] for the given name.
    pub fn unknown_step(name: impl Into<String>) -> Self {
        TraversalError::UnknownStep { name: name.into() }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TraversalError::NoSuchElement => "NoSuchElement",
            TraversalError::MarkStackEmpty { .. } => "MarkStackEmpty",
            TraversalError::PathNotEnabled => "PathNotEnabled",
            TraversalError::ArgumentMismatch { .. } => "ArgumentMismatch",
            TraversalError::UnknownStep { .. } => "UnknownStep",
            TraversalError::NotAnElement { .. } => "NotAnElement",
            TraversalError::NotFound(_) => "NotFound",
            TraversalError::Graph(_) => "Graph",
            TraversalError::Invalid(_) => "Invalid",
        }
    }

    /// True for the expected end-of-stream signal rather than a fault.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TraversalError::NoSuchElement)
    }
}
