use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::error::{Result, TraversalError};
use crate::value::Value;

/// Handle to an accumulator owned by a pipeline's [`SideEffects`] registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(usize);

impl SinkId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

pub(crate) type Reducer = Box<dyn Fn(&[Value]) -> Value>;

/// Accumulator kinds written by side-effect steps.
pub(crate) enum Sink {
    Collection(Vec<Value>),
    Counts(BTreeMap<Value, Value>),
    Groups {
        groups: BTreeMap<Value, Vec<Value>>,
        reduce: Option<Reducer>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Tree(Tree),
}

impl Sink {
    fn kind(&self) -> &'static str {
        match self {
            Sink::Collection(_) => "collection",
            Sink::Counts(_) => "counts",
            Sink::Groups { .. } => "groups",
            Sink::Table { .. } => "table",
            Sink::Tree(_) => "tree",
        }
    }

    /// Current accumulated value. Group reductions run here, on read.
    fn to_value(&self) -> Value {
        match self {
            Sink::Collection(items) => Value::List(items.clone()),
            Sink::Counts(counts) => Value::Map(counts.clone()),
            Sink::Groups { groups, reduce } => Value::Map(
                groups
                    .iter()
                    .map(|(key, members)| {
                        let value = match reduce {
                            Some(reduce) => reduce(members),
                            None => Value::List(members.clone()),
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            ),
            Sink::Table { columns, rows } => Value::List(
                rows.iter()
                    .map(|row| {
                        Value::Map(
                            columns
                                .iter()
                                .zip(row)
                                .map(|(column, cell)| (Value::from(column.as_str()), cell.clone()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
            Sink::Tree(tree) => tree.to_value(),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Groups { groups, reduce } => f
                .debug_struct("Groups")
                .field("groups", groups)
                .field("reduce", &reduce.is_some())
                .finish(),
            Sink::Collection(items) => f.debug_tuple("Collection").field(items).finish(),
            Sink::Counts(counts) => f.debug_tuple("Counts").field(counts).finish(),
            Sink::Table { columns, rows } => f
                .debug_struct("Table")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Sink::Tree(tree) => f.debug_tuple("Tree").field(tree).finish(),
        }
    }
}

/// Prefix tree of traverser paths, as built by `tree()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    children: BTreeMap<Value, Tree>,
}

impl Tree {
    pub fn insert_path(&mut self, path: &[Value]) {
        let mut node = self;
        for value in path {
            node = node.children.entry(value.clone()).or_default();
        }
    }

    pub fn children(&self) -> &BTreeMap<Value, Tree> {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Nested maps: every key maps to the map of its children.
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.children
                .iter()
                .map(|(key, child)| (key.clone(), child.to_value()))
                .collect(),
        )
    }
}

/// Registry of every accumulator a pipeline (and its sub-pipelines) writes to.
///
/// Sinks are created while the pipeline is built and addressed by
/// [`SinkId`]; steps write during pulls and callers read through
/// [`SideEffects::value`] or the pipeline's `cap()`.
#[derive(Debug, Default)]
pub struct SideEffects {
    sinks: Vec<Sink>,
}

impl SideEffects {
    pub(crate) fn register(&mut self, sink: Sink) -> SinkId {
        let id = SinkId(self.sinks.len());
        trace!(sink = %id, kind = sink.kind(), "side-effect sink registered");
        self.sinks.push(sink);
        id
    }

    fn get_mut(&mut self, id: SinkId) -> Result<&mut Sink> {
        self.sinks
            .get_mut(id.0)
            .ok_or(TraversalError::Invalid("unknown side-effect handle"))
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Value accumulated so far in `id`.
    pub fn value(&self, id: SinkId) -> Result<Value> {
        self.sinks
            .get(id.0)
            .map(Sink::to_value)
            .ok_or(TraversalError::Invalid("unknown side-effect handle"))
    }

    pub(crate) fn collect(&mut self, id: SinkId, value: Value) -> Result<()> {
        match self.get_mut(id)? {
            Sink::Collection(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(kind_mismatch()),
        }
    }

    pub(crate) fn count<F>(&mut self, id: SinkId, key: Value, bump: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        match self.get_mut(id)? {
            Sink::Counts(counts) => {
                let slot = counts.entry(key).or_insert(Value::Int(0));
                *slot = bump(slot);
                Ok(())
            }
            _ => Err(kind_mismatch()),
        }
    }

    pub(crate) fn group(&mut self, id: SinkId, key: Value, member: Value) -> Result<()> {
        match self.get_mut(id)? {
            Sink::Groups { groups, .. } => {
                groups.entry(key).or_default().push(member);
                Ok(())
            }
            _ => Err(kind_mismatch()),
        }
    }

    pub(crate) fn row(&mut self, id: SinkId, row: Vec<Value>) -> Result<()> {
        match self.get_mut(id)? {
            Sink::Table { rows, .. } => {
                rows.push(row);
                Ok(())
            }
            _ => Err(kind_mismatch()),
        }
    }

    pub(crate) fn branch(&mut self, id: SinkId, path: &[Value]) -> Result<()> {
        match self.get_mut(id)? {
            Sink::Tree(tree) => {
                tree.insert_path(path);
                Ok(())
            }
            _ => Err(kind_mismatch()),
        }
    }
}

fn kind_mismatch() -> TraversalError {
    TraversalError::Invalid("side-effect handle refers to a different sink kind")
}
