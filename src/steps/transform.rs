//! One-to-one transforms, named steps, and gather/scatter.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{Result, TraversalError};
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::step::{Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::value::Value;

/// Maps a traverser to at most one new value; `None` drops the traverser.
pub type MapFn = Box<dyn FnMut(&Traverser, &mut EvalContext) -> Result<Option<Value>>>;

pub struct MapStep {
    name: &'static str,
    map: MapFn,
}

impl MapStep {
    pub fn new(name: &'static str, map: MapFn) -> Self {
        Self { name, map }
    }

    /// Wraps a plain value function.
    pub fn from_fn<F>(name: &'static str, mut f: F) -> Self
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        Self::new(name, Box::new(move |traverser, _| Ok(Some(f(traverser.value())))))
    }
}

impl Step for MapStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            if let Some(value) = (self.map)(&traverser, ctx)? {
                return Ok(Some(traverser.split(value)));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Passes input through untouched; the path is not extended.
pub struct IdentityStep;

impl Step for IdentityStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        upstream.pull(ctx)
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Binds the current value under a step name (`as_`).
pub struct AsStep {
    label: String,
}

impl AsStep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Step for AsStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(mut traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        traverser.bind(&self.label);
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "as"
    }
}

/// Drains the whole upstream before re-emitting it in the same order.
#[derive(Default)]
pub struct GatherScatterStep {
    buffer: Option<VecDeque<Traverser>>,
}

impl Step for GatherScatterStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            let timer = profile_timer();
            let mut gathered = VecDeque::new();
            while let Some(traverser) = upstream.pull(ctx)? {
                gathered.push_back(traverser);
            }
            record_profile_timer(ProfileKind::Barrier, timer);
            self.buffer = Some(gathered);
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) {
        self.buffer = None;
    }

    fn name(&self) -> &'static str {
        "gather_scatter"
    }
}

fn element(traverser: &Traverser, op: &'static str) -> Result<crate::model::Element> {
    traverser
        .value()
        .as_element()
        .ok_or(TraversalError::NotAnElement { op })
}

/// Property value of the current element; elements without `key` are dropped.
pub fn property(key: impl Into<String>) -> MapFn {
    let key = key.into();
    Box::new(move |traverser, ctx| {
        let element = element(traverser, "property")?;
        ctx.graph().property(element, &key)
    })
}

pub fn id() -> MapFn {
    Box::new(|traverser, _| {
        let element = element(traverser, "id")?;
        Ok(Some(Value::Int(element.id() as i64)))
    })
}

pub fn label() -> MapFn {
    Box::new(|traverser, ctx| {
        let edge = traverser
            .value()
            .as_edge()
            .ok_or(TraversalError::NotAnElement { op: "label" })?;
        Ok(Some(Value::String(ctx.graph().edge_label(edge)?)))
    })
}

/// Property map of the current element, limited to `keys` when non-empty.
pub fn property_map(keys: Vec<String>) -> MapFn {
    Box::new(move |traverser, ctx| {
        let element = element(traverser, "map")?;
        let graph = ctx.graph();
        let keys = if keys.is_empty() {
            graph.property_keys(element)?
        } else {
            keys.clone()
        };
        let mut map = BTreeMap::new();
        for key in keys {
            if let Some(value) = graph.property(element, &key)? {
                map.insert(Value::String(key), value);
            }
        }
        Ok(Some(Value::Map(map)))
    })
}

fn raw_id(value: &Value, op: &'static str) -> Result<u64> {
    value
        .as_int()
        .and_then(|id| u64::try_from(id).ok())
        .ok_or(TraversalError::Invalid(op))
}

/// Resolves an id to a vertex; unknown ids are dropped.
pub fn id_vertex() -> MapFn {
    Box::new(|traverser, ctx| {
        let id = raw_id(traverser.value(), "id_vertex() expects a non-negative integer id")?;
        Ok(ctx.graph().vertex(id)?.map(Value::from))
    })
}

pub fn id_edge() -> MapFn {
    Box::new(|traverser, ctx| {
        let id = raw_id(traverser.value(), "id_edge() expects a non-negative integer id")?;
        Ok(ctx.graph().edge(id)?.map(Value::from))
    })
}
