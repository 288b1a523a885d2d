//! Pass-through steps that write into a side-effect sink or the graph.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{Result, TraversalError};
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::sinks::SinkId;
use crate::pipe::step::{Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::steps::path::bound_row;
use crate::steps::ValueFn;
use crate::value::Value;

/// Accumulates into the group-count map: receives the element and the
/// current count (starting at `Int(0)`), returns the new count.
pub type CountFn = Box<dyn FnMut(&Value, &Value) -> Value>;

fn keyed(key: &mut Option<ValueFn>, value: &Value) -> Value {
    match key {
        Some(key) => key(value),
        None => value.clone(),
    }
}

/// Runs a callback per traverser and passes it through.
pub struct SideEffectStep {
    effect: Box<dyn FnMut(&Value)>,
}

impl SideEffectStep {
    pub fn new(effect: Box<dyn FnMut(&Value)>) -> Self {
        Self { effect }
    }
}

impl Step for SideEffectStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        (self.effect)(traverser.value());
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "side_effect"
    }
}

/// Lazily appends each value (or a key derived from it) to a collection.
pub struct StoreStep {
    sink: SinkId,
    key: Option<ValueFn>,
}

impl StoreStep {
    pub fn new(sink: SinkId, key: Option<ValueFn>) -> Self {
        Self { sink, key }
    }
}

impl Step for StoreStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let value = keyed(&mut self.key, traverser.value());
        ctx.sinks.collect(self.sink, value)?;
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "store"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

/// Like [`StoreStep`] but drains the whole upstream into the collection
/// before emitting anything.
pub struct AggregateStep {
    sink: SinkId,
    key: Option<ValueFn>,
    buffer: Option<VecDeque<Traverser>>,
}

impl AggregateStep {
    pub fn new(sink: SinkId, key: Option<ValueFn>) -> Self {
        Self {
            sink,
            key,
            buffer: None,
        }
    }
}

impl Step for AggregateStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            let timer = profile_timer();
            let mut held = VecDeque::new();
            while let Some(traverser) = upstream.pull(ctx)? {
                let value = keyed(&mut self.key, traverser.value());
                ctx.sinks.collect(self.sink, value)?;
                held.push_back(traverser);
            }
            record_profile_timer(ProfileKind::Barrier, timer);
            self.buffer = Some(held);
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) {
        self.buffer = None;
    }

    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

pub struct GroupByStep {
    sink: SinkId,
    key: ValueFn,
    value: ValueFn,
}

impl GroupByStep {
    pub fn new(sink: SinkId, key: ValueFn, value: ValueFn) -> Self {
        Self { sink, key, value }
    }
}

impl Step for GroupByStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let key = (self.key)(traverser.value());
        let member = (self.value)(traverser.value());
        ctx.sinks.group(self.sink, key, member)?;
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "group_by"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

pub struct GroupCountStep {
    sink: SinkId,
    key: Option<ValueFn>,
    accumulate: Option<CountFn>,
}

impl GroupCountStep {
    pub fn new(sink: SinkId, key: Option<ValueFn>, accumulate: Option<CountFn>) -> Self {
        Self {
            sink,
            key,
            accumulate,
        }
    }
}

impl Step for GroupCountStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let key = keyed(&mut self.key, traverser.value());
        let element = traverser.value();
        match self.accumulate.as_mut() {
            Some(accumulate) => ctx
                .sinks
                .count(self.sink, key, |current| accumulate(element, current))?,
            None => ctx.sinks.count(self.sink, key, |current| {
                Value::Int(current.as_int().unwrap_or(0) + 1)
            })?,
        }
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "group_count"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

/// Appends a row of named-step bindings per traverser.
pub struct TableStep {
    sink: SinkId,
    columns: Vec<String>,
    fns: Vec<ValueFn>,
}

impl TableStep {
    pub fn new(sink: SinkId, columns: Vec<String>, fns: Vec<ValueFn>) -> Self {
        Self { sink, columns, fns }
    }
}

impl Step for TableStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let row = bound_row(&traverser, &self.columns, &mut self.fns);
        ctx.sinks.row(self.sink, row)?;
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "table"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

/// Inserts each traverser's path into a prefix tree.
pub struct TreeStep {
    sink: SinkId,
}

impl TreeStep {
    pub fn new(sink: SinkId) -> Self {
        Self { sink }
    }
}

impl Step for TreeStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        ctx.sinks.branch(self.sink, traverser.path()?)?;
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "tree"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

/// Writes a property on each element it passes.
pub struct PropertySetStep {
    key: String,
    value: Value,
}

impl PropertySetStep {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Step for PropertySetStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let element = traverser
            .value()
            .as_element()
            .ok_or(TraversalError::NotAnElement { op: "property_set" })?;
        ctx.graph()
            .set_property(element, &self.key, self.value.clone())?;
        Ok(Some(traverser))
    }

    fn name(&self) -> &'static str {
        "property_set"
    }
}

/// Wraps a side-effect step and hands its accumulated value to a callback
/// exactly once, when the wrapped step reports exhaustion.
pub struct DivertStep {
    inner: Box<dyn Step>,
    sink: SinkId,
    callback: Box<dyn FnMut(&Value)>,
    fired: bool,
}

impl DivertStep {
    pub fn new(inner: Box<dyn Step>, sink: SinkId, callback: Box<dyn FnMut(&Value)>) -> Self {
        Self {
            inner,
            sink,
            callback,
            fired: false,
        }
    }
}

impl Step for DivertStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        match self.inner.try_next(upstream, ctx)? {
            Some(traverser) => Ok(Some(traverser)),
            None => {
                if !self.fired {
                    self.fired = true;
                    let value = ctx.sinks.value(self.sink)?;
                    debug!(sink = %self.sink, "diverting side effect");
                    (self.callback)(&value);
                }
                Ok(None)
            }
        }
    }

    fn reset(&mut self) {
        self.fired = false;
        self.inner.reset();
    }

    fn name(&self) -> &'static str {
        "divert"
    }

    fn sink(&self) -> Option<SinkId> {
        Some(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::graph::{GraphAccess, MemoryGraph};
    use crate::model::{Element, VertexId};
    use crate::pipe::sinks::Sink;
    use crate::pipe::step::{Chain, Seed, Source};

    fn ctx_on(graph: Arc<MemoryGraph>) -> EvalContext {
        EvalContext::new(graph, TraversalConfig::default())
    }

    fn ctx() -> EvalContext {
        ctx_on(Arc::new(MemoryGraph::classic()))
    }

    fn letters(values: &[&str]) -> Chain {
        Chain::new(Source::new(Seed::Values(
            values.iter().map(|s| Value::from(*s)).collect(),
        )))
    }

    #[test]
    fn store_is_lazy_and_aggregate_is_eager() {
        let mut ctx = ctx();
        let stored = ctx.sinks.register(Sink::Collection(Vec::new()));
        let mut lazy = letters(&["a", "b", "c"]);
        lazy.push(Box::new(StoreStep::new(stored, None)));
        lazy.pull(&mut ctx).unwrap();
        assert_eq!(ctx.sinks.value(stored).unwrap(), Value::List(vec![Value::from("a")]));

        let aggregated = ctx.sinks.register(Sink::Collection(Vec::new()));
        let mut eager = letters(&["a", "b", "c"]);
        eager.push(Box::new(AggregateStep::new(aggregated, None)));
        eager.pull(&mut ctx).unwrap();
        assert_eq!(
            ctx.sinks.value(aggregated).unwrap().as_list().map(<[Value]>::len),
            Some(3)
        );
    }

    #[test]
    fn group_count_with_accumulator() {
        let mut ctx = ctx();
        let sink = ctx.sinks.register(Sink::Counts(BTreeMap::new()));
        let mut chain = letters(&["a", "bb", "a"]);
        chain.push(Box::new(GroupCountStep::new(
            sink,
            None,
            Some(Box::new(|element: &Value, current: &Value| {
                let len = element.as_str().map_or(0, str::len) as i64;
                Value::Int(current.as_int().unwrap_or(0) + len)
            })),
        )));
        while chain.pull(&mut ctx).unwrap().is_some() {}
        let expected: BTreeMap<Value, Value> = [
            (Value::from("a"), Value::Int(2)),
            (Value::from("bb"), Value::Int(2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(ctx.sinks.value(sink).unwrap(), Value::Map(expected));
    }

    #[test]
    fn divert_fires_once_on_exhaustion() {
        let mut ctx = ctx();
        let sink = ctx.sinks.register(Sink::Collection(Vec::new()));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::clone(&seen);
        let mut chain = letters(&["x", "y"]);
        chain.push(Box::new(DivertStep::new(
            Box::new(StoreStep::new(sink, None)),
            sink,
            Box::new(move |value: &Value| recorder.borrow_mut().push(value.clone())),
        )));
        while chain.pull(&mut ctx).unwrap().is_some() {}
        assert!(chain.pull(&mut ctx).unwrap().is_none());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], Value::List(vec![Value::from("x"), Value::from("y")]));
    }

    #[test]
    fn property_set_writes_through() {
        let graph = Arc::new(MemoryGraph::classic());
        let mut ctx = ctx_on(Arc::clone(&graph));
        let mut chain = Chain::new(Source::new(Seed::VertexIds(vec![2])));
        chain.push(Box::new(PropertySetStep::new("seen", Value::Bool(true))));
        chain.pull(&mut ctx).unwrap();
        assert_eq!(
            graph.property(Element::Vertex(VertexId(2)), "seen").unwrap(),
            Some(Value::Bool(true))
        );
    }
}
