use std::collections::VecDeque;

use tracing::trace;

use crate::error::Result;
use crate::model::Element;
use crate::pipe::context::EvalContext;
use crate::pipe::sinks::SinkId;
use crate::pipe::traverser::Traverser;
use crate::value::Value;

/// Filter predicate evaluated against a traverser. Fused filters are a
/// sequence of these run in insertion order.
pub type Predicate = Box<dyn FnMut(&Traverser, &mut EvalContext) -> Result<bool>>;

/// Unit of lazy computation in a pipeline.
///
/// `try_next` pulls from `upstream` as often as it needs and returns the
/// next output, or `None` once the upstream is exhausted and nothing is
/// buffered.
pub trait Step {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>>;

    /// Drops buffered and per-run state so the step can serve a new set of starts.
    fn reset(&mut self) {}

    fn name(&self) -> &'static str;

    /// Accumulator this step writes into, if any.
    fn sink(&self) -> Option<SinkId> {
        None
    }

    /// Offers a predicate for fusion; steps that absorb it return `None`.
    fn fuse_filter(&mut self, predicate: Predicate) -> Option<Predicate> {
        Some(predicate)
    }
}

/// Everything upstream of the step being driven: the steps before it and
/// the chain's source.
pub struct Upstream<'a> {
    steps: &'a mut [Box<dyn Step>],
    source: &'a mut Source,
}

impl Upstream<'_> {
    pub fn pull(&mut self, ctx: &mut EvalContext) -> Result<Option<Traverser>> {
        match self.steps.split_last_mut() {
            Some((step, rest)) => {
                let mut upstream = Upstream {
                    steps: rest,
                    source: &mut *self.source,
                };
                step.try_next(&mut upstream, ctx)
            }
            None => self.source.next(ctx),
        }
    }
}

/// Where a chain's traversers come from.
#[derive(Clone, Debug, PartialEq)]
pub enum Seed {
    Empty,
    Vertices,
    Edges,
    VertexIds(Vec<u64>),
    EdgeIds(Vec<u64>),
    /// Vertices matching every `(key, value)` pair; the first pair drives the lookup.
    VerticesWhere(Vec<(String, Value)>),
    Values(Vec<Value>),
    /// Starts are handed in through [`Chain::reset`].
    Injected,
}

pub struct Source {
    seed: Seed,
    buffer: Option<VecDeque<Traverser>>,
}

impl Source {
    pub fn new(seed: Seed) -> Self {
        Self { seed, buffer: None }
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    /// Narrows a vertex scan to vertices with `key == value`. Returns false
    /// when the seed cannot absorb the constraint.
    ///
    /// Scans match exactly while `has` predicates compare numbers across
    /// int/float and never match null, so those values stay as filters.
    pub(crate) fn narrow(&mut self, key: &str, value: &Value) -> bool {
        if self.buffer.is_some() || matches!(value, Value::Null | Value::Int(_) | Value::Float(_)) {
            return false;
        }
        let constraint = (key.to_owned(), value.clone());
        if matches!(self.seed, Seed::Vertices) {
            self.seed = Seed::VerticesWhere(vec![constraint]);
            return true;
        }
        match &mut self.seed {
            Seed::VerticesWhere(constraints) => {
                constraints.push(constraint);
                true
            }
            _ => false,
        }
    }

    fn inject(&mut self, starts: Vec<Traverser>) {
        self.buffer = Some(starts.into());
    }

    fn rewind(&mut self) {
        self.buffer = None;
    }

    fn next(&mut self, ctx: &mut EvalContext) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            self.buffer = Some(self.materialize(ctx)?);
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn materialize(&self, ctx: &EvalContext) -> Result<VecDeque<Traverser>> {
        let track = ctx.path_enabled;
        let graph = ctx.graph();
        let values: Vec<Value> = match &self.seed {
            Seed::Empty | Seed::Injected => Vec::new(),
            Seed::Vertices => graph.vertex_ids()?.into_iter().map(Value::from).collect(),
            Seed::Edges => graph.edge_ids()?.into_iter().map(Value::from).collect(),
            Seed::VertexIds(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(vertex) = graph.vertex(*id)? {
                        out.push(Value::from(vertex));
                    }
                }
                out
            }
            Seed::EdgeIds(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(edge) = graph.edge(*id)? {
                        out.push(Value::from(edge));
                    }
                }
                out
            }
            Seed::VerticesWhere(constraints) => {
                let Some(((key, value), rest)) = constraints.split_first() else {
                    return Ok(VecDeque::new());
                };
                let mut out = Vec::new();
                'vertices: for vertex in graph.vertices_with(key, value)? {
                    for (key, value) in rest {
                        if graph.property(Element::Vertex(vertex), key)?.as_ref() != Some(value) {
                            continue 'vertices;
                        }
                    }
                    out.push(Value::from(vertex));
                }
                out
            }
            Seed::Values(values) => values.clone(),
        };
        trace!(starts = values.len(), "source materialized");
        Ok(values
            .into_iter()
            .map(|value| Traverser::new(value, track))
            .collect())
    }
}

/// Ordered steps over one source. Sub-pipelines are chains with an
/// injected source that are built once and reset per invocation.
pub struct Chain {
    steps: Vec<Box<dyn Step>>,
    source: Source,
}

impl Chain {
    pub fn new(source: Source) -> Self {
        Self {
            steps: Vec::new(),
            source,
        }
    }

    pub fn injected() -> Self {
        Self::new(Source::new(Seed::Injected))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn source_seed(&self) -> &Seed {
        self.source.seed()
    }

    pub(crate) fn source_mut(&mut self) -> &mut Source {
        &mut self.source
    }

    pub(crate) fn push(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) -> Option<Box<dyn Step>> {
        self.steps.pop()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Box<dyn Step>> {
        self.steps.last_mut()
    }

    /// Moves the steps from `position` onward into a fresh injected chain.
    pub(crate) fn split_off(&mut self, position: usize) -> Chain {
        Chain {
            steps: self.steps.split_off(position.min(self.steps.len())),
            source: Source::new(Seed::Injected),
        }
    }

    pub fn pull(&mut self, ctx: &mut EvalContext) -> Result<Option<Traverser>> {
        let mut upstream = Upstream {
            steps: self.steps.as_mut_slice(),
            source: &mut self.source,
        };
        upstream.pull(ctx)
    }

    /// Resets every step and replaces the source's pending starts.
    pub fn reset(&mut self, starts: Vec<Traverser>) {
        for step in &mut self.steps {
            step.reset();
        }
        self.source.inject(starts);
    }

    /// Resets every step and makes the source scan again on the next pull.
    pub(crate) fn rewind(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.source.rewind();
    }

    /// Feeds a single traverser through and collects every output.
    pub fn run(&mut self, start: Traverser, ctx: &mut EvalContext) -> Result<Vec<Traverser>> {
        self.reset(vec![start]);
        let mut out = Vec::new();
        while let Some(traverser) = self.pull(ctx)? {
            out.push(traverser);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::graph::MemoryGraph;

    struct Doubler;

    impl Step for Doubler {
        fn try_next(
            &mut self,
            upstream: &mut Upstream<'_>,
            ctx: &mut EvalContext,
        ) -> Result<Option<Traverser>> {
            let Some(t) = upstream.pull(ctx)? else {
                return Ok(None);
            };
            let doubled = Value::Int(t.value().as_int().unwrap_or(0) * 2);
            Ok(Some(t.split(doubled)))
        }

        fn name(&self) -> &'static str {
            "doubler"
        }
    }

    fn ctx() -> EvalContext {
        EvalContext::new(Arc::new(MemoryGraph::classic()), TraversalConfig::default())
    }

    #[test]
    fn pulls_through_every_step_in_order() {
        let mut ctx = ctx();
        let mut chain = Chain::new(Source::new(Seed::Values(vec![Value::Int(1), Value::Int(3)])));
        chain.push(Box::new(Doubler));
        chain.push(Box::new(Doubler));
        assert_eq!(chain.pull(&mut ctx).unwrap().map(Traverser::into_value), Some(Value::Int(4)));
        assert_eq!(chain.pull(&mut ctx).unwrap().map(Traverser::into_value), Some(Value::Int(12)));
        assert_eq!(chain.pull(&mut ctx).unwrap(), None);
    }

    #[test]
    fn injected_chain_runs_once_per_start() {
        let mut ctx = ctx();
        let mut chain = Chain::injected();
        chain.push(Box::new(Doubler));
        let out = chain.run(Traverser::new(Value::Int(5), false), &mut ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value(), &Value::Int(10));
        let again = chain.run(Traverser::new(Value::Int(1), false), &mut ctx).unwrap();
        assert_eq!(again[0].value(), &Value::Int(2));
    }

    #[test]
    fn vertices_where_applies_every_constraint() {
        let mut ctx = ctx();
        let mut source = Source::new(Seed::Vertices);
        assert!(source.narrow("lang", &Value::from("java")));
        assert!(source.narrow("name", &Value::from("lop")));
        let first = source.next(&mut ctx).unwrap().map(Traverser::into_value);
        assert_eq!(first, Some(Value::from(crate::model::VertexId(3))));
        assert_eq!(source.next(&mut ctx).unwrap(), None);
    }
}
