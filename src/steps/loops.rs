use std::collections::VecDeque;

use tracing::debug;

use crate::error::Result;
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::step::{Chain, Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::value::Value;

/// What loop predicates see: the value about to re-enter the body and how
/// many passes it has made so far.
pub struct LoopState<'a> {
    traverser: &'a Traverser,
    depth: usize,
}

impl<'a> LoopState<'a> {
    pub fn value(&self) -> &'a Value {
        self.traverser.value()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn path(&self) -> Result<&'a [Value]> {
        self.traverser.path()
    }
}

pub type LoopPredicate = Box<dyn FnMut(&LoopState<'_>) -> bool>;

/// Repeats `body` while the continuation predicate holds.
///
/// Depth starts at 0 for each input and grows by one per pass. A value whose
/// predicate fails (or that reaches the configured depth ceiling) is emitted
/// as final; one that continues is also emitted when `emit` holds for it.
/// Each input's frontier is processed breadth-first before the next input is
/// pulled.
pub struct LoopStep {
    body: Chain,
    proceed: LoopPredicate,
    emit: Option<LoopPredicate>,
    pending: VecDeque<(Traverser, usize)>,
    ready: VecDeque<Traverser>,
}

impl LoopStep {
    pub fn new(body: Chain, proceed: LoopPredicate, emit: Option<LoopPredicate>) -> Self {
        Self {
            body,
            proceed,
            emit,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
        }
    }

    /// Exactly `depth` passes through `body`.
    pub fn times(body: Chain, depth: usize) -> Self {
        Self::new(body, Box::new(move |state: &LoopState<'_>| state.depth() < depth), None)
    }
}

impl Step for LoopStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(next) = self.ready.pop_front() {
                return Ok(Some(next));
            }
            let Some((traverser, depth)) = self.pending.pop_front() else {
                let Some(start) = upstream.pull(ctx)? else {
                    return Ok(None);
                };
                self.pending.push_back((start, 0));
                continue;
            };
            let capped = ctx.config.max_loop_depth.is_some_and(|max| depth >= max);
            let state = LoopState {
                traverser: &traverser,
                depth,
            };
            if capped || !(self.proceed)(&state) {
                if capped {
                    debug!(depth, "loop depth ceiling reached");
                }
                self.ready.push_back(traverser);
                continue;
            }
            if self.emit.as_mut().is_some_and(|emit| emit(&state)) {
                self.ready.push_back(traverser.clone());
            }
            let timer = profile_timer();
            let outputs = self.body.run(traverser, ctx)?;
            record_profile_timer(ProfileKind::Loop, timer);
            self.pending
                .extend(outputs.into_iter().map(|out| (out, depth + 1)));
            if self.pending.is_empty() && self.ready.is_empty() {
                debug!(depth, "loop frontier exhausted");
            }
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.ready.clear();
        self.body.reset(Vec::new());
    }

    fn name(&self) -> &'static str {
        "loop"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::graph::MemoryGraph;
    use crate::model::{Direction, VertexId};
    use crate::pipe::step::{Seed, Source};
    use crate::steps::adjacency::{Expand, ExpandStep};

    /// a(1) -> b(2) -> c(3) -> d(4)
    fn line() -> Arc<MemoryGraph> {
        let graph = MemoryGraph::new();
        let ids: Vec<VertexId> = (1..=4)
            .map(|n| graph.add_vertex_with_id(n, Vec::<(String, Value)>::new()).unwrap())
            .collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], "next").unwrap();
        }
        Arc::new(graph)
    }

    fn out_body() -> Chain {
        let mut body = Chain::injected();
        body.push(Box::new(ExpandStep::new(Expand::Vertices, Direction::Out, Vec::new())));
        body
    }

    fn run(step: LoopStep, config: TraversalConfig) -> Vec<Value> {
        let mut ctx = EvalContext::new(line(), config);
        let mut chain = Chain::new(Source::new(Seed::VertexIds(vec![1])));
        chain.push(Box::new(step));
        let mut out = Vec::new();
        while let Some(t) = chain.pull(&mut ctx).unwrap() {
            out.push(t.into_value());
        }
        out
    }

    #[test]
    fn fixed_depth_reaches_exact_hop() {
        let out = run(LoopStep::times(out_body(), 2), TraversalConfig::default());
        assert_eq!(out, vec![Value::from(VertexId(3))]);
    }

    #[test]
    fn emit_collects_intermediate_values() {
        let step = LoopStep::new(
            out_body(),
            Box::new(|state: &LoopState<'_>| state.depth() < 3),
            Some(Box::new(|state: &LoopState<'_>| state.depth() > 0)),
        );
        let out = run(step, TraversalConfig::default());
        assert_eq!(
            out,
            vec![
                Value::from(VertexId(2)),
                Value::from(VertexId(3)),
                Value::from(VertexId(4))
            ]
        );
    }

    #[test]
    fn ceiling_stops_unbounded_loops() {
        let step = LoopStep::new(out_body(), Box::new(|_| true), None);
        let out = run(step, TraversalConfig::bounded(1));
        assert_eq!(out, vec![Value::from(VertexId(2))]);
    }

    #[test]
    fn predicate_can_inspect_values() {
        let step = LoopStep::new(
            out_body(),
            Box::new(|state: &LoopState<'_>| state.value() != &Value::from(VertexId(4))),
            None,
        );
        assert_eq!(run(step, TraversalConfig::default()), vec![Value::from(VertexId(4))]);
    }
}
