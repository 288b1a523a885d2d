//! Append-only pipeline construction plus the terminal pull API.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::graph::GraphAccess;
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::sinks::{Sink, SinkId};
use crate::pipe::step::{Chain, Predicate, Seed, Source, Step};
use crate::pipe::traverser::Traverser;
use crate::steps::branch::{BackStep, MemoizeStep};
use crate::steps::filter::{self, FilterStep};
use crate::steps::side_effect::DivertStep;
use crate::steps::transform::AsStep;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Steps may still be appended; nothing has been pulled.
    Building,
    Running,
    Exhausted,
}

/// Pending `mark()`: the chain length when it was recorded.
#[derive(Copy, Clone, Debug)]
struct Mark {
    position: usize,
}

/// Name declared with `as_`. `position` is the index of the binding step,
/// absent for names inherited from an enclosing traversal.
#[derive(Clone, Debug)]
struct NamedStep {
    name: String,
    position: Option<usize>,
}

/// An ordered chain of steps over one source, the evaluation context it
/// runs with, and the bookkeeping needed while it is being built.
///
/// Build errors are recorded rather than returned; the first one wins and
/// is reported by the first terminal operation.
pub struct Pipeline {
    chain: Chain,
    ctx: EvalContext,
    marks: Vec<Mark>,
    names: Vec<NamedStep>,
    barrier: Option<usize>,
    last_sink: Option<SinkId>,
    error: Option<TraversalError>,
    state: PipelineState,
    peeked: Option<Traverser>,
    current: Option<Traverser>,
}

impl Pipeline {
    pub fn new(graph: Arc<dyn GraphAccess>, config: TraversalConfig, seed: Seed) -> Self {
        Self::with_context(Chain::new(Source::new(seed)), EvalContext::new(graph, config))
    }

    fn with_context(chain: Chain, ctx: EvalContext) -> Self {
        Self {
            chain,
            ctx,
            marks: Vec::new(),
            names: Vec::new(),
            barrier: None,
            last_sink: None,
            error: None,
            state: PipelineState::Building,
            peeked: None,
            current: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Names of the top-level steps, source excluded.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.chain.step_names()
    }

    pub fn seed(&self) -> &Seed {
        self.chain.source_seed()
    }

    pub fn error(&self) -> Option<&TraversalError> {
        self.error.as_ref()
    }

    pub fn last_sink(&self) -> Option<SinkId> {
        self.last_sink
    }

    pub fn pending_marks(&self) -> usize {
        self.marks.len()
    }

    pub fn path_enabled(&self) -> bool {
        self.ctx.path_enabled
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub fn record_error(&mut self, err: TraversalError) {
        if self.error.is_none() {
            debug!(error = %err, "traversal build error recorded");
            self.error = Some(err);
        }
    }

    /// True when another step may be appended.
    fn accepting(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.state != PipelineState::Building {
            self.record_error(TraversalError::Invalid(
                "steps cannot be appended once the traversal has been pulled",
            ));
            return false;
        }
        true
    }

    pub fn add_step(&mut self, step: Box<dyn Step>) {
        if !self.accepting() {
            return;
        }
        if let Some(sink) = step.sink() {
            self.last_sink = Some(sink);
        }
        self.chain.push(step);
    }

    /// Appends a filter, fusing it into a directly preceding filter when
    /// optimization is on and no mark sits between them.
    pub fn add_filter(&mut self, predicate: Predicate) {
        if !self.accepting() {
            return;
        }
        let mut predicate = predicate;
        let len = self.chain.len();
        if self.ctx.config.optimize && len > 0 && self.barrier.map_or(true, |mark| mark < len) {
            if let Some(last) = self.chain.last_mut() {
                match last.fuse_filter(predicate) {
                    None => {
                        trace!(position = len - 1, "filter fused into preceding step");
                        return;
                    }
                    Some(rejected) => predicate = rejected,
                }
            }
        }
        self.chain.push(Box::new(FilterStep::new(predicate)));
    }

    /// `has(key, value)`; pushed into a leading vertex scan when possible.
    pub fn add_has_value(&mut self, key: &str, value: Value) {
        if !self.accepting() {
            return;
        }
        if self.ctx.config.optimize
            && self.chain.is_empty()
            && self.barrier.is_none()
            && self.chain.source_mut().narrow(key, &value)
        {
            trace!(key, "has() pushed into source scan");
            return;
        }
        self.add_filter(filter::has_value(key, value));
    }

    pub(crate) fn register_sink(&mut self, sink: Sink) -> SinkId {
        self.ctx.sinks.register(sink)
    }

    /// Path tracking is needed by a step about to be appended.
    pub fn require_path(&mut self) {
        if !self.ctx.path_enabled {
            trace!("path tracking enabled");
        }
        self.ctx.path_enabled = true;
    }

    pub fn mark(&mut self) {
        if !self.accepting() {
            return;
        }
        let position = self.chain.len();
        self.marks.push(Mark { position });
        self.barrier = Some(position);
    }

    /// Closes the latest mark: emits the marked traverser once the steps
    /// appended since then yield at least one result for it.
    pub fn back(&mut self) -> Result<()> {
        self.close_mark(false)
    }

    /// Closes the latest mark, emitting the marked traverser whether or not
    /// the intervening steps yield anything.
    pub fn optional(&mut self) -> Result<()> {
        self.close_mark(true)
    }

    fn close_mark(&mut self, optional: bool) -> Result<()> {
        let op = if optional { "optional" } else { "back" };
        let Some(mark) = self.marks.pop() else {
            warn!(op, "mark stack is empty");
            let err = TraversalError::MarkStackEmpty { op };
            self.record_error(err.clone());
            return Err(err);
        };
        if !self.accepting() {
            return Ok(());
        }
        let branch = self.chain.split_off(mark.position);
        self.forget_names_from(mark.position);
        trace!(position = mark.position, steps = branch.len(), op, "mark closed");
        self.chain.push(Box::new(BackStep::new(branch, optional)));
        Ok(())
    }

    fn forget_names_from(&mut self, position: usize) {
        self.names
            .retain(|named| named.position.map_or(true, |p| p < position));
    }

    /// Declares a step name bound to the current value (`as_`).
    pub fn name_step(&mut self, name: &str) {
        if !self.accepting() {
            return;
        }
        if self.names.iter().any(|named| named.name == name) {
            self.record_error(TraversalError::Invalid("step names must be unique"));
            return;
        }
        self.names.push(NamedStep {
            name: name.to_owned(),
            position: Some(self.chain.len()),
        });
        self.chain.push(Box::new(AsStep::new(name)));
    }

    /// Declared names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.names.iter().map(|named| named.name.as_str()).collect()
    }

    /// Validates references to declared names. An empty list means every
    /// declared name.
    pub fn resolve_names(&self, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(self.names.iter().map(|named| named.name.clone()).collect());
        }
        for name in names {
            if !self.names.iter().any(|named| &named.name == name) {
                return Err(TraversalError::unknown_step(name.as_str()));
            }
        }
        Ok(names.to_vec())
    }

    /// Wraps the steps after the step named `name` in a cache keyed by the
    /// value entering them.
    pub fn memoize(&mut self, name: &str) {
        if !self.accepting() {
            return;
        }
        let Some(named) = self.names.iter().find(|named| named.name == name) else {
            self.record_error(TraversalError::unknown_step(name));
            return;
        };
        let Some(position) = named.position else {
            self.record_error(TraversalError::Invalid(
                "memoize() target must be declared in the same traversal",
            ));
            return;
        };
        let start = position + 1;
        if self.marks.iter().any(|mark| mark.position > start) {
            self.record_error(TraversalError::Invalid("memoize() cannot span a pending mark"));
            return;
        }
        let body = self.chain.split_off(start);
        self.forget_names_from(start);
        self.chain.push(Box::new(MemoizeStep::new(body)));
    }

    /// Wraps the last step, which must own a side-effect sink, so that
    /// `callback` receives the sink's value once the step is exhausted.
    pub fn divert(&mut self, callback: Box<dyn FnMut(&Value)>) {
        if !self.accepting() {
            return;
        }
        let sink = self.chain.last_mut().and_then(|step| step.sink());
        let Some(sink) = sink else {
            self.record_error(TraversalError::Invalid(
                "divert() must directly follow a side-effect step",
            ));
            return;
        };
        if let Some(inner) = self.chain.pop() {
            self.chain.push(Box::new(DivertStep::new(inner, sink, callback)));
        }
    }

    /// Starts a sub-pipeline that shares this pipeline's side-effect
    /// registry and sees its step names. Must be handed back to
    /// [`Pipeline::adopt`].
    pub fn spawn(&mut self) -> Pipeline {
        let mut child = Pipeline::with_context(Chain::injected(), self.ctx.fork());
        child.names = self
            .names
            .iter()
            .map(|named| NamedStep {
                name: named.name.clone(),
                position: None,
            })
            .collect();
        child
    }

    /// Takes back a spawned sub-pipeline and returns its chain.
    pub fn adopt(&mut self, child: Pipeline) -> Result<Chain> {
        let Pipeline {
            chain,
            ctx,
            marks,
            error,
            ..
        } = child;
        self.ctx.rejoin(ctx);
        if let Some(err) = error {
            return Err(err);
        }
        if !marks.is_empty() {
            return Err(TraversalError::Invalid("sub-traversal left a mark open"));
        }
        Ok(chain)
    }

    fn pull(&mut self) -> Result<Option<Traverser>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if let Some(traverser) = self.peeked.take() {
            return Ok(Some(traverser));
        }
        match self.state {
            PipelineState::Exhausted => return Ok(None),
            PipelineState::Building => {
                debug!(
                    steps = self.chain.len(),
                    path = self.ctx.path_enabled,
                    sinks = self.ctx.sinks.len(),
                    "pipeline finalized"
                );
                self.state = PipelineState::Running;
            }
            PipelineState::Running => {}
        }
        let timer = profile_timer();
        let result = self.chain.pull(&mut self.ctx);
        record_profile_timer(ProfileKind::Pull, timer);
        match result {
            Ok(Some(traverser)) => Ok(Some(traverser)),
            Ok(None) => {
                self.state = PipelineState::Exhausted;
                Ok(None)
            }
            Err(err) => {
                self.state = PipelineState::Exhausted;
                Err(err)
            }
        }
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_none() {
            self.peeked = self.pull()?;
        }
        Ok(self.peeked.is_some())
    }

    /// Next traverser, with its path and bindings.
    pub fn next_traverser(&mut self) -> Result<Option<Traverser>> {
        let next = self.pull()?;
        if let Some(traverser) = &next {
            self.current = Some(traverser.clone());
        }
        Ok(next)
    }

    pub fn next(&mut self) -> Result<Value> {
        self.next_traverser()?
            .map(Traverser::into_value)
            .ok_or(TraversalError::NoSuchElement)
    }

    /// Iterator protocol: a recorded build error is yielded once, then the
    /// pipeline reads as exhausted.
    pub fn next_item(&mut self) -> Option<Result<Value>> {
        if let Some(err) = self.error.take() {
            self.state = PipelineState::Exhausted;
            self.peeked = None;
            return Some(Err(err));
        }
        self.next_traverser()
            .map(|next| next.map(Traverser::into_value))
            .transpose()
    }

    /// Up to `n` values; fewer when the pipeline runs dry.
    pub fn next_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(n.min(64));
        while out.len() < n {
            match self.next_traverser()? {
                Some(traverser) => out.push(traverser.into_value()),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn to_list(&mut self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        self.fill(&mut out)?;
        Ok(out)
    }

    pub fn to_set(&mut self) -> Result<BTreeSet<Value>> {
        let mut out = BTreeSet::new();
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Drains into `sink`, returning how many values were added.
    pub fn fill<E: Extend<Value>>(&mut self, sink: &mut E) -> Result<usize> {
        let mut added = 0;
        while let Some(traverser) = self.next_traverser()? {
            sink.extend(std::iter::once(traverser.into_value()));
            added += 1;
        }
        Ok(added)
    }

    /// Drains for side effects only.
    pub fn iterate(&mut self) -> Result<()> {
        while self.pull()?.is_some() {}
        Ok(())
    }

    pub fn count(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.pull()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Drains the pipeline if needed and returns the value accumulated by
    /// the most recently appended side-effect step.
    pub fn cap(&mut self) -> Result<Value> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let sink = self
            .last_sink
            .ok_or(TraversalError::Invalid("cap() requires a side-effect step"))?;
        let timer = profile_timer();
        if self.state != PipelineState::Exhausted || self.peeked.is_some() {
            debug!(sink = %sink, "cap() forcing drainage");
            self.iterate()?;
        }
        let value = self.ctx.sinks.value(sink);
        record_profile_timer(ProfileKind::Cap, timer);
        value
    }

    /// Current value of any sink without draining.
    pub fn side_effect_value(&self, sink: SinkId) -> Result<Value> {
        self.ctx.sinks.value(sink)
    }

    /// Path of the value most recently returned by `next`.
    pub fn current_path(&self) -> Result<Vec<Value>> {
        let current = self
            .current
            .as_ref()
            .ok_or(TraversalError::Invalid("no element has been pulled yet"))?;
        Ok(current.path()?.to_vec())
    }

    /// Removes the element most recently returned by `next` from the graph.
    pub fn remove(&mut self) -> Result<()> {
        let current = self
            .current
            .take()
            .ok_or(TraversalError::Invalid("no element has been pulled yet"))?;
        let element = current
            .value()
            .as_element()
            .ok_or(TraversalError::NotAnElement { op: "remove" })?;
        debug!(%element, "removing element");
        self.ctx.graph().remove_element(element)
    }

    /// Rewinds to the source so the pipeline can be pulled again. Sinks keep
    /// what they accumulated.
    pub fn reset(&mut self) {
        self.chain.rewind();
        self.peeked = None;
        self.current = None;
        if self.state != PipelineState::Building {
            self.state = PipelineState::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::model::{Direction, VertexId};
    use crate::steps::adjacency::{Expand, ExpandStep};
    use crate::steps::side_effect::StoreStep;

    fn pipeline(config: TraversalConfig, seed: Seed) -> Pipeline {
        Pipeline::new(Arc::new(MemoryGraph::classic()), config, seed)
    }

    fn out() -> Box<dyn Step> {
        Box::new(ExpandStep::new(Expand::Vertices, Direction::Out, Vec::new()))
    }

    fn v(id: u64) -> Value {
        Value::from(VertexId(id))
    }

    #[test]
    fn has_fuses_into_vertex_scan() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        p.add_has_value("lang", Value::from("java"));
        p.add_has_value("name", Value::from("ripple"));
        assert!(p.is_empty());
        assert_eq!(p.to_list().unwrap(), vec![v(5)]);
    }

    #[test]
    fn numeric_has_stays_a_filter() {
        let mut fused = pipeline(TraversalConfig::default(), Seed::Vertices);
        fused.add_has_value("age", Value::Float(29.0));
        assert_eq!(fused.step_names(), vec!["filter"]);

        let mut plain = pipeline(TraversalConfig::unoptimized(), Seed::Vertices);
        plain.add_has_value("age", Value::Float(29.0));
        assert_eq!(fused.to_list().unwrap(), vec![v(1)]);
        assert_eq!(plain.to_list().unwrap(), vec![v(1)]);
    }

    #[test]
    fn consecutive_filters_fuse_only_when_optimizing() {
        let mut fused = pipeline(TraversalConfig::default(), Seed::Vertices);
        fused.add_step(out());
        fused.add_filter(filter::has("name"));
        fused.add_filter(filter::has_not("age"));
        assert_eq!(fused.step_names(), vec!["out", "filter"]);

        let mut plain = pipeline(TraversalConfig::unoptimized(), Seed::Vertices);
        plain.add_step(out());
        plain.add_filter(filter::has("name"));
        plain.add_filter(filter::has_not("age"));
        assert_eq!(plain.step_names(), vec!["out", "filter", "filter"]);
        assert_eq!(fused.to_list().unwrap(), plain.to_list().unwrap());
    }

    #[test]
    fn fusion_does_not_cross_a_mark() {
        let mut p = pipeline(TraversalConfig::default(), Seed::VertexIds(vec![1, 2]));
        p.add_filter(filter::has("name"));
        p.mark();
        p.add_filter(filter::predicate(|_| false));
        p.optional().unwrap();
        assert_eq!(p.step_names(), vec!["filter", "optional"]);
        assert_eq!(p.to_list().unwrap(), vec![v(1), v(2)]);
    }

    #[test]
    fn back_without_mark_fails_fast() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        assert_eq!(p.back(), Err(TraversalError::MarkStackEmpty { op: "back" }));
        assert_eq!(p.next(), Err(TraversalError::MarkStackEmpty { op: "back" }));
    }

    #[test]
    fn back_returns_to_marked_vertices() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        p.mark();
        p.add_step(out());
        p.add_has_value("name", Value::from("lop"));
        p.back().unwrap();
        assert_eq!(p.to_list().unwrap(), vec![v(1), v(4), v(6)]);
    }

    #[test]
    fn next_after_exhaustion_is_no_such_element() {
        let mut p = pipeline(TraversalConfig::default(), Seed::VertexIds(vec![2]));
        assert!(p.has_next().unwrap());
        assert_eq!(p.next().unwrap(), v(2));
        assert!(!p.has_next().unwrap());
        assert_eq!(p.next(), Err(TraversalError::NoSuchElement));
    }

    #[test]
    fn cap_forces_drainage() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        let sink = p.register_sink(Sink::Collection(Vec::new()));
        p.add_step(Box::new(StoreStep::new(sink, None)));
        assert_eq!(p.side_effect_value(sink).unwrap(), Value::List(Vec::new()));
        let captured = p.cap().unwrap();
        assert_eq!(captured.as_list().map(<[Value]>::len), Some(6));
    }

    #[test]
    fn cap_without_side_effect_is_invalid() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        assert!(matches!(p.cap(), Err(TraversalError::Invalid(_))));
    }

    #[test]
    fn appending_after_pull_is_recorded() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        p.next().unwrap();
        p.add_step(out());
        assert!(matches!(p.next(), Err(TraversalError::Invalid(_))));
    }

    #[test]
    fn current_path_requires_tracking() {
        let mut p = pipeline(TraversalConfig::default(), Seed::VertexIds(vec![1]));
        p.add_step(out());
        p.next().unwrap();
        assert_eq!(p.current_path(), Err(TraversalError::PathNotEnabled));

        let mut tracked = pipeline(TraversalConfig::default(), Seed::VertexIds(vec![1]));
        tracked.require_path();
        tracked.add_step(out());
        tracked.next().unwrap();
        assert_eq!(tracked.current_path().unwrap(), vec![v(1), v(2)]);
    }

    #[test]
    fn memoize_needs_a_declared_name() {
        let mut p = pipeline(TraversalConfig::default(), Seed::Vertices);
        p.memoize("missing");
        assert_eq!(p.error(), Some(&TraversalError::unknown_step("missing")));
    }

    #[test]
    fn reset_rescans_the_source() {
        let mut p = pipeline(TraversalConfig::default(), Seed::VertexIds(vec![1, 2]));
        assert_eq!(p.count().unwrap(), 2);
        p.reset();
        assert_eq!(p.count().unwrap(), 2);
    }
}
