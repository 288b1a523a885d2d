//! Typed fluent facade over [`Pipeline`].
//!
//! `Traversal<K, M>` tracks two things in its type: `K`, what kind of value
//! the last step emits (vertices, edges, or plain values), which decides the
//! steps that can follow; and `M`, the stack of pending `mark()` calls, so a
//! `back()` or `optional()` without a mark does not compile. Every builder
//! method consumes and returns the traversal; nothing is evaluated until a
//! terminal method pulls.
//!
//! ```
//! use std::sync::Arc;
//! use pipewalk::graph::MemoryGraph;
//! use pipewalk::traversal::TraversalSource;
//!
//! let g = TraversalSource::new(Arc::new(MemoryGraph::classic()));
//! let names = g
//!     .v_ids([1])
//!     .out(&["knows"])
//!     .property("name")
//!     .to_list()
//!     .unwrap();
//! assert_eq!(names.len(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use crate::error::{Result, TraversalError};
use crate::pipe::sinks::{Sink, SinkId, Tree};
use crate::pipe::step::Chain;
use crate::pipe::Pipeline;
use crate::steps::branch::IfThenElseStep;
use crate::steps::filter::{self, DedupStep, RandomStep, RangeStep, SimplePathStep};
use crate::steps::loops::{LoopState, LoopStep};
use crate::steps::order::{Order, OrderBy, OrderStep, ShuffleStep};
use crate::steps::path::{PathStep, SelectStep};
use crate::steps::side_effect::{
    AggregateStep, GroupByStep, GroupCountStep, SideEffectStep, StoreStep, TableStep, TreeStep,
};
use crate::steps::transform::{GatherScatterStep, IdentityStep, MapStep};
use crate::steps::ValueFn;
use crate::value::Value;

mod edge;
mod element;
mod source;
mod values;
mod vertex;

pub use source::TraversalSource;

mod sealed {
    pub trait Sealed {}
}

/// Output kind of a traversal.
pub trait Kind: sealed::Sealed {}

/// Kinds whose values are graph elements.
pub trait ElementKind: Kind {}

/// Type-level stack of pending marks.
pub trait MarkStack: sealed::Sealed {}

/// The traversal currently emits vertices.
#[derive(Debug, Clone, Copy)]
pub struct Vertices;

/// The traversal currently emits edges.
#[derive(Debug, Clone, Copy)]
pub struct Edges;

/// The traversal emits arbitrary values.
#[derive(Debug, Clone, Copy)]
pub struct Values;

/// A pending mark recorded while the traversal emitted `K`, on top of `M`.
pub struct Marked<K, M>(PhantomData<fn() -> (K, M)>);

impl sealed::Sealed for Vertices {}
impl sealed::Sealed for Edges {}
impl sealed::Sealed for Values {}
impl sealed::Sealed for () {}
impl<K, M> sealed::Sealed for Marked<K, M> {}

impl Kind for Vertices {}
impl Kind for Edges {}
impl Kind for Values {}
impl ElementKind for Vertices {}
impl ElementKind for Edges {}
impl MarkStack for () {}
impl<K: Kind, M: MarkStack> MarkStack for Marked<K, M> {}

/// A traversal under construction, or being pulled.
pub struct Traversal<K, M = ()> {
    pipeline: Pipeline,
    _kind: PhantomData<fn() -> (K, M)>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

impl<K, M> Traversal<K, M> {
    pub(crate) fn from_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            _kind: PhantomData,
        }
    }

    fn retype<K2, M2>(self) -> Traversal<K2, M2> {
        Traversal::from_pipeline(self.pipeline)
    }

    fn push(mut self, build: impl FnOnce(&mut Pipeline)) -> Self {
        build(&mut self.pipeline);
        self
    }

    /// Builds a sub-traversal that starts from the values this one emits.
    fn nested<K2, M2>(
        &mut self,
        body: impl FnOnce(Traversal<K, ()>) -> Traversal<K2, M2>,
    ) -> Option<Chain> {
        let child = Traversal::<K, ()>::from_pipeline(self.pipeline.spawn());
        let built = body(child);
        match self.pipeline.adopt(built.pipeline) {
            Ok(chain) => Some(chain),
            Err(err) => {
                self.pipeline.record_error(err);
                None
            }
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Sink written by the most recently appended side-effect step.
    pub fn last_sink(&self) -> Option<SinkId> {
        self.pipeline.last_sink()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.pipeline.step_names()
    }

    // ----- filters -----

    pub fn filter<F>(self, test: F) -> Self
    where
        F: FnMut(&Value) -> bool + 'static,
    {
        self.push(|p| p.add_filter(filter::predicate(test)))
    }

    pub fn dedup(self) -> Self {
        self.push(|p| p.add_step(Box::new(DedupStep::new(None))))
    }

    /// Dedup on a key derived from each value.
    pub fn dedup_by<F>(self, key: F) -> Self
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        self.push(|p| p.add_step(Box::new(DedupStep::new(Some(Box::new(key))))))
    }

    pub fn except<I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.push(|p| p.add_filter(filter::except(values)))
    }

    /// Drops values equal to what any of the named steps bound.
    pub fn except_named(self, names: &[&str]) -> Self {
        self.push(|p| match p.resolve_names(&owned(names)) {
            Ok(names) => p.add_filter(filter::except_named(names)),
            Err(err) => p.record_error(err),
        })
    }

    pub fn retain<I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.push(|p| p.add_filter(filter::retain(values)))
    }

    pub fn retain_named(self, names: &[&str]) -> Self {
        self.push(|p| match p.resolve_names(&owned(names)) {
            Ok(names) => p.add_filter(filter::retain_named(names)),
            Err(err) => p.record_error(err),
        })
    }

    /// Keeps each value with probability `bias`.
    pub fn random(self, bias: f64) -> Self {
        self.push(|p| p.add_step(Box::new(RandomStep::new(bias))))
    }

    /// Values at positions `low..=high`; a negative `high` is unbounded.
    pub fn range(self, low: i64, high: i64) -> Self {
        self.push(|p| p.add_step(Box::new(RangeStep::new(low, high))))
    }

    pub fn limit(self, n: usize) -> Self {
        match i64::try_from(n) {
            Ok(0) => self.range(1, 0),
            Ok(n) => self.range(0, n - 1),
            Err(_) => self.range(0, -1),
        }
    }

    /// Drops traversers whose path repeats a value.
    pub fn simple_path(self) -> Self {
        self.push(|p| {
            p.require_path();
            p.add_step(Box::new(SimplePathStep));
        })
    }

    // ----- transforms -----

    pub fn identity(self) -> Self {
        self.push(|p| p.add_step(Box::new(IdentityStep)))
    }

    pub fn transform<F>(self, f: F) -> Traversal<Values, M>
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        self.push(|p| p.add_step(Box::new(MapStep::from_fn("transform", f))))
            .retype()
    }

    /// Each traverser's path as a list.
    pub fn path(self) -> Traversal<Values, M> {
        self.path_by(Vec::new())
    }

    /// Path with entry `i` mapped by `fns[i]`; the function count must equal
    /// the path length. The start value is the first entry and gets the
    /// first function.
    pub fn path_by(self, fns: Vec<ValueFn>) -> Traversal<Values, M> {
        self.push(|p| {
            p.require_path();
            p.add_step(Box::new(PathStep::new(fns)));
        })
        .retype()
    }

    /// Map of step name to bound value; empty `names` selects every declared name.
    pub fn select(self, names: &[&str]) -> Traversal<Values, M> {
        self.select_by(names, Vec::new())
    }

    pub fn select_by(self, names: &[&str], fns: Vec<ValueFn>) -> Traversal<Values, M> {
        self.push(|p| match columns(p, "select", names, &fns) {
            Ok(names) => p.add_step(Box::new(SelectStep::new(names, fns))),
            Err(err) => p.record_error(err),
        })
        .retype()
    }

    /// Barrier that re-emits everything in arrival order.
    pub fn gather_scatter(self) -> Self {
        self.push(|p| p.add_step(Box::new(GatherScatterStep::default())))
    }

    pub fn order(self) -> Self {
        self.order_by(Order::Incr)
    }

    pub fn order_by(self, order: Order) -> Self {
        self.push(|p| p.add_step(Box::new(OrderStep::new(OrderBy::Natural(order)))))
    }

    pub fn order_with<F>(self, compare: F) -> Self
    where
        F: FnMut(&Value, &Value) -> Ordering + 'static,
    {
        self.push(|p| {
            p.add_step(Box::new(OrderStep::new(OrderBy::Comparator(Box::new(
                compare,
            )))))
        })
    }

    pub fn shuffle(self) -> Self {
        self.push(|p| p.add_step(Box::new(ShuffleStep::default())))
    }

    // ----- side effects -----

    pub fn side_effect<F>(self, effect: F) -> Self
    where
        F: FnMut(&Value) + 'static,
    {
        self.push(|p| p.add_step(Box::new(SideEffectStep::new(Box::new(effect)))))
    }

    /// Lazily collects every value.
    pub fn store(self) -> Self {
        self.store_with(None)
    }

    pub fn store_by<F>(self, key: F) -> Self
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        self.store_with(Some(Box::new(key)))
    }

    fn store_with(self, key: Option<ValueFn>) -> Self {
        self.push(|p| {
            let sink = p.register_sink(Sink::Collection(Vec::new()));
            p.add_step(Box::new(StoreStep::new(sink, key)));
        })
    }

    /// Collects every value before letting the first one through.
    pub fn aggregate(self) -> Self {
        self.aggregate_with(None)
    }

    pub fn aggregate_by<F>(self, key: F) -> Self
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        self.aggregate_with(Some(Box::new(key)))
    }

    fn aggregate_with(self, key: Option<ValueFn>) -> Self {
        self.push(|p| {
            let sink = p.register_sink(Sink::Collection(Vec::new()));
            p.add_step(Box::new(AggregateStep::new(sink, key)));
        })
    }

    /// Groups `value(v)` under `key(v)`.
    pub fn group_by<KF, VF>(self, key: KF, value: VF) -> Self
    where
        KF: FnMut(&Value) -> Value + 'static,
        VF: FnMut(&Value) -> Value + 'static,
    {
        self.group_by_with(Box::new(key), Box::new(value), None)
    }

    /// Like [`Traversal::group_by`], reducing each group's list when the
    /// groups are read.
    pub fn group_by_reduce<KF, VF, RF>(self, key: KF, value: VF, reduce: RF) -> Self
    where
        KF: FnMut(&Value) -> Value + 'static,
        VF: FnMut(&Value) -> Value + 'static,
        RF: Fn(&[Value]) -> Value + 'static,
    {
        self.group_by_with(Box::new(key), Box::new(value), Some(Box::new(reduce)))
    }

    fn group_by_with(
        self,
        key: ValueFn,
        value: ValueFn,
        reduce: Option<Box<dyn Fn(&[Value]) -> Value>>,
    ) -> Self {
        self.push(|p| {
            let sink = p.register_sink(Sink::Groups {
                groups: BTreeMap::new(),
                reduce,
            });
            p.add_step(Box::new(GroupByStep::new(sink, key, value)));
        })
    }

    /// Counts occurrences of each value.
    pub fn group_count(self) -> Self {
        self.group_count_with_parts(None, None)
    }

    pub fn group_count_by<F>(self, key: F) -> Self
    where
        F: FnMut(&Value) -> Value + 'static,
    {
        self.group_count_with_parts(Some(Box::new(key)), None)
    }

    /// Group count keyed by `key` with a custom accumulator receiving the
    /// element and the current count.
    pub fn group_count_with<KF, AF>(self, key: KF, accumulate: AF) -> Self
    where
        KF: FnMut(&Value) -> Value + 'static,
        AF: FnMut(&Value, &Value) -> Value + 'static,
    {
        self.group_count_with_parts(Some(Box::new(key)), Some(Box::new(accumulate)))
    }

    fn group_count_with_parts(
        self,
        key: Option<ValueFn>,
        accumulate: Option<crate::steps::CountFn>,
    ) -> Self {
        self.push(|p| {
            let sink = p.register_sink(Sink::Counts(BTreeMap::new()));
            p.add_step(Box::new(GroupCountStep::new(sink, key, accumulate)));
        })
    }

    /// Row of named-step bindings per traverser; empty `names` means every
    /// declared name.
    pub fn table(self, names: &[&str]) -> Self {
        self.table_by(names, Vec::new())
    }

    pub fn table_by(self, names: &[&str], fns: Vec<ValueFn>) -> Self {
        self.push(|p| match columns(p, "table", names, &fns) {
            Ok(columns) => {
                let sink = p.register_sink(Sink::Table {
                    columns: columns.clone(),
                    rows: Vec::new(),
                });
                p.add_step(Box::new(TableStep::new(sink, columns, fns)));
            }
            Err(err) => p.record_error(err),
        })
    }

    /// Prefix tree of every traverser's path.
    pub fn tree(self) -> Self {
        self.push(|p| {
            p.require_path();
            let sink = p.register_sink(Sink::Tree(Tree::default()));
            p.add_step(Box::new(TreeStep::new(sink)));
        })
    }

    /// Caches the steps after `as_(name)` per entering value.
    pub fn memoize(self, name: &str) -> Self {
        self.push(|p| p.memoize(name))
    }

    /// Hands the preceding side-effect step's value to `callback` once that
    /// step is exhausted.
    pub fn divert<F>(self, callback: F) -> Self
    where
        F: FnMut(&Value) + 'static,
    {
        self.push(|p| p.divert(Box::new(callback)))
    }

    // ----- branches and loops -----

    /// Routes each value through `then` when `test` holds, else through
    /// `otherwise`.
    pub fn if_then_else<K2, T, TB, OB>(mut self, test: T, then: TB, otherwise: OB) -> Traversal<K2, M>
    where
        T: FnMut(&Value) -> bool + 'static,
        TB: FnOnce(Traversal<K, ()>) -> Traversal<K2, ()>,
        OB: FnOnce(Traversal<K, ()>) -> Traversal<K2, ()>,
    {
        let then = self.nested(then);
        let otherwise = self.nested(otherwise);
        if let (Some(then), Some(otherwise)) = (then, otherwise) {
            self.pipeline.add_step(Box::new(IfThenElseStep::new(
                Box::new(test),
                then,
                otherwise,
            )));
        }
        self.retype()
    }

    /// Exactly `depth` passes through `body`.
    pub fn loop_times<B>(mut self, body: B, depth: usize) -> Self
    where
        B: FnOnce(Traversal<K, ()>) -> Traversal<K, ()>,
    {
        if let Some(body) = self.nested(body) {
            self.pipeline.add_step(Box::new(LoopStep::times(body, depth)));
        }
        self
    }

    /// Repeats `body` until `stop` holds, emitting only final values.
    pub fn loop_until<B, S>(self, body: B, mut stop: S) -> Self
    where
        B: FnOnce(Traversal<K, ()>) -> Traversal<K, ()>,
        S: FnMut(&LoopState<'_>) -> bool + 'static,
    {
        self.loop_inner(body, Box::new(move |state: &LoopState<'_>| !stop(state)), None)
    }

    /// Repeats `body` while `proceed` holds; values for which `emit` holds
    /// are also emitted on the way.
    pub fn loop_with<B, P, E>(self, body: B, proceed: P, emit: E) -> Self
    where
        B: FnOnce(Traversal<K, ()>) -> Traversal<K, ()>,
        P: FnMut(&LoopState<'_>) -> bool + 'static,
        E: FnMut(&LoopState<'_>) -> bool + 'static,
    {
        self.loop_inner(body, Box::new(proceed), Some(Box::new(emit)))
    }

    fn loop_inner<B>(
        mut self,
        body: B,
        proceed: crate::steps::LoopPredicate,
        emit: Option<crate::steps::LoopPredicate>,
    ) -> Self
    where
        B: FnOnce(Traversal<K, ()>) -> Traversal<K, ()>,
    {
        if let Some(body) = self.nested(body) {
            self.pipeline
                .add_step(Box::new(LoopStep::new(body, proceed, emit)));
        }
        self
    }

    // ----- names and marks -----

    /// Names this position; later steps can read the value bound here.
    pub fn as_(self, name: &str) -> Self {
        self.push(|p| p.name_step(name))
    }

    /// Records a mark that a later `back()`/`optional()` returns to.
    pub fn mark(self) -> Traversal<K, Marked<K, M>> {
        self.push(Pipeline::mark).retype()
    }

    // ----- terminals -----

    pub fn has_next(&mut self) -> Result<bool> {
        self.pipeline.has_next()
    }

    /// Next value; `NoSuchElement` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Value> {
        self.pipeline.next()
    }

    pub fn next_or(&mut self, default: Value) -> Result<Value> {
        match self.pipeline.next() {
            Err(TraversalError::NoSuchElement) => Ok(default),
            other => other,
        }
    }

    pub fn next_n(&mut self, n: usize) -> Result<Vec<Value>> {
        self.pipeline.next_n(n)
    }

    pub fn to_list(&mut self) -> Result<Vec<Value>> {
        self.pipeline.to_list()
    }

    pub fn to_set(&mut self) -> Result<BTreeSet<Value>> {
        self.pipeline.to_set()
    }

    pub fn fill<E: Extend<Value>>(&mut self, sink: &mut E) -> Result<usize> {
        self.pipeline.fill(sink)
    }

    pub fn iterate(&mut self) -> Result<()> {
        self.pipeline.iterate()
    }

    pub fn count(&mut self) -> Result<usize> {
        self.pipeline.count()
    }

    /// Drains and returns the last side-effect step's accumulated value.
    pub fn cap(&mut self) -> Result<Value> {
        self.pipeline.cap()
    }

    pub fn side_effect_value(&self, sink: SinkId) -> Result<Value> {
        self.pipeline.side_effect_value(sink)
    }

    pub fn current_path(&self) -> Result<Vec<Value>> {
        self.pipeline.current_path()
    }

    pub fn reset(&mut self) {
        self.pipeline.reset();
    }

    pub fn iter(&mut self) -> Iter<'_> {
        Iter {
            pipeline: &mut self.pipeline,
        }
    }
}

impl<K, K0, M0> Traversal<K, Marked<K0, M0>> {
    /// Emits the marked value for every input whose steps since `mark()`
    /// yielded at least one result.
    ///
    /// `back()` filters: after a step that rejects everything it yields
    /// nothing, though side effects in between still ran. Use
    /// [`optional`](Self::optional) to get every marked value back
    /// regardless of the branch.
    pub fn back(self) -> Traversal<K0, M0> {
        self.close(Pipeline::back)
    }

    /// Emits the marked value for every input, whatever the steps since
    /// `mark()` yielded.
    pub fn optional(self) -> Traversal<K0, M0> {
        self.close(Pipeline::optional)
    }

    fn close(mut self, close: fn(&mut Pipeline) -> Result<()>) -> Traversal<K0, M0> {
        // The type-level stack guarantees a pending mark, and any failure
        // is already recorded on the pipeline.
        let _ = close(&mut self.pipeline);
        self.retype()
    }
}

/// Pulls values from a borrowed traversal. A recorded build error is
/// yielded once, after which the iterator is done.
pub struct Iter<'a> {
    pipeline: &'a mut Pipeline,
}

impl Iterator for Iter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pipeline.next_item()
    }
}

/// Owning counterpart of [`Iter`].
pub struct IntoIter {
    pipeline: Pipeline,
}

impl Iterator for IntoIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pipeline.next_item()
    }
}

impl<K, M> IntoIterator for Traversal<K, M> {
    type Item = Result<Value>;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter {
            pipeline: self.pipeline,
        }
    }
}

impl<'a, K, M> IntoIterator for &'a mut Traversal<K, M> {
    type Item = Result<Value>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Resolves column names and lines functions up with them.
fn columns(
    pipeline: &Pipeline,
    step: &'static str,
    names: &[&str],
    fns: &[ValueFn],
) -> Result<Vec<String>> {
    let columns = pipeline.resolve_names(&owned(names))?;
    if columns.is_empty() {
        return Err(TraversalError::Invalid("no named steps to read from"));
    }
    if !fns.is_empty() && fns.len() != columns.len() {
        return Err(TraversalError::ArgumentMismatch {
            step,
            expected: columns.len(),
            found: fns.len(),
        });
    }
    Ok(columns)
}
