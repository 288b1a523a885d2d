//! Steps that pass a subset of their input through unchanged.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rand::Rng;

use crate::error::{Result, TraversalError};
use crate::model::Element;
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::step::{Predicate, Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::steps::ValueFn;
use crate::value::Value;

/// Comparison used by `has_cmp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Compare {
    /// Numbers compare across int/float; incomparable kinds only satisfy `Neq`.
    pub fn test(self, left: &Value, right: &Value) -> bool {
        let ord = left.compare_loose(right);
        match self {
            Compare::Eq => ord == Some(Ordering::Equal),
            Compare::Neq => ord != Some(Ordering::Equal),
            Compare::Gt => ord == Some(Ordering::Greater),
            Compare::Gte => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            Compare::Lt => ord == Some(Ordering::Less),
            Compare::Lte => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// One or more predicates; a traverser passes when all of them hold.
pub struct FilterStep {
    predicates: Vec<Predicate>,
}

impl FilterStep {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicates: vec![predicate],
        }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl Step for FilterStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            let timer = profile_timer();
            let mut keep = true;
            for predicate in &mut self.predicates {
                if !predicate(&traverser, ctx)? {
                    keep = false;
                    break;
                }
            }
            record_profile_timer(ProfileKind::Filter, timer);
            if keep {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "filter"
    }

    fn fuse_filter(&mut self, predicate: Predicate) -> Option<Predicate> {
        self.predicates.push(predicate);
        None
    }
}

fn element_of(traverser: &Traverser, op: &'static str) -> Result<Element> {
    traverser
        .value()
        .as_element()
        .ok_or(TraversalError::NotAnElement { op })
}

fn property_of(
    traverser: &Traverser,
    ctx: &EvalContext,
    key: &str,
    op: &'static str,
) -> Result<Option<Value>> {
    let element = element_of(traverser, op)?;
    ctx.graph().property(element, key)
}

pub fn predicate<F>(mut test: F) -> Predicate
where
    F: FnMut(&Value) -> bool + 'static,
{
    Box::new(move |traverser, _| Ok(test(traverser.value())))
}

pub fn has(key: impl Into<String>) -> Predicate {
    let key = key.into();
    Box::new(move |traverser, ctx| Ok(property_of(traverser, ctx, &key, "has")?.is_some()))
}

pub fn has_value(key: impl Into<String>, value: Value) -> Predicate {
    has_cmp(key, Compare::Eq, value)
}

pub fn has_cmp(key: impl Into<String>, compare: Compare, value: Value) -> Predicate {
    let key = key.into();
    Box::new(move |traverser, ctx| {
        Ok(match property_of(traverser, ctx, &key, "has")? {
            Some(found) => compare.test(&found, &value),
            None => false,
        })
    })
}

pub fn has_not(key: impl Into<String>) -> Predicate {
    let key = key.into();
    Box::new(move |traverser, ctx| Ok(property_of(traverser, ctx, &key, "has_not")?.is_none()))
}

/// Passes elements whose `key` is absent or differs from `value`.
pub fn has_not_value(key: impl Into<String>, value: Value) -> Predicate {
    let key = key.into();
    Box::new(move |traverser, ctx| {
        Ok(match property_of(traverser, ctx, &key, "has_not")? {
            Some(found) => !Compare::Eq.test(&found, &value),
            None => true,
        })
    })
}

/// `low <= key < high`.
pub fn interval(key: impl Into<String>, low: Value, high: Value) -> Predicate {
    let key = key.into();
    Box::new(move |traverser, ctx| {
        Ok(match property_of(traverser, ctx, &key, "interval")? {
            Some(found) => Compare::Gte.test(&found, &low) && Compare::Lt.test(&found, &high),
            None => false,
        })
    })
}

pub fn except(values: impl IntoIterator<Item = Value>) -> Predicate {
    let values: BTreeSet<Value> = values.into_iter().collect();
    Box::new(move |traverser, _| Ok(!values.contains(traverser.value())))
}

pub fn retain(values: impl IntoIterator<Item = Value>) -> Predicate {
    let values: BTreeSet<Value> = values.into_iter().collect();
    Box::new(move |traverser, _| Ok(values.contains(traverser.value())))
}

/// Drops traversers whose value equals what any of `names` bound.
pub fn except_named(names: Vec<String>) -> Predicate {
    Box::new(move |traverser, _| {
        Ok(!names
            .iter()
            .any(|name| traverser.binding(name) == Some(traverser.value())))
    })
}

/// Keeps traversers whose value equals what one of `names` bound.
pub fn retain_named(names: Vec<String>) -> Predicate {
    Box::new(move |traverser, _| {
        Ok(names
            .iter()
            .any(|name| traverser.binding(name) == Some(traverser.value())))
    })
}

/// Emits the first traverser seen for each key.
pub struct DedupStep {
    key: Option<ValueFn>,
    seen: BTreeSet<Value>,
}

impl DedupStep {
    pub fn new(key: Option<ValueFn>) -> Self {
        Self {
            key,
            seen: BTreeSet::new(),
        }
    }
}

impl Step for DedupStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            let key = match self.key.as_mut() {
                Some(key) => key(traverser.value()),
                None => traverser.value().clone(),
            };
            if self.seen.insert(key) {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.seen.clear();
    }

    fn name(&self) -> &'static str {
        "dedup"
    }
}

/// Emits the inputs at 0-based positions `low..=high`; a negative `high`
/// leaves the range open. Stops pulling once `high` is passed.
pub struct RangeStep {
    low: usize,
    high: Option<usize>,
    index: usize,
}

impl RangeStep {
    pub fn new(low: i64, high: i64) -> Self {
        Self {
            low: usize::try_from(low).unwrap_or(0),
            high: usize::try_from(high).ok(),
            index: 0,
        }
    }
}

impl Step for RangeStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        loop {
            if self.high.is_some_and(|high| self.index > high) {
                return Ok(None);
            }
            let Some(traverser) = upstream.pull(ctx)? else {
                return Ok(None);
            };
            let index = self.index;
            self.index += 1;
            if index >= self.low {
                return Ok(Some(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.index = 0;
    }

    fn name(&self) -> &'static str {
        "range"
    }
}

/// Keeps each traverser with probability `bias`.
pub struct RandomStep {
    bias: f64,
}

impl RandomStep {
    pub fn new(bias: f64) -> Self {
        Self { bias }
    }
}

impl Step for RandomStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            if self.bias >= ctx.rng().gen::<f64>() {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Drops traversers whose path revisits a value.
pub struct SimplePathStep;

impl Step for SimplePathStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            let mut seen = BTreeSet::new();
            if traverser.path()?.iter().all(|value| seen.insert(value)) {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "simple_path"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::graph::MemoryGraph;
    use crate::model::VertexId;
    use crate::pipe::step::{Chain, Seed, Source};

    fn ctx() -> EvalContext {
        EvalContext::new(Arc::new(MemoryGraph::classic()), TraversalConfig::deterministic(3))
    }

    fn drain(chain: &mut Chain, ctx: &mut EvalContext) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(t) = chain.pull(ctx).unwrap() {
            out.push(t.into_value());
        }
        out
    }

    fn ints(values: &[i64]) -> Chain {
        Chain::new(Source::new(Seed::Values(values.iter().copied().map(Value::Int).collect())))
    }

    #[test]
    fn compare_crosses_numeric_kinds() {
        assert!(Compare::Gt.test(&Value::Float(30.5), &Value::Int(30)));
        assert!(Compare::Eq.test(&Value::Int(2), &Value::Float(2.0)));
        assert!(!Compare::Lt.test(&Value::from("a"), &Value::Int(1)));
        assert!(Compare::Neq.test(&Value::from("a"), &Value::Int(1)));
    }

    #[test]
    fn fused_predicates_all_apply() {
        let mut ctx = ctx();
        let mut chain = ints(&[1, 2, 3, 4, 5, 6]);
        let mut step = FilterStep::new(predicate(|v| v.as_int().unwrap_or(0) % 2 == 0));
        assert!(step.fuse_filter(predicate(|v| v.as_int().unwrap_or(0) > 2)).is_none());
        assert_eq!(step.len(), 2);
        chain.push(Box::new(step));
        assert_eq!(drain(&mut chain, &mut ctx), vec![Value::Int(4), Value::Int(6)]);
    }

    #[test]
    fn has_cmp_reads_properties() {
        let mut ctx = ctx();
        let mut chain = Chain::new(Source::new(Seed::Vertices));
        chain.push(Box::new(FilterStep::new(has_cmp("age", Compare::Gt, Value::Int(30)))));
        assert_eq!(
            drain(&mut chain, &mut ctx),
            vec![Value::from(VertexId(4)), Value::from(VertexId(6))]
        );
    }

    #[test]
    fn has_on_plain_value_is_an_error() {
        let mut ctx = ctx();
        let mut chain = ints(&[1]);
        chain.push(Box::new(FilterStep::new(has("name"))));
        assert_eq!(
            chain.pull(&mut ctx),
            Err(TraversalError::NotAnElement { op: "has" })
        );
    }

    #[test]
    fn interval_is_half_open() {
        let mut ctx = ctx();
        let mut chain = Chain::new(Source::new(Seed::Vertices));
        chain.push(Box::new(FilterStep::new(interval("age", Value::Int(27), Value::Int(32)))));
        assert_eq!(
            drain(&mut chain, &mut ctx),
            vec![Value::from(VertexId(1)), Value::from(VertexId(2))]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut ctx = ctx();
        let mut chain = ints(&[3, 1, 3, 2, 1]);
        chain.push(Box::new(DedupStep::new(None)));
        assert_eq!(
            drain(&mut chain, &mut ctx),
            vec![Value::Int(3), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn range_is_inclusive_and_open_ended() {
        let mut ctx = ctx();
        let mut chain = ints(&[10, 11, 12, 13, 14]);
        chain.push(Box::new(RangeStep::new(1, 3)));
        assert_eq!(
            drain(&mut chain, &mut ctx),
            vec![Value::Int(11), Value::Int(12), Value::Int(13)]
        );

        let mut open = ints(&[10, 11, 12]);
        open.push(Box::new(RangeStep::new(1, -1)));
        assert_eq!(drain(&mut open, &mut ctx), vec![Value::Int(11), Value::Int(12)]);
    }

    #[test]
    fn random_bias_extremes() {
        let mut ctx = ctx();
        let mut all = ints(&[1, 2, 3]);
        all.push(Box::new(RandomStep::new(1.0)));
        assert_eq!(drain(&mut all, &mut ctx).len(), 3);
        let mut none = ints(&[1, 2, 3]);
        none.push(Box::new(RandomStep::new(-1.0)));
        assert!(drain(&mut none, &mut ctx).is_empty());
    }

    #[test]
    fn except_and_retain_are_complements() {
        let mut ctx = ctx();
        let mut kept = ints(&[1, 2, 3, 4]);
        kept.push(Box::new(FilterStep::new(retain([Value::Int(2), Value::Int(4)]))));
        let mut dropped = ints(&[1, 2, 3, 4]);
        dropped.push(Box::new(FilterStep::new(except([Value::Int(2), Value::Int(4)]))));
        assert_eq!(drain(&mut kept, &mut ctx), vec![Value::Int(2), Value::Int(4)]);
        assert_eq!(drain(&mut dropped, &mut ctx), vec![Value::Int(1), Value::Int(3)]);
    }
}
