//! Ordering barriers and map-entry ordering.

use std::cmp::Ordering;
use std::collections::VecDeque;

use rand::seq::SliceRandom;

use crate::error::{Result, TraversalError};
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::step::{Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::value::Value;

/// Sort direction for natural and keyed orderings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Incr,
    Decr,
}

impl Order {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Incr => ordering,
            Order::Decr => ordering.reverse(),
        }
    }
}

pub type Comparator = Box<dyn FnMut(&Value, &Value) -> Ordering>;

pub enum OrderBy {
    Natural(Order),
    Comparator(Comparator),
    /// Orders elements by a property; missing properties sort as null.
    Property(String, Order),
}

/// Materializes the whole upstream, sorts it (stable), then emits.
pub struct OrderStep {
    by: OrderBy,
    buffer: Option<VecDeque<Traverser>>,
}

impl OrderStep {
    pub fn new(by: OrderBy) -> Self {
        Self { by, buffer: None }
    }

    fn sort(&mut self, mut items: Vec<Traverser>, ctx: &EvalContext) -> Result<Vec<Traverser>> {
        match &mut self.by {
            OrderBy::Natural(order) => {
                let order = *order;
                items.sort_by(|a, b| order.apply(a.value().cmp(b.value())));
                Ok(items)
            }
            OrderBy::Comparator(compare) => {
                items.sort_by(|a, b| compare(a.value(), b.value()));
                Ok(items)
            }
            OrderBy::Property(key, order) => {
                let order = *order;
                let mut keyed = Vec::with_capacity(items.len());
                for item in items {
                    let element = item
                        .value()
                        .as_element()
                        .ok_or(TraversalError::NotAnElement { op: "order" })?;
                    let sort_key = ctx.graph().property(element, key)?.unwrap_or(Value::Null);
                    keyed.push((sort_key, item));
                }
                keyed.sort_by(|(a, _), (b, _)| order.apply(a.cmp(b)));
                Ok(keyed.into_iter().map(|(_, item)| item).collect())
            }
        }
    }
}

impl Step for OrderStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            let timer = profile_timer();
            let mut items = Vec::new();
            while let Some(traverser) = upstream.pull(ctx)? {
                items.push(traverser);
            }
            let sorted = self.sort(items, ctx)?;
            record_profile_timer(ProfileKind::Barrier, timer);
            self.buffer = Some(sorted.into());
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) {
        self.buffer = None;
    }

    fn name(&self) -> &'static str {
        "order"
    }
}

/// For each map input, emits its keys ordered by their values.
pub struct OrderMapStep {
    order: Order,
    pending: VecDeque<Traverser>,
}

impl OrderMapStep {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            pending: VecDeque::new(),
        }
    }
}

impl Step for OrderMapStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return Ok(Some(next));
            }
            let Some(traverser) = upstream.pull(ctx)? else {
                return Ok(None);
            };
            let map = traverser
                .value()
                .as_map()
                .ok_or(TraversalError::Invalid("order_map() expects map values"))?;
            let mut entries: Vec<(&Value, &Value)> = map.iter().collect();
            let order = self.order;
            entries.sort_by(|(_, a), (_, b)| order.apply(a.cmp(b)));
            let keys: Vec<Value> = entries.into_iter().map(|(key, _)| key.clone()).collect();
            self.pending
                .extend(keys.into_iter().map(|key| traverser.split(key)));
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    fn name(&self) -> &'static str {
        "order_map"
    }
}

/// Materializes the upstream and emits it in random order.
#[derive(Default)]
pub struct ShuffleStep {
    buffer: Option<VecDeque<Traverser>>,
}

impl Step for ShuffleStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            let timer = profile_timer();
            let mut items = Vec::new();
            while let Some(traverser) = upstream.pull(ctx)? {
                items.push(traverser);
            }
            items.shuffle(ctx.rng());
            record_profile_timer(ProfileKind::Barrier, timer);
            self.buffer = Some(items.into());
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) {
        self.buffer = None;
    }

    fn name(&self) -> &'static str {
        "shuffle"
    }
}
