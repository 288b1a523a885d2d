use crate::error::Result;
use crate::steps::filter::{self, Compare};
use crate::steps::order::{Order, OrderBy, OrderStep};
use crate::steps::side_effect::PropertySetStep;
use crate::steps::transform::{self, MapStep};
use crate::traversal::{ElementKind, Traversal, Values};
use crate::value::Value;

/// Steps available while the traversal emits vertices or edges.
impl<K: ElementKind, M> Traversal<K, M> {
    /// Elements that carry `key`.
    pub fn has(self, key: &str) -> Self {
        self.push(|p| p.add_filter(filter::has(key)))
    }

    /// Elements whose `key` equals `value`. Pushed into the vertex scan when
    /// it is the first step.
    pub fn has_value(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(|p| p.add_has_value(key, value))
    }

    pub fn has_cmp(self, key: &str, compare: Compare, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(|p| p.add_filter(filter::has_cmp(key, compare, value)))
    }

    pub fn has_not(self, key: &str) -> Self {
        self.push(|p| p.add_filter(filter::has_not(key)))
    }

    pub fn has_not_value(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(|p| p.add_filter(filter::has_not_value(key, value)))
    }

    /// Elements with `low <= key < high`.
    pub fn interval(self, key: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let (low, high) = (low.into(), high.into());
        self.push(|p| p.add_filter(filter::interval(key, low, high)))
    }

    /// Value of `key`; elements without it are dropped.
    pub fn property(self, key: &str) -> Traversal<Values, M> {
        self.push(|p| p.add_step(Box::new(MapStep::new("property", transform::property(key)))))
            .retype()
    }

    pub fn id(self) -> Traversal<Values, M> {
        self.push(|p| p.add_step(Box::new(MapStep::new("id", transform::id()))))
            .retype()
    }

    /// Property map, restricted to `keys` when non-empty.
    pub fn map(self, keys: &[&str]) -> Traversal<Values, M> {
        let keys = super::owned(keys);
        self.push(|p| p.add_step(Box::new(MapStep::new("map", transform::property_map(keys)))))
            .retype()
    }

    /// Writes `key = value` on every element passing through.
    pub fn property_set(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(|p| p.add_step(Box::new(PropertySetStep::new(key, value))))
    }

    /// Orders by a property; a missing property sorts as null.
    pub fn order_by_property(self, key: &str, order: Order) -> Self {
        self.push(|p| {
            p.add_step(Box::new(OrderStep::new(OrderBy::Property(
                key.to_owned(),
                order,
            ))))
        })
    }

    /// Removes the element last returned by `next()` from the graph.
    pub fn remove(&mut self) -> Result<()> {
        self.pipeline.remove()
    }
}
