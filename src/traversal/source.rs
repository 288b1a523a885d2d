use std::sync::Arc;

use tracing::debug;

use crate::config::TraversalConfig;
use crate::graph::GraphAccess;
use crate::model::{EdgeId, VertexId};
use crate::pipe::step::Seed;
use crate::pipe::Pipeline;
use crate::traversal::{Edges, Traversal, Values, Vertices};
use crate::value::Value;

/// Entry point for traversals over one graph.
///
/// Cheap to clone; every traversal it starts gets its own pipeline,
/// side-effect registry and a copy of the config.
#[derive(Clone)]
pub struct TraversalSource {
    graph: Arc<dyn GraphAccess>,
    config: TraversalConfig,
}

impl TraversalSource {
    pub fn new(graph: Arc<dyn GraphAccess>) -> Self {
        Self::with_config(graph, TraversalConfig::default())
    }

    pub fn with_config(graph: Arc<dyn GraphAccess>, config: TraversalConfig) -> Self {
        debug!(
            optimize = config.optimize,
            seed = ?config.seed,
            max_loop_depth = ?config.max_loop_depth,
            "traversal source opened"
        );
        Self { graph, config }
    }

    pub fn graph(&self) -> &Arc<dyn GraphAccess> {
        &self.graph
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    fn begin<K>(&self, seed: Seed) -> Traversal<K> {
        Traversal::from_pipeline(Pipeline::new(
            Arc::clone(&self.graph),
            self.config.clone(),
            seed,
        ))
    }

    /// Every vertex.
    pub fn v(&self) -> Traversal<Vertices> {
        self.begin(Seed::Vertices)
    }

    /// Every edge.
    pub fn e(&self) -> Traversal<Edges> {
        self.begin(Seed::Edges)
    }

    /// The vertices with these ids, in the given order; unknown ids are skipped.
    pub fn v_ids(&self, ids: impl IntoIterator<Item = u64>) -> Traversal<Vertices> {
        self.begin(Seed::VertexIds(ids.into_iter().collect()))
    }

    pub fn e_ids(&self, ids: impl IntoIterator<Item = u64>) -> Traversal<Edges> {
        self.begin(Seed::EdgeIds(ids.into_iter().collect()))
    }

    /// Vertices whose `key` equals `value`, answered from the graph's key
    /// lookup rather than a full scan.
    pub fn v_where(&self, key: &str, value: impl Into<Value>) -> Traversal<Vertices> {
        self.begin(Seed::VerticesWhere(vec![(key.to_owned(), value.into())]))
    }

    /// A single arbitrary start value.
    pub fn start(&self, value: impl Into<Value>) -> Traversal<Values> {
        self.begin(Seed::Values(vec![value.into()]))
    }

    pub fn start_all(&self, values: impl IntoIterator<Item = Value>) -> Traversal<Values> {
        self.begin(Seed::Values(values.into_iter().collect()))
    }

    pub fn start_vertex(&self, vertex: VertexId) -> Traversal<Vertices> {
        self.begin(Seed::Values(vec![Value::from(vertex)]))
    }

    pub fn start_edge(&self, edge: EdgeId) -> Traversal<Edges> {
        self.begin(Seed::Values(vec![Value::from(edge)]))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::TraversalError;
    use crate::graph::MemoryGraph;
    use crate::steps::filter::Compare;
    use crate::steps::order::Order;
    use crate::steps::ValueFn;

    fn g() -> TraversalSource {
        TraversalSource::new(Arc::new(MemoryGraph::classic()))
    }

    fn v(id: u64) -> Value {
        Value::from(VertexId(id))
    }

    fn names(values: &[&str]) -> Vec<Value> {
        values.iter().map(|name| Value::from(*name)).collect()
    }

    #[test]
    fn out_then_property() {
        let mut names_known = g().v_ids([1]).out(&["knows"]).property("name");
        assert_eq!(names_known.to_list().unwrap(), names(&["vadas", "josh"]));
    }

    #[test]
    fn edges_and_endpoints() {
        let mut labels = g().v_ids([1]).out_e(&[]).label().dedup().order();
        assert_eq!(labels.to_list().unwrap(), names(&["created", "knows"]));

        let mut heads = g().v_ids([4]).out_e(&["created"]).in_v().property("name").order();
        assert_eq!(heads.to_list().unwrap(), names(&["lop", "ripple"]));
    }

    #[test]
    fn has_filters_on_properties() {
        let mut older = g().v().has_cmp("age", Compare::Gt, 30).property("name").order();
        assert_eq!(older.to_list().unwrap(), names(&["josh", "peter"]));

        let software = g().v().has_value("lang", "java").count();
        assert_eq!(software.unwrap(), 2);

        let mut young = g().v().interval("age", 27, 32).property("name").order();
        assert_eq!(young.to_list().unwrap(), names(&["marko", "vadas"]));
    }

    #[test]
    fn v_where_uses_key_lookup() {
        let mut lop = g().v_where("name", "lop");
        assert_eq!(lop.to_list().unwrap(), vec![v(3)]);
    }

    #[test]
    fn group_count_caps_to_counts() {
        let mut t = g().v().out(&["created"]).group_count();
        let counts = t.cap().unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(v(3), Value::Int(3));
        expected.insert(v(5), Value::Int(1));
        assert_eq!(counts, Value::Map(expected));
    }

    #[test]
    fn typed_mark_and_back() {
        let mut t = g()
            .v()
            .mark()
            .out(&["created"])
            .has_value("name", "ripple")
            .back()
            .property("name");
        assert_eq!(t.to_list().unwrap(), names(&["josh"]));
    }

    #[test]
    fn select_reads_named_steps() {
        let mut t = g()
            .v_ids([1])
            .as_("a")
            .out(&["created"])
            .as_("b")
            .select(&["a", "b"]);
        let row = t.next().unwrap();
        let row = row.as_map().unwrap();
        assert_eq!(row.get(&Value::from("a")), Some(&v(1)));
        assert_eq!(row.get(&Value::from("b")), Some(&v(3)));
    }

    #[test]
    fn select_unknown_name_fails() {
        let mut t = g().v().as_("a").select(&["nope"]);
        assert_eq!(t.next(), Err(TraversalError::unknown_step("nope")));
    }

    #[test]
    fn select_function_count_must_match() {
        let mut fns: Vec<ValueFn> = Vec::new();
        fns.push(Box::new(|value: &Value| value.clone()));
        let mut t = g().v().as_("a").as_("b").select_by(&[], fns);
        assert!(matches!(
            t.next(),
            Err(TraversalError::ArgumentMismatch { step: "select", expected: 2, found: 1 })
        ));
    }

    #[test]
    fn if_then_else_routes_by_test() {
        let mut t = g()
            .v_ids([1, 2])
            .if_then_else(
                |value| value.as_vertex() == Some(VertexId(1)),
                |then| then.out(&["knows"]).property("name"),
                |otherwise| otherwise.property("age"),
            )
            .to_list()
            .unwrap();
        t.sort();
        assert_eq!(t, vec![Value::Int(27), Value::from("josh"), Value::from("vadas")]);
    }

    #[test]
    fn loop_times_walks_depth() {
        let mut t = g()
            .v_ids([1])
            .loop_times(|body| body.out(&[]), 2)
            .property("name")
            .order();
        assert_eq!(t.to_list().unwrap(), names(&["lop", "ripple"]));
    }

    #[test]
    fn loop_until_stops_on_depth() {
        let mut t = g()
            .v_ids([1])
            .loop_until(|body| body.out(&["knows"]), |state| state.depth() >= 1)
            .property("name")
            .order();
        assert_eq!(t.to_list().unwrap(), names(&["josh", "vadas"]));
    }

    #[test]
    fn limit_and_range() {
        assert_eq!(g().v().limit(2).count().unwrap(), 2);
        assert_eq!(g().v().limit(0).count().unwrap(), 0);
        assert_eq!(g().v().range(1, 3).to_list().unwrap(), vec![v(2), v(3), v(4)]);
    }

    #[test]
    fn order_map_on_counts() {
        let mut t = g()
            .v()
            .out(&["created"])
            .group_count()
            .cap()
            .map(|counts| g().start(counts).order_map(Order::Decr).to_list())
            .unwrap()
            .unwrap();
        assert_eq!(t.remove(0), v(3));
    }

    #[test]
    fn iterator_yields_values() {
        let collected: Result<Vec<Value>, _> = g().v_ids([1, 2]).into_iter().collect();
        assert_eq!(collected.unwrap(), vec![v(1), v(2)]);
    }

    #[test]
    fn next_or_falls_back_when_exhausted() {
        let mut t = g().v_ids([99]);
        assert_eq!(t.next_or(Value::Null).unwrap(), Value::Null);
    }
}
