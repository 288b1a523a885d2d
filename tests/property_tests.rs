use std::collections::BTreeSet;
use std::sync::Arc;

use pipewalk::graph::MemoryGraph;
use pipewalk::{Compare, TraversalConfig, TraversalSource, Value, VertexId};
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-20i64..20).prop_map(Value::Int),
        "[a-c]{1,2}".prop_map(Value::String),
        any::<bool>().prop_map(Value::Bool),
    ]
}

/// Ages mix ints with floats, some of them whole, so int/float equality
/// is exercised.
fn arb_age() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..60).prop_map(Value::Int),
        (0i64..60).prop_map(|age| Value::Float(age as f64)),
        (0i64..60).prop_map(|age| Value::Float(age as f64 + 0.5)),
    ]
}

/// Vertex count, edges as index pairs into the vertex list, and an `age`
/// per vertex (absent for `None`).
fn arb_graph() -> impl Strategy<Value = (Vec<Option<Value>>, Vec<(usize, usize, bool)>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::option::of(arb_age()), n),
            prop::collection::vec((0..n, 0..n, any::<bool>()), 0..30),
        )
    })
}

fn build_graph(ages: &[Option<Value>], edges: &[(usize, usize, bool)]) -> Arc<MemoryGraph> {
    let graph = MemoryGraph::new();
    let ids: Vec<VertexId> = ages
        .iter()
        .map(|age| match age {
            Some(age) => graph.add_vertex([("age", age.clone())]),
            None => graph.add_vertex(Vec::<(String, Value)>::new()),
        })
        .collect();
    for (tail, head, knows) in edges {
        let label = if *knows { "knows" } else { "likes" };
        graph.add_edge(ids[*tail], ids[*head], label).unwrap();
    }
    Arc::new(graph)
}

fn source() -> TraversalSource {
    TraversalSource::new(Arc::new(MemoryGraph::new()))
}

proptest! {
    #[test]
    fn prop_range_length_matches_window(
        values in prop::collection::vec(arb_value(), 0..40),
        low in 0i64..45,
        high in 0i64..45,
    ) {
        let out = source().start_all(values.clone()).range(low, high).to_list().unwrap();
        let n = values.len() as i64;
        let expected = (high.min(n - 1) - low + 1).max(0);
        prop_assert_eq!(out.len() as i64, expected);
        if expected > 0 {
            prop_assert_eq!(&out[..], &values[low as usize..=(high.min(n - 1)) as usize]);
        }
    }

    #[test]
    fn prop_dedup_is_unique_and_first_occurrence_ordered(
        values in prop::collection::vec(arb_value(), 0..60),
    ) {
        let out = source().start_all(values.clone()).dedup().to_list().unwrap();
        let mut seen = BTreeSet::new();
        let expected: Vec<Value> = values
            .into_iter()
            .filter(|value| seen.insert(value.clone()))
            .collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_order_sorts(values in prop::collection::vec(arb_value(), 0..40)) {
        let out = source().start_all(values.clone()).order().to_list().unwrap();
        let mut expected = values;
        expected.sort();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_count_equals_list_length((ages, edges) in arb_graph()) {
        let g = TraversalSource::new(build_graph(&ages, &edges));
        let listed = g.v().out(&["knows"]).both(&[]).to_list().unwrap();
        let counted = g.v().out(&["knows"]).both(&[]).count().unwrap();
        prop_assert_eq!(listed.len(), counted);
    }

    #[test]
    fn prop_fusion_preserves_results((ages, edges) in arb_graph(), threshold in 0i64..60) {
        let graph = build_graph(&ages, &edges);
        let fused = TraversalSource::new(graph.clone());
        let plain = TraversalSource::with_config(graph, TraversalConfig::unoptimized());
        let run = |g: &TraversalSource| {
            g.v()
                .has("age")
                .out(&[])
                .has_cmp("age", Compare::Gte, threshold)
                .has_not_value("age", threshold + 1)
                .id()
                .to_list()
                .unwrap()
        };
        prop_assert_eq!(run(&fused), run(&plain));
    }

    #[test]
    fn prop_scan_pushdown_preserves_results((ages, edges) in arb_graph(), wanted in arb_age()) {
        let graph = build_graph(&ages, &edges);
        let fused = TraversalSource::new(graph.clone());
        let plain = TraversalSource::with_config(graph, TraversalConfig::unoptimized());
        let run = |g: &TraversalSource| {
            g.v().has_value("age", wanted.clone()).id().to_list().unwrap()
        };
        prop_assert_eq!(run(&fused), run(&plain));
    }

    #[test]
    fn prop_loop_times_matches_repeated_steps((ages, edges) in arb_graph(), depth in 0usize..4) {
        let g = TraversalSource::new(build_graph(&ages, &edges));
        let looped = g.v().loop_times(|body| body.out(&[]), depth).to_list().unwrap();
        let mut unrolled = g.v();
        for _ in 0..depth {
            unrolled = unrolled.out(&[]);
        }
        let unrolled = unrolled.to_list().unwrap();
        let as_set = |values: Vec<Value>| {
            let mut values = values;
            values.sort();
            values
        };
        prop_assert_eq!(as_set(looped), as_set(unrolled));
    }

    #[test]
    fn prop_optional_is_identity_over_starts((ages, edges) in arb_graph()) {
        let g = TraversalSource::new(build_graph(&ages, &edges));
        let starts = g.v().to_list().unwrap();
        let restored = g.v().mark().out(&["likes"]).has("age").optional().to_list().unwrap();
        prop_assert_eq!(starts, restored);
    }
}
