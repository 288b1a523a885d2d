//! Adjacency expansion: vertex to vertices/edges, edge to vertices.

use std::collections::VecDeque;

use crate::error::{Result, TraversalError};
use crate::model::Direction;
use crate::pipe::context::EvalContext;
use crate::pipe::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::pipe::step::{Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Expand {
    /// Vertex to adjacent vertices.
    Vertices,
    /// Vertex to incident edges.
    Edges,
    /// Edge to its endpoint vertices.
    EdgeVertices,
}

/// Buffers one input's expansion and hands it out before pulling again.
pub struct ExpandStep {
    expand: Expand,
    dir: Direction,
    labels: Vec<String>,
    pending: VecDeque<Traverser>,
}

impl ExpandStep {
    pub fn new(expand: Expand, dir: Direction, labels: Vec<String>) -> Self {
        Self {
            expand,
            dir,
            labels,
            pending: VecDeque::new(),
        }
    }

    fn op(&self) -> &'static str {
        match (self.expand, self.dir) {
            (Expand::Vertices, Direction::Out) => "out",
            (Expand::Vertices, Direction::In) => "in",
            (Expand::Vertices, Direction::Both) => "both",
            (Expand::Edges, Direction::Out) => "out_e",
            (Expand::Edges, Direction::In) => "in_e",
            (Expand::Edges, Direction::Both) => "both_e",
            (Expand::EdgeVertices, Direction::Out) => "out_v",
            (Expand::EdgeVertices, Direction::In) => "in_v",
            (Expand::EdgeVertices, Direction::Both) => "both_v",
        }
    }

    fn expand(&self, value: &Value, ctx: &EvalContext) -> Result<Vec<Value>> {
        let graph = ctx.graph();
        match self.expand {
            Expand::Vertices | Expand::Edges => {
                let vertex = value
                    .as_vertex()
                    .ok_or(TraversalError::NotAnElement { op: self.op() })?;
                if self.expand == Expand::Vertices {
                    let adjacent = graph.adjacent(vertex, self.dir, &self.labels)?;
                    Ok(adjacent.into_iter().map(Value::from).collect())
                } else {
                    let incident = graph.incident_edges(vertex, self.dir, &self.labels)?;
                    Ok(incident.into_iter().map(Value::from).collect())
                }
            }
            Expand::EdgeVertices => {
                let edge = value
                    .as_edge()
                    .ok_or(TraversalError::NotAnElement { op: self.op() })?;
                let ends = graph.edge_vertices(edge, self.dir)?;
                Ok(ends.into_iter().map(Value::from).collect())
            }
        }
    }
}

impl Step for ExpandStep {
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
            let timer = profile_timer();
            let neighbors = self.expand(traverser.value(), ctx)?;
            record_profile_timer(ProfileKind::Expand, timer);
            self.pending
                .extend(neighbors.into_iter().map(|value| traverser.split(value)));
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    fn name(&self) -> &'static str {
        self.op()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::graph::MemoryGraph;
    use crate::model::{EdgeId, VertexId};
    use crate::pipe::step::{Chain, Seed, Source};

    fn run(seed: Seed, step: ExpandStep) -> Result<Vec<Value>> {
        let mut ctx = EvalContext::new(Arc::new(MemoryGraph::classic()), TraversalConfig::default());
        let mut chain = Chain::new(Source::new(seed));
        chain.push(Box::new(step));
        let mut out = Vec::new();
        while let Some(t) = chain.pull(&mut ctx)? {
            out.push(t.into_value());
        }
        Ok(out)
    }

    #[test]
    fn out_follows_insertion_order() {
        let out = run(
            Seed::VertexIds(vec![1]),
            ExpandStep::new(Expand::Vertices, Direction::Out, Vec::new()),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                Value::from(VertexId(2)),
                Value::from(VertexId(4)),
                Value::from(VertexId(3))
            ]
        );
    }

    #[test]
    fn labels_restrict_expansion() {
        let out = run(
            Seed::VertexIds(vec![1]),
            ExpandStep::new(Expand::Edges, Direction::Out, vec!["created".into()]),
        )
        .unwrap();
        assert_eq!(out, vec![Value::from(EdgeId(9))]);
    }

    #[test]
    fn in_expands_every_input() {
        let out = run(
            Seed::VertexIds(vec![3, 2]),
            ExpandStep::new(Expand::Vertices, Direction::In, Vec::new()),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                Value::from(VertexId(1)),
                Value::from(VertexId(4)),
                Value::from(VertexId(6)),
                Value::from(VertexId(1))
            ]
        );
    }

    #[test]
    fn both_v_yields_tail_then_head() {
        let out = run(
            Seed::EdgeIds(vec![10]),
            ExpandStep::new(Expand::EdgeVertices, Direction::Both, Vec::new()),
        )
        .unwrap();
        assert_eq!(out, vec![Value::from(VertexId(4)), Value::from(VertexId(5))]);
    }

    #[test]
    fn vertex_expansion_rejects_edges() {
        let err = run(
            Seed::EdgeIds(vec![7]),
            ExpandStep::new(Expand::Vertices, Direction::Out, Vec::new()),
        )
        .unwrap_err();
        assert_eq!(err, TraversalError::NotAnElement { op: "out" });
    }
}
