use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TraversalError};
use crate::graph::MemoryGraph;
use crate::model::VertexId;
use crate::value::Value;

/// Serialized graph: vertex and edge lists with JSON property maps.
///
/// ```json
/// {
///   "vertices": [{"id": 1, "properties": {"name": "marko"}}],
///   "edges": [{"out": 1, "in": 2, "label": "knows"}]
/// }
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub vertices: Vec<VertexDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexDocument {
    pub id: Option<u64>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub id: Option<u64>,
    pub out: u64,
    #[serde(rename = "in")]
    pub in_: u64,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl GraphDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| TraversalError::Graph(format!("invalid graph document: {err}")))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| TraversalError::Graph(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    /// Materializes the document into a fresh [`MemoryGraph`].
    ///
    /// Vertices with explicit ids keep them; the rest are numbered after the
    /// largest explicit id. Edge endpoints refer to vertex ids as written.
    pub fn into_graph(self) -> Result<MemoryGraph> {
        let graph = MemoryGraph::new();
        let mut deferred = Vec::new();
        for vertex in self.vertices {
            let props = vertex
                .properties
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)));
            match vertex.id {
                Some(id) => {
                    graph.add_vertex_with_id(id, props)?;
                }
                None => deferred.push(props.collect::<Vec<_>>()),
            }
        }
        for props in deferred {
            graph.add_vertex(props);
        }
        for edge in self.edges {
            let props = edge
                .properties
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)));
            graph.add_edge_with(edge.id, VertexId(edge.out), VertexId(edge.in_), edge.label, props)?;
        }
        info!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "graph document loaded"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAccess;
    use crate::model::{Direction, Element};

    #[test]
    fn loads_vertices_and_edges() {
        let doc = GraphDocument::from_json(
            r#"{
                "vertices": [
                    {"id": 1, "properties": {"name": "a"}},
                    {"id": 2, "properties": {"name": "b", "weight": 1.5}}
                ],
                "edges": [{"out": 1, "in": 2, "label": "next"}]
            }"#,
        )
        .unwrap();
        let graph = doc.into_graph().unwrap();
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(
            graph.adjacent(VertexId(1), Direction::Out, &[]).unwrap(),
            vec![VertexId(2)]
        );
        assert_eq!(
            graph.property(Element::Vertex(VertexId(2)), "weight").unwrap(),
            Some(Value::Float(1.5))
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let doc = GraphDocument::from_json(
            r#"{"vertices": [{"id": 1}], "edges": [{"out": 1, "in": 9, "label": "x"}]}"#,
        )
        .unwrap();
        assert!(doc.into_graph().is_err());
    }
}
