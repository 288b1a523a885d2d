//! Graph access capability consumed by the traversal engine.
//!
//! The engine never owns graph state. Every step that needs adjacency or
//! properties goes through [`GraphAccess`], so any backend that can answer
//! these questions can be traversed.

use crate::error::Result;
use crate::model::{Direction, EdgeId, Element, VertexId};
use crate::value::Value;

/// JSON graph documents loaded by the CLI.
pub mod document;
/// In-memory reference backend.
pub mod memory;

pub use document::GraphDocument;
pub use memory::MemoryGraph;

/// Minimal read/write surface a backing graph must expose.
///
/// Methods take `&self`; backends that support mutation use interior
/// mutability. Scans return owned id lists which the source step then
/// hands out one at a time.
pub trait GraphAccess {
    /// All vertex ids in a stable order.
    fn vertex_ids(&self) -> Result<Vec<VertexId>>;

    /// All edge ids in a stable order.
    fn edge_ids(&self) -> Result<Vec<EdgeId>>;

    /// Resolves a raw id to a vertex, if present.
    fn vertex(&self, id: u64) -> Result<Option<VertexId>>;

    /// Resolves a raw id to an edge, if present.
    fn edge(&self, id: u64) -> Result<Option<EdgeId>>;

    /// Edges incident to `vertex` in `dir`, restricted to `labels` when non-empty.
    fn incident_edges(
        &self,
        vertex: VertexId,
        dir: Direction,
        labels: &[String],
    ) -> Result<Vec<EdgeId>>;

    /// Endpoint(s) of `edge`: `Out` is the tail, `In` the head, `Both` yields tail then head.
    fn edge_vertices(&self, edge: EdgeId, dir: Direction) -> Result<Vec<VertexId>>;

    fn edge_label(&self, edge: EdgeId) -> Result<String>;

    fn property(&self, element: Element, key: &str) -> Result<Option<Value>>;

    fn property_keys(&self, element: Element) -> Result<Vec<String>>;

    fn set_property(&self, element: Element, key: &str, value: Value) -> Result<()>;

    fn remove_element(&self, element: Element) -> Result<()>;

    /// Vertices adjacent to `vertex` across edges in `dir`.
    fn adjacent(&self, vertex: VertexId, dir: Direction, labels: &[String]) -> Result<Vec<VertexId>> {
        let mut out = Vec::new();
        if matches!(dir, Direction::Out | Direction::Both) {
            for edge in self.incident_edges(vertex, Direction::Out, labels)? {
                out.extend(self.edge_vertices(edge, Direction::In)?);
            }
        }
        if matches!(dir, Direction::In | Direction::Both) {
            for edge in self.incident_edges(vertex, Direction::In, labels)? {
                out.extend(self.edge_vertices(edge, Direction::Out)?);
            }
        }
        Ok(out)
    }

    /// Vertices whose `key` property equals `value`. Backends with an index override this.
    fn vertices_with(&self, key: &str, value: &Value) -> Result<Vec<VertexId>> {
        let mut out = Vec::new();
        for vertex in self.vertex_ids()? {
            if self.property(Element::Vertex(vertex), key)?.as_ref() == Some(value) {
                out.push(vertex);
            }
        }
        Ok(out)
    }
}
