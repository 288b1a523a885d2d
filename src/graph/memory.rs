use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{Result, TraversalError};
use crate::graph::GraphAccess;
use crate::model::{Direction, EdgeId, Element, VertexId};
use crate::value::Value;

type Props = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct VertexRecord {
    props: Props,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
}

#[derive(Debug)]
struct EdgeRecord {
    label: String,
    tail: VertexId,
    head: VertexId,
    props: Props,
}

#[derive(Debug, Default)]
struct GraphState {
    vertices: BTreeMap<VertexId, VertexRecord>,
    edges: BTreeMap<EdgeId, EdgeRecord>,
    key_index: BTreeMap<String, BTreeMap<Value, BTreeSet<VertexId>>>,
    next_id: u64,
}

impl GraphState {
    fn allocate(&mut self, requested: Option<u64>) -> Result<u64> {
        let id = match requested {
            Some(id) => {
                if self.vertices.contains_key(&VertexId(id)) || self.edges.contains_key(&EdgeId(id)) {
                    return Err(TraversalError::Invalid("element id already in use"));
                }
                id
            }
            None => self.next_id.max(1),
        };
        self.next_id = self.next_id.max(id + 1);
        Ok(id)
    }

    fn index_insert(&mut self, vertex: VertexId, key: &str, value: &Value) {
        if let Some(index) = self.key_index.get_mut(key) {
            index.entry(value.clone()).or_default().insert(vertex);
        }
    }

    fn index_remove(&mut self, vertex: VertexId, key: &str, value: &Value) {
        if let Some(index) = self.key_index.get_mut(key) {
            if let Some(bucket) = index.get_mut(value) {
                bucket.remove(&vertex);
                if bucket.is_empty() {
                    index.remove(value);
                }
            }
        }
    }

    fn props(&self, element: Element) -> Result<&Props> {
        match element {
            Element::Vertex(v) => self
                .vertices
                .get(&v)
                .map(|record| &record.props)
                .ok_or(TraversalError::NotFound(element)),
            Element::Edge(e) => self
                .edges
                .get(&e)
                .map(|record| &record.props)
                .ok_or(TraversalError::NotFound(element)),
        }
    }

    fn detach_edge(&mut self, edge: EdgeId) -> Option<EdgeRecord> {
        let record = self.edges.remove(&edge)?;
        if let Some(tail) = self.vertices.get_mut(&record.tail) {
            tail.out_edges.retain(|candidate| *candidate != edge);
        }
        if let Some(head) = self.vertices.get_mut(&record.head) {
            head.in_edges.retain(|candidate| *candidate != edge);
        }
        Some(record)
    }
}

/// In-memory property graph guarded by a `parking_lot::RwLock`.
///
/// Ids are shared between vertices and edges and handed out in increasing
/// order. Adjacency lists keep insertion order, so traversals over the same
/// graph state are deterministic.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex with the next free id.
    pub fn add_vertex<I, K, V>(&self, props: I) -> VertexId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut state = self.state.write();
        let id = state.next_id.max(1);
        state.next_id = id + 1;
        Self::insert_vertex(&mut state, VertexId(id), props)
    }

    /// Adds a vertex with a caller-chosen id.
    pub fn add_vertex_with_id<I, K, V>(&self, id: u64, props: I) -> Result<VertexId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut state = self.state.write();
        let id = state.allocate(Some(id))?;
        Ok(Self::insert_vertex(&mut state, VertexId(id), props))
    }

    fn insert_vertex<I, K, V>(state: &mut GraphState, vertex: VertexId, props: I) -> VertexId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let props: Props = props
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        for (key, value) in &props {
            state.index_insert(vertex, key, value);
        }
        state.vertices.insert(
            vertex,
            VertexRecord {
                props,
                ..VertexRecord::default()
            },
        );
        trace!(vertex = vertex.0, "vertex added");
        vertex
    }

    /// Adds a directed edge `tail -label-> head`.
    pub fn add_edge(&self, tail: VertexId, head: VertexId, label: impl Into<String>) -> Result<EdgeId> {
        self.add_edge_with(None, tail, head, label, std::iter::empty::<(String, Value)>())
    }

    /// Adds an edge with an optional explicit id and properties.
    pub fn add_edge_with<I, K, V>(
        &self,
        id: Option<u64>,
        tail: VertexId,
        head: VertexId,
        label: impl Into<String>,
        props: I,
    ) -> Result<EdgeId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut state = self.state.write();
        if !state.vertices.contains_key(&tail) {
            return Err(TraversalError::NotFound(Element::Vertex(tail)));
        }
        if !state.vertices.contains_key(&head) {
            return Err(TraversalError::NotFound(Element::Vertex(head)));
        }
        let edge = EdgeId(state.allocate(id)?);
        state.edges.insert(
            edge,
            EdgeRecord {
                label: label.into(),
                tail,
                head,
                props: props
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            },
        );
        if let Some(record) = state.vertices.get_mut(&tail) {
            record.out_edges.push(edge);
        }
        if let Some(record) = state.vertices.get_mut(&head) {
            record.in_edges.push(edge);
        }
        Ok(edge)
    }

    /// Maintains an equality index over a vertex property key.
    pub fn create_key_index(&self, key: &str) {
        let mut state = self.state.write();
        let mut index: BTreeMap<Value, BTreeSet<VertexId>> = BTreeMap::new();
        for (vertex, record) in &state.vertices {
            if let Some(value) = record.props.get(key) {
                index.entry(value.clone()).or_default().insert(*vertex);
            }
        }
        debug!(key, entries = index.len(), "key index created");
        state.key_index.insert(key.to_owned(), index);
    }

    pub fn vertex_count(&self) -> usize {
        self.state.read().vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    /// The six-vertex "classic" graph used throughout the tests.
    ///
    /// ```text
    /// marko(1) -knows(7, 0.5)-> vadas(2)
    /// marko(1) -knows(8, 1.0)-> josh(4)
    /// marko(1) -created(9, 0.4)-> lop(3)
    /// josh(4) -created(10, 1.0)-> ripple(5)
    /// josh(4) -created(11, 0.4)-> lop(3)
    /// peter(6) -created(12, 0.2)-> lop(3)
    /// ```
    pub fn classic() -> Self {
        let graph = Self::new();
        let person = |name: &str, age: i64| {
            vec![
                ("name".to_owned(), Value::from(name)),
                ("age".to_owned(), Value::Int(age)),
            ]
        };
        let software = |name: &str| {
            vec![
                ("name".to_owned(), Value::from(name)),
                ("lang".to_owned(), Value::from("java")),
            ]
        };
        let vertices = [
            (1, person("marko", 29)),
            (2, person("vadas", 27)),
            (3, software("lop")),
            (4, person("josh", 32)),
            (5, software("ripple")),
            (6, person("peter", 35)),
        ];
        let edges = [
            (7, 1, 2, "knows", 0.5),
            (8, 1, 4, "knows", 1.0),
            (9, 1, 3, "created", 0.4),
            (10, 4, 5, "created", 1.0),
            (11, 4, 3, "created", 0.4),
            (12, 6, 3, "created", 0.2),
        ];
        let mut state = graph.state.write();
        for (id, props) in vertices {
            Self::insert_vertex(&mut state, VertexId(id), props);
        }
        for (id, tail, head, label, weight) in edges {
            let edge = EdgeId(id);
            state.edges.insert(
                edge,
                EdgeRecord {
                    label: label.to_owned(),
                    tail: VertexId(tail),
                    head: VertexId(head),
                    props: BTreeMap::from([("weight".to_owned(), Value::Float(weight))]),
                },
            );
            if let Some(record) = state.vertices.get_mut(&VertexId(tail)) {
                record.out_edges.push(edge);
            }
            if let Some(record) = state.vertices.get_mut(&VertexId(head)) {
                record.in_edges.push(edge);
            }
        }
        state.next_id = 13;
        drop(state);
        graph
    }
}

impl GraphAccess for MemoryGraph {
    fn vertex_ids(&self) -> Result<Vec<VertexId>> {
        Ok(self.state.read().vertices.keys().copied().collect())
    }

    fn edge_ids(&self) -> Result<Vec<EdgeId>> {
        Ok(self.state.read().edges.keys().copied().collect())
    }

    fn vertex(&self, id: u64) -> Result<Option<VertexId>> {
        let vertex = VertexId(id);
        Ok(self.state.read().vertices.contains_key(&vertex).then_some(vertex))
    }

    fn edge(&self, id: u64) -> Result<Option<EdgeId>> {
        let edge = EdgeId(id);
        Ok(self.state.read().edges.contains_key(&edge).then_some(edge))
    }

    fn incident_edges(
        &self,
        vertex: VertexId,
        dir: Direction,
        labels: &[String],
    ) -> Result<Vec<EdgeId>> {
        let state = self.state.read();
        let record = state
            .vertices
            .get(&vertex)
            .ok_or(TraversalError::NotFound(Element::Vertex(vertex)))?;
        let candidates: Box<dyn Iterator<Item = &EdgeId> + '_> = match dir {
            Direction::Out => Box::new(record.out_edges.iter()),
            Direction::In => Box::new(record.in_edges.iter()),
            Direction::Both => Box::new(record.out_edges.iter().chain(record.in_edges.iter())),
        };
        Ok(candidates
            .filter(|edge| {
                labels.is_empty()
                    || state
                        .edges
                        .get(edge)
                        .map(|e| labels.iter().any(|label| *label == e.label))
                        .unwrap_or(false)
            })
            .copied()
            .collect())
    }

    fn edge_vertices(&self, edge: EdgeId, dir: Direction) -> Result<Vec<VertexId>> {
        let state = self.state.read();
        let record = state
            .edges
            .get(&edge)
            .ok_or(TraversalError::NotFound(Element::Edge(edge)))?;
        Ok(match dir {
            Direction::Out => vec![record.tail],
            Direction::In => vec![record.head],
            Direction::Both => vec![record.tail, record.head],
        })
    }

    fn edge_label(&self, edge: EdgeId) -> Result<String> {
        self.state
            .read()
            .edges
            .get(&edge)
            .map(|record| record.label.clone())
            .ok_or(TraversalError::NotFound(Element::Edge(edge)))
    }

    fn property(&self, element: Element, key: &str) -> Result<Option<Value>> {
        Ok(self.state.read().props(element)?.get(key).cloned())
    }

    fn property_keys(&self, element: Element) -> Result<Vec<String>> {
        Ok(self.state.read().props(element)?.keys().cloned().collect())
    }

    fn set_property(&self, element: Element, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write();
        match element {
            Element::Vertex(vertex) => {
                let previous = state
                    .vertices
                    .get_mut(&vertex)
                    .ok_or(TraversalError::NotFound(element))?
                    .props
                    .insert(key.to_owned(), value.clone());
                if let Some(previous) = previous {
                    state.index_remove(vertex, key, &previous);
                }
                state.index_insert(vertex, key, &value);
            }
            Element::Edge(edge) => {
                state
                    .edges
                    .get_mut(&edge)
                    .ok_or(TraversalError::NotFound(element))?
                    .props
                    .insert(key.to_owned(), value);
            }
        }
        Ok(())
    }

    fn remove_element(&self, element: Element) -> Result<()> {
        let mut state = self.state.write();
        match element {
            Element::Vertex(vertex) => {
                let record = state
                    .vertices
                    .remove(&vertex)
                    .ok_or(TraversalError::NotFound(element))?;
                for (key, value) in &record.props {
                    state.index_remove(vertex, key, value);
                }
                for edge in record.out_edges.iter().chain(record.in_edges.iter()) {
                    state.detach_edge(*edge);
                }
            }
            Element::Edge(edge) => {
                state
                    .detach_edge(edge)
                    .ok_or(TraversalError::NotFound(element))?;
            }
        }
        debug!(%element, "element removed");
        Ok(())
    }

    fn vertices_with(&self, key: &str, value: &Value) -> Result<Vec<VertexId>> {
        let state = self.state.read();
        if let Some(index) = state.key_index.get(key) {
            return Ok(index
                .get(value)
                .map(|bucket| bucket.iter().copied().collect())
                .unwrap_or_default());
        }
        Ok(state
            .vertices
            .iter()
            .filter(|(_, record)| record.props.get(key) == Some(value))
            .map(|(vertex, _)| *vertex)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_graph_shape() {
        let graph = MemoryGraph::classic();
        assert_eq!(graph.vertex_count(), 6);
        assert_eq!(graph.edge_count(), 6);
        let out = graph.adjacent(VertexId(1), Direction::Out, &[]).unwrap();
        assert_eq!(out, vec![VertexId(2), VertexId(4), VertexId(3)]);
        let knows = graph
            .adjacent(VertexId(1), Direction::Out, &["knows".to_owned()])
            .unwrap();
        assert_eq!(knows, vec![VertexId(2), VertexId(4)]);
        let creators = graph.adjacent(VertexId(3), Direction::In, &[]).unwrap();
        assert_eq!(creators, vec![VertexId(1), VertexId(4), VertexId(6)]);
    }

    #[test]
    fn key_index_tracks_updates() {
        let graph = MemoryGraph::classic();
        graph.create_key_index("name");
        let marko = graph.vertices_with("name", &Value::from("marko")).unwrap();
        assert_eq!(marko, vec![VertexId(1)]);
        graph
            .set_property(Element::Vertex(VertexId(1)), "name", Value::from("mark"))
            .unwrap();
        assert!(graph
            .vertices_with("name", &Value::from("marko"))
            .unwrap()
            .is_empty());
        assert_eq!(
            graph.vertices_with("name", &Value::from("mark")).unwrap(),
            vec![VertexId(1)]
        );
    }

    #[test]
    fn removing_vertex_detaches_edges() {
        let graph = MemoryGraph::classic();
        graph.remove_element(Element::Vertex(VertexId(4))).unwrap();
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(graph.edge_count(), 3);
        let out = graph.adjacent(VertexId(1), Direction::Out, &[]).unwrap();
        assert_eq!(out, vec![VertexId(2), VertexId(3)]);
        assert_eq!(
            graph.remove_element(Element::Vertex(VertexId(4))),
            Err(TraversalError::NotFound(Element::Vertex(VertexId(4))))
        );
    }

    #[test]
    fn explicit_ids_must_be_unique() {
        let graph = MemoryGraph::new();
        let a = graph.add_vertex_with_id(10, [("name", "a")]).unwrap();
        assert!(graph.add_vertex_with_id(10, [("name", "b")]).is_err());
        let b = graph.add_vertex([("name", "b")]);
        assert_eq!(b, VertexId(11));
        let edge = graph.add_edge(a, b, "link").unwrap();
        assert_eq!(edge, EdgeId(12));
    }
}
