use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct VertexId(pub u64);
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EdgeId(pub u64);

/// Opaque handle to a vertex or edge owned by a [`GraphAccess`](crate::graph::GraphAccess).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Element {
    Vertex(VertexId),
    Edge(EdgeId),
}

impl Element {
    pub fn id(&self) -> u64 {
        match self {
            Element::Vertex(v) => v.0,
            Element::Edge(e) => e.0,
        }
    }

    pub fn as_vertex(&self) -> Option<VertexId> {
        match self {
            Element::Vertex(v) => Some(*v),
            Element::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<EdgeId> {
        match self {
            Element::Edge(e) => Some(*e),
            Element::Vertex(_) => None,
        }
    }
}

/// Adjacency direction relative to the vertex being expanded.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v[{}]", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e[{}]", self.0)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Vertex(v) => v.fmt(f),
            Element::Edge(e) => e.fmt(f),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "out"),
            Direction::In => write!(f, "in"),
            Direction::Both => write!(f, "both"),
        }
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

impl From<u64> for EdgeId {
    fn from(value: u64) -> Self {
        EdgeId(value)
    }
}

impl From<VertexId> for Element {
    fn from(value: VertexId) -> Self {
        Element::Vertex(value)
    }
}

impl From<EdgeId> for Element {
    fn from(value: EdgeId) -> Self {
        Element::Edge(value)
    }
}
