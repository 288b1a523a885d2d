use crate::model::Direction;
use crate::steps::adjacency::{Expand, ExpandStep};
use crate::steps::transform::{self, MapStep};
use crate::traversal::{Edges, Traversal, Values, Vertices};

impl<M> Traversal<Edges, M> {
    fn endpoints(self, dir: Direction) -> Traversal<Vertices, M> {
        self.push(|p| {
            p.add_step(Box::new(ExpandStep::new(
                Expand::EdgeVertices,
                dir,
                Vec::new(),
            )))
        })
        .retype()
    }

    /// Tail vertex of each edge.
    pub fn out_v(self) -> Traversal<Vertices, M> {
        self.endpoints(Direction::Out)
    }

    /// Head vertex of each edge.
    pub fn in_v(self) -> Traversal<Vertices, M> {
        self.endpoints(Direction::In)
    }

    /// Tail then head.
    pub fn both_v(self) -> Traversal<Vertices, M> {
        self.endpoints(Direction::Both)
    }

    pub fn label(self) -> Traversal<Values, M> {
        self.push(|p| p.add_step(Box::new(MapStep::new("label", transform::label()))))
            .retype()
    }
}
