use crate::model::Direction;
use crate::steps::adjacency::{Expand, ExpandStep};
use crate::traversal::{owned, Edges, Traversal, Vertices};

impl<M> Traversal<Vertices, M> {
    fn expand<K2>(self, expand: Expand, dir: Direction, labels: &[&str]) -> Traversal<K2, M> {
        let labels = owned(labels);
        self.push(|p| p.add_step(Box::new(ExpandStep::new(expand, dir, labels))))
            .retype()
    }

    /// Adjacent vertices across outgoing edges, restricted to `labels` when
    /// non-empty.
    pub fn out(self, labels: &[&str]) -> Traversal<Vertices, M> {
        self.expand(Expand::Vertices, Direction::Out, labels)
    }

    pub fn in_(self, labels: &[&str]) -> Traversal<Vertices, M> {
        self.expand(Expand::Vertices, Direction::In, labels)
    }

    pub fn both(self, labels: &[&str]) -> Traversal<Vertices, M> {
        self.expand(Expand::Vertices, Direction::Both, labels)
    }

    pub fn out_e(self, labels: &[&str]) -> Traversal<Edges, M> {
        self.expand(Expand::Edges, Direction::Out, labels)
    }

    pub fn in_e(self, labels: &[&str]) -> Traversal<Edges, M> {
        self.expand(Expand::Edges, Direction::In, labels)
    }

    pub fn both_e(self, labels: &[&str]) -> Traversal<Edges, M> {
        self.expand(Expand::Edges, Direction::Both, labels)
    }
}
