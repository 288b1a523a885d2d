use crate::steps::order::{Order, OrderMapStep};
use crate::steps::transform::{self, MapStep};
use crate::traversal::{Edges, Traversal, Values, Vertices};

impl<M> Traversal<Values, M> {
    /// Resolves integer ids to vertices; unknown ids are dropped.
    pub fn id_vertex(self) -> Traversal<Vertices, M> {
        self.push(|p| p.add_step(Box::new(MapStep::new("id_vertex", transform::id_vertex()))))
            .retype()
    }

    pub fn id_edge(self) -> Traversal<Edges, M> {
        self.push(|p| p.add_step(Box::new(MapStep::new("id_edge", transform::id_edge()))))
            .retype()
    }

    /// Emits each map's keys ordered by their values.
    pub fn order_map(self, order: Order) -> Self {
        self.push(|p| p.add_step(Box::new(OrderMapStep::new(order))))
    }
}
