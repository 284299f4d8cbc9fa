//! Generic dense directed graph with per-row active-edge lists.
//!
//! Edges live in an `order x order` [`EdgeMatrix`], so any `(from, to)` cell
//! is reachable in O(1). Only some cells are real links; those are threaded
//! into a singly-linked list per row, stored as indices inside the cells
//! themselves:
//!
//! - `edges[from][from].next_edge()` is the first active destination of
//!   `from` (the diagonal cell is the list head, never a link);
//! - each active cell's `next_edge()` names the next active destination;
//! - [`INVALID_NODE`] terminates the list.
//!
//! Walking a row therefore costs O(active edges), not O(order).

use crate::id::{INVALID_NODE, NodeId};
use crate::matrix::EdgeMatrix;

// ---------------------------------------------------------------------------
// Edge link trait
// ---------------------------------------------------------------------------

/// Access to the intrusive list pointer embedded in an edge cell.
///
/// `Default` for an implementing type must yield an unlinked cell
/// (`next_edge() == INVALID_NODE`).
pub trait LinkedEdge {
    fn next_edge(&self) -> NodeId;
    fn set_next_edge(&mut self, next: NodeId);
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A directed graph over `Node` values with dense `Edge` storage.
#[derive(Debug, Clone, Default)]
pub struct Graph<N, E> {
    nodes: Vec<N>,
    edges: EdgeMatrix<E>,
}

impl<N, E> Graph<N, E>
where
    N: Default + Clone,
    E: LinkedEdge + Default + Clone,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: EdgeMatrix::new(),
        }
    }

    /// Number of nodes (the order of the graph).
    pub fn size(&self) -> NodeId {
        debug_assert_eq!(self.edges.width(), self.nodes.len());
        debug_assert!(self.edges.height() >= self.nodes.len());
        self.nodes.len() as NodeId
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate `size` default nodes and a `size x size` edge matrix.
    ///
    /// Only valid on an empty graph; used when rebuilding a graph of known
    /// order, e.g. while loading.
    pub fn resize(&mut self, size: NodeId) {
        debug_assert!(self.is_empty(), "resize is only allowed on an empty graph");
        let n = usize::from(size);
        self.nodes = vec![N::default(); n];
        self.edges = EdgeMatrix::with_size(n, n);
    }

    /// Append `node` and return its id. The new row and column are reset to
    /// unlinked default cells.
    pub fn push_node(&mut self, node: N) -> NodeId {
        let id = self.nodes.len();
        debug_assert!(id < usize::from(INVALID_NODE), "graph order exhausted");
        self.nodes.push(node);
        let size = id + 1;
        self.edges.grow(size, size);
        for from in 0..size {
            self.edges[from][id] = E::default();
        }
        self.edges[id].fill(E::default());
        id as NodeId
    }

    /// Read-only view of a node and its edge row.
    pub fn node(&self, id: NodeId) -> NodeRef<'_, N, E> {
        let index = usize::from(id);
        NodeRef {
            id,
            node: &self.nodes[index],
            edges: &self.edges[index][..self.nodes.len()],
        }
    }

    /// Mutable view of a node and its edge row.
    pub fn node_mut(&mut self, id: NodeId) -> NodeMut<'_, N, E> {
        let index = usize::from(id);
        let size = self.nodes.len();
        NodeMut {
            id,
            node: &mut self.nodes[index],
            edges: &mut self.edges[index][..size],
        }
    }

    /// All node values in id order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// The edge cell `from -> to`, whether or not it is an active link.
    pub fn edge(&self, from: NodeId, to: NodeId) -> &E {
        &self.edges[usize::from(from)][usize::from(to)]
    }

    /// Mutable edge cell `from -> to`. Callers must not touch `next_edge`.
    pub fn edge_mut(&mut self, from: NodeId, to: NodeId) -> &mut E {
        &mut self.edges[usize::from(from)][usize::from(to)]
    }

    /// Iterate the active edges leaving `from`.
    pub fn edges(&self, from: NodeId) -> EdgeIter<'_, E> {
        EdgeIter::begin(&self.edges[usize::from(from)][..self.nodes.len()], from)
    }

    /// Remove node `id` and its row, moving the last node and row into the
    /// gap. Columns are left alone: the owner must already have copied
    /// column `last` into column `id` in every row and fixed the lists.
    pub(crate) fn swap_remove_node(&mut self, id: NodeId) -> N {
        let index = usize::from(id);
        self.edges.erase_row(index);
        self.nodes.swap_remove(index)
    }
}

// ---------------------------------------------------------------------------
// Node wrappers
// ---------------------------------------------------------------------------

/// A node bundled with its id and its full edge row.
#[derive(Debug)]
pub struct NodeRef<'a, N, E> {
    id: NodeId,
    node: &'a N,
    edges: &'a [E],
}

impl<'a, N, E: LinkedEdge> NodeRef<'a, N, E> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> &'a N {
        self.node
    }

    /// The cell towards `to`.
    pub fn edge(&self, to: NodeId) -> &'a E {
        &self.edges[usize::from(to)]
    }

    /// Active edges leaving this node.
    pub fn edges(&self) -> EdgeIter<'a, E> {
        EdgeIter::begin(self.edges, self.id)
    }
}

/// Mutable node wrapper. The only way to restructure a row's edge list.
#[derive(Debug)]
pub struct NodeMut<'a, N, E> {
    id: NodeId,
    node: &'a mut N,
    edges: &'a mut [E],
}

impl<N, E: LinkedEdge> NodeMut<'_, N, E> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> &N {
        &*self.node
    }

    pub fn data_mut(&mut self) -> &mut N {
        &mut *self.node
    }

    pub fn edge(&self, to: NodeId) -> &E {
        &self.edges[usize::from(to)]
    }

    /// Mutable cell towards `to`. Callers must not touch `next_edge`.
    pub fn edge_mut(&mut self, to: NodeId) -> &mut E {
        &mut self.edges[usize::from(to)]
    }

    pub fn edges(&self) -> EdgeIter<'_, E> {
        EdgeIter::begin(&*self.edges, self.id)
    }

    /// Whether `to` is currently in this row's active list.
    pub fn is_linked(&self, to: NodeId) -> bool {
        self.edges().any(|(id, _)| id == to)
    }

    /// Insert `to` at the head of the active list and return its cell.
    pub fn link(&mut self, to: NodeId) -> &mut E {
        debug_assert_ne!(self.id, to, "a node cannot link to itself");
        let head = self.edges[usize::from(self.id)].next_edge();
        self.edges[usize::from(to)].set_next_edge(head);
        self.edges[usize::from(self.id)].set_next_edge(to);
        &mut self.edges[usize::from(to)]
    }

    /// Remove `to` from the active list and return the detached cell so the
    /// caller can reset it.
    ///
    /// `to` must be in the list; walking off the end is a contract violation.
    pub fn unlink(&mut self, to: NodeId) -> &mut E {
        debug_assert_ne!(self.id, to, "the list head cannot be unlinked");
        let mut prev = usize::from(self.id);
        loop {
            let next = self.edges[prev].next_edge();
            debug_assert_ne!(next, INVALID_NODE, "{} -> {to} is not an active edge", self.id);
            if next == INVALID_NODE {
                break;
            }
            if next == to {
                let after = self.edges[usize::from(to)].next_edge();
                self.edges[prev].set_next_edge(after);
                self.edges[usize::from(to)].set_next_edge(INVALID_NODE);
                break;
            }
            prev = usize::from(next);
        }
        &mut self.edges[usize::from(to)]
    }

    /// Rewrite the list entry pointing at `old` so it points at `new`.
    /// Does nothing if `old` is not linked.
    pub fn relabel(&mut self, old: NodeId, new: NodeId) {
        let mut prev = usize::from(self.id);
        let mut next = self.edges[prev].next_edge();
        while next != INVALID_NODE {
            if next == old {
                self.edges[prev].set_next_edge(new);
                return;
            }
            prev = usize::from(next);
            next = self.edges[prev].next_edge();
        }
    }
}

// ---------------------------------------------------------------------------
// Edge iterator
// ---------------------------------------------------------------------------

/// Forward iterator over one row's active-edge list. Yields `(to, &edge)`.
#[derive(Debug)]
pub struct EdgeIter<'a, E> {
    row: &'a [E],
    current: NodeId,
}

impl<'a, E: LinkedEdge> EdgeIter<'a, E> {
    fn begin(row: &'a [E], from: NodeId) -> Self {
        Self {
            current: row[usize::from(from)].next_edge(),
            row,
        }
    }

    /// The destination the iterator will yield next, or [`INVALID_NODE`].
    pub fn current(&self) -> NodeId {
        self.current
    }
}

impl<E> Clone for EdgeIter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            row: self.row,
            current: self.current,
        }
    }
}

impl<E> PartialEq for EdgeIter<'_, E> {
    /// Iterators over different rows never compare equal, even when both
    /// are exhausted.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.row.as_ptr(), other.row.as_ptr()) && self.current == other.current
    }
}

impl<'a, E: LinkedEdge> Iterator for EdgeIter<'a, E> {
    type Item = (NodeId, &'a E);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == INVALID_NODE {
            return None;
        }
        let to = self.current;
        let edge = &self.row[usize::from(to)];
        self.current = edge.next_edge();
        Some((to, edge))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
