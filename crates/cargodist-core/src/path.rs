//! Flow accounting legs.
//!
//! A solver builds trees of [`Path`]s while it assigns flow: the root sits
//! at an origin node and every other path is one leg, forked off its
//! parent, that ends at `node`. Paths are stored in a job-scoped arena and
//! refer to their parent by [`PathId`]; a parent does not own its children.
//! The operations that touch the job's edges live on
//! [`JobSnapshot`](crate::job::JobSnapshot).

use crate::id::{INVALID_NODE, NodeId};

/// Scale factor of [`Path::capacity_ratio_of`].
pub const PATH_CAP_MULTIPLIER: i32 = 16;
/// Lowest free capacity that can be scaled without overflowing `i32`.
pub const PATH_CAP_MIN_FREE: i32 = (i32::MIN + 1) / PATH_CAP_MULTIPLIER;
/// Highest free capacity that can be scaled without overflowing `i32`.
pub const PATH_CAP_MAX_FREE: i32 = (i32::MAX - 1) / PATH_CAP_MULTIPLIER;

/// Saturation value that disables capacity clamping in
/// [`JobSnapshot::add_path_flow`](crate::job::JobSnapshot::add_path_flow).
pub const UNLIMITED_SATURATION: u32 = u32::MAX;

/// Index of a path in its job's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathId(pub(crate) u32);

impl PathId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One leg of a flow tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub(crate) node: NodeId,
    pub(crate) origin: NodeId,
    pub(crate) capacity: u32,
    pub(crate) free_capacity: i32,
    pub(crate) flow: u32,
    pub(crate) distance: u32,
    pub(crate) parent: Option<PathId>,
    pub(crate) num_children: u32,
}

impl Path {
    /// A fresh path ending at `node`.
    ///
    /// A source path is the root of a tree: it has unlimited capacity and no
    /// distance. Any other path starts unreachable until it is forked.
    pub fn new(node: NodeId, source: bool) -> Self {
        if source {
            Self {
                node,
                origin: node,
                capacity: u32::MAX,
                free_capacity: i32::MAX,
                flow: 0,
                distance: 0,
                parent: None,
                num_children: 0,
            }
        } else {
            Self {
                node,
                origin: INVALID_NODE,
                capacity: 0,
                free_capacity: i32::MIN,
                flow: 0,
                distance: u32::MAX,
                parent: None,
                num_children: 0,
            }
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Node the flow of this tree comes from.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Smallest edge capacity from the root up to this leg.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Smallest remaining capacity from the root up to this leg. Negative
    /// when some edge is overloaded.
    pub fn free_capacity(&self) -> i32 {
        self.free_capacity
    }

    pub fn flow(&self) -> u32 {
        self.flow
    }

    /// Accumulated distance from the origin.
    pub fn distance(&self) -> u32 {
        self.distance
    }

    pub fn parent(&self) -> Option<PathId> {
        self.parent
    }

    pub fn num_children(&self) -> u32 {
        self.num_children
    }

    /// Whether anything still depends on this path.
    pub fn is_in_use(&self) -> bool {
        self.num_children > 0 || self.flow > 0
    }

    /// Headroom of this path relative to its capacity.
    pub fn capacity_ratio(&self) -> i32 {
        Self::capacity_ratio_of(self.free_capacity, self.capacity)
    }

    /// `free / total`, scaled by [`PATH_CAP_MULTIPLIER`].
    ///
    /// `free` is clamped first so the scaled value always fits an `i32`.
    pub fn capacity_ratio_of(free: i32, total: u32) -> i32 {
        let free = free.clamp(PATH_CAP_MIN_FREE, PATH_CAP_MAX_FREE);
        let ratio = i64::from(free) * i64::from(PATH_CAP_MULTIPLIER) / i64::from(total.max(1));
        ratio as i32
    }
}
