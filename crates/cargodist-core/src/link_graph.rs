//! The persistent per-cargo link graph.
//!
//! A [`LinkGraph`] has one node per station handling its cargo and a dense
//! matrix of edges between them. Distances exist for every pair; an edge is
//! a real link only while its capacity is non-zero, and exactly those edges
//! are threaded into the row's active list.
//!
//! Besides incremental maintenance the graph owns two lifecycle policies:
//! [`LinkGraph::compress`] decays old figures, and [`LinkGraph::merge`]
//! absorbs another graph when two station networks join.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::date::{DAYS_PER_MONTH, Date, DateDelta, INVALID_DATE, inclusive_age, shift_valid};
use crate::graph::{EdgeIter, Graph, LinkedEdge};
use crate::id::{
    CargoId, INVALID_NODE, INVALID_STATION, LinkGraphId, NodeId, StationId, TileXY,
    distance_max_plus_manhattan,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while maintaining a link graph.
#[derive(Debug, thiserror::Error)]
pub enum LinkGraphError {
    #[error("station not found: {0:?}")]
    StationNotFound(StationId),
    #[error("link graph is full ({0} nodes)")]
    Full(usize),
}

/// Largest order a link graph can reach; [`INVALID_NODE`] stays reserved.
pub const MAX_NODES: usize = INVALID_NODE as usize;

// ---------------------------------------------------------------------------
// Station interface
// ---------------------------------------------------------------------------

/// What a station reports about one cargo when it joins a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationGoods {
    pub xy: TileXY,
    pub supply: u32,
    pub acceptance: bool,
}

/// The live station simulation, as seen by the link graph.
pub trait StationProvider {
    /// Goods entry of `station` for `cargo`, or `None` if the station is gone.
    fn station_goods(&self, station: StationId, cargo: CargoId) -> Option<StationGoods>;

    /// Record that `station`'s entry for `cargo` now lives at `node` of
    /// `link_graph`.
    fn set_link_graph_node(
        &mut self,
        station: StationId,
        cargo: CargoId,
        link_graph: LinkGraphId,
        node: NodeId,
    );
}

// ---------------------------------------------------------------------------
// Node and edge records
// ---------------------------------------------------------------------------

/// One station's participation in one cargo's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraphNode {
    pub(crate) supply: u32,
    pub(crate) demand: u32,
    pub(crate) station: StationId,
    pub(crate) xy: TileXY,
    pub(crate) last_update: Date,
}

impl Default for LinkGraphNode {
    fn default() -> Self {
        Self {
            supply: 0,
            demand: 0,
            station: INVALID_STATION,
            xy: TileXY::default(),
            last_update: INVALID_DATE,
        }
    }
}

impl LinkGraphNode {
    /// Cargo generated recently (decayed by compression).
    pub fn supply(&self) -> u32 {
        self.supply
    }

    /// Acceptance weight.
    pub fn demand(&self) -> u32 {
        self.demand
    }

    pub fn station(&self) -> StationId {
        self.station
    }

    pub fn xy(&self) -> TileXY {
        self.xy
    }

    /// Date supply last changed, or [`INVALID_DATE`].
    pub fn last_update(&self) -> Date {
        self.last_update
    }
}

/// A potential or established link between two nodes.
///
/// The diagonal cell of each row is not a link; it only carries the head of
/// the row's active list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraphEdge {
    pub(crate) distance: u32,
    pub(crate) capacity: u32,
    pub(crate) usage: u32,
    pub(crate) last_unrestricted_update: Date,
    pub(crate) last_restricted_update: Date,
    pub(crate) next_edge: NodeId,
}

impl Default for LinkGraphEdge {
    fn default() -> Self {
        Self {
            distance: 0,
            capacity: 0,
            usage: 0,
            last_unrestricted_update: INVALID_DATE,
            last_restricted_update: INVALID_DATE,
            next_edge: INVALID_NODE,
        }
    }
}

impl LinkedEdge for LinkGraphEdge {
    fn next_edge(&self) -> NodeId {
        self.next_edge
    }

    fn set_next_edge(&mut self, next: NodeId) {
        self.next_edge = next;
    }
}

impl LinkGraphEdge {
    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Observed capacity. Zero means the link does not exist.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn last_unrestricted_update(&self) -> Date {
        self.last_unrestricted_update
    }

    pub fn last_restricted_update(&self) -> Date {
        self.last_restricted_update
    }

    /// The later of the two update dates.
    pub fn last_update(&self) -> Date {
        self.last_unrestricted_update.max(self.last_restricted_update)
    }

    fn stamp(&mut self, mode: EdgeUpdateMode, now: Date) {
        if mode.contains(EdgeUpdateMode::UNRESTRICTED) {
            self.last_unrestricted_update = now;
        }
        if mode.contains(EdgeUpdateMode::RESTRICTED) {
            self.last_restricted_update = now;
        }
    }

    /// Update an existing link.
    fn update(&mut self, capacity: u32, usage: u32, mode: EdgeUpdateMode, now: Date) {
        debug_assert!(self.capacity > 0, "updating an absent edge");
        if mode.contains(EdgeUpdateMode::INCREASE) {
            self.capacity = self.capacity.saturating_add(capacity);
            self.usage = self.usage.saturating_add(usage);
        } else if mode.contains(EdgeUpdateMode::REFRESH) {
            self.capacity = self.capacity.max(capacity);
            self.usage = self.usage.max(usage);
        }
        self.stamp(mode, now);
    }

    /// Forget everything but the distance.
    fn clear_link(&mut self) {
        self.capacity = 0;
        self.usage = 0;
        self.last_unrestricted_update = INVALID_DATE;
        self.last_restricted_update = INVALID_DATE;
    }
}

// ---------------------------------------------------------------------------
// Edge update mode
// ---------------------------------------------------------------------------

/// Bit set selecting how [`LinkGraph::update_edge`] treats an existing link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EdgeUpdateMode(u8);

impl EdgeUpdateMode {
    /// Only stamp dates (when combined with a date flag).
    pub const NONE: Self = Self(0);
    /// Add capacity and usage to the existing figures.
    pub const INCREASE: Self = Self(1);
    /// Take the elementwise maximum of old and new figures.
    pub const REFRESH: Self = Self(1 << 1);
    /// Stamp the restricted update date.
    pub const RESTRICTED: Self = Self(1 << 2);
    /// Stamp the unrestricted update date.
    pub const UNRESTRICTED: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for EdgeUpdateMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// LinkGraph
// ---------------------------------------------------------------------------

/// The authoritative graph of one cargo.
#[derive(Debug, Clone)]
pub struct LinkGraph {
    id: LinkGraphId,
    cargo: CargoId,
    last_compression: Date,
    pub(crate) graph: Graph<LinkGraphNode, LinkGraphEdge>,
}

/// Scale `val` by `target_age / orig_age`, keeping positive values positive.
pub fn scale(val: u32, target_age: u32, orig_age: u32) -> u32 {
    if val == 0 {
        return 0;
    }
    let scaled = u64::from(val) * u64::from(target_age) / u64::from(orig_age.max(1));
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

impl LinkGraph {
    /// Create an empty graph for `cargo`, compressed as of `now`.
    pub fn new(id: LinkGraphId, cargo: CargoId, now: Date) -> Self {
        Self {
            id,
            cargo,
            last_compression: now,
            graph: Graph::new(),
        }
    }

    /// Rebuild an empty graph of known order, as done while loading.
    pub fn init(&mut self, size: NodeId) {
        self.graph.resize(size);
    }

    pub fn id(&self) -> LinkGraphId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: LinkGraphId) {
        self.id = id;
    }

    pub fn cargo(&self) -> CargoId {
        self.cargo
    }

    pub fn last_compression(&self) -> Date {
        self.last_compression
    }

    pub fn size(&self) -> NodeId {
        self.graph.size()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn graph(&self) -> &Graph<LinkGraphNode, LinkGraphEdge> {
        &self.graph
    }

    pub fn node(&self, id: NodeId) -> &LinkGraphNode {
        self.graph.node(id).data()
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> &LinkGraphEdge {
        self.graph.edge(from, to)
    }

    /// Active links leaving `from`.
    pub fn edges(&self, from: NodeId) -> EdgeIter<'_, LinkGraphEdge> {
        self.graph.edges(from)
    }

    /// Scale `base` from the period since the last compression to a month.
    pub fn monthly(&self, base: u32, now: Date) -> u32 {
        let age = inclusive_age(now, self.last_compression);
        let monthly = u64::from(base) * u64::from(DAYS_PER_MONTH) / u64::from(age);
        monthly.min(u64::from(u32::MAX)) as u32
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Add a node for `station` and return its id.
    ///
    /// The node's figures come from the station's goods entry. Distances to
    /// every existing node are computed in both directions; the new node
    /// starts without links.
    pub fn add_node(
        &mut self,
        station: StationId,
        stations: &impl StationProvider,
    ) -> Result<NodeId, LinkGraphError> {
        let goods = stations
            .station_goods(station, self.cargo)
            .ok_or(LinkGraphError::StationNotFound(station))?;
        if self.graph.nodes().len() >= MAX_NODES {
            return Err(LinkGraphError::Full(MAX_NODES));
        }
        let id = self.graph.push_node(LinkGraphNode {
            supply: goods.supply,
            demand: u32::from(goods.acceptance),
            station,
            xy: goods.xy,
            last_update: INVALID_DATE,
        });
        self.init_distances(id);
        Ok(id)
    }

    /// Fill the distance of every cell in row and column `id`.
    fn init_distances(&mut self, id: NodeId) {
        let xy = self.node(id).xy;
        for other in 0..=id {
            let distance = distance_max_plus_manhattan(xy, self.node(other).xy);
            self.graph.edge_mut(id, other).distance = distance;
            self.graph.edge_mut(other, id).distance = distance;
        }
    }

    /// Remove node `id` by moving the last node into its slot.
    ///
    /// Every link into `id` is dropped, every reference to the last node is
    /// relabelled to `id`, and the relocated station is told its new node
    /// id. The edge matrix keeps its height; the stale column past the new
    /// order is reset the next time a node is added.
    pub fn remove_node(&mut self, id: NodeId, stations: &mut impl StationProvider) {
        let size = self.size();
        debug_assert!(id < size, "node {id} out of range");
        let last = size - 1;

        for i in 0..size {
            let mut row = self.graph.node_mut(i);
            if i != id && row.edge(id).capacity > 0 {
                row.unlink(id);
            }
            row.relabel(last, id);
            let moved = row.edge(last).clone();
            *row.edge_mut(id) = moved;
        }

        if id != last {
            let station = self.node(last).station;
            stations.set_link_graph_node(station, self.cargo, self.id, id);
        }

        let removed = self.graph.swap_remove_node(id);
        tracing::debug!(
            cargo = self.cargo.0,
            node = id,
            station = removed.station.0,
            remaining = self.graph.nodes().len(),
            "removed link graph node"
        );
    }

    /// Record that the station behind `id` moved to `xy`.
    pub fn update_distances(&mut self, id: NodeId, xy: TileXY) {
        debug_assert!(id < self.size(), "node {id} out of range");
        self.graph.node_mut(id).data_mut().xy = xy;
        for other in 0..self.size() {
            if other == id {
                continue;
            }
            let distance = distance_max_plus_manhattan(xy, self.node(other).xy);
            self.graph.edge_mut(id, other).distance = distance;
            self.graph.edge_mut(other, id).distance = distance;
        }
    }

    /// Add `supply` to the node and stamp its update date.
    pub fn update_supply(&mut self, id: NodeId, supply: u32, now: Date) {
        let mut node = self.graph.node_mut(id);
        let data = node.data_mut();
        data.supply = data.supply.saturating_add(supply);
        data.last_update = now;
    }

    /// Set the acceptance weight of a node.
    pub fn set_demand(&mut self, id: NodeId, demand: u32) {
        self.graph.node_mut(id).data_mut().demand = demand;
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Create or update the link `from -> to`.
    ///
    /// A new link is inserted at the head of `from`'s active list. For an
    /// existing link `mode` decides between adding and taking the maximum.
    /// Requires `capacity > 0` and `usage <= capacity`.
    pub fn update_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        capacity: u32,
        usage: u32,
        mode: EdgeUpdateMode,
        now: Date,
    ) {
        debug_assert!(capacity > 0, "edge capacity must be positive");
        debug_assert!(usage <= capacity, "usage {usage} exceeds capacity {capacity}");
        debug_assert_ne!(from, to, "self links are not allowed");
        let capacity = capacity.max(1);
        let usage = usage.min(capacity);

        let mut node = self.graph.node_mut(from);
        if node.edge(to).capacity == 0 {
            let edge = node.link(to);
            edge.capacity = capacity;
            edge.usage = usage;
            edge.stamp(mode, now);
        } else {
            node.edge_mut(to).update(capacity, usage, mode, now);
        }
    }

    /// Drop the link `from -> to`. The cell keeps its distance. Does nothing
    /// if there is no such link.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        let mut node = self.graph.node_mut(from);
        if from == to || node.edge(to).capacity == 0 {
            return;
        }
        node.unlink(to).clear_link();
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Halve supply, usage and capacity so the graph reflects recent
    /// activity. Existing links keep a capacity of at least one.
    pub fn compress(&mut self, now: Date) {
        let midpoint = (i64::from(now) + i64::from(self.last_compression)) / 2;
        self.last_compression = midpoint as Date;
        let size = self.size();
        for id in 0..size {
            let mut node = self.graph.node_mut(id);
            node.data_mut().supply /= 2;
            for to in 0..size {
                let edge = node.edge_mut(to);
                if edge.capacity > 0 {
                    edge.capacity = (edge.capacity / 2).max(1);
                    edge.usage /= 2;
                }
            }
        }
        tracing::trace!(
            cargo = self.cargo.0,
            last_compression = self.last_compression,
            "compressed link graph"
        );
    }

    /// Absorb `other` into this graph.
    ///
    /// Its nodes are appended after the existing ones and its figures are
    /// scaled from its own age to this graph's age. Every absorbed station is
    /// pointed at this graph.
    pub fn merge(
        &mut self,
        other: LinkGraph,
        stations: &mut impl StationProvider,
        now: Date,
    ) -> Result<(), LinkGraphError> {
        let age = inclusive_age(now, self.last_compression);
        let other_age = inclusive_age(now, other.last_compression);
        let first = self.size();
        if usize::from(first) + usize::from(other.size()) > MAX_NODES {
            return Err(LinkGraphError::Full(MAX_NODES));
        }

        let rebase = |edge: &LinkGraphEdge| {
            let mut edge = edge.clone();
            edge.capacity = scale(edge.capacity, age, other_age);
            edge.usage = scale(edge.usage, age, other_age);
            if edge.next_edge != INVALID_NODE {
                edge.next_edge += first;
            }
            edge
        };

        for node1 in 0..other.size() {
            let source = other.node(node1);
            let new_node = self.graph.push_node(LinkGraphNode {
                supply: scale(source.supply, age, other_age),
                ..source.clone()
            });
            self.init_distances(new_node);
            stations.set_link_graph_node(source.station, self.cargo, self.id, new_node);

            for node2 in 0..node1 {
                *self.graph.edge_mut(new_node, first + node2) = rebase(other.edge(node1, node2));
                *self.graph.edge_mut(first + node2, new_node) = rebase(other.edge(node2, node1));
            }
            *self.graph.edge_mut(new_node, new_node) = rebase(other.edge(node1, node1));
        }

        tracing::debug!(
            cargo = self.cargo.0,
            absorbed = other.size(),
            size = self.size(),
            "merged link graphs"
        );
        Ok(())
    }

    /// Move every valid timestamp by `interval` days.
    pub fn shift_dates(&mut self, interval: DateDelta) {
        self.last_compression = self.last_compression.saturating_add(interval);
        let size = self.size();
        for from in 0..size {
            let mut node = self.graph.node_mut(from);
            let data = node.data_mut();
            data.last_update = shift_valid(data.last_update, interval);
            for to in 0..size {
                let edge = node.edge_mut(to);
                edge.last_unrestricted_update =
                    shift_valid(edge.last_unrestricted_update, interval);
                edge.last_restricted_update = shift_valid(edge.last_restricted_update, interval);
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
