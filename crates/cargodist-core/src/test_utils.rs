//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use std::collections::HashMap;

use crate::id::{CargoId, LinkGraphId, NodeId, StationId, TileXY};
use crate::job::{JobSnapshot, JobStage};
use crate::link_graph::{EdgeUpdateMode, LinkGraph, StationGoods, StationProvider};

// ===========================================================================
// Cargo constructors
// ===========================================================================

pub fn passengers() -> CargoId {
    CargoId(0)
}

// ===========================================================================
// In-memory stations
// ===========================================================================

/// A station provider backed by hash maps. Every station offers the same
/// goods entry for every cargo.
#[derive(Debug, Default, Clone)]
pub struct TestStations {
    goods: HashMap<StationId, StationGoods>,
    nodes: HashMap<(StationId, CargoId), (LinkGraphId, NodeId)>,
}

impl TestStations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a station at `(x, y)` and return its id.
    pub fn add(
        &mut self,
        station: StationId,
        x: u32,
        y: u32,
        supply: u32,
        acceptance: bool,
    ) -> StationId {
        self.goods.insert(
            station,
            StationGoods {
                xy: TileXY::new(x, y),
                supply,
                acceptance,
            },
        );
        station
    }

    /// Forget a station, as if it was demolished.
    pub fn remove(&mut self, station: StationId) {
        self.goods.remove(&station);
    }

    /// Node the station was last told it lives at.
    pub fn assigned_node(&self, station: StationId, cargo: CargoId) -> Option<NodeId> {
        self.nodes.get(&(station, cargo)).map(|&(_, node)| node)
    }

    /// Graph the station was last told it belongs to.
    pub fn assigned_graph(&self, station: StationId, cargo: CargoId) -> Option<LinkGraphId> {
        self.nodes.get(&(station, cargo)).map(|&(graph, _)| graph)
    }
}

impl StationProvider for TestStations {
    fn station_goods(&self, station: StationId, _cargo: CargoId) -> Option<StationGoods> {
        self.goods.get(&station).copied()
    }

    fn set_link_graph_node(
        &mut self,
        station: StationId,
        cargo: CargoId,
        link_graph: LinkGraphId,
        node: NodeId,
    ) {
        self.nodes.insert((station, cargo), (link_graph, node));
    }
}

// ===========================================================================
// Graph builders
// ===========================================================================

/// `n` passenger stations four tiles apart on a row, each with supply 10,
/// no links. The graph was last compressed on day 0.
pub fn build_empty_graph(n: u16) -> (LinkGraph, TestStations) {
    let mut stations = TestStations::new();
    let mut lg = LinkGraph::new(LinkGraphId::default(), passengers(), 0);
    for i in 0..n {
        let station = stations.add(StationId(i), u32::from(i) * 4, 0, 10, true);
        let node = lg
            .add_node(station, &stations)
            .expect("test station exists");
        stations.set_link_graph_node(station, passengers(), lg.id(), node);
    }
    (lg, stations)
}

/// Like [`build_empty_graph`], with links `i <-> i + 1` of `capacity`.
pub fn build_line_graph(n: u16, capacity: u32) -> (LinkGraph, TestStations) {
    let (mut lg, stations) = build_empty_graph(n);
    for i in 1..n {
        lg.update_edge(i - 1, i, capacity, 0, EdgeUpdateMode::UNRESTRICTED, 0);
        lg.update_edge(i, i - 1, capacity, 0, EdgeUpdateMode::UNRESTRICTED, 0);
    }
    (lg, stations)
}

/// Like [`build_empty_graph`], with every ordered pair linked. Capacities
/// differ per pair so relabelling mistakes show up.
pub fn build_full_graph(n: u16, capacity: u32) -> (LinkGraph, TestStations) {
    let (mut lg, stations) = build_empty_graph(n);
    for from in 0..n {
        for to in 0..n {
            if from != to {
                let cap = capacity + u32::from(from) * 100 + u32::from(to);
                lg.update_edge(from, to, cap, cap / 2, EdgeUpdateMode::UNRESTRICTED, 0);
            }
        }
    }
    (lg, stations)
}

// ===========================================================================
// Direct-route solver
// ===========================================================================

/// A minimal solver: every node splits its undelivered supply evenly over
/// its direct links and pushes it over a one-leg path.
#[derive(Debug, Clone, Copy)]
pub struct DirectRouteSolver {
    max_saturation: u32,
}

impl DirectRouteSolver {
    pub fn new(max_saturation: u32) -> Self {
        Self { max_saturation }
    }
}

impl JobStage for DirectRouteSolver {
    fn name(&self) -> &str {
        "direct route solver"
    }

    fn run(&self, job: &mut JobSnapshot) {
        for from in 0..job.size() {
            let targets: Vec<(NodeId, u32, u32)> = job
                .node(from)
                .edges()
                .map(|(to, edge)| (to, edge.capacity(), edge.distance()))
                .collect();
            if targets.is_empty() {
                continue;
            }
            let source = job.new_path(from, true);
            let mut remaining = targets.len() as u32;
            for (to, capacity, distance) in targets {
                let share = job.node(from).undelivered_supply() / remaining;
                remaining -= 1;
                if share == 0 {
                    continue;
                }
                job.node_mut(from).deliver_supply(to, share);
                let free = capacity.saturating_sub(job.edge(from, to).flow());
                let free = i32::try_from(free).unwrap_or(i32::MAX);
                let leg = job.new_path(to, false);
                job.fork_path(leg, source, capacity, free, distance.max(1));
                let admitted = job.add_path_flow(leg, share, self.max_saturation);
                job.edge_mut(from, to).satisfy_demand(admitted);
            }
        }
    }
}
