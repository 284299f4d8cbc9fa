//! Property-based tests for the cargodist link graph engine.
//!
//! Uses proptest to generate random graphs and maintenance sequences, then
//! verify that the active-edge lists and the flow bookkeeping stay sound.

use std::collections::BTreeSet;

use cargodist_core::id::*;
use cargodist_core::job::LinkGraphJob;
use cargodist_core::link_graph::{EdgeUpdateMode, LinkGraph, StationProvider};
use cargodist_core::path::{PATH_CAP_MAX_FREE, Path, UNLIMITED_SATURATION};
use cargodist_core::settings::LinkGraphSettings;
use cargodist_core::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// Maintenance operations. Node indices are taken modulo the current size.
#[derive(Debug, Clone)]
enum GraphOp {
    AddNode,
    RemoveNode(u16),
    UpdateEdge(u16, u16, u32, bool),
    RemoveEdge(u16, u16),
    Compress,
}

fn arb_op_sequence(max_ops: usize) -> impl Strategy<Value = Vec<GraphOp>> {
    proptest::collection::vec(
        prop_oneof![
            2 => Just(GraphOp::AddNode),
            1 => (0..32u16).prop_map(GraphOp::RemoveNode),
            4 => (0..32u16, 0..32u16, 1..1000u32, any::<bool>())
                .prop_map(|(a, b, cap, increase)| GraphOp::UpdateEdge(a, b, cap, increase)),
            2 => (0..32u16, 0..32u16).prop_map(|(a, b)| GraphOp::RemoveEdge(a, b)),
            1 => Just(GraphOp::Compress),
        ],
        1..=max_ops,
    )
}

/// A graph of up to `max_nodes` nodes with random links.
fn arb_graph(max_nodes: u16) -> impl Strategy<Value = LinkGraph> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec((0..n, 0..n, 1..500u32), 0..=usize::from(n) * 3).prop_map(
            move |links| {
                let (mut lg, _) = build_empty_graph(n);
                for (from, to, cap) in links {
                    if from != to {
                        lg.update_edge(from, to, cap, cap / 3, EdgeUpdateMode::REFRESH, 0);
                    }
                }
                lg
            },
        )
    })
}

// ===========================================================================
// Helpers
// ===========================================================================

/// Fails if some row's active list differs from its set of positive cells,
/// visits a target twice or contains a self link.
fn check_active_lists(lg: &LinkGraph) -> Result<(), TestCaseError> {
    for from in 0..lg.size() {
        let listed: Vec<NodeId> = lg.edges(from).map(|(to, _)| to).collect();
        let unique: BTreeSet<NodeId> = listed.iter().copied().collect();
        prop_assert_eq!(listed.len(), unique.len(), "duplicate in row {}", from);
        prop_assert!(!unique.contains(&from), "self link in row {}", from);
        let positive: BTreeSet<NodeId> = (0..lg.size())
            .filter(|&to| to != from && lg.edge(from, to).capacity() > 0)
            .collect();
        prop_assert_eq!(unique, positive, "row {}", from);
    }
    Ok(())
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of maintenance operations keeps the size at adds minus
    /// removes and every active list equal to the set of links with positive
    /// capacity.
    #[test]
    fn active_lists_match_capacities(ops in arb_op_sequence(60)) {
        let (mut lg, mut stations) = build_empty_graph(3);
        let mut next_station = 1000u16;
        let mut expected_size = 3u16;
        let mut today = 0;

        for op in ops {
            today += 1;
            let size = lg.size();
            match op {
                GraphOp::AddNode => {
                    let x = u32::from(next_station);
                    let station = stations.add(StationId(next_station), x, 7, 5, true);
                    next_station += 1;
                    let node = lg.add_node(station, &stations).unwrap();
                    stations.set_link_graph_node(station, passengers(), lg.id(), node);
                    expected_size += 1;
                }
                GraphOp::RemoveNode(i) if size > 0 => {
                    lg.remove_node(i % size, &mut stations);
                    expected_size -= 1;
                }
                GraphOp::UpdateEdge(a, b, cap, increase) if size > 1 => {
                    let (from, to) = (a % size, b % size);
                    if from != to {
                        let mode = if increase {
                            EdgeUpdateMode::INCREASE
                        } else {
                            EdgeUpdateMode::REFRESH
                        };
                        let mode = mode | EdgeUpdateMode::UNRESTRICTED;
                        lg.update_edge(from, to, cap, cap / 2, mode, today);
                    }
                }
                GraphOp::RemoveEdge(a, b) if size > 0 => {
                    lg.remove_edge(a % size, b % size);
                }
                GraphOp::Compress => lg.compress(today),
                _ => {}
            }
            prop_assert_eq!(lg.size(), expected_size);
            check_active_lists(&lg)?;
        }

        // Every station still points at the node holding it.
        for id in 0..lg.size() {
            let station = lg.node(id).station();
            prop_assert_eq!(stations.assigned_node(station, passengers()), Some(id));
        }
    }

    /// Compression never grows a figure and never drops a link.
    #[test]
    fn compress_is_monotonic(lg in arb_graph(12), now in 0..10_000i32) {
        let mut compressed = lg.clone();
        compressed.compress(now);
        prop_assert!(compressed.last_compression() >= lg.last_compression().min(now));
        prop_assert!(compressed.last_compression() <= lg.last_compression().max(now));
        for from in 0..lg.size() {
            prop_assert!(compressed.node(from).supply() <= lg.node(from).supply());
            for to in 0..lg.size() {
                let (before, after) = (lg.edge(from, to), compressed.edge(from, to));
                prop_assert!(after.capacity() <= before.capacity());
                prop_assert!(after.usage() <= before.usage());
                prop_assert_eq!(before.capacity() > 0, after.capacity() > 0);
            }
        }
        check_active_lists(&compressed)?;
    }

    /// Merging appends every node, keeps positive supplies positive and
    /// carries every link over.
    #[test]
    fn merge_keeps_everything(
        a in arb_graph(8),
        b in arb_graph(8),
        a_age in 0..500i32,
        b_age in 0..500i32,
    ) {
        let now = 500;
        let mut target = a.clone();
        target.shift_dates(now - a_age);
        let mut other = b.clone();
        other.shift_dates(now - b_age);
        let mut stations = TestStations::new();

        let first = target.size();
        target.merge(other, &mut stations, now).unwrap();
        prop_assert_eq!(target.size(), a.size() + b.size());
        for node in 0..b.size() {
            let merged = target.node(first + node);
            prop_assert_eq!(merged.supply() > 0, b.node(node).supply() > 0);
            prop_assert_eq!(
                stations.assigned_node(merged.station(), passengers()),
                Some(first + node)
            );
            for to in 0..b.size() {
                prop_assert_eq!(
                    target.edge(first + node, first + to).capacity() > 0,
                    b.edge(node, to).capacity() > 0
                );
            }
        }
        check_active_lists(&target)?;
    }

    /// The capacity ratio is total and keeps the sign of the free capacity.
    #[test]
    fn capacity_ratio_is_total(free in any::<i32>(), total in any::<u32>()) {
        let ratio = Path::capacity_ratio_of(free, total);
        if free > 0 {
            prop_assert!(ratio >= 0);
        } else if free < 0 {
            prop_assert!(ratio <= 0);
        }
    }

    /// However flow is pushed along a line, no edge carries more than the
    /// saturation allows.
    #[test]
    fn path_flow_respects_saturation(
        n in 2..8u16,
        capacity in 1..200u32,
        saturation in 1..=100u32,
        pushes in proptest::collection::vec((0..8u16, 1..100u32), 1..20),
    ) {
        let (lg, _) = build_line_graph(n, capacity);
        let settings = LinkGraphSettings { threaded: false, ..Default::default() };
        let mut job = LinkGraphJob::new(&lg, &settings, 0);
        let snapshot = job.snapshot_mut().unwrap();

        let root = snapshot.new_path(0, true);
        let mut chain = vec![root];
        for to in 1..n {
            let leg = snapshot.new_path(to, false);
            let parent = *chain.last().unwrap();
            let distance = snapshot.edge(to - 1, to).distance().max(1);
            snapshot.fork_path(leg, parent, capacity, capacity as i32, distance);
            chain.push(leg);
        }

        let usable = capacity * saturation / 100;
        for (end, flow) in pushes {
            let leg = chain[usize::from(end % (n - 1)) + 1];
            let admitted = snapshot.add_path_flow(leg, flow, saturation);
            prop_assert!(admitted <= flow);
        }
        for to in 1..n {
            prop_assert!(snapshot.edge(to - 1, to).flow() <= usable);
        }
        // Each leg carries everything that passed through it.
        for pair in chain.windows(2) {
            prop_assert!(snapshot.path(pair[0]).flow() >= snapshot.path(pair[1]).flow());
        }
    }

    /// Flow pushed at the counter limits is either recorded in full or not
    /// admitted; the admitted total always equals what the edges carry.
    #[test]
    fn admitted_flow_is_recorded(
        pushes in proptest::collection::vec(
            (any::<u32>(), prop_oneof![Just(UNLIMITED_SATURATION), 1..=400u32]),
            1..12,
        ),
    ) {
        let (lg, _) = build_line_graph(3, u32::MAX);
        let settings = LinkGraphSettings { threaded: false, ..Default::default() };
        let mut job = LinkGraphJob::new(&lg, &settings, 0);
        let snapshot = job.snapshot_mut().unwrap();
        let root = snapshot.new_path(0, true);
        let first = snapshot.new_path(1, false);
        let second = snapshot.new_path(2, false);
        snapshot.fork_path(first, root, u32::MAX, PATH_CAP_MAX_FREE, 1);
        snapshot.fork_path(second, first, u32::MAX, PATH_CAP_MAX_FREE, 1);

        let mut total = 0u64;
        for (flow, saturation) in pushes {
            total += u64::from(snapshot.add_path_flow(second, flow, saturation));
        }
        prop_assert!(total <= u64::from(u32::MAX));
        prop_assert_eq!(u64::from(snapshot.edge(0, 1).flow()), total);
        prop_assert_eq!(u64::from(snapshot.edge(1, 2).flow()), total);
        prop_assert_eq!(u64::from(snapshot.path(root).flow()), total);
    }
}
