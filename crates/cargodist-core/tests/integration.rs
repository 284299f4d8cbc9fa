//! Integration tests for the cargodist link graph engine.
//!
//! These exercise the public API end to end: building graphs, running jobs
//! inline and on workers, mapping flows and saving/loading.

use std::sync::Arc;

use cargodist_core::flow_mapper::FlowMapper;
use cargodist_core::id::*;
use cargodist_core::job::{JobStage, JobStages, LinkGraphJob, create_job};
use cargodist_core::link_graph::{EdgeUpdateMode, LinkGraph};
use cargodist_core::pool::{LinkGraphJobPool, LinkGraphPool};
use cargodist_core::serialize::load_link_graph;
use cargodist_core::settings::LinkGraphSettings;
use cargodist_core::test_utils::*;

fn solver_stages() -> JobStages {
    let stages: Vec<Box<dyn JobStage>> = vec![
        Box::new(DirectRouteSolver::new(100)),
        Box::new(FlowMapper::new(true)),
    ];
    stages.into()
}

fn settings(threaded: bool) -> LinkGraphSettings {
    LinkGraphSettings {
        threaded,
        ..Default::default()
    }
}

// ===========================================================================
// Test 1: Three stations, one forked path
// ===========================================================================
//
// A --10--> B --10--> C. Five units along A -> B -> C land on both legs, and
// the root carries the sum of its descendants.

#[test]
fn three_station_chain_flow() {
    let mut stations = TestStations::new();
    let a = stations.add(StationId(10), 0, 0, 50, true);
    let b = stations.add(StationId(11), 5, 0, 0, true);
    let c = stations.add(StationId(12), 10, 0, 0, true);

    let mut lg = LinkGraph::new(LinkGraphId::default(), passengers(), 0);
    let na = lg.add_node(a, &stations).unwrap();
    let nb = lg.add_node(b, &stations).unwrap();
    let nc = lg.add_node(c, &stations).unwrap();
    lg.update_edge(na, nb, 10, 0, EdgeUpdateMode::UNRESTRICTED, 0);
    lg.update_edge(nb, nc, 10, 0, EdgeUpdateMode::UNRESTRICTED, 0);

    let mut job = LinkGraphJob::new(&lg, &settings(false), 1);
    let snapshot = job.snapshot_mut().unwrap();
    let root = snapshot.new_path(na, true);
    let ab = snapshot.new_path(nb, false);
    let bc = snapshot.new_path(nc, false);
    let d_ab = snapshot.edge(na, nb).distance();
    let d_bc = snapshot.edge(nb, nc).distance();
    snapshot.fork_path(ab, root, 10, 10, d_ab);
    snapshot.fork_path(bc, ab, 10, 10, d_bc);

    assert_eq!(snapshot.add_path_flow(bc, 5, 100), 5);
    assert_eq!(snapshot.path(ab).flow(), 5);
    assert_eq!(snapshot.path(bc).flow(), 5);
    assert_eq!(snapshot.path(root).flow(), 5);
    assert_eq!(snapshot.edge(na, nb).flow(), 5);
    assert_eq!(snapshot.edge(nb, nc).flow(), 5);
    assert_eq!(snapshot.path(bc).distance(), d_ab + d_bc);

    FlowMapper::new(false).run(snapshot);
    assert_eq!(snapshot.node(na).flows().via(a, b), 5);
    assert_eq!(snapshot.node(nb).flows().via(a, c), 5);
    assert_eq!(snapshot.node(nc).flows().via(a, c), 5);
}

// ===========================================================================
// Test 2: Threaded and inline jobs agree
// ===========================================================================

#[test]
fn threaded_and_inline_jobs_agree() {
    let (mut lg, _) = build_line_graph(5, 40);
    for node in 0..lg.size() {
        lg.update_supply(node, 30 * u32::from(node + 1), 0);
    }
    let stages = solver_stages();

    let mut inline = LinkGraphJob::new(&lg, &settings(false), 20);
    inline.spawn_thread(Arc::clone(&stages)).unwrap();

    let mut threaded = LinkGraphJob::new(&lg, &settings(true), 20);
    threaded.spawn_thread(stages).unwrap();
    let joined = threaded.join_thread().unwrap();

    let inline = inline.snapshot().unwrap();
    for node in 0..lg.size() {
        assert_eq!(inline.node(node).flows(), joined.node(node).flows());
        assert_eq!(
            inline.node(node).undelivered_supply(),
            joined.node(node).undelivered_supply()
        );
    }
    assert!(joined.paths().is_empty());
}

// ===========================================================================
// Test 3: Scheduler-style round over pools
// ===========================================================================

#[test]
fn pooled_jobs_round() {
    let mut graphs = LinkGraphPool::with_default_capacity();
    let mut jobs = LinkGraphJobPool::with_default_capacity();
    let settings = settings(true);
    let stages = solver_stages();

    let mut ids = Vec::new();
    for n in 2..5u16 {
        let (lg, _) = build_line_graph(n, 20);
        let bytes = lg.serialize().unwrap();
        ids.push(load_link_graph(&mut graphs, &bytes).unwrap());
    }

    let today = 100;
    let mut job_ids = Vec::new();
    for &id in &ids {
        let lg = graphs.get(id).unwrap();
        let job_id = create_job(&mut jobs, lg, &settings, today).unwrap();
        jobs.get_mut(job_id)
            .unwrap()
            .spawn_thread(Arc::clone(&stages))
            .unwrap();
        job_ids.push(job_id);
    }
    assert_eq!(jobs.len(), 3);

    let join_day = today + i32::from(settings.recalc_time);
    for job_id in job_ids {
        let job = jobs.get_mut(job_id).unwrap();
        assert!(!job.is_finished(join_day - 1));
        assert!(job.is_finished(join_day));
        let graph_id = job.link_graph_id();
        let snapshot = job.join_thread().unwrap();
        assert_eq!(snapshot.size(), graphs.get(graph_id).unwrap().size());
        let total: u32 = (0..snapshot.size())
            .map(|n| snapshot.node(n).flows().total())
            .sum();
        assert!(total > 0);
        jobs.remove(job_id);
    }
    assert!(jobs.is_empty());
}

// ===========================================================================
// Test 4: Node removal followed by a save/load round trip
// ===========================================================================
//
// Removing the middle of five fully linked nodes moves node 4 into slot 2.
// The reloaded graph must match the original under that renumbering.

#[test]
fn remove_middle_node_then_round_trip() {
    let (mut lg, mut stations) = build_full_graph(5, 1000);
    let original = lg.clone();
    lg.remove_node(2, &mut stations);
    assert_eq!(lg.size(), 4);

    let restored = LinkGraph::deserialize(&lg.serialize().unwrap()).unwrap();
    // new id -> old id
    let old = |id: NodeId| if id == 2 { 4 } else { id };
    for from in 0..restored.size() {
        assert_eq!(restored.node(from), original.node(old(from)));
        for to in 0..restored.size() {
            let (now, before) = (restored.edge(from, to), original.edge(old(from), old(to)));
            assert_eq!(now.capacity(), before.capacity(), "{from} -> {to}");
            assert_eq!(now.usage(), before.usage());
            assert_eq!(now.distance(), before.distance());
        }
        let mut targets: Vec<NodeId> = restored.edges(from).map(|(to, _)| to).collect();
        targets.sort_unstable();
        let expected: Vec<NodeId> = (0..4).filter(|&to| to != from).collect();
        assert_eq!(targets, expected);
    }
    assert_eq!(
        stations.assigned_node(original.node(4).station(), passengers()),
        Some(2)
    );
}

// ===========================================================================
// Test 5: Merge, compress and shift between jobs
// ===========================================================================

#[test]
fn maintenance_between_jobs() {
    let (mut a, mut stations) = build_line_graph(3, 64);
    let mut b = LinkGraph::new(LinkGraphId::default(), passengers(), 0);
    for i in 0..2u16 {
        let station = stations.add(StationId(100 + i), 50 + u32::from(i), 50, 8, true);
        b.add_node(station, &stations).unwrap();
    }
    b.update_edge(0, 1, 16, 4, EdgeUpdateMode::UNRESTRICTED, 0);

    a.merge(b, &mut stations, 10).unwrap();
    assert_eq!(a.size(), 5);
    assert_eq!(a.edge(3, 4).capacity(), 16);
    assert_eq!(stations.assigned_graph(StationId(101), passengers()), Some(a.id()));
    assert_eq!(stations.assigned_node(StationId(101), passengers()), Some(4));

    a.compress(20);
    assert_eq!(a.edge(0, 1).capacity(), 32);
    assert_eq!(a.edge(3, 4).capacity(), 8);
    assert_eq!(a.last_compression(), 10);

    let mut job = LinkGraphJob::new(&a, &settings(false), 30);
    job.spawn_thread(solver_stages()).unwrap();
    let snapshot = job.join_thread().unwrap();
    let merged_station = snapshot.node(3).station();
    assert!(snapshot.node(3).flows().get(merged_station).is_some());

    a.shift_dates(-10);
    job.shift_join_date(-10);
    assert_eq!(a.last_compression(), 0);
    assert_eq!(job.join_date(), 30 + 16 - 10);
}
