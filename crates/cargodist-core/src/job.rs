//! Background flow computation over a snapshot of a link graph.
//!
//! A [`LinkGraphJob`] is the main-thread handle. It owns a [`JobSnapshot`]:
//! a deep copy of the graph plus per-node and per-edge annotations and the
//! [`Path`] arena. Spawning moves the snapshot to a worker which runs every
//! [`JobStage`] on it; joining moves it back. While the worker owns the
//! snapshot the handle has no access to it, so the live graph and the job
//! never share mutable state.
//!
//! # Lifecycle
//!
//! ```text
//! LinkGraphJob::new -> (init) -> spawn_thread -> join_thread -> read flows -> drop
//! ```

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::sync::{Arc, mpsc};
#[cfg(not(feature = "parallel"))]
use std::thread;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::date::{Date, DateDelta};
use crate::flow_stat::FlowStatMap;
use crate::graph::{EdgeIter, Graph, NodeRef};
use crate::id::{CargoId, LinkGraphId, LinkGraphJobId, NodeId, StationId, TileXY};
use crate::link_graph::{LinkGraph, LinkGraphEdge, LinkGraphNode};
use crate::matrix::EdgeMatrix;
use crate::path::{Path, PathId, UNLIMITED_SATURATION};
use crate::pool::{LinkGraphJobPool, PoolError};
use crate::settings::LinkGraphSettings;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from job creation and the worker lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("too many link graph jobs")]
    TooManyJobs(#[source] PoolError),
    #[error("link graph job is already running")]
    AlreadyRunning,
    #[error("link graph job worker for cargo {0} panicked")]
    WorkerPanicked(u8),
    #[error("link graph job is unusable after its worker failed")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One step of a job's computation, e.g. demand estimation, a solver pass
/// or the flow mapper.
pub trait JobStage: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    fn run(&self, job: &mut JobSnapshot);
}

/// The ordered stages a job runs, shared between jobs and workers.
pub type JobStages = Arc<[Box<dyn JobStage>]>;

fn run_stages(stages: &[Box<dyn JobStage>], snapshot: &mut JobSnapshot) {
    let span = tracing::debug_span!(
        "link_graph_job",
        cargo = snapshot.cargo.0,
        nodes = snapshot.size()
    );
    let _guard = span.enter();
    for stage in stages {
        tracing::trace!(stage = stage.name(), "running stage");
        stage.run(snapshot);
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// Working state of one node.
#[derive(Debug, Clone, Default)]
pub struct NodeAnnotation {
    pub(crate) undelivered_supply: u32,
    /// Legs leaving this node, zero-flow legs at the back.
    pub(crate) paths: VecDeque<PathId>,
    pub(crate) flows: FlowStatMap,
}

/// Working state of one edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeAnnotation {
    pub(crate) demand: u32,
    pub(crate) unsatisfied_demand: u32,
    pub(crate) flow: u32,
}

// ---------------------------------------------------------------------------
// JobSnapshot
// ---------------------------------------------------------------------------

/// Everything a worker needs, owned by value.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    graph: Graph<LinkGraphNode, LinkGraphEdge>,
    nodes: Vec<NodeAnnotation>,
    edges: EdgeMatrix<EdgeAnnotation>,
    paths: Vec<Path>,
    settings: LinkGraphSettings,
    link_graph_id: LinkGraphId,
    cargo: CargoId,
    spawn_date: Date,
    last_compression: Date,
}

impl JobSnapshot {
    pub(crate) fn new(
        graph: Graph<LinkGraphNode, LinkGraphEdge>,
        link_graph_id: LinkGraphId,
        cargo: CargoId,
        settings: LinkGraphSettings,
        spawn_date: Date,
        last_compression: Date,
    ) -> Self {
        let mut snapshot = Self {
            graph,
            nodes: Vec::new(),
            edges: EdgeMatrix::new(),
            paths: Vec::new(),
            settings,
            link_graph_id,
            cargo,
            spawn_date,
            last_compression,
        };
        snapshot.init();
        snapshot
    }

    /// Reset every annotation: undelivered supply is the node's supply,
    /// demand and flow are zero, no paths and no flows exist.
    pub fn init(&mut self) {
        let size = usize::from(self.size());
        self.nodes = self
            .graph
            .nodes()
            .iter()
            .map(|node| NodeAnnotation {
                undelivered_supply: node.supply(),
                ..NodeAnnotation::default()
            })
            .collect();
        self.edges = EdgeMatrix::with_size(size, size);
        self.paths.clear();
    }

    pub fn size(&self) -> NodeId {
        self.graph.size()
    }

    pub fn graph(&self) -> &Graph<LinkGraphNode, LinkGraphEdge> {
        &self.graph
    }

    pub fn settings(&self) -> &LinkGraphSettings {
        &self.settings
    }

    pub fn link_graph_id(&self) -> LinkGraphId {
        self.link_graph_id
    }

    pub fn cargo(&self) -> CargoId {
        self.cargo
    }

    pub fn spawn_date(&self) -> Date {
        self.spawn_date
    }

    /// Compression date of the graph at the time of the copy.
    pub fn last_compression(&self) -> Date {
        self.last_compression
    }

    pub fn node(&self, id: NodeId) -> JobNode<'_> {
        let index = usize::from(id);
        let size = self.nodes.len();
        JobNode {
            base: self.graph.node(id),
            anno: &self.nodes[index],
            edge_annos: &self.edges[index][..size],
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> JobNodeMut<'_> {
        let index = usize::from(id);
        let size = self.nodes.len();
        JobNodeMut {
            base: self.graph.node(id),
            anno: &mut self.nodes[index],
            edge_annos: &mut self.edges[index][..size],
        }
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> JobEdge<'_> {
        JobEdge {
            base: self.graph.edge(from, to),
            anno: &self.edges[usize::from(from)][usize::from(to)],
        }
    }

    pub fn edge_mut(&mut self, from: NodeId, to: NodeId) -> JobEdgeMut<'_> {
        JobEdgeMut {
            base: self.graph.edge(from, to),
            anno: &mut self.edges[usize::from(from)][usize::from(to)],
        }
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Allocate a path ending at `node`. See [`Path::new`].
    pub fn new_path(&mut self, node: NodeId, source: bool) -> PathId {
        let id = PathId(self.paths.len() as u32);
        self.paths.push(Path::new(node, source));
        id
    }

    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id.index()]
    }

    /// Every path allocated since the last [`clear_paths`](Self::clear_paths).
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Make `id` a leg following `base` over an edge with capacity `cap`,
    /// free capacity `free_cap` and length `dist`.
    ///
    /// Capacities become the minimum along the chain and distances add up.
    /// If `id` had another parent it is detached from it first.
    pub fn fork_path(&mut self, id: PathId, base: PathId, cap: u32, free_cap: i32, dist: u32) {
        debug_assert_ne!(id, base, "a path cannot fork off itself");
        let parent = self.paths[base.index()].clone();
        let current_parent = self.paths[id.index()].parent;

        let path = &mut self.paths[id.index()];
        path.capacity = parent.capacity.min(cap);
        path.free_capacity = parent.free_capacity.min(free_cap);
        path.distance = parent.distance.saturating_add(dist);
        path.origin = parent.origin;
        debug_assert!(path.distance > 0, "forked paths must have a length");

        if current_parent != Some(base) {
            self.detach_path(id);
            self.paths[id.index()].parent = Some(base);
            self.paths[base.index()].num_children += 1;
        }
    }

    /// Push up to `flow` along the chain ending at `id` and return the
    /// amount admitted.
    ///
    /// Every leg's edge may carry at most `max_saturation` percent of its
    /// capacity; [`UNLIMITED_SATURATION`] disables the limit. The admitted
    /// amount is added to every leg up to the root and to each leg's edge. A
    /// leg receiving flow for the first time moves to the front of its
    /// parent node's path list.
    pub fn add_path_flow(&mut self, id: PathId, flow: u32, max_saturation: u32) -> u32 {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(leg) = current {
            chain.push(leg);
            current = self.paths[leg.index()].parent;
        }

        let mut flow = flow;
        if max_saturation != UNLIMITED_SATURATION {
            for &leg in &chain {
                let Some((from, to)) = self.leg_edge(leg) else {
                    continue;
                };
                let capacity = self.graph.edge(from, to).capacity();
                let usable = u64::from(capacity) * u64::from(max_saturation) / 100;
                let used = u64::from(self.edges[usize::from(from)][usize::from(to)].flow);
                if usable <= used {
                    return 0;
                }
                flow = flow.min((usable - used).min(u64::from(u32::MAX)) as u32);
            }
        }
        // Counters are u32; admit only what every leg and edge can record.
        for &leg in &chain {
            flow = flow.min(u32::MAX - self.paths[leg.index()].flow);
            if let Some((from, to)) = self.leg_edge(leg) {
                flow = flow.min(u32::MAX - self.edges[usize::from(from)][usize::from(to)].flow);
            }
        }
        if flow == 0 {
            return 0;
        }

        for &leg in chain.iter().rev() {
            if let Some((from, to)) = self.leg_edge(leg) {
                if self.paths[leg.index()].flow == 0 {
                    self.nodes[usize::from(from)].paths.push_front(leg);
                }
                let anno = &mut self.edges[usize::from(from)][usize::from(to)];
                anno.flow = anno.flow.saturating_add(flow);
            }
            let path = &mut self.paths[leg.index()];
            path.flow = path.flow.saturating_add(flow);
        }
        flow
    }

    /// Remove `flow` from leg `id` only.
    pub fn reduce_path_flow(&mut self, id: PathId, flow: u32) {
        let path = &mut self.paths[id.index()];
        debug_assert!(flow <= path.flow, "reducing flow {flow} below zero");
        path.flow = path.flow.saturating_sub(flow);
    }

    /// Cut `id` off its parent. Children of `id` stay attached to it.
    pub fn detach_path(&mut self, id: PathId) {
        if let Some(parent) = self.paths[id.index()].parent.take() {
            let parent = &mut self.paths[parent.index()];
            debug_assert!(parent.num_children > 0, "parent has no children");
            parent.num_children = parent.num_children.saturating_sub(1);
        }
    }

    /// Drop every path and empty every node's path list.
    pub fn clear_paths(&mut self) {
        self.paths.clear();
        for node in &mut self.nodes {
            node.paths.clear();
        }
    }

    /// The edge a leg runs over, or `None` for a root.
    fn leg_edge(&self, leg: PathId) -> Option<(NodeId, NodeId)> {
        let path = &self.paths[leg.index()];
        path.parent.map(|parent| (self.paths[parent.index()].node, path.node))
    }
}

// ---------------------------------------------------------------------------
// Node and edge views
// ---------------------------------------------------------------------------

/// Read-only view of a node with its annotations.
#[derive(Debug)]
pub struct JobNode<'a> {
    base: NodeRef<'a, LinkGraphNode, LinkGraphEdge>,
    anno: &'a NodeAnnotation,
    edge_annos: &'a [EdgeAnnotation],
}

impl<'a> JobNode<'a> {
    pub fn id(&self) -> NodeId {
        self.base.id()
    }

    pub fn supply(&self) -> u32 {
        self.base.data().supply()
    }

    pub fn demand(&self) -> u32 {
        self.base.data().demand()
    }

    pub fn station(&self) -> StationId {
        self.base.data().station()
    }

    pub fn xy(&self) -> TileXY {
        self.base.data().xy()
    }

    pub fn undelivered_supply(&self) -> u32 {
        self.anno.undelivered_supply
    }

    pub fn flows(&self) -> &'a FlowStatMap {
        &self.anno.flows
    }

    pub fn paths(&self) -> &'a VecDeque<PathId> {
        &self.anno.paths
    }

    pub fn edge(&self, to: NodeId) -> JobEdge<'a> {
        JobEdge {
            base: self.base.edge(to),
            anno: &self.edge_annos[usize::from(to)],
        }
    }

    /// Active links leaving this node.
    pub fn edges(&self) -> JobEdges<'a> {
        JobEdges {
            inner: self.base.edges(),
            annos: self.edge_annos,
        }
    }
}

/// Mutable view of a node's annotations. The copied graph stays read-only.
#[derive(Debug)]
pub struct JobNodeMut<'a> {
    base: NodeRef<'a, LinkGraphNode, LinkGraphEdge>,
    anno: &'a mut NodeAnnotation,
    edge_annos: &'a mut [EdgeAnnotation],
}

impl JobNodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.base.id()
    }

    pub fn supply(&self) -> u32 {
        self.base.data().supply()
    }

    pub fn demand(&self) -> u32 {
        self.base.data().demand()
    }

    pub fn station(&self) -> StationId {
        self.base.data().station()
    }

    pub fn xy(&self) -> TileXY {
        self.base.data().xy()
    }

    pub fn undelivered_supply(&self) -> u32 {
        self.anno.undelivered_supply
    }

    pub fn flows(&self) -> &FlowStatMap {
        &self.anno.flows
    }

    pub fn flows_mut(&mut self) -> &mut FlowStatMap {
        &mut self.anno.flows
    }

    pub fn paths(&self) -> &VecDeque<PathId> {
        &self.anno.paths
    }

    /// The path list. Callers reordering it must keep zero-flow legs at the
    /// back.
    pub fn paths_mut(&mut self) -> &mut VecDeque<PathId> {
        &mut self.anno.paths
    }

    /// Turn `amount` of this node's undelivered supply into demand on the
    /// edge towards `to`.
    pub fn deliver_supply(&mut self, to: NodeId, amount: u32) {
        debug_assert!(
            amount <= self.anno.undelivered_supply,
            "delivering {amount} of {} undelivered",
            self.anno.undelivered_supply
        );
        self.anno.undelivered_supply = self.anno.undelivered_supply.saturating_sub(amount);
        self.edge_mut(to).add_demand(amount);
    }

    pub fn edge(&self, to: NodeId) -> JobEdge<'_> {
        JobEdge {
            base: self.base.edge(to),
            anno: &self.edge_annos[usize::from(to)],
        }
    }

    pub fn edge_mut(&mut self, to: NodeId) -> JobEdgeMut<'_> {
        JobEdgeMut {
            base: self.base.edge(to),
            anno: &mut self.edge_annos[usize::from(to)],
        }
    }

    pub fn edges(&self) -> JobEdges<'_> {
        JobEdges {
            inner: self.base.edges(),
            annos: &*self.edge_annos,
        }
    }
}

/// Read-only view of an edge with its annotation.
#[derive(Debug, Clone, Copy)]
pub struct JobEdge<'a> {
    base: &'a LinkGraphEdge,
    anno: &'a EdgeAnnotation,
}

impl JobEdge<'_> {
    pub fn capacity(&self) -> u32 {
        self.base.capacity()
    }

    pub fn usage(&self) -> u32 {
        self.base.usage()
    }

    pub fn distance(&self) -> u32 {
        self.base.distance()
    }

    pub fn demand(&self) -> u32 {
        self.anno.demand
    }

    pub fn unsatisfied_demand(&self) -> u32 {
        self.anno.unsatisfied_demand
    }

    pub fn flow(&self) -> u32 {
        self.anno.flow
    }
}

/// Mutable view of an edge annotation.
#[derive(Debug)]
pub struct JobEdgeMut<'a> {
    base: &'a LinkGraphEdge,
    anno: &'a mut EdgeAnnotation,
}

impl JobEdgeMut<'_> {
    pub fn capacity(&self) -> u32 {
        self.base.capacity()
    }

    pub fn usage(&self) -> u32 {
        self.base.usage()
    }

    pub fn distance(&self) -> u32 {
        self.base.distance()
    }

    pub fn demand(&self) -> u32 {
        self.anno.demand
    }

    pub fn unsatisfied_demand(&self) -> u32 {
        self.anno.unsatisfied_demand
    }

    pub fn flow(&self) -> u32 {
        self.anno.flow
    }

    pub fn add_flow(&mut self, flow: u32) {
        self.anno.flow = self.anno.flow.saturating_add(flow);
    }

    pub fn remove_flow(&mut self, flow: u32) {
        debug_assert!(flow <= self.anno.flow, "removing {flow} of {} flow", self.anno.flow);
        self.anno.flow = self.anno.flow.saturating_sub(flow);
    }

    /// Add to both the demand and the unsatisfied demand.
    pub fn add_demand(&mut self, demand: u32) {
        self.anno.demand = self.anno.demand.saturating_add(demand);
        self.anno.unsatisfied_demand = self.anno.unsatisfied_demand.saturating_add(demand);
    }

    pub fn satisfy_demand(&mut self, demand: u32) {
        debug_assert!(
            demand <= self.anno.unsatisfied_demand,
            "satisfying {demand} of {} unsatisfied demand",
            self.anno.unsatisfied_demand
        );
        self.anno.unsatisfied_demand = self.anno.unsatisfied_demand.saturating_sub(demand);
    }
}

/// Iterator over a node's active links with their annotations.
#[derive(Debug, Clone)]
pub struct JobEdges<'a> {
    inner: EdgeIter<'a, LinkGraphEdge>,
    annos: &'a [EdgeAnnotation],
}

impl<'a> Iterator for JobEdges<'a> {
    type Item = (NodeId, JobEdge<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let (to, base) = self.inner.next()?;
        Some((
            to,
            JobEdge {
                base,
                anno: &self.annos[usize::from(to)],
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Worker {
    results: mpsc::Receiver<Box<JobSnapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start a named OS thread for the job. On failure the snapshot is
    /// handed back so it can run inline.
    #[cfg(not(feature = "parallel"))]
    fn spawn(
        snapshot: Box<JobSnapshot>,
        stages: &JobStages,
    ) -> Result<Self, (Box<JobSnapshot>, io::Error)> {
        let (handoff, inbox) = mpsc::sync_channel::<Box<JobSnapshot>>(1);
        let (outbox, results) = mpsc::sync_channel(1);
        let stages = Arc::clone(stages);
        let spawned = thread::Builder::new()
            .name(format!("linkgraph-{}", snapshot.cargo.0))
            .spawn(move || {
                let Ok(mut snapshot) = inbox.recv() else {
                    return;
                };
                run_stages(&stages, &mut snapshot);
                let _ = outbox.send(snapshot);
            });
        match spawned {
            Ok(thread) => match handoff.send(snapshot) {
                Ok(()) => Ok(Self {
                    results,
                    thread: Some(thread),
                }),
                Err(mpsc::SendError(snapshot)) => Err((
                    snapshot,
                    io::Error::other("worker exited before receiving its job"),
                )),
            },
            Err(error) => Err((snapshot, error)),
        }
    }

    /// Run the job on the rayon pool.
    #[cfg(feature = "parallel")]
    fn spawn(
        snapshot: Box<JobSnapshot>,
        stages: &JobStages,
    ) -> Result<Self, (Box<JobSnapshot>, io::Error)> {
        use std::panic::{self, AssertUnwindSafe};

        let (outbox, results) = mpsc::sync_channel(1);
        let stages = Arc::clone(stages);
        rayon::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                let mut snapshot = snapshot;
                run_stages(&stages, &mut snapshot);
                snapshot
            }));
            if let Ok(snapshot) = outcome {
                let _ = outbox.send(snapshot);
            }
        });
        Ok(Self {
            results,
            thread: None,
        })
    }

    /// Block until the worker is done. `None` if it died without returning
    /// the snapshot.
    fn join(self) -> Option<Box<JobSnapshot>> {
        let snapshot = self.results.recv().ok();
        if let Some(thread) = self.thread {
            let _ = thread.join();
        }
        snapshot
    }
}

// ---------------------------------------------------------------------------
// LinkGraphJob
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum JobState {
    /// The handle owns the snapshot.
    Idle(Box<JobSnapshot>),
    /// A worker owns the snapshot.
    Running(Worker),
    /// The snapshot was lost to a panicking worker.
    Poisoned,
}

/// Main-thread handle of one flow computation.
#[derive(Debug)]
pub struct LinkGraphJob {
    link_graph_id: LinkGraphId,
    cargo: CargoId,
    settings: LinkGraphSettings,
    join_date: Date,
    spawn_date: Date,
    state: JobState,
}

impl LinkGraphJob {
    /// Copy `link_graph` into a new, initialised job spawned at `now`.
    ///
    /// The job may be joined once `now + settings.recalc_time` is reached.
    pub fn new(link_graph: &LinkGraph, settings: &LinkGraphSettings, now: Date) -> Self {
        let join_date = now.saturating_add(DateDelta::from(settings.recalc_time));
        Self::restore(
            link_graph.graph.clone(),
            link_graph.id(),
            link_graph.cargo(),
            settings.clone(),
            now,
            join_date,
            link_graph.last_compression(),
        )
    }

    /// Rebuild a job from its saved parts. Annotations start fresh.
    pub(crate) fn restore(
        graph: Graph<LinkGraphNode, LinkGraphEdge>,
        link_graph_id: LinkGraphId,
        cargo: CargoId,
        settings: LinkGraphSettings,
        spawn_date: Date,
        join_date: Date,
        last_compression: Date,
    ) -> Self {
        let snapshot = JobSnapshot::new(
            graph,
            link_graph_id,
            cargo,
            settings.clone(),
            spawn_date,
            last_compression,
        );
        Self {
            link_graph_id,
            cargo,
            settings,
            join_date,
            spawn_date,
            state: JobState::Idle(Box::new(snapshot)),
        }
    }

    pub fn link_graph_id(&self) -> LinkGraphId {
        self.link_graph_id
    }

    pub fn cargo(&self) -> CargoId {
        self.cargo
    }

    /// Settings as they were when the job was created.
    pub fn settings(&self) -> &LinkGraphSettings {
        &self.settings
    }

    pub fn join_date(&self) -> Date {
        self.join_date
    }

    pub fn spawn_date(&self) -> Date {
        self.spawn_date
    }

    /// Reset all annotations. Fails while a worker owns the snapshot.
    pub fn init(&mut self) -> Result<(), JobError> {
        match &mut self.state {
            JobState::Idle(snapshot) => {
                snapshot.init();
                Ok(())
            }
            JobState::Running(_) => Err(JobError::AlreadyRunning),
            JobState::Poisoned => Err(JobError::Poisoned),
        }
    }

    /// The snapshot, unless a worker owns it.
    pub fn snapshot(&self) -> Option<&JobSnapshot> {
        match &self.state {
            JobState::Idle(snapshot) => Some(&**snapshot),
            _ => None,
        }
    }

    pub fn snapshot_mut(&mut self) -> Option<&mut JobSnapshot> {
        match &mut self.state {
            JobState::Idle(snapshot) => Some(&mut **snapshot),
            _ => None,
        }
    }

    /// Whether a worker currently owns the snapshot.
    pub fn is_running(&self) -> bool {
        matches!(self.state, JobState::Running(_))
    }

    /// Run `stages` on the snapshot.
    ///
    /// With threading enabled the snapshot moves to a worker and this
    /// returns at once. Otherwise, or if no worker can be started, the stages
    /// run here before returning.
    pub fn spawn_thread(&mut self, stages: JobStages) -> Result<(), JobError> {
        let mut snapshot = match mem::replace(&mut self.state, JobState::Poisoned) {
            JobState::Idle(snapshot) => snapshot,
            JobState::Running(worker) => {
                self.state = JobState::Running(worker);
                return Err(JobError::AlreadyRunning);
            }
            JobState::Poisoned => return Err(JobError::Poisoned),
        };

        if !self.settings.threaded {
            debug!(cargo = self.cargo.0, "running link graph job inline");
            run_stages(&stages, &mut snapshot);
            self.state = JobState::Idle(snapshot);
            return Ok(());
        }

        match Worker::spawn(snapshot, &stages) {
            Ok(worker) => {
                debug!(
                    cargo = self.cargo.0,
                    spawn_date = self.spawn_date,
                    join_date = self.join_date,
                    "spawned link graph job"
                );
                self.state = JobState::Running(worker);
            }
            Err((mut snapshot, error)) => {
                warn!(
                    cargo = self.cargo.0,
                    %error,
                    "could not start link graph worker, running job inline"
                );
                run_stages(&stages, &mut snapshot);
                self.state = JobState::Idle(snapshot);
            }
        }
        Ok(())
    }

    /// Wait for the worker and take the snapshot back.
    ///
    /// Joining a job that was never spawned, or already joined, just returns
    /// the snapshot.
    pub fn join_thread(&mut self) -> Result<&mut JobSnapshot, JobError> {
        match mem::replace(&mut self.state, JobState::Poisoned) {
            JobState::Running(worker) => match worker.join() {
                Some(snapshot) => {
                    debug!(cargo = self.cargo.0, "joined link graph job");
                    self.state = JobState::Idle(snapshot);
                }
                None => {
                    warn!(cargo = self.cargo.0, "link graph job worker panicked");
                    return Err(JobError::WorkerPanicked(self.cargo.0));
                }
            },
            other => self.state = other,
        }
        match &mut self.state {
            JobState::Idle(snapshot) => Ok(&mut **snapshot),
            _ => Err(JobError::Poisoned),
        }
    }

    /// Whether the job's time window is over. Says nothing about the worker.
    pub fn is_finished(&self, now: Date) -> bool {
        self.join_date <= now
    }

    /// Non-blocking check whether the worker is done.
    ///
    /// A finished worker's snapshot is taken back right away, so
    /// [`snapshot`](Self::snapshot) becomes available.
    pub fn is_job_completed(&mut self) -> bool {
        let JobState::Running(worker) = &self.state else {
            return true;
        };
        match worker.results.try_recv() {
            Ok(snapshot) => {
                if let JobState::Running(worker) =
                    mem::replace(&mut self.state, JobState::Idle(snapshot))
                {
                    let _ = worker.join();
                }
                true
            }
            Err(mpsc::TryRecvError::Empty) => false,
            Err(mpsc::TryRecvError::Disconnected) => true,
        }
    }

    /// Move the join date, e.g. when the game date itself is shifted.
    pub fn shift_join_date(&mut self, interval: DateDelta) {
        self.join_date = self.join_date.saturating_add(interval);
    }
}

impl Drop for LinkGraphJob {
    /// A running worker is joined before the job goes away.
    fn drop(&mut self) {
        if let JobState::Running(worker) = mem::replace(&mut self.state, JobState::Poisoned) {
            debug!(cargo = self.cargo.0, "joining link graph job on drop");
            let _ = worker.join();
        }
    }
}

/// Copy `link_graph` into a new job stored in `pool`.
pub fn create_job(
    pool: &mut LinkGraphJobPool,
    link_graph: &LinkGraph,
    settings: &LinkGraphSettings,
    now: Date,
) -> Result<LinkGraphJobId, JobError> {
    let id = pool
        .insert_with_key(|_| LinkGraphJob::new(link_graph, settings, now))
        .map_err(JobError::TooManyJobs)?;
    debug!(
        cargo = link_graph.cargo().0,
        nodes = link_graph.size(),
        jobs = pool.len(),
        "created link graph job"
    );
    Ok(id)
}

// ===========================================================================
// Tests
// ===========================================================================
