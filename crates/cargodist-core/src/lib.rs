//! Cargodist core -- the link graph engine behind cargo distribution.
//!
//! Every cargo type has a [`link_graph::LinkGraph`]: one node per station
//! handling the cargo and a dense matrix of edges recording observed link
//! capacity and usage. Periodically a [`job::LinkGraphJob`] takes a deep
//! copy of a graph and computes, on a worker thread or inline, how much
//! cargo should travel from each origin over which next hop. The result
//! ends up in a [`flow_stat::FlowStatMap`] per station.
//!
//! # Job Lifecycle
//!
//! ```rust,ignore
//! let id = job::create_job(&mut jobs, &link_graph, &settings, today)?;
//! let job = jobs.get_mut(id).unwrap();
//! job.spawn_thread(stages.clone())?;
//! // ... days pass ...
//! if job.is_finished(today) {
//!     let snapshot = job.join_thread()?;
//!     // read snapshot.node(n).flows()
//! }
//! ```
//!
//! # Key Types
//!
//! - [`graph::Graph`] -- Dense graph with an active-edge list per row.
//! - [`link_graph::LinkGraph`] -- Persistent per-cargo graph with
//!   compression and merging.
//! - [`job::LinkGraphJob`] -- Snapshot plus worker handle; stages implement
//!   [`job::JobStage`].
//! - [`path::Path`] -- Flow accounting leg used by solvers.
//! - [`flow_mapper::FlowMapper`] -- Stage turning paths into flow tables.
//! - [`settings::LinkGraphSettings`] -- Configuration copied into each job.
//! - [`serialize`] -- Versioned save/load via bitcode.
//!
//! The crate logs through `tracing` and installs no subscriber.

pub mod date;
pub mod flow_mapper;
pub mod flow_stat;
pub mod graph;
pub mod id;
pub mod job;
pub mod link_graph;
pub mod matrix;
pub mod path;
pub mod pool;
pub mod serialize;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
