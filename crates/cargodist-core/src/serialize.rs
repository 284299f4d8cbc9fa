//! Binary save and load of link graphs and jobs.
//!
//! Both formats carry a magic/version header and encode the graph by
//! walking it row by row: for every `from` the node, then the edge towards
//! every `to` in index order. Loading validates the structure before
//! anything is built from it, so a corrupt save is reported as
//! [`DeserializeError::Corrupt`] instead of tripping assertions later.
//!
//! A job is saved without its annotations or paths; a loaded job is fresh
//! and must be spawned again.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::date::Date;
use crate::graph::{Graph, LinkedEdge};
use crate::id::{CargoId, INVALID_NODE, LinkGraphId, NodeId};
use crate::job::LinkGraphJob;
use crate::link_graph::{LinkGraph, LinkGraphEdge, LinkGraphNode, MAX_NODES};
use crate::pool::{LinkGraphPool, PoolError};
use crate::settings::LinkGraphSettings;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number of a saved link graph.
pub const LINK_GRAPH_MAGIC: u32 = 0xCA7D_0001;

/// Magic number of a saved link graph job.
pub const LINK_GRAPH_JOB_MAGIC: u32 = 0xCA7D_0002;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("cannot save a job while its worker is running")]
    JobRunning,
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("data too short for a header")]
    TooShort,
    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{found:08X}")]
    InvalidMagic { expected: u32, found: u32 },
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("save from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("corrupt link graph: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header prepended to every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveHeader {
    pub magic: u32,
    pub version: u32,
}

impl SaveHeader {
    fn new(magic: u32) -> Self {
        Self {
            magic,
            version: FORMAT_VERSION,
        }
    }

    fn validate(&self, magic: u32) -> Result<(), DeserializeError> {
        if self.magic != magic {
            return Err(DeserializeError::InvalidMagic {
                expected: magic,
                found: self.magic,
            });
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One step of the graph walk: a node and its full edge row.
#[derive(Debug, Serialize, Deserialize)]
struct RowRecord {
    node: LinkGraphNode,
    edges: Vec<LinkGraphEdge>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkGraphRecord {
    header: SaveHeader,
    cargo: CargoId,
    last_compression: Date,
    rows: Vec<RowRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkGraphJobRecord {
    header: SaveHeader,
    cargo: CargoId,
    settings: LinkGraphSettings,
    spawn_date: Date,
    join_date: Date,
    last_compression: Date,
    rows: Vec<RowRecord>,
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, DeserializeError> {
    if data.is_empty() {
        return Err(DeserializeError::TooShort);
    }
    bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, SerializeError> {
    bitcode::serialize(record).map_err(|e| SerializeError::Encode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Graph walk
// ---------------------------------------------------------------------------

fn write_rows(graph: &Graph<LinkGraphNode, LinkGraphEdge>) -> Vec<RowRecord> {
    let size = graph.size();
    (0..size)
        .map(|from| RowRecord {
            node: graph.node(from).data().clone(),
            edges: (0..size).map(|to| graph.edge(from, to).clone()).collect(),
        })
        .collect()
}

/// Check that `rows` describe a consistent graph.
fn validate_rows(rows: &[RowRecord]) -> Result<(), DeserializeError> {
    let size = rows.len();
    if size > MAX_NODES {
        return Err(DeserializeError::Corrupt(format!(
            "{size} nodes exceed the maximum of {MAX_NODES}"
        )));
    }
    for (from, row) in rows.iter().enumerate() {
        if row.edges.len() != size {
            return Err(DeserializeError::Corrupt(format!(
                "row {from} has {} edges, expected {size}",
                row.edges.len()
            )));
        }
        if row.edges[from].capacity() != 0 {
            return Err(DeserializeError::Corrupt(format!("node {from} links to itself")));
        }

        let mut listed = vec![false; size];
        let mut next = row.edges[from].next_edge();
        while next != INVALID_NODE {
            let to = usize::from(next);
            if to >= size || to == from {
                return Err(DeserializeError::Corrupt(format!(
                    "row {from} lists invalid destination {to}"
                )));
            }
            if listed[to] {
                return Err(DeserializeError::Corrupt(format!(
                    "row {from} lists destination {to} twice"
                )));
            }
            listed[to] = true;
            next = row.edges[to].next_edge();
        }

        for (to, edge) in row.edges.iter().enumerate() {
            if to != from && listed[to] != (edge.capacity() > 0) {
                return Err(DeserializeError::Corrupt(format!(
                    "edge {from} -> {to} with capacity {} is {} the active list",
                    edge.capacity(),
                    if listed[to] { "in" } else { "missing from" }
                )));
            }
        }
    }
    Ok(())
}

fn read_rows(
    rows: Vec<RowRecord>,
) -> Result<Graph<LinkGraphNode, LinkGraphEdge>, DeserializeError> {
    validate_rows(&rows)?;
    let mut graph = Graph::new();
    graph.resize(rows.len() as NodeId);
    for (from, row) in rows.into_iter().enumerate() {
        let from = from as NodeId;
        let mut node = graph.node_mut(from);
        *node.data_mut() = row.node;
        for (to, edge) in row.edges.into_iter().enumerate() {
            *node.edge_mut(to as NodeId) = edge;
        }
    }
    Ok(graph)
}

// ---------------------------------------------------------------------------
// Link graphs
// ---------------------------------------------------------------------------

impl LinkGraph {
    /// Serialize the graph to a binary blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        encode(&LinkGraphRecord {
            header: SaveHeader::new(LINK_GRAPH_MAGIC),
            cargo: self.cargo(),
            last_compression: self.last_compression(),
            rows: write_rows(&self.graph),
        })
    }

    /// Deserialize a graph. It gets the default id until it is placed in a
    /// pool; see [`load_link_graph`].
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let record: LinkGraphRecord = decode(data)?;
        record.header.validate(LINK_GRAPH_MAGIC)?;
        let mut lg = LinkGraph::new(LinkGraphId::default(), record.cargo, record.last_compression);
        lg.graph = read_rows(record.rows)?;
        tracing::debug!(cargo = lg.cargo().0, nodes = lg.size(), "loaded link graph");
        Ok(lg)
    }
}

/// Deserialize a graph straight into `pool`. The graph learns its new id;
/// stations must be pointed at it by the caller.
pub fn load_link_graph(
    pool: &mut LinkGraphPool,
    data: &[u8],
) -> Result<LinkGraphId, DeserializeError> {
    let mut lg = LinkGraph::deserialize(data)?;
    let id = pool.insert_with_key(|id| {
        lg.set_id(id);
        lg
    })?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

impl LinkGraphJob {
    /// Serialize the job's graph copy, settings and dates.
    ///
    /// Fails while a worker owns the snapshot.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = self.snapshot().ok_or(SerializeError::JobRunning)?;
        encode(&LinkGraphJobRecord {
            header: SaveHeader::new(LINK_GRAPH_JOB_MAGIC),
            cargo: self.cargo(),
            settings: self.settings().clone(),
            spawn_date: self.spawn_date(),
            join_date: self.join_date(),
            last_compression: snapshot.last_compression(),
            rows: write_rows(snapshot.graph()),
        })
    }

    /// Deserialize a job belonging to `link_graph`. The job comes back
    /// initialised but not spawned.
    pub fn deserialize(data: &[u8], link_graph: LinkGraphId) -> Result<Self, DeserializeError> {
        let record: LinkGraphJobRecord = decode(data)?;
        record.header.validate(LINK_GRAPH_JOB_MAGIC)?;
        let graph = read_rows(record.rows)?;
        tracing::debug!(
            cargo = record.cargo.0,
            nodes = graph.size(),
            join_date = record.join_date,
            "loaded link graph job"
        );
        Ok(LinkGraphJob::restore(
            graph,
            link_graph,
            record.cargo,
            record.settings,
            record.spawn_date,
            record.join_date,
            record.last_compression,
        ))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
