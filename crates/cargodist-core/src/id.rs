use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a link graph in its pool.
    pub struct LinkGraphId;

    /// Identifies a link graph job in its pool.
    pub struct LinkGraphJobId;
}

/// Index of a node inside one link graph. Doubles as the row/column index
/// of the edge matrix.
pub type NodeId = u16;

/// Sentinel for "no such node" and for the end of an active-edge list.
pub const INVALID_NODE: NodeId = NodeId::MAX;

/// Identifies a station. Owned by the station simulation, never by a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub u16);

/// Sentinel for "no station".
pub const INVALID_STATION: StationId = StationId(u16::MAX);

/// Identifies a cargo type. Each link graph is scoped to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CargoId(pub u8);

/// Broad cargo category, used to pick a distribution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CargoClass {
    Passengers,
    Mail,
    Armoured,
    Other,
}

/// Map coordinates of a station sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct TileXY {
    pub x: u32,
    pub y: u32,
}

impl TileXY {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Distance metric used for link graph edges: the larger axis delta counted
/// twice plus the smaller one, i.e. `max(dx, dy) + dx + dy`.
pub fn distance_max_plus_manhattan(a: TileXY, b: TileXY) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    dx.max(dy).saturating_add(dx).saturating_add(dy)
}
