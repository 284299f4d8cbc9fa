//! Per-node flow tables produced by a job.
//!
//! A [`FlowStatMap`] lives at one station and maps each origin station to a
//! [`FlowStat`]: how much of that origin's cargo leaves through each next
//! hop. A share whose via station is the table's own station is consumed
//! locally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::date::DAYS_PER_MONTH;
use crate::id::StationId;

/// Distribution of one origin's cargo over next hops.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowStat {
    shares: BTreeMap<StationId, u32>,
    unrestricted: u32,
}

impl FlowStat {
    /// A table with a single share.
    pub fn new(via: StationId, flow: u32, restricted: bool) -> Self {
        let mut stat = Self::default();
        stat.append_share(via, flow, restricted);
        stat
    }

    /// Add `flow` to the share of `via`. Restricted flow is only usable by
    /// vehicles that explicitly route through `via`.
    pub fn append_share(&mut self, via: StationId, flow: u32, restricted: bool) {
        if flow == 0 {
            return;
        }
        let share = self.shares.entry(via).or_insert(0);
        *share = share.saturating_add(flow);
        if !restricted {
            self.unrestricted = self.unrestricted.saturating_add(flow);
        }
    }

    /// Take up to `flow` from the share of `via` and return what was taken.
    /// Empty shares are dropped.
    pub fn take_share(&mut self, via: StationId, flow: u32) -> u32 {
        let Some(share) = self.shares.get_mut(&via) else {
            return 0;
        };
        let taken = flow.min(*share);
        *share -= taken;
        if *share == 0 {
            self.shares.remove(&via);
        }
        self.unrestricted = self.unrestricted.saturating_sub(taken);
        taken
    }

    /// Share of `via`, zero if there is none.
    pub fn share(&self, via: StationId) -> u32 {
        self.shares.get(&via).copied().unwrap_or(0)
    }

    pub fn shares(&self) -> &BTreeMap<StationId, u32> {
        &self.shares
    }

    /// Part of the total that any vehicle may carry.
    pub fn unrestricted(&self) -> u32 {
        self.unrestricted
    }

    /// Sum of all shares.
    pub fn total(&self) -> u32 {
        self.shares.values().fold(0u32, |acc, &s| acc.saturating_add(s))
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Convert shares accumulated over `runtime` days to monthly figures.
    /// A share never drops to zero.
    pub fn scale_to_monthly(&mut self, runtime: u32) {
        debug_assert!(runtime > 0, "runtime must be positive");
        let runtime = runtime.max(1);
        let monthly = |value: u32| -> u32 {
            let scaled = u64::from(value) * u64::from(DAYS_PER_MONTH) / u64::from(runtime);
            scaled.clamp(1, u64::from(u32::MAX)) as u32
        };
        for share in self.shares.values_mut() {
            *share = monthly(*share);
        }
        if self.unrestricted > 0 {
            self.unrestricted = monthly(self.unrestricted).min(self.total());
        }
    }
}

/// Flows through one station, keyed by origin station.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowStatMap {
    flows: BTreeMap<StationId, FlowStat>,
}

impl FlowStatMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `flow` from `origin` leaving through `via`.
    pub fn add_flow(&mut self, origin: StationId, via: StationId, flow: u32) {
        self.flows
            .entry(origin)
            .or_default()
            .append_share(via, flow, false);
    }

    /// Forward `flow` from `origin` that was marked for local consumption at
    /// `local` on to `via` instead.
    ///
    /// If less than `flow` was marked as local, the remainder is added as new
    /// flow through `via`.
    pub fn pass_on_flow(&mut self, origin: StationId, local: StationId, via: StationId, flow: u32) {
        let stat = self.flows.entry(origin).or_default();
        stat.take_share(local, flow);
        stat.append_share(via, flow, false);
    }

    /// Scale every table to monthly figures.
    pub fn scale_to_monthly(&mut self, runtime: u32) {
        for stat in self.flows.values_mut() {
            stat.scale_to_monthly(runtime);
        }
    }

    /// The table of `origin`.
    pub fn get(&self, origin: StationId) -> Option<&FlowStat> {
        self.flows.get(&origin)
    }

    /// Flow from `origin` leaving through `via`.
    pub fn via(&self, origin: StationId, via: StationId) -> u32 {
        self.get(origin).map_or(0, |stat| stat.share(via))
    }

    /// Sum of all flows from all origins.
    pub fn total(&self) -> u32 {
        self.flows
            .values()
            .fold(0u32, |acc, stat| acc.saturating_add(stat.total()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (StationId, &FlowStat)> {
        self.flows.iter().map(|(&origin, stat)| (origin, stat))
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn clear(&mut self) {
        self.flows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: StationId = StationId(1);
    const B: StationId = StationId(2);
    const C: StationId = StationId(3);

    #[test]
    fn add_flow_accumulates_per_via() {
        let mut map = FlowStatMap::new();
        map.add_flow(A, B, 5);
        map.add_flow(A, B, 3);
        map.add_flow(A, C, 2);
        assert_eq!(map.via(A, B), 8);
        assert_eq!(map.via(A, C), 2);
        assert_eq!(map.get(A).unwrap().total(), 10);
        assert_eq!(map.get(A).unwrap().unrestricted(), 10);
        assert_eq!(map.via(B, A), 0);
    }

    #[test]
    fn pass_on_moves_local_share() {
        let mut map = FlowStatMap::new();
        // 10 units from A end here, at B.
        map.add_flow(A, B, 10);
        map.pass_on_flow(A, B, C, 4);
        assert_eq!(map.via(A, B), 6);
        assert_eq!(map.via(A, C), 4);
        assert_eq!(map.total(), 10);

        map.pass_on_flow(A, B, C, 6);
        assert_eq!(map.via(A, B), 0);
        assert!(!map.get(A).unwrap().shares().contains_key(&B));
    }

    #[test]
    fn pass_on_without_local_share_adds_flow() {
        let mut map = FlowStatMap::new();
        map.pass_on_flow(A, B, C, 7);
        assert_eq!(map.via(A, C), 7);
        assert_eq!(map.total(), 7);
    }

    #[test]
    fn restricted_share_is_not_unrestricted() {
        let mut stat = FlowStat::new(B, 10, true);
        stat.append_share(C, 5, false);
        assert_eq!(stat.total(), 15);
        assert_eq!(stat.unrestricted(), 5);
    }

    #[test]
    fn scale_to_monthly_keeps_small_shares() {
        let mut map = FlowStatMap::new();
        map.add_flow(A, B, 120);
        map.add_flow(A, C, 1);
        // 60 days of history -> half.
        map.scale_to_monthly(60);
        assert_eq!(map.via(A, B), 60);
        assert_eq!(map.via(A, C), 1);
        assert!(map.get(A).unwrap().unrestricted() <= map.get(A).unwrap().total());
    }

    #[test]
    fn zero_flow_leaves_no_share() {
        let mut map = FlowStatMap::new();
        map.add_flow(A, B, 0);
        assert!(map.get(A).unwrap().is_empty());
        assert_eq!(map.total(), 0);
    }
}
