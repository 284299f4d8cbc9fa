//! Stage that turns solved paths into per-station flow tables.

use crate::date::inclusive_age;
use crate::id::{NodeId, StationId};
use crate::job::{JobSnapshot, JobStage};

/// Walks every node's path list and records, at each station, which next
/// hop each origin's cargo takes.
///
/// Each leg `prev -> node` with positive flow marks that flow as consumed
/// locally at `node`. At `prev` the flow either starts (if `prev` is the
/// origin) or is passed on from `prev`'s own local share. The paths are
/// cleared afterwards.
#[derive(Debug, Clone, Copy)]
pub struct FlowMapper {
    scale: bool,
}

impl FlowMapper {
    /// With `scale` set, flows are converted to monthly figures based on the
    /// time between the graph's last compression and the job's spawn.
    pub fn new(scale: bool) -> Self {
        Self { scale }
    }
}

impl JobStage for FlowMapper {
    fn name(&self) -> &str {
        "flow mapper"
    }

    fn run(&self, job: &mut JobSnapshot) {
        let size = job.size();
        let mut legs: Vec<(NodeId, NodeId, StationId, u32)> = Vec::new();
        for prev in 0..size {
            for &id in job.node(prev).paths() {
                let path = job.path(id);
                if path.flow() == 0 {
                    break;
                }
                let origin = job.node(path.origin()).station();
                legs.push((prev, path.node(), origin, path.flow()));
            }
        }

        // Local shares are all in place before any of them is passed on, so
        // the node order does not matter.
        for &(prev, to, origin, flow) in &legs {
            let via = job.node(to).station();
            debug_assert_ne!(job.node(prev).station(), via, "leg does not leave its node");
            debug_assert_ne!(via, origin, "leg returns to its origin");
            job.node_mut(to).flows_mut().add_flow(origin, via, flow);
            let mut prev_node = job.node_mut(prev);
            if prev_node.station() == origin {
                prev_node.flows_mut().add_flow(origin, via, flow);
            }
        }
        for &(prev, to, origin, flow) in &legs {
            let via = job.node(to).station();
            let mut prev_node = job.node_mut(prev);
            let local = prev_node.station();
            if local != origin {
                prev_node.flows_mut().pass_on_flow(origin, local, via, flow);
            }
        }

        if self.scale {
            let runtime = inclusive_age(job.spawn_date(), job.last_compression());
            for id in 0..size {
                job.node_mut(id).flows_mut().scale_to_monthly(runtime);
            }
        }

        tracing::trace!(cargo = job.cargo().0, paths = job.paths().len(), "mapped flows");
        job.clear_paths();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::LinkGraphJob;
    use crate::settings::LinkGraphSettings;
    use crate::test_utils::*;

    fn three_station_job() -> LinkGraphJob {
        let (lg, _) = build_line_graph(3, 10);
        let settings = LinkGraphSettings {
            threaded: false,
            ..Default::default()
        };
        // Compressed at 0, spawned at 29: 30 days of history.
        LinkGraphJob::new(&lg, &settings, 29)
    }

    #[test]
    fn two_leg_path_maps_to_three_tables() {
        let mut job = three_station_job();
        let snapshot = job.snapshot_mut().unwrap();
        let root = snapshot.new_path(0, true);
        let ab = snapshot.new_path(1, false);
        let bc = snapshot.new_path(2, false);
        snapshot.fork_path(ab, root, 10, 10, 1);
        snapshot.fork_path(bc, ab, 10, 10, 1);
        snapshot.add_path_flow(bc, 6, 100);

        let (a, b, c) = (
            snapshot.node(0).station(),
            snapshot.node(1).station(),
            snapshot.node(2).station(),
        );
        FlowMapper::new(false).run(snapshot);

        // A sends everything towards B.
        assert_eq!(snapshot.node(0).flows().via(a, b), 6);
        // B passes it on to C instead of consuming it.
        assert_eq!(snapshot.node(1).flows().via(a, b), 0);
        assert_eq!(snapshot.node(1).flows().via(a, c), 6);
        // C consumes it.
        assert_eq!(snapshot.node(2).flows().via(a, c), 6);
        assert!(snapshot.paths().is_empty());
        assert!(snapshot.node(0).paths().is_empty());
    }

    #[test]
    fn stops_at_first_zero_flow_path() {
        let mut job = three_station_job();
        let snapshot = job.snapshot_mut().unwrap();
        let root = snapshot.new_path(1, true);
        let to_a = snapshot.new_path(0, false);
        let to_c = snapshot.new_path(2, false);
        snapshot.fork_path(to_a, root, 10, 10, 1);
        snapshot.fork_path(to_c, root, 10, 10, 1);
        snapshot.add_path_flow(to_a, 4, 100);
        snapshot.node_mut(1).paths_mut().push_back(to_c);

        FlowMapper::new(false).run(snapshot);
        let b = snapshot.node(1).station();
        assert_eq!(snapshot.node(1).flows().get(b).unwrap().total(), 4);
        assert!(snapshot.node(2).flows().is_empty());
    }

    #[test]
    fn scaling_uses_job_runtime() {
        let (lg, _) = build_line_graph(2, 100);
        let settings = LinkGraphSettings {
            threaded: false,
            ..Default::default()
        };
        // 60 days between compression and spawn halves the figures.
        let mut job = LinkGraphJob::new(&lg, &settings, 59);
        let snapshot = job.snapshot_mut().unwrap();
        let root = snapshot.new_path(0, true);
        let leg = snapshot.new_path(1, false);
        snapshot.fork_path(leg, root, 100, 100, 1);
        snapshot.add_path_flow(leg, 40, 100);

        FlowMapper::new(true).run(snapshot);
        let (a, b) = (snapshot.node(0).station(), snapshot.node(1).station());
        assert_eq!(snapshot.node(0).flows().via(a, b), 20);
        assert_eq!(snapshot.node(1).flows().via(a, b), 20);
    }
}
