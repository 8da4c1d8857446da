//! Live cluster occupancy, read from the resource manager's node-state
//! report.

use anyhow::Context;

use crate::Map;
use crate::server::dispatch::DispatchResult;
use crate::server::remote::RemoteSession;

pub const IDLE_STATE: &str = "idle";
pub const ALLOCATED_STATE: &str = "alloc";

/// Markers the resource manager appends to partition names (default
/// partition) and node states (drain, power-save and similar flags).
const PARTITION_MARKERS: &[char] = &['*'];
const STATE_MARKERS: &[char] = &['*', '~', '#', '%', '$', '@', '+'];

/// Point-in-time node counts per (partition, state).
///
/// Recomputed every scheduling cycle and shared by all jobs examined in that
/// cycle; never cached across cycles.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    counts: Map<(String, String), u64>,
}

impl ResourceSnapshot {
    pub fn from_report(report: &str) -> ResourceSnapshot {
        ResourceSnapshot {
            counts: parse_node_report(report),
        }
    }

    pub fn count(&self, partition: &str, state: &str) -> u64 {
        self.counts
            .get(&(partition.to_string(), state.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of unused nodes available in the partition.
    pub fn idle(&self, partition: &str) -> u64 {
        self.count(partition, IDLE_STATE)
    }

    /// Number of nodes currently running work in the partition.
    pub fn allocated(&self, partition: &str) -> u64 {
        self.count(partition, ALLOCATED_STATE)
    }
}

/// Fetches the node-state report and parses it into a snapshot. One query
/// serves every partition examined in the cycle.
pub async fn take_snapshot(
    session: &dyn RemoteSession,
    report_cmd: &str,
) -> DispatchResult<ResourceSnapshot> {
    let report = session
        .execute(report_cmd)
        .await
        .context("Node state query failed")?;
    Ok(ResourceSnapshot::from_report(&report))
}

/// Parse per-(partition, state) node counts from a sinfo-shaped report.
///
/// Columns are located by the header line, so the parser does not depend on
/// column order or width. Lines missing one of the three columns or carrying
/// a non-numeric node count are skipped.
pub fn parse_node_report(report: &str) -> Map<(String, String), u64> {
    let mut counts = Map::new();
    let mut lines = report.lines();
    let header = match lines.next() {
        Some(header) => header,
        None => return counts,
    };

    let columns: Vec<&str> = header.split_whitespace().collect();
    let find = |name: &str| columns.iter().position(|c| c.eq_ignore_ascii_case(name));
    let (partition_col, nodes_col, state_col) =
        match (find("PARTITION"), find("NODES"), find("STATE")) {
            (Some(partition), Some(nodes), Some(state)) => (partition, nodes, state),
            _ => {
                log::warn!("Node state report is missing the PARTITION/NODES/STATE header");
                return counts;
            }
        };

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(partition), Some(nodes), Some(state)) = (
            fields.get(partition_col),
            fields.get(nodes_col),
            fields.get(state_col),
        ) else {
            continue;
        };
        let Ok(count) = nodes.parse::<u64>() else {
            continue;
        };
        let partition = partition.trim_end_matches(PARTITION_MARKERS).to_string();
        let state = state.to_lowercase().trim_end_matches(STATE_MARKERS).to_string();
        *counts.entry((partition, state)).or_insert(0) += count;
    }
    counts
}

#[cfg(test)]
mod tests {
    use crate::server::dispatch::probe::ResourceSnapshot;

    // Captured from a real sinfo invocation, shortened node lists.
    const REPORT: &str = "PARTITION AVAIL  TIMELIMIT  NODES  STATE NODELIST
long*        up 7-00:00:00     61   idle n[001-061]
long*        up 7-00:00:00     18  alloc n[062-079]
long*        up 7-00:00:00      2  drain n[080-081]
accel        up 2-00:00:00     12   idle p[01-12]
accel        up 2-00:00:00      3  alloc p[13-15]
";

    #[test]
    fn counts_nodes_per_partition_and_state() {
        let snapshot = ResourceSnapshot::from_report(REPORT);
        assert_eq!(snapshot.idle("long"), 61);
        assert_eq!(snapshot.allocated("long"), 18);
        assert_eq!(snapshot.idle("accel"), 12);
        assert_eq!(snapshot.allocated("accel"), 3);
        assert_eq!(snapshot.count("long", "drain"), 2);
    }

    #[test]
    fn unknown_partition_counts_zero() {
        let snapshot = ResourceSnapshot::from_report(REPORT);
        assert_eq!(snapshot.idle("gpu"), 0);
        assert_eq!(snapshot.allocated("gpu"), 0);
    }

    #[test]
    fn split_state_lines_are_summed() {
        let report = "PARTITION NODES STATE\nlong 10 idle\nlong 5 idle\n";
        let snapshot = ResourceSnapshot::from_report(report);
        assert_eq!(snapshot.idle("long"), 15);
    }

    #[test]
    fn state_markers_are_stripped() {
        let report = "PARTITION NODES STATE\nlong 4 idle~\nlong 2 idle*\n";
        let snapshot = ResourceSnapshot::from_report(report);
        assert_eq!(snapshot.idle("long"), 6);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let report = "PARTITION NODES STATE\n\
                      long ? idle\n\
                      incomplete\n\
                      long 7 idle\n";
        let snapshot = ResourceSnapshot::from_report(report);
        assert_eq!(snapshot.idle("long"), 7);
    }

    #[test]
    fn column_order_is_taken_from_the_header() {
        let report = "NODES PARTITION STATE\n9 accel idle\n";
        let snapshot = ResourceSnapshot::from_report(report);
        assert_eq!(snapshot.idle("accel"), 9);
    }

    #[test]
    fn missing_header_yields_empty_snapshot() {
        let snapshot = ResourceSnapshot::from_report("no header here\nlong 3 idle\n");
        assert_eq!(snapshot.idle("long"), 0);
    }

    #[test]
    fn empty_report_yields_empty_snapshot() {
        let snapshot = ResourceSnapshot::from_report("");
        assert_eq!(snapshot.idle("long"), 0);
    }
}
