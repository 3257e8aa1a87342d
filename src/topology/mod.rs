//! Topology discovery: BFS-from-roots and full-scan strategies over the
//! service-call graph, plus edge materialization.

mod edges;
mod engine;
mod fullscan;

pub use edges::{materialize, EdgeCandidate, EdgeSet, Relation, ResolvedEdge};
pub use engine::TopologyEngine;

/// Strategy selector for one discovery run.
#[derive(Debug, Clone)]
pub enum DiscoveryMode {
    /// Breadth-first walk following outgoing CALLS from the given roots.
    RootBfs { roots: Vec<String> },
    /// Paginate every service of the environment and extract both
    /// relationship directions in one combined scan.
    FullScan,
}

/// Terminal state of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Structured result of one discovery run.
///
/// Always returned, never panicked out of: a cancelled or failed run still
/// carries whatever edges were materialized before it stopped.
#[derive(Debug)]
pub struct DiscoveryReport {
    pub outcome: RunOutcome,
    pub message: String,
    pub services_discovered: usize,
    pub max_depth: usize,
    /// Sorted, deduplicated, resolved edge list (possibly empty).
    pub edges: Vec<ResolvedEdge>,
}

impl DiscoveryReport {
    /// Completed runs are successes even with an empty edge list (zero root
    /// matches is a valid result, not a failure).
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}
