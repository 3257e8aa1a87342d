//! Breadth-first traversal engine over the service-call graph.
//!
//! Owns the per-run working state (visited set, frontier queue, discovered
//! map, edge candidates) and the cooperative cancellation points. Remote
//! access goes exclusively through the [`EntityGateway`] seam.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::api::{EntityGateway, ServiceNode};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::observer::{NoopObserver, Observer, ProgressSnapshot};
use crate::topology::edges::{materialize, EdgeSet, Relation};
use crate::topology::fullscan;
use crate::topology::{DiscoveryMode, DiscoveryReport, RunOutcome};

/// Per-run traversal working state. Built fresh for every run and discarded
/// with it; never shared across runs.
#[derive(Debug, Default)]
pub(crate) struct TraversalState {
    /// Ids ever enqueued; prevents a node from entering the frontier twice.
    pub visited: HashSet<String>,
    /// FIFO frontier of (id, depth); FIFO order keeps level-order processing.
    pub frontier: VecDeque<(String, usize)>,
    /// Nodes fetched so far, keyed by id.
    pub discovered: HashMap<String, ServiceNode>,
    /// Unique relationship candidates observed so far.
    pub edges: EdgeSet,
    /// Max BFS depth observed across all batches.
    pub max_depth: usize,
}

/// Drives one discovery run against a gateway, reporting through an
/// observer. The run itself is strictly sequential; callbacks and the
/// cancellation token are the only things that cross thread boundaries.
pub struct TopologyEngine<'a> {
    gateway: &'a dyn EntityGateway,
    observer: &'a dyn Observer,
    batch_size: usize,
}

static NOOP: NoopObserver = NoopObserver;

impl<'a> TopologyEngine<'a> {
    pub fn new(gateway: &'a dyn EntityGateway, batch_size: usize) -> Self {
        Self {
            gateway,
            observer: &NOOP,
            batch_size,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Execute one discovery run. Never panics; every path (success,
    /// cancellation, failure) lands in a [`DiscoveryReport`] carrying the
    /// edges materialized so far.
    pub async fn run(&self, mode: DiscoveryMode, cancel: &CancellationToken) -> DiscoveryReport {
        match mode {
            DiscoveryMode::RootBfs { roots } => self.run_bfs(&roots, cancel).await,
            DiscoveryMode::FullScan => {
                let mut state = TraversalState::default();
                let result = fullscan::run(self.gateway, self.observer, &mut state, cancel).await;
                self.finish(state, result)
            }
        }
    }

    async fn run_bfs(&self, roots: &[String], cancel: &CancellationToken) -> DiscoveryReport {
        let mut state = TraversalState::default();

        // Trim and deduplicate caller-supplied roots; all enter at depth 0.
        for root in roots {
            let id = root.trim();
            if !id.is_empty() && state.visited.insert(id.to_string()) {
                state.frontier.push_back((id.to_string(), 0));
            }
        }

        if state.frontier.is_empty() {
            return DiscoveryReport {
                outcome: RunOutcome::Failed,
                message: "No valid root service ids provided".to_string(),
                services_discovered: 0,
                max_depth: 0,
                edges: Vec::new(),
            };
        }

        self.observer
            .on_log(&format!("Starting BFS traversal from {} root(s)", state.frontier.len()));

        let result = self.bfs_loop(&mut state, cancel).await;
        self.finish(state, result)
    }

    async fn bfs_loop(&self, state: &mut TraversalState, cancel: &CancellationToken) -> Result<()> {
        while !state.frontier.is_empty() {
            if cancel.is_cancelled() {
                return Err(crate::error::SvcTopoError::Cancelled);
            }

            // Dequeue up to batch_size entries, FIFO order preserved.
            // Entries of different depths may share a batch at a level
            // boundary; that is acceptable.
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                match state.frontier.pop_front() {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }

            let batch_depth = batch.iter().map(|(_, d)| *d).max().unwrap_or(0);
            state.max_depth = state.max_depth.max(batch_depth);
            let depths: HashMap<String, usize> = batch.iter().cloned().collect();
            let ids: Vec<String> = batch.into_iter().map(|(id, _)| id).collect();

            // Counts here are pre-batch: the snapshot reports what was
            // discovered before this fetch lands.
            self.observer.on_progress(&ProgressSnapshot {
                depth: batch_depth,
                discovered: state.discovered.len(),
                edges: state.edges.len(),
                queue_size: state.frontier.len(),
                status: format!("Depth {}: fetching {} services", batch_depth, ids.len()),
            });

            let nodes = match self.gateway.fetch_by_ids(&ids, cancel).await {
                Ok(nodes) => nodes,
                // A single failing batch must not sink the traversal;
                // cancellation is the one error that terminates the run.
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    self.observer
                        .on_log(&format!("API error fetching batch, skipping: {}", e));
                    log::warn!("Skipping failed batch of {} ids: {}", ids.len(), e);
                    continue;
                }
            };

            // The API may return fewer records than requested ids; missing
            // ids simply stay absent from the discovered map.
            for node in nodes {
                let depth = depths.get(&node.id).copied().unwrap_or(batch_depth);
                for target in &node.calls {
                    state.edges.add(&node.id, target, Relation::Calls);
                    if state.visited.insert(target.clone()) {
                        state.frontier.push_back((target.clone(), depth + 1));
                    }
                }
                state.discovered.insert(node.id.clone(), node);
            }
        }

        self.observer
            .on_log(&format!("BFS traversal complete, max depth {}", state.max_depth));
        Ok(())
    }

    /// Materialize edges and fold the loop result into a report. Partial
    /// results survive cancellation and failure.
    fn finish(&self, state: TraversalState, result: Result<()>) -> DiscoveryReport {
        let edges = materialize(&state.discovered, &state.edges);
        let services_discovered = state.discovered.len();

        let (outcome, message) = match result {
            Ok(()) if services_discovered == 0 => (
                RunOutcome::Completed,
                "No services found; check that the root ids are valid".to_string(),
            ),
            Ok(()) => (RunOutcome::Completed, "Discovery completed".to_string()),
            Err(e) if e.is_cancelled() => {
                (RunOutcome::Cancelled, "Discovery cancelled".to_string())
            }
            Err(e) => (RunOutcome::Failed, e.to_string()),
        };

        self.observer.on_progress(&ProgressSnapshot {
            depth: state.max_depth,
            discovered: services_discovered,
            edges: edges.len(),
            queue_size: state.frontier.len(),
            status: message.clone(),
        });

        DiscoveryReport {
            outcome,
            message,
            services_discovered,
            max_depth: state.max_depth,
            edges,
        }
    }
}
