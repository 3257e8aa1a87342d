//! Observer seam between the traversal engine and whatever surface hosts it.
//!
//! The engine never talks to a UI or logger directly; it reports through this
//! trait so the core stays testable headless. `NoopObserver` is the default
//! null object, `LogObserver` forwards to the `log` facade for the CLI.

/// Discrete progress snapshot emitted once per processed batch or page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Max BFS depth seen in the current batch (0 for full-scan pages).
    pub depth: usize,
    /// Nodes fetched and recorded so far.
    pub discovered: usize,
    /// Unique edge candidates collected so far.
    pub edges: usize,
    /// Remaining frontier entries (pages left is unknowable, so 0 in full-scan).
    pub queue_size: usize,
    /// Human-readable status line.
    pub status: String,
}

/// Receives log lines and progress snapshots from a running discovery.
pub trait Observer: Send + Sync {
    fn on_log(&self, message: &str);
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

/// Observer that discards everything. Default when no surface is attached.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_log(&self, _message: &str) {}
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

/// Observer that forwards to the `log` facade; used by the CLI.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_log(&self, message: &str) {
        log::info!("{}", message);
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        log::debug!(
            "progress: depth={} discovered={} edges={} queue={} ({})",
            snapshot.depth,
            snapshot.discovered,
            snapshot.edges,
            snapshot.queue_size,
            snapshot.status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records everything it sees.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub logs: Mutex<Vec<String>>,
        pub snapshots: Mutex<Vec<ProgressSnapshot>>,
    }

    impl Observer for RecordingObserver {
        fn on_log(&self, message: &str) {
            self.logs.lock().unwrap().push(message.to_string());
        }

        fn on_progress(&self, snapshot: &ProgressSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }
    }

    #[test]
    fn test_noop_observer_accepts_everything() {
        let obs = NoopObserver;
        obs.on_log("hello");
        obs.on_progress(&ProgressSnapshot::default());
    }

    #[test]
    fn test_recording_observer() {
        let obs = RecordingObserver::default();
        obs.on_log("one");
        obs.on_progress(&ProgressSnapshot {
            depth: 2,
            discovered: 10,
            edges: 4,
            queue_size: 7,
            status: "fetching".to_string(),
        });
        assert_eq!(obs.logs.lock().unwrap().len(), 1);
        assert_eq!(obs.snapshots.lock().unwrap()[0].depth, 2);
    }
}
