pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod observer;
pub mod topology;

pub use cancel::CancellationToken;
pub use config::Config;
pub use error::{Result, SvcTopoError};
pub use observer::{LogObserver, NoopObserver, Observer, ProgressSnapshot};
pub use topology::{DiscoveryMode, DiscoveryReport, RunOutcome, TopologyEngine};
