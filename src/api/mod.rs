//! Remote entity gateway: request issuance, auth header injection, and the
//! retry/backoff machinery for the Monitored Entities API v2.

mod client;
mod entity;

pub use client::EntityClient;
pub use entity::{decode_entities, decode_entity, ServiceNode, SERVICE_TYPE, UNKNOWN_NAME};

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::error::Result;

/// One page of a full-scan pagination.
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    pub entities: Vec<ServiceNode>,
    /// Opaque continuation cursor; absent or empty means the scan is done.
    pub next_page_key: Option<String>,
    /// Total match count, reported on the first page only.
    pub total_count: Option<u64>,
}

/// Seam between the traversal engine and the remote API.
///
/// The engine only ever talks to this trait; tests drive it with an
/// in-memory graph instead of a live endpoint.
#[async_trait]
pub trait EntityGateway: Send + Sync {
    /// Fetch one page of the full service scan. The first call (no cursor)
    /// carries all filter parameters; continuation calls carry only the
    /// cursor.
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<EntityPage>;

    /// Batch-fetch up to `batch_size` services by id. The API may return
    /// fewer records than requested ids (stale/expired ids); that is not an
    /// error.
    async fn fetch_by_ids(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceNode>>;

    /// Fetch a single service by id for name resolution. 404 is a valid
    /// "absent" result, not an error.
    async fn fetch_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ServiceNode>>;
}
