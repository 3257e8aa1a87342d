//! Full-scan discovery: paginate every service of the environment, extract
//! both relationship directions, then resolve ids referenced outside the
//! scanned set with individual lookups.
//!
//! Deliberate asymmetry with BFS mode: nodes resolved in the second pass
//! only get their display name filled in and are NOT re-scanned for further
//! relationships, so a full scan is not transitively complete beyond one hop
//! outside the initial page set. BFS mode has no such limit.

use std::collections::BTreeSet;

use crate::api::{EntityGateway, ServiceNode};
use crate::cancel::CancellationToken;
use crate::error::{Result, SvcTopoError};
use crate::observer::{Observer, ProgressSnapshot};
use crate::topology::edges::Relation;
use crate::topology::engine::TraversalState;

pub(crate) async fn run(
    gateway: &dyn EntityGateway,
    observer: &dyn Observer,
    state: &mut TraversalState,
    cancel: &CancellationToken,
) -> Result<()> {
    observer.on_log("Starting full service scan");

    let mut cursor: Option<String> = None;
    let mut page_count = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(SvcTopoError::Cancelled);
        }

        let page = gateway.fetch_page(cursor.as_deref(), cancel).await?;
        page_count += 1;

        for node in page.entities {
            for target in &node.calls {
                state.edges.add(&node.id, target, Relation::Calls);
            }
            for source in &node.called_by {
                state.edges.add(source, &node.id, Relation::CalledBy);
            }
            state.discovered.insert(node.id.clone(), node);
        }

        observer.on_progress(&ProgressSnapshot {
            depth: 0,
            discovered: state.discovered.len(),
            edges: state.edges.len(),
            queue_size: 0,
            status: format!(
                "Page {}: {} services scanned so far",
                page_count,
                state.discovered.len()
            ),
        });

        cursor = page.next_page_key;
        if cursor.is_none() {
            break;
        }
    }

    observer.on_log(&format!(
        "Scan complete: {} pages, {} services, {} edge candidates",
        page_count,
        state.discovered.len(),
        state.edges.len()
    ));

    resolve_unknown_ids(gateway, observer, state, cancel).await
}

/// Second pass: ids referenced by an edge but absent from the scanned set
/// are looked up individually. Unresolved ids keep the UNKNOWN sentinel
/// permanently.
async fn resolve_unknown_ids(
    gateway: &dyn EntityGateway,
    observer: &dyn Observer,
    state: &mut TraversalState,
    cancel: &CancellationToken,
) -> Result<()> {
    // BTreeSet gives a stable resolution order across runs
    let unknown: BTreeSet<String> = state
        .edges
        .iter()
        .flat_map(|c| [c.source_id.clone(), c.target_id.clone()])
        .filter(|id| !state.discovered.contains_key(id))
        .collect();

    if unknown.is_empty() {
        return Ok(());
    }

    observer.on_log(&format!("Resolving {} unknown service ids", unknown.len()));
    let mut resolved = 0usize;

    for id in &unknown {
        if cancel.is_cancelled() {
            return Err(SvcTopoError::Cancelled);
        }

        match gateway.fetch_by_id(id, cancel).await {
            // Name only; the resolved node's relationships are deliberately
            // not extracted.
            Ok(Some(node)) => {
                state.discovered.insert(
                    id.clone(),
                    ServiceNode {
                        id: id.clone(),
                        display_name: node.display_name,
                        ..Default::default()
                    },
                );
                resolved += 1;
            }
            Ok(None) => {
                log::debug!("Service id {} not found, keeping UNKNOWN", id);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                log::warn!("Could not resolve id {}: {}", id, e);
            }
        }
    }

    observer.on_log(&format!(
        "Resolved {} of {} unknown ids",
        resolved,
        unknown.len()
    ));
    Ok(())
}
