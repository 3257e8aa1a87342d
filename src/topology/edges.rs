//! Edge materializer: turns the discovered node set plus raw relationship
//! candidates into a deduplicated, resolved, deterministically ordered edge
//! list.

use std::collections::{BTreeSet, HashMap};

use crate::api::{ServiceNode, UNKNOWN_NAME};

/// Direction label of a call relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    Calls,
    CalledBy,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Calls => "CALLS",
            Relation::CalledBy => "CALLED_BY",
        }
    }
}

/// One observed relationship, before resolution. Candidate identity is the
/// full triple; the candidate set is a mathematical set even if the API
/// reports the same relationship on several pages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeCandidate {
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
}

/// Accumulates unique edge candidates during a traversal.
#[derive(Debug, Default)]
pub struct EdgeSet {
    candidates: BTreeSet<EdgeCandidate>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source_id: &str, target_id: &str, relation: Relation) {
        self.candidates.insert(EdgeCandidate {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
        });
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EdgeCandidate> {
        self.candidates.iter()
    }
}

/// One fully resolved edge row: denormalized source and target snapshots
/// taken at export time. Field order here is the stable column order
/// downstream consumers key on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub source_id: String,
    pub source_name: String,
    pub source_process_group: String,
    pub source_web_application_id: String,
    pub source_remote_endpoint: String,
    pub source_web_server: String,
    pub relation: Relation,
    pub target_id: String,
    pub target_name: String,
    pub target_process_group: String,
    pub target_web_application_id: String,
    pub target_remote_endpoint: String,
    pub target_web_server: String,
}

impl ResolvedEdge {
    /// Sort key for deterministic, diff-friendly output across runs.
    fn sort_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.source_id,
            &self.source_name,
            &self.target_id,
            &self.target_name,
            self.relation.as_str(),
        )
    }
}

/// Attribute snapshot of one endpoint: name plus tracked properties.
struct Snapshot<'a> {
    name: &'a str,
    process_group: &'a str,
    web_application_id: &'a str,
    remote_endpoint: &'a str,
    web_server: &'a str,
}

fn snapshot<'a>(discovered: &'a HashMap<String, ServiceNode>, id: &str) -> Snapshot<'a> {
    match discovered.get(id) {
        Some(node) => Snapshot {
            name: &node.display_name,
            process_group: &node.process_group,
            web_application_id: &node.web_application_id,
            remote_endpoint: &node.remote_endpoint,
            web_server: &node.web_server_name,
        },
        // Referenced but never fetched: UNKNOWN placeholder, never dropped
        None => Snapshot {
            name: UNKNOWN_NAME,
            process_group: "",
            web_application_id: "",
            remote_endpoint: "",
            web_server: "",
        },
    }
}

/// Resolve every candidate against the discovered node set.
///
/// Endpoints absent from `discovered` keep the UNKNOWN sentinel and empty
/// properties. Output is sorted by
/// (source_id, source_name, target_id, target_name, relation).
pub fn materialize(
    discovered: &HashMap<String, ServiceNode>,
    edges: &EdgeSet,
) -> Vec<ResolvedEdge> {
    let mut resolved: Vec<ResolvedEdge> = edges
        .candidates
        .iter()
        .map(|candidate| {
            let source = snapshot(discovered, &candidate.source_id);
            let target = snapshot(discovered, &candidate.target_id);
            ResolvedEdge {
                source_id: candidate.source_id.clone(),
                source_name: source.name.to_string(),
                source_process_group: source.process_group.to_string(),
                source_web_application_id: source.web_application_id.to_string(),
                source_remote_endpoint: source.remote_endpoint.to_string(),
                source_web_server: source.web_server.to_string(),
                relation: candidate.relation,
                target_id: candidate.target_id.clone(),
                target_name: target.name.to_string(),
                target_process_group: target.process_group.to_string(),
                target_web_application_id: target.web_application_id.to_string(),
                target_remote_endpoint: target.remote_endpoint.to_string(),
                target_web_server: target.web_server.to_string(),
            }
        })
        .collect();

    resolved.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str) -> ServiceNode {
        ServiceNode {
            id: id.to_string(),
            display_name: name.to_string(),
            process_group: format!("PG-{}", name),
            ..Default::default()
        }
    }

    fn discovered(nodes: Vec<ServiceNode>) -> HashMap<String, ServiceNode> {
        nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
    }

    #[test]
    fn test_materialize_resolves_both_endpoints() {
        let map = discovered(vec![node("SERVICE-A", "alpha"), node("SERVICE-B", "beta")]);
        let mut edges = EdgeSet::new();
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);

        let rows = materialize(&map, &edges);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_name, "alpha");
        assert_eq!(rows[0].source_process_group, "PG-alpha");
        assert_eq!(rows[0].target_name, "beta");
        assert_eq!(rows[0].relation, Relation::Calls);
    }

    #[test]
    fn test_materialize_unknown_target_placeholder() {
        let map = discovered(vec![node("SERVICE-A", "alpha")]);
        let mut edges = EdgeSet::new();
        edges.add("SERVICE-A", "SERVICE-GONE", Relation::Calls);

        let rows = materialize(&map, &edges);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_name, "UNKNOWN");
        assert_eq!(rows[0].target_process_group, "");
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        let map = discovered(vec![node("SERVICE-A", "alpha"), node("SERVICE-B", "beta")]);
        let mut edges = EdgeSet::new();
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);

        assert_eq!(edges.len(), 1);
        assert_eq!(materialize(&map, &edges).len(), 1);
    }

    #[test]
    fn test_same_pair_different_relation_kept() {
        // Full-scan reports A->B both as an outgoing CALLS on A and an
        // incoming CALLED_BY on B; both survive dedup.
        let map = discovered(vec![node("SERVICE-A", "alpha"), node("SERVICE-B", "beta")]);
        let mut edges = EdgeSet::new();
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);
        edges.add("SERVICE-A", "SERVICE-B", Relation::CalledBy);

        assert_eq!(materialize(&map, &edges).len(), 2);
    }

    #[test]
    fn test_output_sorted_by_full_tuple() {
        let map = discovered(vec![
            node("SERVICE-A", "alpha"),
            node("SERVICE-B", "beta"),
            node("SERVICE-C", "gamma"),
        ]);
        let mut edges = EdgeSet::new();
        edges.add("SERVICE-C", "SERVICE-A", Relation::Calls);
        edges.add("SERVICE-A", "SERVICE-C", Relation::Calls);
        edges.add("SERVICE-A", "SERVICE-B", Relation::Calls);
        edges.add("SERVICE-B", "SERVICE-A", Relation::Calls);

        let rows = materialize(&map, &edges);
        let pairs: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.source_id.as_str(), r.target_id.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("SERVICE-A", "SERVICE-B"),
                ("SERVICE-A", "SERVICE-C"),
                ("SERVICE-B", "SERVICE-A"),
                ("SERVICE-C", "SERVICE-A"),
            ]
        );
    }
}
