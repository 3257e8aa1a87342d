//! Export adapters: serialize the resolved edge list to tabular and graph
//! formats. All writers consume the same stable column schema; downstream
//! spreadsheet and graph consumers key on column order and naming.

mod csv;
mod graphml;

pub use csv::write_csv;
pub use graphml::write_graphml;

use crate::topology::ResolvedEdge;

/// Fixed edge-list column order. Do not reorder or rename: downstream
/// consumers key on these.
pub const EDGE_COLUMNS: [&str; 13] = [
    "Source_ID",
    "Source_Name",
    "Source_PG",
    "Source_WebAppID",
    "Source_RemoteName",
    "Source_WebServer",
    "RELATION",
    "Target_ID",
    "Target_Name",
    "Target_PG",
    "Target_WebAppID",
    "Target_RemoteName",
    "Target_WebServer",
];

/// One edge flattened into the stable column order.
pub fn edge_row(edge: &ResolvedEdge) -> [&str; 13] {
    [
        &edge.source_id,
        &edge.source_name,
        &edge.source_process_group,
        &edge.source_web_application_id,
        &edge.source_remote_endpoint,
        &edge.source_web_server,
        edge.relation.as_str(),
        &edge.target_id,
        &edge.target_name,
        &edge.target_process_group,
        &edge.target_web_application_id,
        &edge.target_remote_endpoint,
        &edge.target_web_server,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Relation;

    pub(crate) fn sample_edge() -> ResolvedEdge {
        ResolvedEdge {
            source_id: "SERVICE-A".to_string(),
            source_name: "alpha".to_string(),
            source_process_group: "PG-A".to_string(),
            source_web_application_id: "".to_string(),
            source_remote_endpoint: "".to_string(),
            source_web_server: "apache".to_string(),
            relation: Relation::Calls,
            target_id: "SERVICE-B".to_string(),
            target_name: "beta".to_string(),
            target_process_group: "PG-B".to_string(),
            target_web_application_id: "".to_string(),
            target_remote_endpoint: "".to_string(),
            target_web_server: "".to_string(),
        }
    }

    #[test]
    fn test_edge_row_matches_column_order() {
        let edge = sample_edge();
        let row = edge_row(&edge);
        assert_eq!(row.len(), EDGE_COLUMNS.len());
        assert_eq!(row[0], "SERVICE-A");
        assert_eq!(row[6], "CALLS");
        assert_eq!(row[7], "SERVICE-B");
    }
}
