//! Entity model: normalizes raw Monitored Entities API payloads into
//! canonical [`ServiceNode`] records. Pure data transformation, no I/O.

use serde::Deserialize;

use crate::error::{Result, SvcTopoError};

/// Entity type this tool traverses; cross-type relationships are dropped.
pub const SERVICE_TYPE: &str = "SERVICE";

/// Sentinel display name for nodes referenced but never fetched.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

/// One discovered service entity.
///
/// Populated once when the entity is first fetched; never mutated afterwards
/// (a node is fetched at most once per traversal run).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceNode {
    pub id: String,
    pub display_name: String,
    pub process_group: String,
    pub web_application_id: String,
    pub remote_endpoint: String,
    pub web_server_name: String,
    pub service_type: String,
    /// Ids of services this service calls (outgoing CALLS relationships).
    /// May reference services not yet fetched.
    pub calls: Vec<String>,
    /// Ids of services calling this service (incoming CALLED_BY
    /// relationships); only populated in full-scan mode.
    pub called_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntity {
    entity_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    properties: RawProperties,
    #[serde(default)]
    from_relationships: RawFromRelationships,
    #[serde(default)]
    to_relationships: RawToRelationships,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    #[serde(default)]
    process_group: String,
    #[serde(default)]
    web_application_id: String,
    #[serde(default)]
    remote_endpoint: String,
    #[serde(default)]
    web_server_name: String,
    #[serde(default)]
    service_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawFromRelationships {
    #[serde(default)]
    calls: Vec<RawRelationTarget>,
}

#[derive(Debug, Default, Deserialize)]
struct RawToRelationships {
    // The API exposes this relationship under a snake_case key, unlike the
    // rest of the payload.
    #[serde(default, rename = "called_by")]
    called_by: Vec<RawRelationTarget>,
}

#[derive(Debug, Deserialize)]
struct RawRelationTarget {
    id: String,
    #[serde(default, rename = "type")]
    entity_type: String,
}

/// Decode one raw entity record into a [`ServiceNode`].
///
/// Relationship targets whose declared type is not SERVICE are silently
/// dropped (same-kind edges only).
pub fn decode_entity(raw: &serde_json::Value) -> Result<ServiceNode> {
    let entity: RawEntity = serde_json::from_value(raw.clone())
        .map_err(|e| SvcTopoError::Decode(format!("malformed entity record: {}", e)))?;

    if entity.entity_id.is_empty() {
        return Err(SvcTopoError::Decode("entity record missing entityId".to_string()));
    }

    let keep_services = |targets: Vec<RawRelationTarget>| -> Vec<String> {
        targets
            .into_iter()
            .filter(|t| t.entity_type == SERVICE_TYPE)
            .map(|t| t.id)
            .collect()
    };

    Ok(ServiceNode {
        id: entity.entity_id,
        display_name: entity.display_name,
        process_group: entity.properties.process_group,
        web_application_id: entity.properties.web_application_id,
        remote_endpoint: entity.properties.remote_endpoint,
        web_server_name: entity.properties.web_server_name,
        service_type: entity.properties.service_type,
        calls: keep_services(entity.from_relationships.calls),
        called_by: keep_services(entity.to_relationships.called_by),
    })
}

/// Decode a batch of raw records, skipping malformed ones.
///
/// A single bad record must not invalidate the other 49 in its batch: each
/// failure is logged and the record dropped.
pub fn decode_entities(raw_entities: &[serde_json::Value]) -> Vec<ServiceNode> {
    let mut nodes = Vec::with_capacity(raw_entities.len());
    for raw in raw_entities {
        match decode_entity(raw) {
            Ok(node) => nodes.push(node),
            Err(e) => log::warn!("Skipping undecodable entity record: {}", e),
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entity() -> serde_json::Value {
        json!({
            "entityId": "SERVICE-AAA",
            "displayName": "checkout-service",
            "properties": {
                "processGroup": "PROCESS_GROUP-1",
                "webApplicationId": "easyTravel",
                "serviceType": "WEB_SERVICE",
                "webServerName": "apache-01"
            },
            "fromRelationships": {
                "calls": [
                    {"id": "SERVICE-BBB", "type": "SERVICE"},
                    {"id": "PROCESS_GROUP-2", "type": "PROCESS_GROUP"},
                    {"id": "SERVICE-CCC", "type": "SERVICE"}
                ]
            },
            "toRelationships": {
                "called_by": [
                    {"id": "SERVICE-DDD", "type": "SERVICE"},
                    {"id": "HOST-1", "type": "HOST"}
                ]
            }
        })
    }

    #[test]
    fn test_decode_full_entity() {
        let node = decode_entity(&sample_entity()).unwrap();
        assert_eq!(node.id, "SERVICE-AAA");
        assert_eq!(node.display_name, "checkout-service");
        assert_eq!(node.process_group, "PROCESS_GROUP-1");
        assert_eq!(node.web_application_id, "easyTravel");
        assert_eq!(node.service_type, "WEB_SERVICE");
        assert_eq!(node.web_server_name, "apache-01");
        assert_eq!(node.remote_endpoint, "");
    }

    #[test]
    fn test_decode_filters_cross_type_relationships() {
        let node = decode_entity(&sample_entity()).unwrap();
        // PROCESS_GROUP and HOST targets dropped, order preserved
        assert_eq!(node.calls, vec!["SERVICE-BBB", "SERVICE-CCC"]);
        assert_eq!(node.called_by, vec!["SERVICE-DDD"]);
    }

    #[test]
    fn test_decode_minimal_entity_defaults() {
        let node = decode_entity(&json!({"entityId": "SERVICE-X"})).unwrap();
        assert_eq!(node.id, "SERVICE-X");
        assert_eq!(node.display_name, "");
        assert!(node.calls.is_empty());
        assert!(node.called_by.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        assert!(decode_entity(&json!({"displayName": "orphan"})).is_err());
        assert!(decode_entity(&json!({"entityId": ""})).is_err());
    }

    #[test]
    fn test_decode_batch_skips_bad_records() {
        let batch = vec![
            sample_entity(),
            json!({"displayName": "no id here"}),
            json!("not even an object"),
            json!({"entityId": "SERVICE-EEE"}),
        ];
        let nodes = decode_entities(&batch);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, "SERVICE-AAA");
        assert_eq!(nodes[1].id, "SERVICE-EEE");
    }
}
