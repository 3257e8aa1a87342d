//! GraphML edge-list writer.
//!
//! Produces a directed graph with one node per id appearing in the edge
//! list (placeholder nodes included for UNKNOWN endpoints) and one edge per
//! resolved relationship.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, SvcTopoError};
use crate::topology::ResolvedEdge;

const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

/// Node attribute keys, in declaration order.
const NODE_KEYS: [&str; 6] = [
    "label",
    "displayName",
    "processGroup",
    "webApplicationId",
    "remoteEndpoint",
    "webServerName",
];

#[derive(Debug, Clone, Default)]
struct NodeAttrs {
    name: String,
    process_group: String,
    web_application_id: String,
    remote_endpoint: String,
    web_server: String,
}

fn emit<T, E: std::fmt::Display>(result: std::result::Result<T, E>) -> Result<T> {
    result.map_err(|e| SvcTopoError::Export(e.to_string()))
}

/// Collect one attribute snapshot per node id referenced by the edge list.
/// A named snapshot wins over an UNKNOWN placeholder for the same id.
fn collect_nodes(edges: &[ResolvedEdge]) -> BTreeMap<String, NodeAttrs> {
    let mut nodes: BTreeMap<String, NodeAttrs> = BTreeMap::new();

    let mut upsert = |id: &str, attrs: NodeAttrs| {
        match nodes.get(id) {
            Some(existing) if existing.name != crate::api::UNKNOWN_NAME => {}
            _ => {
                nodes.insert(id.to_string(), attrs);
            }
        }
    };

    for edge in edges {
        upsert(
            &edge.source_id,
            NodeAttrs {
                name: edge.source_name.clone(),
                process_group: edge.source_process_group.clone(),
                web_application_id: edge.source_web_application_id.clone(),
                remote_endpoint: edge.source_remote_endpoint.clone(),
                web_server: edge.source_web_server.clone(),
            },
        );
        upsert(
            &edge.target_id,
            NodeAttrs {
                name: edge.target_name.clone(),
                process_group: edge.target_process_group.clone(),
                web_application_id: edge.target_web_application_id.clone(),
                remote_endpoint: edge.target_remote_endpoint.clone(),
                web_server: edge.target_web_server.clone(),
            },
        );
    }

    nodes
}

fn write_data<W: std::io::Write>(
    writer: &mut Writer<W>,
    key: &str,
    value: &str,
) -> Result<()> {
    let mut data = BytesStart::new("data");
    data.push_attribute(("key", key));
    emit(writer.write_event(Event::Start(data)))?;
    emit(writer.write_event(Event::Text(BytesText::new(value))))?;
    emit(writer.write_event(Event::End(BytesEnd::new("data"))))?;
    Ok(())
}

/// Write the edge list as a directed GraphML document.
pub fn write_graphml(edges: &[ResolvedEdge], path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| SvcTopoError::Export(format!("cannot open {}: {}", path.display(), e)))?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    emit(writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None))))?;

    let mut graphml = BytesStart::new("graphml");
    graphml.push_attribute(("xmlns", GRAPHML_NS));
    emit(writer.write_event(Event::Start(graphml)))?;

    for key in NODE_KEYS {
        let mut el = BytesStart::new("key");
        el.push_attribute(("id", key));
        el.push_attribute(("for", "node"));
        el.push_attribute(("attr.name", key));
        el.push_attribute(("attr.type", "string"));
        emit(writer.write_event(Event::Empty(el)))?;
    }
    let mut rel_key = BytesStart::new("key");
    rel_key.push_attribute(("id", "relation"));
    rel_key.push_attribute(("for", "edge"));
    rel_key.push_attribute(("attr.name", "relation"));
    rel_key.push_attribute(("attr.type", "string"));
    emit(writer.write_event(Event::Empty(rel_key)))?;

    let mut graph = BytesStart::new("graph");
    graph.push_attribute(("id", "G"));
    graph.push_attribute(("edgedefault", "directed"));
    emit(writer.write_event(Event::Start(graph)))?;

    for (id, attrs) in collect_nodes(edges) {
        let mut el = BytesStart::new("node");
        el.push_attribute(("id", id.as_str()));
        emit(writer.write_event(Event::Start(el)))?;

        write_data(&mut writer, "label", &attrs.name)?;
        write_data(&mut writer, "displayName", &attrs.name)?;
        if !attrs.process_group.is_empty() {
            write_data(&mut writer, "processGroup", &attrs.process_group)?;
        }
        if !attrs.web_application_id.is_empty() {
            write_data(&mut writer, "webApplicationId", &attrs.web_application_id)?;
        }
        if !attrs.remote_endpoint.is_empty() {
            write_data(&mut writer, "remoteEndpoint", &attrs.remote_endpoint)?;
        }
        if !attrs.web_server.is_empty() {
            write_data(&mut writer, "webServerName", &attrs.web_server)?;
        }

        emit(writer.write_event(Event::End(BytesEnd::new("node"))))?;
    }

    for edge in edges {
        let mut el = BytesStart::new("edge");
        el.push_attribute(("source", edge.source_id.as_str()));
        el.push_attribute(("target", edge.target_id.as_str()));
        emit(writer.write_event(Event::Start(el)))?;
        write_data(&mut writer, "relation", edge.relation.as_str())?;
        emit(writer.write_event(Event::End(BytesEnd::new("edge"))))?;
    }

    emit(writer.write_event(Event::End(BytesEnd::new("graph"))))?;
    emit(writer.write_event(Event::End(BytesEnd::new("graphml"))))?;

    log::info!("GraphML exported: {} ({} edges)", path.display(), edges.len());
    Ok(())
}
