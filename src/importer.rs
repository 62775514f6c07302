use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::GraphError;
use crate::store::{GraphDb, Properties};

pub const NODE_TYPE_FIELD: &str = "Node Type";
pub const EDGE_TYPE_FIELD: &str = "Edge Type";

#[derive(Debug, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Map<String, Value>>,
    #[serde(default)]
    pub links: Vec<Map<String, Value>>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub nodes: usize,
    pub links: usize,
    pub created_links: usize,
    pub skipped_links: usize,
}

pub fn read_document(path: &Path) -> Result<GraphDocument, GraphError> {
    let text = fs::read_to_string(path)
        .map_err(|error| GraphError::Document(format!("{}: {error}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|error| GraphError::Document(format!("{}: {error}", path.display())))
}

pub fn load_document(
    graph: &GraphDb,
    document: &GraphDocument,
    batch_size: usize,
) -> Result<LoadReport, GraphError> {
    let batch_size = batch_size.max(1);
    let mut report = LoadReport {
        nodes: document.nodes.len(),
        links: document.links.len(),
        ..LoadReport::default()
    };

    // External id (as JSON text, so 1 and "1" stay distinct) -> store key.
    let mut node_keys: HashMap<String, String> = HashMap::new();
    for (batch_index, batch) in document.nodes.chunks(batch_size).enumerate() {
        let created = graph.write_blocking(|session| {
            let mut created = Vec::with_capacity(batch.len());
            for record in batch {
                let label = type_field(record, NODE_TYPE_FIELD)?;
                let properties: Properties = record
                    .iter()
                    .filter(|(name, _)| name.as_str() != NODE_TYPE_FIELD)
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                let key = session.create_node(label, &properties)?;
                if let Some(external) = record.get("id") {
                    created.push((external.to_string(), key));
                }
            }
            Ok(created)
        })?;
        node_keys.extend(created);
        tracing::debug!(batch = batch_index, "node batch committed");
    }

    for (batch_index, batch) in document.links.chunks(batch_size).enumerate() {
        let created = graph.write_blocking(|session| {
            let mut created = 0;
            for link in batch {
                let label = type_field(link, EDGE_TYPE_FIELD)?;
                let (Some(source), Some(target)) =
                    (endpoint(&node_keys, link, "source"), endpoint(&node_keys, link, "target"))
                else {
                    continue;
                };
                session.create_edge(source, target, label, &Properties::new())?;
                created += 1;
            }
            Ok(created)
        })?;
        report.created_links += created;
        tracing::debug!(batch = batch_index, "link batch committed");
    }
    report.skipped_links = report.links - report.created_links;

    tracing::info!(
        nodes = report.nodes,
        links = report.links,
        created_links = report.created_links,
        skipped_links = report.skipped_links,
        "graph document loaded"
    );
    Ok(report)
}

fn type_field<'a>(record: &'a Map<String, Value>, field: &str) -> Result<&'a str, GraphError> {
    record.get(field).and_then(Value::as_str).ok_or_else(|| {
        GraphError::Document(format!(
            "record without string {field:?}: {}",
            Value::Object(record.clone())
        ))
    })
}

fn endpoint<'a>(
    node_keys: &'a HashMap<String, String>,
    link: &Map<String, Value>,
    field: &str,
) -> Option<&'a str> {
    node_keys
        .get(&link.get(field)?.to_string())
        .map(String::as_str)
}
