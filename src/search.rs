use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::error::GraphError;
use crate::store::{Properties, ReadSession, StoredNode, render_value};

#[derive(Debug, Serialize, PartialEq)]
pub struct NodeView {
    pub id: Option<String>,
    pub name: Value,
    #[serde(rename = "type")]
    pub label: String,
    pub properties: Properties,
}

impl From<&StoredNode> for NodeView {
    fn from(node: &StoredNode) -> Self {
        NodeView {
            id: render_value(node.property("id")),
            name: node.property("name").cloned().unwrap_or(Value::Null),
            label: node.label.clone(),
            properties: node.properties.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EdgeView {
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub label: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Neighbourhood {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

/// True when `name` contains `term` ignoring case, or `id` renders exactly as `term`.
/// The term is literal text, never a pattern.
pub fn matches_term(node: &StoredNode, term: &str) -> bool {
    if render_value(node.property("id")).as_deref() == Some(term) {
        return true;
    }
    match node.property("name") {
        Some(Value::String(name)) => name.to_lowercase().contains(&term.to_lowercase()),
        _ => false,
    }
}

/// First matching node (creation order) followed by its distinct neighbours,
/// plus the distinct `(source, target, type)` edges touching it.
pub fn find_neighbourhood(
    session: &ReadSession,
    term: &str,
) -> Result<Option<Neighbourhood>, GraphError> {
    let Some(main) = session
        .nodes(None)?
        .into_iter()
        .find(|node| matches_term(node, term))
    else {
        return Ok(None);
    };

    let main_id = render_value(main.property("id"));
    let mut nodes = vec![NodeView::from(&main)];
    let mut edges = Vec::new();
    let mut seen_nodes = HashSet::new();
    let mut seen_edges = HashSet::new();
    for edge in session.incident_edges(&main.key)? {
        let other = if edge.from == main.key { &edge.to } else { &edge.from };
        let Some(neighbour) = session.node(other)? else {
            continue;
        };
        let neighbour_id = render_value(neighbour.property("id"));
        let (source, target) = if edge.from == main.key {
            (main_id.clone(), neighbour_id)
        } else {
            (neighbour_id, main_id.clone())
        };
        if seen_edges.insert((source.clone(), target.clone(), edge.label.clone())) {
            edges.push(EdgeView {
                source,
                target,
                label: edge.label,
            });
        }
        if seen_nodes.insert(neighbour.key.clone()) {
            nodes.push(NodeView::from(&neighbour));
        }
    }

    Ok(Some(Neighbourhood { nodes, edges }))
}
