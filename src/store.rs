use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::error::GraphError;
use crate::keys::{
    adjacency_key, adjacency_prefix, edge_record, entity_key, index_key, index_prefix,
    property_key, property_prefix, split_decoded,
};

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const NODES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("nodes");
const NODE_DATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("node_data");
const NODE_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("node_index");
const EDGES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("edges");
const EDGE_DATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("edge_data");
const ADJACENCY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("adjacency");

const GRAPH_TABLES: [TableDefinition<&str, &str>; 6] = [
    NODES_TABLE,
    NODE_DATA_TABLE,
    NODE_INDEX_TABLE,
    EDGES_TABLE,
    EDGE_DATA_TABLE,
    ADJACENCY_TABLE,
];

const NODE_SEQ: &str = "node_seq";
const EDGE_SEQ: &str = "edge_seq";

type StrGuard<'a> = redb::AccessGuard<'a, &'static str>;

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub key: String,
    pub label: String,
    pub properties: Properties,
}

impl StoredNode {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub key: String,
    pub from: String,
    pub to: String,
    pub label: String,
    pub properties: Properties,
}

impl StoredEdge {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Scalar rendering used wherever a property is shown as text.
pub fn render_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct GraphDb {
    db: Arc<Database>,
    timeout: Duration,
}

impl GraphDb {
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, GraphError> {
        let db = Database::create(path).map_err(|source| GraphError::Connection {
            path: path.display().to_string(),
            source,
        })?;
        init_db(&db)?;
        Ok(GraphDb {
            db: Arc::new(db),
            timeout,
        })
    }

    pub async fn read<T, F>(&self, operation: F) -> Result<T, GraphError>
    where
        T: Send + 'static,
        F: FnOnce(&ReadSession) -> Result<T, GraphError> + Send + 'static,
    {
        let graph = self.clone();
        self.bounded(tokio::task::spawn_blocking(move || {
            graph.read_blocking(operation)
        }))
        .await
    }

    pub async fn write<T, F>(&self, operation: F) -> Result<T, GraphError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteSession) -> Result<T, GraphError> + Send + 'static,
    {
        let graph = self.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let result = self
            .bounded(tokio::task::spawn_blocking(move || {
                graph.write_unless_cancelled(operation, &flag)
            }))
            .await;
        if matches!(result, Err(GraphError::Timeout(_))) {
            cancelled.store(true, Ordering::SeqCst);
        }
        result
    }

    pub fn read_blocking<T>(
        &self,
        operation: impl FnOnce(&ReadSession) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let session = ReadSession { txn };
        operation(&session)
    }

    /// Commits only when `operation` succeeds; any error aborts the session.
    pub fn write_blocking<T>(
        &self,
        operation: impl FnOnce(&mut WriteSession) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        self.write_unless_cancelled(operation, &AtomicBool::new(false))
    }

    // A caller that already gave up on the session gets it aborted instead of committed.
    fn write_unless_cancelled<T>(
        &self,
        operation: impl FnOnce(&mut WriteSession) -> Result<T, GraphError>,
        cancelled: &AtomicBool,
    ) -> Result<T, GraphError> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        let mut session = WriteSession { txn };
        let outcome = operation(&mut session).and_then(|value| {
            if cancelled.load(Ordering::SeqCst) {
                Err(GraphError::Timeout(self.timeout))
            } else {
                Ok(value)
            }
        });
        match outcome {
            Ok(value) => {
                session.txn.commit().map_err(redb::Error::from)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(abort) = session.txn.abort() {
                    tracing::warn!(%abort, "failed to abort write session");
                }
                Err(error)
            }
        }
    }

    // The blocking task keeps running after a timeout; writes check the flag before committing.
    async fn bounded<T>(&self, task: JoinHandle<Result<T, GraphError>>) -> Result<T, GraphError> {
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(GraphError::Timeout(self.timeout)),
        }
    }
}

pub struct ReadSession {
    txn: ReadTransaction,
}

impl ReadSession {
    pub fn nodes(&self, label: Option<&str>) -> Result<Vec<StoredNode>, redb::Error> {
        let nodes = self.txn.open_table(NODES_TABLE)?;
        let data = self.txn.open_table(NODE_DATA_TABLE)?;
        scan_nodes(&nodes, &data, label)
    }

    pub fn node(&self, key: &str) -> Result<Option<StoredNode>, redb::Error> {
        let nodes = self.txn.open_table(NODES_TABLE)?;
        let data = self.txn.open_table(NODE_DATA_TABLE)?;
        load_node(&nodes, &data, key)
    }

    pub fn nodes_where(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<StoredNode>, redb::Error> {
        let index = self.txn.open_table(NODE_INDEX_TABLE)?;
        let nodes = self.txn.open_table(NODES_TABLE)?;
        let data = self.txn.open_table(NODE_DATA_TABLE)?;
        find_nodes(&index, &nodes, &data, label, key, value)
    }

    pub fn edges(&self, label: Option<&str>) -> Result<Vec<StoredEdge>, redb::Error> {
        let edges = self.txn.open_table(EDGES_TABLE)?;
        let data = self.txn.open_table(EDGE_DATA_TABLE)?;
        scan_edges(&edges, &data, label)
    }

    /// Every edge starting or ending at `node`, in creation order.
    pub fn incident_edges(&self, node: &str) -> Result<Vec<StoredEdge>, redb::Error> {
        let adjacency = self.txn.open_table(ADJACENCY_TABLE)?;
        let edges = self.txn.open_table(EDGES_TABLE)?;
        let data = self.txn.open_table(EDGE_DATA_TABLE)?;

        let prefix = adjacency_prefix(node);
        let mut incident = Vec::new();
        for entry in adjacency.range(prefix.as_str()..)? {
            let (key, _): (StrGuard<'_>, StrGuard<'_>) = entry?;
            let key_value = key.value();
            if !key_value.starts_with(&prefix) {
                break;
            }
            let Some([_, edge_key]) = split_decoded(key_value) else {
                continue;
            };
            let Some(record) = edges.get(edge_key.as_str())? else {
                continue;
            };
            let Some(mut edge) = decode_edge(&edge_key, record.value()) else {
                continue;
            };
            edge.properties = load_properties(&data, &edge_key)?;
            incident.push(edge);
        }
        Ok(incident)
    }
}

pub struct WriteSession {
    txn: WriteTransaction,
}

impl WriteSession {
    /// Creates a node and returns its store key. `null` properties are not stored.
    pub fn create_node(
        &mut self,
        label: &str,
        properties: &Properties,
    ) -> Result<String, redb::Error> {
        let key = entity_key(self.next_seq(NODE_SEQ)?);
        let mut nodes = self.txn.open_table(NODES_TABLE)?;
        let mut data = self.txn.open_table(NODE_DATA_TABLE)?;
        let mut index = self.txn.open_table(NODE_INDEX_TABLE)?;
        nodes.insert(key.as_str(), label)?;
        for (name, value) in properties {
            if value.is_null() {
                continue;
            }
            let encoded = value.to_string();
            data.insert(property_key(&key, name).as_str(), encoded.as_str())?;
            if is_indexable(value) {
                index.insert(index_key(name, &encoded, &key).as_str(), "")?;
            }
        }
        Ok(key)
    }

    pub fn create_edge(
        &mut self,
        from: &str,
        to: &str,
        label: &str,
        properties: &Properties,
    ) -> Result<String, redb::Error> {
        let key = entity_key(self.next_seq(EDGE_SEQ)?);
        let mut edges = self.txn.open_table(EDGES_TABLE)?;
        let mut data = self.txn.open_table(EDGE_DATA_TABLE)?;
        let mut adjacency = self.txn.open_table(ADJACENCY_TABLE)?;
        edges.insert(key.as_str(), edge_record(from, to, label).as_str())?;
        for (name, value) in properties {
            if value.is_null() {
                continue;
            }
            data.insert(property_key(&key, name).as_str(), value.to_string().as_str())?;
        }
        adjacency.insert(adjacency_key(from, &key).as_str(), "")?;
        adjacency.insert(adjacency_key(to, &key).as_str(), "")?;
        Ok(key)
    }

    pub fn nodes_where(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<StoredNode>, redb::Error> {
        let index = self.txn.open_table(NODE_INDEX_TABLE)?;
        let nodes = self.txn.open_table(NODES_TABLE)?;
        let data = self.txn.open_table(NODE_DATA_TABLE)?;
        find_nodes(&index, &nodes, &data, label, key, value)
    }

    /// Removes every node, edge and property and restarts key allocation.
    pub fn clear(&mut self) -> Result<(), redb::Error> {
        for table in GRAPH_TABLES {
            self.txn.delete_table(table)?;
        }
        self.txn.delete_table(META_TABLE)?;
        create_tables(&self.txn)
    }

    fn next_seq(&self, name: &str) -> Result<u64, redb::Error> {
        let mut meta = self.txn.open_table(META_TABLE)?;
        let next = meta.get(name)?.map(|guard| guard.value()).unwrap_or(0) + 1;
        meta.insert(name, next)?;
        Ok(next)
    }
}

fn init_db(db: &Database) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    create_tables(&write_txn)?;
    write_txn.commit()?;
    Ok(())
}

fn create_tables(txn: &WriteTransaction) -> Result<(), redb::Error> {
    txn.open_table(META_TABLE)?;
    for table in GRAPH_TABLES {
        txn.open_table(table)?;
    }
    Ok(())
}

fn is_indexable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn decode_edge(key: &str, record: &str) -> Option<StoredEdge> {
    let [from, to, label] = split_decoded(record)?;
    Some(StoredEdge {
        key: key.to_string(),
        from,
        to,
        label,
        properties: Properties::new(),
    })
}

fn load_properties(
    table: &impl ReadableTable<&'static str, &'static str>,
    entity: &str,
) -> Result<Properties, redb::Error> {
    let prefix = property_prefix(entity);
    let mut properties = Properties::new();
    for entry in table.range(prefix.as_str()..)? {
        let (key, value): (StrGuard<'_>, StrGuard<'_>) = entry?;
        let key_value = key.value();
        if !key_value.starts_with(&prefix) {
            break;
        }
        let Some([_, name]) = split_decoded(key_value) else {
            continue;
        };
        match serde_json::from_str(value.value()) {
            Ok(parsed) => {
                properties.insert(name, parsed);
            }
            Err(error) => {
                tracing::warn!(entity, property = %name, %error, "skipping undecodable property");
            }
        }
    }
    Ok(properties)
}

fn load_node(
    nodes: &impl ReadableTable<&'static str, &'static str>,
    data: &impl ReadableTable<&'static str, &'static str>,
    key: &str,
) -> Result<Option<StoredNode>, redb::Error> {
    let Some(label) = nodes.get(key)? else {
        return Ok(None);
    };
    let label = label.value().to_string();
    Ok(Some(StoredNode {
        key: key.to_string(),
        label,
        properties: load_properties(data, key)?,
    }))
}

fn scan_nodes(
    nodes: &impl ReadableTable<&'static str, &'static str>,
    data: &impl ReadableTable<&'static str, &'static str>,
    label: Option<&str>,
) -> Result<Vec<StoredNode>, redb::Error> {
    let mut found = Vec::new();
    for entry in nodes.iter()? {
        let (key, stored_label): (StrGuard<'_>, StrGuard<'_>) = entry?;
        if label.is_some_and(|label| label != stored_label.value()) {
            continue;
        }
        let key = key.value().to_string();
        let properties = load_properties(data, &key)?;
        found.push(StoredNode {
            key,
            label: stored_label.value().to_string(),
            properties,
        });
    }
    Ok(found)
}

fn find_nodes(
    index: &impl ReadableTable<&'static str, &'static str>,
    nodes: &impl ReadableTable<&'static str, &'static str>,
    data: &impl ReadableTable<&'static str, &'static str>,
    label: &str,
    key: &str,
    value: &Value,
) -> Result<Vec<StoredNode>, redb::Error> {
    let prefix = index_prefix(key, &value.to_string());
    let mut found = Vec::new();
    for entry in index.range(prefix.as_str()..)? {
        let (index_entry, _): (StrGuard<'_>, StrGuard<'_>) = entry?;
        let entry_value = index_entry.value();
        if !entry_value.starts_with(&prefix) {
            break;
        }
        let Some([_, _, node_key]) = split_decoded(entry_value) else {
            continue;
        };
        if let Some(node) = load_node(nodes, data, &node_key)? {
            if node.label == label {
                found.push(node);
            }
        }
    }
    Ok(found)
}

fn scan_edges(
    edges: &impl ReadableTable<&'static str, &'static str>,
    data: &impl ReadableTable<&'static str, &'static str>,
    label: Option<&str>,
) -> Result<Vec<StoredEdge>, redb::Error> {
    let mut found = Vec::new();
    for entry in edges.iter()? {
        let (key, record): (StrGuard<'_>, StrGuard<'_>) = entry?;
        let Some(mut edge) = decode_edge(key.value(), record.value()) else {
            continue;
        };
        if label.is_some_and(|label| label != edge.label) {
            continue;
        }
        edge.properties = load_properties(data, &edge.key)?;
        found.push(edge);
    }
    Ok(found)
}
