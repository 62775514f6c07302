use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot open graph database at {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: redb::DatabaseError,
    },

    #[error("graph storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("graph session exceeded {0:?}")]
    Timeout(Duration),

    #[error("graph session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("cannot read {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("invalid graph document: {0}")]
    Document(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}
