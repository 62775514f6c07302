pub mod airports;
pub mod config;
pub mod error;
pub mod importer;
pub mod keys;
pub mod routes;
pub mod search;
pub mod store;

pub use config::Config;
pub use error::{ConfigError, GraphError};
pub use store::GraphDb;
