use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;

const DB_PATH: &str = "airgraph.redb";
const IMPORT_DIR: &str = "import";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub import_dir: PathBuf,
    /// Pause applied after the read/write example queries.
    pub response_delay: Duration,
    pub query_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_path: PathBuf::from(DB_PATH),
            import_dir: PathBuf::from(IMPORT_DIR),
            response_delay: Duration::from_millis(1000),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        Ok(Config {
            host: lookup("AIRGRAPH_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "AIRGRAPH_PORT")?.unwrap_or(defaults.port),
            db_path: lookup("AIRGRAPH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            import_dir: lookup("AIRGRAPH_IMPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.import_dir),
            response_delay: parse_var(&lookup, "AIRGRAPH_RESPONSE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_delay),
            query_timeout: parse_var(&lookup, "AIRGRAPH_QUERY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.query_timeout),
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = format!("{}:{}", self.host, self.port);
        value.parse().map_err(|_| ConfigError::Invalid {
            name: "AIRGRAPH_HOST",
            value,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}
