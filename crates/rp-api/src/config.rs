//! Server configuration, read from the environment
use std::env;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8787";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address (`RP_ADDR`).
    pub addr: String,
    /// Log every stage of every route to the console (`RP_DEBUG`).
    pub debug: bool,
    /// Let parallel branches log through the route logger (`RP_LOG_BRANCHES`).
    pub log_branches: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            debug: false,
            log_branches: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            addr: lookup("RP_ADDR").unwrap_or(defaults.addr),
            debug: lookup("RP_DEBUG").map_or(defaults.debug, |v| is_truthy(&v)),
            log_branches: lookup("RP_LOG_BRANCHES").map_or(defaults.log_branches, |v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
