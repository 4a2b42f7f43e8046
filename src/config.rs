use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────

const DEFAULT_MONGO_URL: &str = "mongodb://localhost";
const DEFAULT_DATABASE: &str = "flask_profiler";
const DEFAULT_COLLECTION: &str = "measurements";
const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Which persistence backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Mongo,
    Memory,
}

impl Backend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid {
                key: "PROFILER_STORAGE",
                message: format!("unknown backend \"{other}\" (expected mongo or memory)"),
            }),
        }
    }
}

/// Where measurements are persisted.
///
/// Also deserializes from the upper-case keys `MONGO_URL`, `DATABASE` and
/// `COLLECTION`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_mongo_url", alias = "MONGO_URL")]
    pub mongo_url: String,
    #[serde(default = "default_database", alias = "DATABASE")]
    pub database: String,
    #[serde(default = "default_collection", alias = "COLLECTION")]
    pub collection: String,
}

fn default_mongo_url() -> String {
    DEFAULT_MONGO_URL.into()
}
fn default_database() -> String {
    DEFAULT_DATABASE.into()
}
fn default_collection() -> String {
    DEFAULT_COLLECTION.into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            mongo_url: default_mongo_url(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Read `PROFILER_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("PROFILER_STORAGE") {
            config.store.backend = Backend::parse(&raw)?;
        }
        if let Some(url) = lookup("PROFILER_MONGO_URL") {
            config.store.mongo_url = url;
        }
        if let Some(db) = lookup("PROFILER_DATABASE") {
            config.store.database = db;
        }
        if let Some(coll) = lookup("PROFILER_COLLECTION") {
            config.store.collection = coll;
        }
        if let Some(bind) = lookup("PROFILER_BIND") {
            config.server.bind = bind;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.store.backend, Backend::Mongo);
        assert_eq!(config.store.mongo_url, "mongodb://localhost");
        assert_eq!(config.store.database, "flask_profiler");
        assert_eq!(config.store.collection, "measurements");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn reads_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PROFILER_STORAGE", "Memory"),
            ("PROFILER_MONGO_URL", "mongodb://db:27017"),
            ("PROFILER_DATABASE", "perf"),
            ("PROFILER_COLLECTION", "calls"),
            ("PROFILER_BIND", "127.0.0.1:8080"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.store.mongo_url, "mongodb://db:27017");
        assert_eq!(config.store.database, "perf");
        assert_eq!(config.store.collection, "calls");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = Config::from_lookup(|k| (k == "PROFILER_STORAGE").then(|| "sqlite".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn deserializes_upper_case_keys() {
        let config: StoreConfig = serde_json::from_value(serde_json::json!({
            "MONGO_URL": "mongodb://example",
            "COLLECTION": "calls",
        }))
        .unwrap();
        assert_eq!(config.mongo_url, "mongodb://example");
        assert_eq!(config.database, "flask_profiler");
        assert_eq!(config.collection, "calls");
        assert_eq!(config.backend, Backend::Mongo);
    }
}
