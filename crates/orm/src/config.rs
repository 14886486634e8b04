//! Settings consumed once at start-up
//!
//! ```yaml
//! db:
//!   master: { url: "postgres://app@localhost/app", max_connections: 10 }
//!   slave:  { url: "postgres://app@replica/app" }
//!   member.slave: { url: "postgres://app@member-replica/app" }
//! redis: { host: 127.0.0.1, port: 6379, db: 0 }
//! thing: { debug: false }
//! ```

use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// URL schemes a section may point at
pub const SUPPORTED_SCHEMES: &[&str] = &["postgres", "postgresql", "memory"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingConfig {
    /// Routing sections: `master`, `slave`, `<table>.<role>[.<shard>]`
    #[serde(default)]
    pub db: BTreeMap<String, DatabaseSection>,

    #[serde(default)]
    pub redis: Option<RedisSection>,

    #[serde(default)]
    pub thing: ThingSection,
}

/// One routing section: a connection URL plus driver options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_connections: Option<u32>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<u64>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lifetime: Option<u64>,

    /// Driver options; the PostgreSQL backend understands
    /// `statement_cache_capacity` and `application_name` and logs the rest
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl DatabaseSection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn scheme(&self) -> Option<&str> {
        self.url.split_once("://").map(|(scheme, _)| scheme)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisSection {
    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            ttl_seconds: None,
        }
    }
}

impl RedisSection {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingSection {
    /// Log every statement at `info` level
    #[serde(default)]
    pub debug: bool,
}

impl ThingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(source: &str) -> OrmResult<Self> {
        serde_json::from_str(source)
            .map_err(|e| OrmError::Configuration(format!("Invalid JSON configuration: {}", e)))
    }

    pub fn from_yaml_str(source: &str) -> OrmResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            OrmError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            other => Err(OrmError::Configuration(format!(
                "Unsupported configuration format: {:?}",
                other
            ))),
        }
    }

    /// Add or replace a routing section
    pub fn with_section(mut self, name: impl Into<String>, section: DatabaseSection) -> Self {
        self.db.insert(name.into(), section);
        self
    }

    pub fn with_redis(mut self, redis: RedisSection) -> Self {
        self.redis = Some(redis);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.thing.debug = debug;
        self
    }

    pub fn section(&self, name: &str) -> Option<&DatabaseSection> {
        self.db.get(name)
    }

    pub fn is_debug(&self) -> bool {
        self.thing.debug
    }

    /// Every section needs a URL with a scheme a backend understands
    pub fn validate(&self) -> OrmResult<()> {
        for (name, section) in &self.db {
            if section.url.trim().is_empty() {
                return Err(OrmError::Configuration(format!(
                    "Section 'db.{}' has no url",
                    name
                )));
            }

            let parsed = url::Url::parse(&section.url).map_err(|e| {
                OrmError::Configuration(format!("Section 'db.{}' has an invalid url: {}", name, e))
            })?;

            if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
                return Err(OrmError::Configuration(format!(
                    "Section 'db.{}' uses unsupported scheme '{}'",
                    name,
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}
