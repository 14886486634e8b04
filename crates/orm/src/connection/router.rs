//! Routing of (table, read/write, shard) to a cached connection
//!
//! A request for table `member` tries the sections `member.slave.<shard>`,
//! `member.slave` and finally `slave` (`master` for writes). Connections are
//! opened on first use, cached per resolved section and reopened if found
//! closed. The cached handle is shared by every caller.

use crate::backends::{DatabaseBackendRegistry, DatabaseConnection};
use crate::config::{DatabaseSection, ThingConfig};
use crate::error::{OrmError, OrmResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    pub fn for_read(is_read: bool) -> Self {
        if is_read {
            Role::Slave
        } else {
            Role::Master
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }
}

/// Counters kept by the router
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub opened: u64,
    pub reopened: u64,
    pub reused: u64,
}

pub struct ConnectionRouter {
    config: Arc<ThingConfig>,
    backends: Arc<DatabaseBackendRegistry>,
    connections: DashMap<String, Arc<dyn DatabaseConnection>>,
    opened: AtomicU64,
    reopened: AtomicU64,
    reused: AtomicU64,
}

impl ConnectionRouter {
    pub fn new(config: Arc<ThingConfig>, backends: Arc<DatabaseBackendRegistry>) -> Self {
        Self {
            config,
            backends,
            connections: DashMap::new(),
            opened: AtomicU64::new(0),
            reopened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Name of the section serving this request, most specific first
    pub fn resolve_section(
        &self,
        table: &str,
        is_read: bool,
        shard: Option<&str>,
    ) -> OrmResult<(String, &DatabaseSection)> {
        let role = Role::for_read(is_read).as_str();

        let mut candidates = Vec::with_capacity(3);
        if let Some(shard) = shard {
            candidates.push(format!("{}.{}.{}", table, role, shard));
        }
        candidates.push(format!("{}.{}", table, role));
        candidates.push(role.to_string());

        for name in candidates {
            if let Some(section) = self.config.section(&name) {
                return Ok((name, section));
            }
        }

        Err(OrmError::Configuration(format!(
            "No '{}' section configured for table '{}'",
            role, table
        )))
    }

    pub async fn get_connection(
        &self,
        table: &str,
        is_read: bool,
        shard: Option<&str>,
    ) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let (name, section) = self.resolve_section(table, is_read, shard)?;

        let cached = self.connections.get(&name).map(|entry| entry.value().clone());
        if let Some(conn) = cached {
            if !conn.is_closed() {
                self.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(conn);
            }
            warn!("Connection for section '{}' was closed, reopening", name);
            self.connections.remove(&name);
            self.reopened.fetch_add(1, Ordering::Relaxed);
        }

        let conn = self.backends.connect(section).await?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!("Opened connection for section '{}'", name);

        Ok(self.connections.entry(name).or_insert(conn).clone())
    }

    /// Close and forget every cached connection
    pub async fn close_all(&self) -> OrmResult<()> {
        let connections: Vec<(String, Arc<dyn DatabaseConnection>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.connections.clear();

        for (name, conn) in connections {
            debug!("Closing connection for section '{}'", name);
            conn.close().await?;
        }
        Ok(())
    }

    pub fn open_sections(&self) -> Vec<String> {
        let mut sections: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        sections.sort();
        sections
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            opened: self.opened.load(Ordering::Relaxed),
            reopened: self.reopened.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    fn router(config: ThingConfig) -> ConnectionRouter {
        let mut registry = DatabaseBackendRegistry::new();
        registry.register(Arc::new(MemoryBackend::new()));
        ConnectionRouter::new(Arc::new(config), Arc::new(registry))
    }

    fn routed_config() -> ThingConfig {
        ThingConfig::new()
            .with_section("master", DatabaseSection::new("memory://main"))
            .with_section("slave", DatabaseSection::new("memory://replica"))
            .with_section("member.slave", DatabaseSection::new("memory://member_replica"))
            .with_section("member.master.shard1", DatabaseSection::new("memory://shard1"))
    }

    #[test]
    fn test_resolution_order() {
        let router = router(routed_config());

        let (name, _) = router.resolve_section("member", true, None).unwrap();
        assert_eq!(name, "member.slave");

        let (name, _) = router.resolve_section("member", false, None).unwrap();
        assert_eq!(name, "master");

        let (name, _) = router.resolve_section("member", false, Some("shard1")).unwrap();
        assert_eq!(name, "member.master.shard1");

        let (name, _) = router.resolve_section("member", true, Some("shard1")).unwrap();
        assert_eq!(name, "member.slave");

        let (name, _) = router.resolve_section("vote", true, None).unwrap();
        assert_eq!(name, "slave");
    }

    #[test]
    fn test_missing_section_is_configuration_error() {
        let router = router(ThingConfig::new().with_section("master", DatabaseSection::new("memory://main")));
        let err = router.resolve_section("member", true, None).unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_connections_are_cached_per_section() {
        let router = router(routed_config());

        let first = router.get_connection("vote", true, None).await.unwrap();
        let second = router.get_connection("comment", true, None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        router.get_connection("member", true, None).await.unwrap();
        assert_eq!(router.open_sections(), vec!["member.slave", "slave"]);
        assert_eq!(router.stats().opened, 2);
        assert_eq!(router.stats().reused, 1);
    }

    #[tokio::test]
    async fn test_closed_connection_is_reopened() {
        let router = router(routed_config());

        let conn = router.get_connection("vote", false, None).await.unwrap();
        conn.close().await.unwrap();

        let reopened = router.get_connection("vote", false, None).await.unwrap();
        assert!(!reopened.is_closed());
        assert!(!Arc::ptr_eq(&conn, &reopened));
        assert_eq!(router.stats().reopened, 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let router = router(routed_config());
        let conn = router.get_connection("vote", true, None).await.unwrap();

        router.close_all().await.unwrap();
        assert!(conn.is_closed());
        assert!(router.open_sections().is_empty());
    }
}
