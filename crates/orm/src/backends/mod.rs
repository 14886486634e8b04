//! Database Backend Abstractions
//!
//! Backends are chosen by URL scheme: `postgres://` goes to sqlx, `memory://`
//! to the in-process evaluator.

pub mod core;
pub mod memory;
pub mod postgres;

pub use self::core::*;
pub use memory::{MemoryBackend, MemoryConnection, MemoryDatabase};
pub use postgres::{PostgresBackend, PostgresConnection};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    Memory,
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "memory" => Ok(DatabaseBackendType::Memory),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
