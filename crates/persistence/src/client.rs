//! ScyllaDB client wrapper

use scylla::{Session, SessionBuilder};
use std::sync::Arc;

use crate::schema;
use crate::PersistenceError;

/// ScyllaDB connection configuration.
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "converge".to_string(),
            replication_factor: 1,
        }
    }
}

/// Shared session handle.
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    /// Connect to the cluster.
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "connected to ScyllaDB");

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }

    /// Create the keyspace and tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        for statement in schema::schema_statements(&self.config.keyspace, self.config.replication_factor)
        {
            self.session.query_unpaged(statement, ()).await?;
        }
        tracing::info!(keyspace = %self.config.keyspace, "schema ensured");
        Ok(())
    }
}
