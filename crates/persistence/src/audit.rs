//! Audit logging
//!
//! Every PII access on the review surface appends an entry: who looked,
//! at what, and when.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// Reviewer or system identity
    pub actor: String,
    /// e.g. "pii_access", "review_action"
    pub action: String,
    /// Record the action touched, e.g. "review_queue/<uuid>"
    pub target: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), PersistenceError>;

    /// Most recent entries for a target, newest first.
    async fn list_for_target(
        &self,
        target: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, PersistenceError>;
}

/// ScyllaDB implementation, partitioned by target.
#[derive(Clone)]
pub struct ScyllaAuditLog {
    client: ScyllaClient,
}

impl ScyllaAuditLog {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuditLog for ScyllaAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.audit_log (target, entry_id, created_at, actor, action, details) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &entry.target,
                    entry.id,
                    entry.created_at.timestamp_millis(),
                    &entry.actor,
                    &entry.action,
                    &entry.details,
                ),
            )
            .await?;

        Ok(())
    }

    async fn list_for_target(
        &self,
        target: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, PersistenceError> {
        let query = format!(
            "SELECT target, entry_id, created_at, actor, action, details \
             FROM {}.audit_log WHERE target = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (target, limit as i32))
            .await?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (target, entry_id, created_at, actor, action, details): (
                    String,
                    Uuid,
                    i64,
                    String,
                    String,
                    String,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                entries.push(AuditEntry {
                    id: entry_id,
                    actor,
                    action,
                    target,
                    details,
                    created_at: DateTime::from_timestamp_millis(created_at)
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_constructor() {
        let entry = AuditEntry::new("ops-7", "pii_access", "review_queue/abc", "full snippet view");
        assert_eq!(entry.actor, "ops-7");
        assert_eq!(entry.action, "pii_access");
        assert!(!entry.id.is_nil());
    }
}
