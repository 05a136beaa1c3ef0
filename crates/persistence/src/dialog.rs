//! Dialog state persistence
//!
//! One row per session; concurrent writers resolve by last-write-wins
//! on `updated_at`, which makes retried writes idempotent.

use async_trait::async_trait;
use converge_core::DialogState;

use crate::{PersistenceError, ScyllaClient};

/// Store for the per-session dialog state.
#[async_trait]
pub trait DialogStateStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<DialogState>, PersistenceError>;

    /// Write the state unless a newer write already landed.
    async fn put(&self, state: &DialogState) -> Result<(), PersistenceError>;

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation with the state as a JSON payload.
#[derive(Clone)]
pub struct ScyllaDialogStateStore {
    client: ScyllaClient,
}

impl ScyllaDialogStateStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DialogStateStore for ScyllaDialogStateStore {
    async fn get(&self, session_id: &str) -> Result<Option<DialogState>, PersistenceError> {
        let query = format!(
            "SELECT payload FROM {}.dialog_states WHERE session_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (payload,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return Ok(Some(serde_json::from_str(&payload)?));
            }
        }

        Ok(None)
    }

    async fn put(&self, state: &DialogState) -> Result<(), PersistenceError> {
        // Last-write-wins on updated_at
        if let Some(existing) = self.get(&state.session_id).await? {
            if existing.updated_at > state.updated_at {
                tracing::debug!(
                    session_id = %state.session_id,
                    "skipping stale dialog state write"
                );
                return Ok(());
            }
        }

        let query = format!(
            "INSERT INTO {}.dialog_states (session_id, payload, updated_at) VALUES (?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &state.session_id,
                    serde_json::to_string(state)?,
                    state.updated_at.timestamp_millis(),
                ),
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        let query = format!(
            "DELETE FROM {}.dialog_states WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;
        Ok(())
    }
}
