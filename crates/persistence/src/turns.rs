//! Conversation turn persistence

use async_trait::async_trait;
use converge_core::ConversationTurn;

use crate::{PersistenceError, ScyllaClient};

/// Store for immutable conversation turns.
#[async_trait]
pub trait ConversationTurnStore: Send + Sync {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), PersistenceError>;

    /// Most recent turns, oldest first.
    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, PersistenceError>;
}

/// ScyllaDB implementation; turns persist as JSON payloads clustered by
/// time within the session partition.
#[derive(Clone)]
pub struct ScyllaTurnStore {
    client: ScyllaClient,
}

impl ScyllaTurnStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationTurnStore for ScyllaTurnStore {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.conversation_turns (session_id, turn_id, created_at, payload) \
             VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &turn.session_id,
                    turn.id,
                    turn.created_at.timestamp_millis(),
                    serde_json::to_string(turn)?,
                ),
            )
            .await?;

        tracing::debug!(
            session_id = %turn.session_id,
            role = turn.role.as_str(),
            intent = ?turn.intent,
            "conversation turn persisted"
        );

        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, PersistenceError> {
        // Clustering order is ascending; fetch the whole partition tail.
        let query = format!(
            "SELECT payload FROM {}.conversation_turns WHERE session_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;

        let mut turns = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                turns.push(serde_json::from_str(&payload)?);
            }
        }

        if turns.len() > limit {
            turns.drain(..turns.len() - limit);
        }
        Ok(turns)
    }
}
