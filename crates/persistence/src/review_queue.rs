//! Priority-queue persistence for operations review

use async_trait::async_trait;
use converge_core::{PriorityQueueEntry, ReviewStatus};
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// Store for review-queue entries. Created by the system; mutated only
/// through `update` by operations staff.
#[async_trait]
pub trait ReviewQueueStore: Send + Sync {
    async fn create(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError>;

    async fn get(&self, id: Uuid) -> Result<Option<PriorityQueueEntry>, PersistenceError>;

    async fn update(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError>;

    /// Entries in the given status, highest priority first.
    async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: usize,
    ) -> Result<Vec<PriorityQueueEntry>, PersistenceError>;
}

/// ScyllaDB implementation with a JSON payload and a status index.
#[derive(Clone)]
pub struct ScyllaReviewQueueStore {
    client: ScyllaClient,
}

impl ScyllaReviewQueueStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn write(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.review_queue (entry_id, status, priority_score, payload, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    entry.id,
                    entry.status.as_str(),
                    entry.priority_score,
                    serde_json::to_string(entry)?,
                    entry.updated_at.timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewQueueStore for ScyllaReviewQueueStore {
    async fn create(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError> {
        self.write(entry).await?;
        tracing::info!(
            entry_id = %entry.id,
            intent = %entry.intent,
            priority_score = entry.priority_score,
            "review queue entry created"
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PriorityQueueEntry>, PersistenceError> {
        let query = format!(
            "SELECT payload FROM {}.review_queue WHERE entry_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id,)).await?;

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

    async fn update(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError> {
        if self.get(entry.id).await?.is_none() {
            return Err(PersistenceError::NotFound(format!(
                "review queue entry {}",
                entry.id
            )));
        }
        self.write(entry).await
    }

    async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: usize,
    ) -> Result<Vec<PriorityQueueEntry>, PersistenceError> {
        let result = match status {
            Some(status) => {
                let query = format!(
                    "SELECT payload FROM {}.review_queue WHERE status = ?",
                    self.client.keyspace()
                );
                self.client
                    .session()
                    .query_unpaged(query, (status.as_str(),))
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT payload FROM {}.review_queue",
                    self.client.keyspace()
                );
                self.client.session().query_unpaged(query, ()).await?
            }
        };

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                entries.push(serde_json::from_str::<PriorityQueueEntry>(&payload)?);
            }
        }

        entries.sort_by(|a, b| b.priority_score.partial_cmp(&a.priority_score).unwrap());
        entries.truncate(limit);
        Ok(entries)
    }
}
