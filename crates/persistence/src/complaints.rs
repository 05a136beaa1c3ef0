//! Complaint persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, ScyllaClient};

/// Rule-table priority of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintPriority {
    Low,
    Medium,
    High,
}

impl ComplaintPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Complaint lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "resolved" => Self::Resolved,
            _ => Self::Open,
        }
    }
}

/// Complaint row with SLA deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    pub complaint_id: String,
    pub user_id: i64,
    pub session_id: String,
    pub issue_type: String,
    pub description: String,
    pub booking_order_id: Option<String>,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub response_due: DateTime<Utc>,
    pub resolution_due: DateTime<Utc>,
    pub confirmation_nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Complaint store.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn create(&self, complaint: &Complaint) -> Result<(), PersistenceError>;

    async fn get(
        &self,
        user_id: i64,
        complaint_id: &str,
    ) -> Result<Option<Complaint>, PersistenceError>;

    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Complaint>, PersistenceError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Complaint>, PersistenceError>;

    /// Complaints filed by the user since the given instant; feeds the
    /// repeat-issue factor of the priority score.
    async fn count_recent_for_user(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError>;
}

/// ScyllaDB implementation of the complaint store.
#[derive(Clone)]
pub struct ScyllaComplaintStore {
    client: ScyllaClient,
}

impl ScyllaComplaintStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    const SELECT_COLUMNS: &'static str = "user_id, complaint_id, session_id, issue_type, \
        description, booking_order_id, priority, status, response_due, resolution_due, \
        confirmation_nonce, created_at, updated_at";

    fn row_to_complaint(
        row: scylla::frame::response::result::Row,
    ) -> Result<Complaint, PersistenceError> {
        let (
            user_id,
            complaint_id,
            session_id,
            issue_type,
            description,
            booking_order_id,
            priority,
            status,
            response_due,
            resolution_due,
            confirmation_nonce,
            created_at,
            updated_at,
        ): (
            i64,
            String,
            String,
            String,
            String,
            Option<String>,
            String,
            String,
            i64,
            i64,
            String,
            i64,
            i64,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Complaint {
            complaint_id,
            user_id,
            session_id,
            issue_type,
            description,
            booking_order_id,
            priority: ComplaintPriority::parse(&priority),
            status: ComplaintStatus::parse(&status),
            response_due: DateTime::from_timestamp_millis(response_due).unwrap_or_else(Utc::now),
            resolution_due: DateTime::from_timestamp_millis(resolution_due)
                .unwrap_or_else(Utc::now),
            confirmation_nonce,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl ComplaintStore for ScyllaComplaintStore {
    async fn create(&self, complaint: &Complaint) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.complaints (
                user_id, complaint_id, session_id, issue_type, description,
                booking_order_id, priority, status, response_due, resolution_due,
                confirmation_nonce, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    complaint.user_id,
                    &complaint.complaint_id,
                    &complaint.session_id,
                    &complaint.issue_type,
                    &complaint.description,
                    &complaint.booking_order_id,
                    complaint.priority.as_str(),
                    complaint.status.as_str(),
                    complaint.response_due.timestamp_millis(),
                    complaint.resolution_due.timestamp_millis(),
                    &complaint.confirmation_nonce,
                    complaint.created_at.timestamp_millis(),
                    complaint.updated_at.timestamp_millis(),
                ),
            )
            .await?;

        tracing::info!(
            complaint_id = %complaint.complaint_id,
            user_id = complaint.user_id,
            issue_type = %complaint.issue_type,
            priority = complaint.priority.as_str(),
            "complaint created"
        );
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        complaint_id: &str,
    ) -> Result<Option<Complaint>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.complaints WHERE user_id = ? AND complaint_id = ?",
            Self::SELECT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, complaint_id))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(Self::row_to_complaint(row)?));
            }
        }
        Ok(None)
    }

    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Complaint>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.complaints WHERE confirmation_nonce = ?",
            Self::SELECT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (nonce,))
            .await?;

        if let Some(rows) = result.rows {
            for row in rows {
                let complaint = Self::row_to_complaint(row)?;
                if complaint.session_id == session_id {
                    return Ok(Some(complaint));
                }
            }
        }
        Ok(None)
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Complaint>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.complaints WHERE user_id = ? LIMIT ?",
            Self::SELECT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, limit as i32))
            .await?;

        let mut complaints = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                complaints.push(Self::row_to_complaint(row)?);
            }
        }
        Ok(complaints)
    }

    async fn count_recent_for_user(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError> {
        let complaints = self.list_for_user(user_id, 100).await?;
        Ok(complaints.iter().filter(|c| c.created_at >= since).count() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_and_parse() {
        assert!(ComplaintPriority::High > ComplaintPriority::Medium);
        assert!(ComplaintPriority::Medium > ComplaintPriority::Low);
        assert_eq!(ComplaintPriority::parse("HIGH"), ComplaintPriority::High);
        assert_eq!(ComplaintPriority::parse("unknown"), ComplaintPriority::Low);
        assert_eq!(ComplaintPriority::High.display(), "HIGH");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ComplaintStatus::parse("in_progress"), ComplaintStatus::InProgress);
        assert_eq!(ComplaintStatus::parse("anything"), ComplaintStatus::Open);
    }
}
