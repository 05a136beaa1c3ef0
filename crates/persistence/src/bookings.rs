//! Booking persistence

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, ScyllaClient};

/// Booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => Self::Cancelled,
            "completed" => Self::Completed,
            _ => Self::Confirmed,
        }
    }
}

/// Booking row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub order_id: String,
    pub user_id: i64,
    pub session_id: String,
    pub service_type: String,
    pub scheduled_date: NaiveDate,
    /// "HH:MM"
    pub scheduled_time: String,
    /// Pincode or city
    pub location: String,
    pub status: BookingStatus,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub refund_amount: Option<f64>,
    /// Idempotence key from the dialog state
    pub confirmation_nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking store.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: &Booking) -> Result<(), PersistenceError>;

    async fn get(&self, user_id: i64, order_id: &str)
        -> Result<Option<Booking>, PersistenceError>;

    /// Idempotence lookup: the booking already written for this
    /// confirmation, if any.
    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Booking>, PersistenceError>;

    async fn update(&self, booking: &Booking) -> Result<(), PersistenceError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Booking>, PersistenceError>;
}

/// ScyllaDB implementation of the booking store.
#[derive(Clone)]
pub struct ScyllaBookingStore {
    client: ScyllaClient,
}

impl ScyllaBookingStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn insert_query(&self) -> String {
        format!(
            "INSERT INTO {}.bookings (
                user_id, order_id, session_id, service_type,
                scheduled_date, scheduled_time, location, status,
                subtotal, discount, tax, total, refund_amount,
                confirmation_nonce, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        )
    }

    async fn write(&self, booking: &Booking) -> Result<(), PersistenceError> {
        self.client
            .session()
            .query_unpaged(
                self.insert_query(),
                (
                    booking.user_id,
                    &booking.order_id,
                    &booking.session_id,
                    &booking.service_type,
                    booking.scheduled_date.to_string(),
                    &booking.scheduled_time,
                    &booking.location,
                    booking.status.as_str(),
                    booking.subtotal,
                    booking.discount,
                    booking.tax,
                    booking.total,
                    booking.refund_amount,
                    &booking.confirmation_nonce,
                    booking.created_at.timestamp_millis(),
                    booking.updated_at.timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }

    fn row_to_booking(
        row: scylla::frame::response::result::Row,
    ) -> Result<Booking, PersistenceError> {
        let (
            user_id,
            order_id,
            session_id,
            service_type,
            scheduled_date,
            scheduled_time,
            location,
            status,
            subtotal,
            discount,
            tax,
            total,
            refund_amount,
            confirmation_nonce,
            created_at,
            updated_at,
        ): (
            i64,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            f64,
            f64,
            f64,
            f64,
            Option<f64>,
            String,
            i64,
            i64,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Booking {
            order_id,
            user_id,
            session_id,
            service_type,
            scheduled_date: NaiveDate::parse_from_str(&scheduled_date, "%Y-%m-%d")
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
            scheduled_time,
            location,
            status: BookingStatus::parse(&status),
            subtotal,
            discount,
            tax,
            total,
            refund_amount,
            confirmation_nonce,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        })
    }

    const SELECT_COLUMNS: &'static str = "user_id, order_id, session_id, service_type, \
        scheduled_date, scheduled_time, location, status, subtotal, discount, tax, total, \
        refund_amount, confirmation_nonce, created_at, updated_at";
}

#[async_trait]
impl BookingStore for ScyllaBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), PersistenceError> {
        self.write(booking).await?;

        tracing::info!(
            order_id = %booking.order_id,
            user_id = booking.user_id,
            service_type = %booking.service_type,
            date = %booking.scheduled_date,
            "booking created"
        );
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        order_id: &str,
    ) -> Result<Option<Booking>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.bookings WHERE user_id = ? AND order_id = ?",
            Self::SELECT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, order_id))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(Self::row_to_booking(row)?));
            }
        }
        Ok(None)
    }

    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Booking>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.bookings WHERE confirmation_nonce = ?",
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
                let booking = Self::row_to_booking(row)?;
                if booking.session_id == session_id {
                    return Ok(Some(booking));
                }
            }
        }
        Ok(None)
    }

    async fn update(&self, booking: &Booking) -> Result<(), PersistenceError> {
        if self.get(booking.user_id, &booking.order_id).await?.is_none() {
            return Err(PersistenceError::NotFound(format!(
                "booking {}",
                booking.order_id
            )));
        }
        self.write(booking).await
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Booking>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.bookings WHERE user_id = ? LIMIT ?",
            Self::SELECT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, limit as i32))
            .await?;

        let mut bookings = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                bookings.push(Self::row_to_booking(row)?);
            }
        }
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(BookingStatus::parse("cancelled"), BookingStatus::Cancelled);
        assert_eq!(BookingStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(BookingStatus::parse("garbage"), BookingStatus::Confirmed);
    }
}
