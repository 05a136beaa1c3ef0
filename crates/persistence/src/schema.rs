//! Schema DDL

/// DDL statements executed at startup, in order.
pub fn schema_statements(keyspace: &str, replication_factor: u8) -> Vec<String> {
    vec![
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'NetworkTopologyStrategy', 'replication_factor': {}}}",
            keyspace, replication_factor
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.conversation_turns (
                session_id text,
                turn_id uuid,
                created_at bigint,
                payload text,
                PRIMARY KEY (session_id, created_at, turn_id)
            ) WITH CLUSTERING ORDER BY (created_at ASC, turn_id ASC)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.dialog_states (
                session_id text PRIMARY KEY,
                payload text,
                updated_at bigint
            )",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.review_queue (
                entry_id uuid PRIMARY KEY,
                status text,
                priority_score float,
                payload text,
                updated_at bigint
            )",
            keyspace
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS review_queue_status_idx ON {}.review_queue (status)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.audit_log (
                target text,
                entry_id uuid,
                created_at bigint,
                actor text,
                action text,
                details text,
                PRIMARY KEY (target, created_at, entry_id)
            ) WITH CLUSTERING ORDER BY (created_at DESC, entry_id ASC)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.bookings (
                user_id bigint,
                order_id text,
                session_id text,
                service_type text,
                scheduled_date text,
                scheduled_time text,
                location text,
                status text,
                subtotal double,
                discount double,
                tax double,
                total double,
                refund_amount double,
                confirmation_nonce text,
                created_at bigint,
                updated_at bigint,
                PRIMARY KEY (user_id, order_id)
            )",
            keyspace
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS bookings_nonce_idx ON {}.bookings (confirmation_nonce)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.complaints (
                user_id bigint,
                complaint_id text,
                session_id text,
                issue_type text,
                description text,
                booking_order_id text,
                priority text,
                status text,
                response_due bigint,
                resolution_due bigint,
                confirmation_nonce text,
                created_at bigint,
                updated_at bigint,
                PRIMARY KEY (user_id, complaint_id)
            )",
            keyspace
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS complaints_nonce_idx ON {}.complaints (confirmation_nonce)",
            keyspace
        ),
    ]
}
