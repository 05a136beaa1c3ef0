//! Complaint agent

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use converge_config::{keys, CachedOpsConfig, EntityRulesConfig, SlaSettings};
use converge_core::{AgentKind, EntityKey, Provenance, Result};
use converge_persistence::{Complaint, ComplaintPriority, ComplaintStatus, ComplaintStore};

use super::{TaskAgent, TaskOutcome, TaskRequest};

/// Opens complaint records with rule-table priority and SLA deadlines.
/// The response always carries the complaint id, priority and both SLA
/// timestamps.
pub struct ComplaintAgent {
    store: Arc<dyn ComplaintStore>,
    rules: Arc<EntityRulesConfig>,
    sla: SlaSettings,
    ops: Arc<CachedOpsConfig>,
}

impl ComplaintAgent {
    pub fn new(
        store: Arc<dyn ComplaintStore>,
        rules: Arc<EntityRulesConfig>,
        sla: SlaSettings,
        ops: Arc<CachedOpsConfig>,
    ) -> Self {
        Self {
            store,
            rules,
            sla,
            ops,
        }
    }

    fn generate_complaint_id() -> String {
        format!("CMP{:08X}", rand::random::<u32>())
    }

    fn format_deadline(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    fn confirmation_text(complaint: &Complaint) -> String {
        format!(
            "I've filed your complaint {} with {} priority. \
You'll hear from our team by {}, and we aim to resolve it by {}.",
            complaint.complaint_id,
            complaint.priority.display(),
            Self::format_deadline(complaint.response_due),
            Self::format_deadline(complaint.resolution_due),
        )
    }
}

#[async_trait]
impl TaskAgent for ComplaintAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Complaint
    }

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutcome> {
        if let Some(existing) = self
            .store
            .find_by_nonce(&request.session_id, &request.confirmation_nonce)
            .await?
        {
            return Ok(TaskOutcome {
                response: Self::confirmation_text(&existing),
                action_taken: "complaint_already_filed".to_string(),
                provenance: Provenance::table("complaints"),
                needs_review: None,
            });
        }

        let issue_type = request.entity(EntityKey::IssueType)?;
        let description = request.entity(EntityKey::Description)?;
        let booking_order_id = request
            .entities
            .get(&EntityKey::BookingId)
            .cloned();

        // Rule table: no-show -> HIGH, damage -> HIGH, quality ->
        // MEDIUM, delay -> LOW (configurable)
        let priority = self
            .rules
            .issue_type(issue_type)
            .map(|i| ComplaintPriority::parse(&i.priority))
            .unwrap_or(ComplaintPriority::Medium);

        let response_hours = self
            .ops
            .get_i64(keys::COMPLAINT_RESPONSE_HOURS, self.sla.complaint_response_hours)
            .await;
        let resolution_hours = self
            .ops
            .get_i64(
                keys::COMPLAINT_RESOLUTION_HOURS,
                self.sla.complaint_resolution_hours,
            )
            .await;

        let now = Utc::now();
        let complaint = Complaint {
            complaint_id: Self::generate_complaint_id(),
            user_id: request.user_id,
            session_id: request.session_id.clone(),
            issue_type: issue_type.to_string(),
            description: description.to_string(),
            booking_order_id,
            priority,
            status: ComplaintStatus::Open,
            response_due: now + Duration::hours(response_hours),
            resolution_due: now + Duration::hours(resolution_hours),
            confirmation_nonce: request.confirmation_nonce.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store.create(&complaint).await?;

        // High-severity complaints go straight to the review queue
        let needs_review = (priority == ComplaintPriority::High)
            .then(|| format!("high-priority complaint {}", complaint.complaint_id));

        Ok(TaskOutcome {
            response: Self::confirmation_text(&complaint),
            action_taken: "complaint_created".to_string(),
            provenance: Provenance::table("complaints"),
            needs_review,
        })
    }
}
