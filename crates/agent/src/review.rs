//! Priority scoring and the operations review surface
//!
//! Score formula (components in [0, 1]):
//!
//! ```text
//! priority_score = (confidence_deficit * 0.40
//!                + sentiment_urgency   * 0.30
//!                + time_decay          * 0.20
//!                + user_history_factor * 0.10) * 100
//! ```
//!
//! Snippets shown to reviewers without the `full_access` capability are
//! PII-redacted, and every unredacted read is audited.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use converge_config::ReviewSettings;
use converge_core::{Error, IntentKind, PriorityQueueEntry, Result, ReviewStatus, SlaRisk};
use converge_nlu::{PiiRedactor, SentimentAnalyzer};
use converge_persistence::{AuditEntry, AuditLog, ComplaintStore, ReviewQueueStore};

/// Scorer over the configured weights.
pub struct PriorityScorer {
    settings: ReviewSettings,
}

impl PriorityScorer {
    pub fn new(settings: ReviewSettings) -> Self {
        Self { settings }
    }

    /// Compute the score in [0, 100].
    pub fn score(
        &self,
        intent_confidence: f32,
        sentiment: f32,
        waited: Duration,
        prior_issues: u32,
    ) -> f32 {
        let confidence_deficit = (1.0 - intent_confidence).clamp(0.0, 1.0);
        // -1 (angry) -> 1.0, +1 (happy) -> 0.0
        let sentiment_urgency = ((1.0 - sentiment) / 2.0).clamp(0.0, 1.0);
        let waited_hours = waited.num_minutes() as f32 / 60.0;
        let time_decay =
            (waited_hours / self.settings.time_decay_saturation_hours).clamp(0.0, 1.0);
        let user_history_factor =
            (prior_issues as f32 / self.settings.history_saturation as f32).clamp(0.0, 1.0);

        let score = (confidence_deficit * self.settings.confidence_weight
            + sentiment_urgency * self.settings.sentiment_weight
            + time_decay * self.settings.time_decay_weight
            + user_history_factor * self.settings.history_weight)
            * 100.0;
        score.clamp(0.0, 100.0)
    }

    /// SLA risk label given the entry's age.
    pub fn sla_risk(&self, intent: IntentKind, age: Duration, buffer_hours: f32) -> SlaRisk {
        let expected_minutes = self
            .settings
            .expected_response_minutes
            .get(intent.as_str())
            .copied()
            .unwrap_or(480) as i64;
        let age_minutes = age.num_minutes();
        let buffer_minutes = (buffer_hours * 60.0) as i64;

        if age_minutes >= expected_minutes {
            SlaRisk::Breached
        } else if age_minutes >= expected_minutes - buffer_minutes {
            SlaRisk::AtRisk
        } else {
            SlaRisk::OnTrack
        }
    }
}

/// Reviewer identity with capability.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub id: String,
    pub full_access: bool,
}

/// Review-queue operations used by the coordinator and the ops surface.
pub struct ReviewService {
    queue: Arc<dyn ReviewQueueStore>,
    complaints: Arc<dyn ComplaintStore>,
    audit: Arc<dyn AuditLog>,
    scorer: PriorityScorer,
    sentiment: SentimentAnalyzer,
    redactor: PiiRedactor,
    settings: ReviewSettings,
}

impl ReviewService {
    pub fn new(
        queue: Arc<dyn ReviewQueueStore>,
        complaints: Arc<dyn ComplaintStore>,
        audit: Arc<dyn AuditLog>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            queue,
            complaints,
            audit,
            scorer: PriorityScorer::new(settings.clone()),
            sentiment: SentimentAnalyzer::new(),
            redactor: PiiRedactor::new(),
            settings,
        }
    }

    pub fn scorer(&self) -> &PriorityScorer {
        &self.scorer
    }

    /// Create an entry for a low-confidence or high-severity turn.
    pub async fn enqueue(
        &self,
        user_id: i64,
        session_id: &str,
        intent: IntentKind,
        confidence: f32,
        message: &str,
        reason: &str,
    ) -> Result<PriorityQueueEntry> {
        let sentiment = self.sentiment.score(message);
        let prior_issues = self
            .complaints
            .count_recent_for_user(user_id, Utc::now() - Duration::days(30))
            .await
            .unwrap_or(0);
        let score = self
            .scorer
            .score(confidence, sentiment, Duration::zero(), prior_issues);

        let snippet: String = message.chars().take(200).collect();
        let entry = PriorityQueueEntry::new(
            user_id,
            session_id,
            intent,
            confidence,
            score,
            sentiment,
            snippet,
        );
        self.queue.create(&entry).await?;

        tracing::info!(
            entry_id = %entry.id,
            intent = %intent,
            confidence,
            score,
            reason,
            "interaction queued for review"
        );
        Ok(entry)
    }

    /// List entries for a reviewer, redacting snippets unless the
    /// viewer holds full_access. Unredacted reads are audited.
    pub async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: usize,
        viewer: &Viewer,
    ) -> Result<Vec<PriorityQueueEntry>> {
        let mut entries = self.queue.list(status, limit).await?;

        if viewer.full_access {
            for entry in &entries {
                self.audit
                    .append(&AuditEntry::new(
                        viewer.id.clone(),
                        "pii_access",
                        format!("review_queue/{}", entry.id),
                        "unredacted snippet viewed",
                    ))
                    .await?;
            }
        } else {
            for entry in &mut entries {
                entry.snippet = self.redactor.redact(&entry.snippet);
            }
        }

        Ok(entries)
    }

    /// SLA risk for an entry right now.
    pub fn risk(&self, entry: &PriorityQueueEntry) -> SlaRisk {
        self.scorer.sla_risk(
            entry.intent,
            Utc::now() - entry.created_at,
            self.settings.sla_buffer_hours,
        )
    }

    /// Record a review action.
    pub async fn review(
        &self,
        id: Uuid,
        viewer: &Viewer,
        action: &str,
        escalate: bool,
    ) -> Result<PriorityQueueEntry> {
        let mut entry = self
            .queue
            .get(id)
            .await?
            .ok_or_else(|| Error::InvalidRequest(format!("no review entry {}", id)))?;

        entry.status = if escalate {
            ReviewStatus::Escalated
        } else {
            ReviewStatus::Reviewed
        };
        entry.reviewer = Some(viewer.id.clone());
        entry.action_taken = Some(action.to_string());
        entry.updated_at = Utc::now();
        self.queue.update(&entry).await?;

        self.audit
            .append(&AuditEntry::new(
                viewer.id.clone(),
                "review_action",
                format!("review_queue/{}", entry.id),
                action,
            ))
            .await?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_persistence::{InMemoryAuditLog, InMemoryComplaintStore, InMemoryReviewQueueStore};

    fn scorer() -> PriorityScorer {
        PriorityScorer::new(ReviewSettings::default())
    }

    fn service() -> (
        ReviewService,
        Arc<InMemoryReviewQueueStore>,
        Arc<InMemoryAuditLog>,
    ) {
        let queue = Arc::new(InMemoryReviewQueueStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let service = ReviewService::new(
            queue.clone(),
            Arc::new(InMemoryComplaintStore::new()),
            audit.clone(),
            ReviewSettings::default(),
        );
        (service, queue, audit)
    }

    #[test]
    fn test_score_extremes() {
        let s = scorer();
        // Worst case: no confidence, furious, stale, repeat offender issues
        let worst = s.score(0.0, -1.0, Duration::hours(48), 10);
        assert!((worst - 100.0).abs() < 0.01);
        // Best case: confident, happy, fresh, first contact
        let best = s.score(1.0, 1.0, Duration::zero(), 0);
        assert!(best.abs() < 0.01);
    }

    #[test]
    fn test_score_component_directions() {
        let s = scorer();
        let base = s.score(0.6, 0.0, Duration::zero(), 0);
        assert!(s.score(0.3, 0.0, Duration::zero(), 0) > base);
        assert!(s.score(0.6, -0.8, Duration::zero(), 0) > base);
        assert!(s.score(0.6, 0.0, Duration::hours(12), 0) > base);
        assert!(s.score(0.6, 0.0, Duration::zero(), 3) > base);
    }

    #[test]
    fn test_sla_risk_bands() {
        let s = scorer();
        // complaint expects a response within 120 minutes; buffer 4h
        // makes everything at least at_risk from the start
        assert_eq!(
            s.sla_risk(IntentKind::Complaint, Duration::minutes(0), 1.0),
            SlaRisk::OnTrack
        );
        assert_eq!(
            s.sla_risk(IntentKind::Complaint, Duration::minutes(70), 1.0),
            SlaRisk::AtRisk
        );
        assert_eq!(
            s.sla_risk(IntentKind::Complaint, Duration::minutes(120), 1.0),
            SlaRisk::Breached
        );
    }

    #[tokio::test]
    async fn test_enqueue_scores_negative_sentiment_higher() {
        let (service, queue, _) = service();
        service
            .enqueue(1, "s1", IntentKind::Complaint, 0.5, "this is fine", "low confidence")
            .await
            .unwrap();
        service
            .enqueue(
                2,
                "s2",
                IntentKind::Complaint,
                0.5,
                "terrible awful worst service, never again",
                "low confidence",
            )
            .await
            .unwrap();

        let entries = queue.list(Some(ReviewStatus::Pending), 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Angrier entry first
        assert_eq!(entries[0].user_id, 2);
        assert!(entries[0].priority_score > entries[1].priority_score);
    }

    #[tokio::test]
    async fn test_redaction_depends_on_capability() {
        let (service, _, audit) = service();
        service
            .enqueue(
                1,
                "s1",
                IntentKind::Complaint,
                0.4,
                "call me at 9812345678 about this",
                "low confidence",
            )
            .await
            .unwrap();

        let restricted = Viewer {
            id: "ops-1".to_string(),
            full_access: false,
        };
        let entries = service.list(Some(ReviewStatus::Pending), 10, &restricted).await.unwrap();
        assert!(entries[0].snippet.contains("98****5678"));
        assert!(audit.is_empty());

        let privileged = Viewer {
            id: "ops-2".to_string(),
            full_access: true,
        };
        let entries = service.list(Some(ReviewStatus::Pending), 10, &privileged).await.unwrap();
        assert!(entries[0].snippet.contains("9812345678"));
        // The unredacted read is audited
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_review_lifecycle() {
        let (service, queue, audit) = service();
        let entry = service
            .enqueue(1, "s1", IntentKind::UnclearIntent, 0.5, "??", "low confidence")
            .await
            .unwrap();

        let viewer = Viewer {
            id: "ops-1".to_string(),
            full_access: false,
        };
        let reviewed = service
            .review(entry.id, &viewer, "called the customer", false)
            .await
            .unwrap();
        assert_eq!(reviewed.status, ReviewStatus::Reviewed);
        assert_eq!(reviewed.reviewer.as_deref(), Some("ops-1"));

        let stored = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.action_taken.as_deref(), Some("called the customer"));
        assert_eq!(audit.len(), 1);

        // Unknown entries are an invalid request, not a panic
        assert!(service
            .review(Uuid::new_v4(), &viewer, "x", true)
            .await
            .is_err());
    }
}
