//! Notification emission service.
//!
//! Wraps the deduplicating notification insert for single and fan-out
//! delivery. Recipient sets are resolved by the caller (e.g. "all admins of
//! the agency" via the user repository); this service only counts what was
//! actually created versus suppressed.

use chrono::{DateTime, Utc};
use tracing::debug;

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;
use tripflow_core::events::EventKey;
use tripflow_db::repositories::{
    history, DeliveryOutcome, NotificationRepository, RepositoryError, SqlNotificationRepository,
};
use tripflow_db::DbPool;

const AUTOMATION_ACTOR: &str = "automation";

/// A notification body without a recipient, fanned out by `notify_many`.
#[derive(Clone, Debug)]
pub struct NotificationTemplate {
    pub agency_id: AgencyId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub event_key: Option<EventKey>,
}

impl NotificationTemplate {
    fn for_recipient(&self, recipient_id: UserId) -> NewNotification {
        NewNotification {
            agency_id: self.agency_id.clone(),
            recipient_id,
            kind: self.kind,
            title: self.title.clone(),
            message: self.message.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            event_key: self.event_key.clone().map(EventKey::into_string),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmissionCounts {
    pub created: u64,
    pub deduplicated: u64,
}

#[derive(Clone)]
pub struct Notifier {
    pool: DbPool,
}

impl Notifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn notify(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, RepositoryError> {
        let repo = SqlNotificationRepository::new(self.pool.clone());
        let agency_id = new.agency_id.clone();
        let entity_type = new.entity_type.clone();
        let entity_id = new.entity_id.clone();
        let event_key = new.event_key.clone();
        let recipient = new.recipient_id.clone();

        let outcome = repo.try_create(new, now).await?;

        if outcome.created {
            let mut event = AuditEvent::new(
                Some(agency_id),
                event_key.clone().unwrap_or_else(|| "unkeyed".to_string()),
                "notification.created",
                AuditCategory::Notification,
                AUTOMATION_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("recipient_id", recipient.0.clone());
            if let (Some(entity_type), Some(entity_id)) = (entity_type, entity_id) {
                event = event.with_entity(entity_type, entity_id);
            }
            history::insert_audit_event(&self.pool, &event).await?;
        } else {
            debug!(
                event_name = "notify.duplicate_suppressed",
                recipient_id = %recipient.0,
                event_key = event_key.as_deref().unwrap_or("unkeyed"),
                "notification suppressed by dedup key"
            );
        }

        Ok(outcome)
    }

    /// Fan out one template to every recipient, deduplicating per recipient.
    pub async fn notify_many(
        &self,
        recipients: &[UserId],
        template: &NotificationTemplate,
        now: DateTime<Utc>,
    ) -> Result<EmissionCounts, RepositoryError> {
        let mut counts = EmissionCounts::default();
        for recipient in recipients {
            let outcome = self.notify(template.for_recipient(recipient.clone()), now).await?;
            if outcome.created {
                counts.created += 1;
            } else {
                counts.deduplicated += 1;
            }
        }
        Ok(counts)
    }
}

/// Admins of the agency plus the assigned planner, without duplicates.
pub fn fan_out_recipients(admins: Vec<UserId>, planner: &UserId) -> Vec<UserId> {
    let mut recipients = admins;
    if !recipients.contains(planner) {
        recipients.push(planner.clone());
    }
    recipients
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tripflow_core::domain::notification::NotificationKind;
    use tripflow_core::domain::user::UserId;
    use tripflow_core::events::EventKey;
    use tripflow_db::fixtures;
    use tripflow_db::repositories::{NotificationRepository, SqlNotificationRepository};

    use super::{fan_out_recipients, NotificationTemplate, Notifier};

    fn template(baseline: &fixtures::Baseline, key: EventKey) -> NotificationTemplate {
        NotificationTemplate {
            agency_id: baseline.agency_id.clone(),
            kind: NotificationKind::Urgent,
            title: "Payment deadline approaching".to_string(),
            message: "Payment of 2500.00 to Iberia for trip to Lisbon is due in 2 days"
                .to_string(),
            entity_type: Some("booking".to_string()),
            entity_id: Some("bk-1".to_string()),
            event_key: Some(key),
        }
    }

    #[tokio::test]
    async fn fan_out_creates_one_row_per_recipient() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let notifier = Notifier::new(pool.clone());
        let now = Utc::now();

        let recipients = vec![baseline.admin_id.clone(), baseline.planner_id.clone()];
        let key = EventKey::daily("payment_deadline", "booking", "bk-1", now);

        let counts =
            notifier.notify_many(&recipients, &template(&baseline, key), now).await.expect("send");
        assert_eq!(counts.created, 2);
        assert_eq!(counts.deduplicated, 0);

        let repo = SqlNotificationRepository::new(pool);
        let admin_inbox =
            repo.list_for_recipient(&baseline.admin_id, 10).await.expect("admin inbox");
        assert_eq!(admin_inbox.len(), 1);
    }

    #[tokio::test]
    async fn repeated_fan_out_is_fully_deduplicated() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let notifier = Notifier::new(pool);
        let now = Utc::now();

        let recipients = vec![baseline.admin_id.clone(), baseline.planner_id.clone()];
        let key = EventKey::daily("payment_deadline", "booking", "bk-1", now);

        notifier.notify_many(&recipients, &template(&baseline, key.clone()), now).await.expect("first");
        let counts = notifier
            .notify_many(&recipients, &template(&baseline, key), now)
            .await
            .expect("second");

        assert_eq!(counts.created, 0);
        assert_eq!(counts.deduplicated, 2);
    }

    #[test]
    fn fan_out_recipients_dedups_planner_admins() {
        let admin = UserId("user-admin".to_string());
        let planner = UserId("user-planner".to_string());

        let recipients = fan_out_recipients(vec![admin.clone()], &planner);
        assert_eq!(recipients, vec![admin.clone(), planner.clone()]);

        let planner_is_admin = fan_out_recipients(vec![admin.clone(), planner.clone()], &planner);
        assert_eq!(planner_is_admin.len(), 2);
    }
}
