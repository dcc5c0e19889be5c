//! Completed trips with no client feedback on file.

use chrono::{DateTime, Utc};

use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::events::EventKey;
use tripflow_core::format::day_count;
use tripflow_db::repositories::{RepositoryError, SqlTripRepository, TripRepository};
use tripflow_db::DbPool;

use super::{ScanOutcome, FEEDBACK_REMINDER};
use crate::notify::Notifier;

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    days: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let trips = SqlTripRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let unreviewed = trips.list_completed_without_feedback(now, days).await?;
    let mut created = 0;

    for trip in &unreviewed {
        let days_since = (now - trip.updated_at).num_days();
        let outcome = notifier
            .notify(
                NewNotification {
                    agency_id: trip.agency_id.clone(),
                    recipient_id: trip.planner_id.clone(),
                    kind: NotificationKind::Normal,
                    title: "Request trip feedback".to_string(),
                    message: format!(
                        "Trip to {} completed {} ago and has no client feedback yet",
                        trip.destination,
                        day_count(days_since)
                    ),
                    entity_type: Some("trip".to_string()),
                    entity_id: Some(trip.id.0.clone()),
                    event_key: Some(
                        EventKey::daily(FEEDBACK_REMINDER, "trip", &trip.id.0, now).into_string(),
                    ),
                },
                now,
            )
            .await?;
        if outcome.created {
            created += 1;
        }
    }

    Ok(ScanOutcome::notifications(FEEDBACK_REMINDER, unreviewed.len() as u64, created))
}
