//! Quoted trips with no recent activity.

use chrono::{DateTime, Utc};

use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::events::EventKey;
use tripflow_core::format::day_count;
use tripflow_db::repositories::{RepositoryError, SqlTripRepository, TripRepository};
use tripflow_db::DbPool;

use super::{ScanOutcome, QUOTE_FOLLOWUP};
use crate::notify::Notifier;

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    days: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let trips = SqlTripRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let stale = trips.list_stale_quoted(now, days).await?;
    let mut created = 0;

    for trip in &stale {
        let idle_days = (now - trip.updated_at).num_days();
        let outcome = notifier
            .notify(
                NewNotification {
                    agency_id: trip.agency_id.clone(),
                    recipient_id: trip.planner_id.clone(),
                    kind: NotificationKind::Normal,
                    title: "Quote follow-up needed".to_string(),
                    message: format!(
                        "Trip to {} has been quoted for {} with no activity",
                        trip.destination,
                        day_count(idle_days)
                    ),
                    entity_type: Some("trip".to_string()),
                    entity_id: Some(trip.id.0.clone()),
                    event_key: Some(
                        EventKey::daily(QUOTE_FOLLOWUP, "trip", &trip.id.0, now).into_string(),
                    ),
                },
                now,
            )
            .await?;
        if outcome.created {
            created += 1;
        }
    }

    Ok(ScanOutcome::notifications(QUOTE_FOLLOWUP, stale.len() as u64, created))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use tripflow_core::domain::trip::TripStage;
    use tripflow_db::fixtures;
    use tripflow_db::repositories::{
        NotificationRepository, SqlNotificationRepository, SqlTripRepository, TripRepository,
    };

    #[tokio::test]
    async fn notifies_planner_once_per_day_bucket() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        let mut stale = fixtures::sample_trip(&baseline, "trip-stale", TripStage::Quoted, now);
        stale.updated_at = now - Duration::days(5);
        trips.save(stale).await.expect("save trip");

        let first = super::run(&pool, now, 3).await.expect("first run");
        assert_eq!(first.checked, 1);
        assert_eq!(first.notifications_created, 1);

        // Same entity state, same day: a no-op.
        let second = super::run(&pool, now + Duration::hours(2), 3).await.expect("second run");
        assert_eq!(second.checked, 1);
        assert_eq!(second.notifications_created, 0);

        // The next day's bucket is a fresh condition.
        let third = super::run(&pool, now + Duration::days(1), 3).await.expect("third run");
        assert_eq!(third.notifications_created, 1);

        let inbox = SqlNotificationRepository::new(pool)
            .list_for_recipient(&baseline.planner_id, 10)
            .await
            .expect("inbox");
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|n| n.message.contains("Trip to Lisbon")));
    }

    #[tokio::test]
    async fn fresh_quotes_are_not_flagged() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        let mut fresh = fixtures::sample_trip(&baseline, "trip-fresh", TripStage::Quoted, now);
        fresh.updated_at = now - Duration::days(1);
        trips.save(fresh).await.expect("save trip");

        let outcome = super::run(&pool, now, 3).await.expect("run");
        assert_eq!(outcome.checked, 0);
        assert_eq!(outcome.notifications_created, 0);
    }
}
