//! Booking payments falling due soon.
//!
//! Time-critical, so the tier is urgent and the fan-out covers the agency's
//! admins as well as the assigned planner.

use chrono::{DateTime, Utc};
use tracing::warn;

use tripflow_core::domain::notification::NotificationKind;
use tripflow_core::events::EventKey;
use tripflow_core::format::deadline_phrase;
use tripflow_db::repositories::{
    BookingRepository, RepositoryError, SqlBookingRepository, SqlTripRepository,
    SqlUserRepository, TripRepository, UserRepository,
};
use tripflow_db::DbPool;

use super::{ScanOutcome, PAYMENT_DEADLINE};
use crate::notify::{fan_out_recipients, NotificationTemplate, Notifier};

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    hours: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let bookings = SqlBookingRepository::new(pool.clone());
    let trips = SqlTripRepository::new(pool.clone());
    let users = SqlUserRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let due = bookings.list_payment_due_within(now, hours).await?;
    let mut created = 0;

    for booking in &due {
        let Some(trip) = trips.find_by_id(&booking.trip_id).await? else {
            warn!(
                event_name = "scanner.payment_deadline.orphan_booking",
                booking_id = %booking.id.0,
                trip_id = %booking.trip_id.0,
                "booking references a missing trip, skipping"
            );
            continue;
        };
        let Some(due_at) = booking.payment_due else {
            continue;
        };

        let admins =
            users.list_admins(&booking.agency_id).await?.into_iter().map(|user| user.id).collect();
        let recipients = fan_out_recipients(admins, &trip.planner_id);

        let hours_until = (due_at - now).num_hours();
        let template = NotificationTemplate {
            agency_id: booking.agency_id.clone(),
            kind: NotificationKind::Urgent,
            title: "Payment deadline approaching".to_string(),
            message: format!(
                "Payment of {} to {} for trip to {} is {} ({})",
                booking.total_amount,
                booking.supplier,
                trip.destination,
                deadline_phrase(hours_until),
                booking.payment_status
            ),
            entity_type: Some("booking".to_string()),
            entity_id: Some(booking.id.0.clone()),
            event_key: Some(EventKey::daily(PAYMENT_DEADLINE, "booking", &booking.id.0, now)),
        };

        let counts = notifier.notify_many(&recipients, &template, now).await?;
        created += counts.created;
    }

    Ok(ScanOutcome::notifications(PAYMENT_DEADLINE, due.len() as u64, created))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use tripflow_core::domain::booking::PaymentStatus;
    use tripflow_core::domain::trip::TripStage;
    use tripflow_db::fixtures;
    use tripflow_db::repositories::{
        BookingRepository, NotificationRepository, SqlBookingRepository,
        SqlNotificationRepository, SqlTripRepository, TripRepository,
    };

    #[tokio::test]
    async fn notifies_admins_and_planner_with_day_count_phrasing() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let bookings = SqlBookingRepository::new(pool.clone());
        let mut due = fixtures::sample_booking(&baseline, "bk-1", "trip-1", now);
        due.payment_due = Some(now + Duration::hours(30));
        due.payment_status = PaymentStatus::DepositPaid;
        bookings.save(due).await.expect("save booking");

        let outcome = super::run(&pool, now, 48).await.expect("run");
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.notifications_created, 2, "admin plus planner");

        let repo = SqlNotificationRepository::new(pool);
        for recipient in [&baseline.admin_id, &baseline.planner_id] {
            let inbox = repo.list_for_recipient(recipient, 10).await.expect("inbox");
            assert_eq!(inbox.len(), 1);
            // 30 hours away rounds up to two days, never the <24h wording.
            assert!(inbox[0].message.contains("due in 2 days"));
            assert!(!inbox[0].message.contains("less than 24 hours"));
            assert!(inbox[0].message.contains("deposit_paid"));
        }
    }

    #[tokio::test]
    async fn fully_paid_bookings_are_ignored() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let bookings = SqlBookingRepository::new(pool.clone());
        let mut paid = fixtures::sample_booking(&baseline, "bk-1", "trip-1", now);
        paid.payment_due = Some(now + Duration::hours(30));
        paid.payment_status = PaymentStatus::PaidInFull;
        bookings.save(paid).await.expect("save booking");

        let outcome = super::run(&pool, now, 48).await.expect("run");
        assert_eq!(outcome.checked, 0);
        assert_eq!(outcome.notifications_created, 0);
    }
}
