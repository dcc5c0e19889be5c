//! Deadline task generation.
//!
//! Creates `Task` rows (not notifications) for final-payment deadlines,
//! pre-travel checklists and per-booking payment due dates. Dedup here runs
//! on the task store's `source_event` guard, independent of the
//! notification event-key mechanism.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tripflow_core::domain::task::{Task, TaskId, TaskPriority, TaskStatus};
use tripflow_core::domain::trip::Trip;
use tripflow_core::domain::user::UserId;
use tripflow_db::repositories::{
    history, BookingRepository, RepositoryError, SqlBookingRepository, SqlTaskRepository,
    SqlTripRepository, TaskRepository, TripRepository,
};
use tripflow_db::DbPool;

use super::{ScanOutcome, DEADLINE_TASKS};

const AUTOMATION_ACTOR: &str = "automation";

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    lead_days: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let trips = SqlTripRepository::new(pool.clone());
    let bookings = SqlBookingRepository::new(pool.clone());
    let tasks = SqlTaskRepository::new(pool.clone());

    let mut checked = 0;
    let mut created = 0;

    // Final payment collection, per trip.
    let payment_trips = trips.list_final_payment_due_within(now, lead_days).await?;
    checked += payment_trips.len() as u64;
    for trip in &payment_trips {
        let Some(due_at) = trip.final_payment_due else {
            continue;
        };
        let task = system_task(
            trip,
            &trip.planner_id,
            format!("Collect final payment for trip to {}", trip.destination),
            "Final trip payment falls due; confirm funds are in before the deadline.".to_string(),
            due_at,
            TaskPriority::Urgent,
            format!("final_payment:{}", trip.id.0),
            now,
        );
        if create_guarded(pool, &tasks, task).await? {
            created += 1;
        }
    }

    // Pre-travel checklist, per departing trip.
    let departing = trips.list_departing_within(now, lead_days * 24).await?;
    checked += departing.len() as u64;
    for trip in &departing {
        let Some(start) = trip.travel_start else {
            continue;
        };
        let task = system_task(
            trip,
            &trip.planner_id,
            format!("Pre-travel checklist for trip to {}", trip.destination),
            "Verify documents, confirmations and payments before departure.".to_string(),
            start - Duration::days(2),
            TaskPriority::Normal,
            format!("pre_travel_checklist:{}", trip.id.0),
            now,
        );
        if create_guarded(pool, &tasks, task).await? {
            created += 1;
        }
    }

    // Per-booking payment due dates.
    let due_bookings = bookings.list_payment_due_within(now, lead_days * 24).await?;
    checked += due_bookings.len() as u64;
    for booking in &due_bookings {
        let Some(trip) = trips.find_by_id(&booking.trip_id).await? else {
            warn!(
                event_name = "scanner.deadline_tasks.orphan_booking",
                booking_id = %booking.id.0,
                trip_id = %booking.trip_id.0,
                "booking references a missing trip, skipping"
            );
            continue;
        };
        let Some(due_at) = booking.payment_due else {
            continue;
        };
        let task = system_task(
            &trip,
            &trip.planner_id,
            format!("Pay {} for trip to {}", booking.supplier, trip.destination),
            format!("Supplier payment of {} is due.", booking.total_amount),
            due_at,
            TaskPriority::Urgent,
            format!("booking_payment:{}", booking.id.0),
            now,
        );
        if create_guarded(pool, &tasks, task).await? {
            created += 1;
        }
    }

    Ok(ScanOutcome::tasks(DEADLINE_TASKS, checked, created))
}

#[allow(clippy::too_many_arguments)]
fn system_task(
    trip: &Trip,
    assignee: &UserId,
    title: String,
    description: String,
    due_at: DateTime<Utc>,
    priority: TaskPriority,
    source_event: String,
    now: DateTime<Utc>,
) -> Task {
    Task {
        id: TaskId(Uuid::new_v4().to_string()),
        agency_id: trip.agency_id.clone(),
        trip_id: Some(trip.id.clone()),
        assignee_id: assignee.clone(),
        title,
        description,
        due_at,
        status: TaskStatus::Open,
        priority,
        category: "deadline".to_string(),
        is_system_generated: true,
        source_event: Some(source_event),
        created_at: now,
        updated_at: now,
    }
}

async fn create_guarded(
    pool: &DbPool,
    tasks: &SqlTaskRepository,
    task: Task,
) -> Result<bool, RepositoryError> {
    let agency_id = task.agency_id.clone();
    let trip_id = task.trip_id.clone();
    let source_event = task.source_event.clone().unwrap_or_default();

    let outcome = tasks.try_create_system_task(task).await?;
    if outcome.created {
        let mut event = AuditEvent::new(
            Some(agency_id),
            source_event.clone(),
            "task.system_generated",
            AuditCategory::Task,
            AUTOMATION_ACTOR,
            AuditOutcome::Success,
        )
        .with_metadata("source_event", source_event);
        if let Some(trip_id) = trip_id {
            event = event.with_entity("trip", trip_id.0);
        }
        history::insert_audit_event(pool, &event).await?;
    }
    Ok(outcome.created)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use sqlx::Row;

    use tripflow_core::domain::trip::TripStage;
    use tripflow_db::fixtures;
    use tripflow_db::repositories::{
        BookingRepository, SqlBookingRepository, SqlTripRepository, TripRepository,
    };

    #[tokio::test]
    async fn generates_each_deadline_task_exactly_once_while_open() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        let mut trip = fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now);
        trip.travel_start = Some(now + Duration::days(6));
        trip.final_payment_due = Some(now + Duration::days(4));
        trips.save(trip).await.expect("save trip");

        let bookings = SqlBookingRepository::new(pool.clone());
        let mut booking = fixtures::sample_booking(&baseline, "bk-1", "trip-1", now);
        booking.payment_due = Some(now + Duration::days(3));
        bookings.save(booking).await.expect("save booking");

        let first = super::run(&pool, now, 14).await.expect("first run");
        assert_eq!(first.tasks_created, 3, "final payment, checklist and booking payment");

        let second = super::run(&pool, now, 14).await.expect("second run");
        assert_eq!(second.tasks_created, 0, "open tasks guard re-insertion");

        let source_events: Vec<String> = sqlx::query(
            "SELECT source_event FROM tasks WHERE is_system_generated = 1 ORDER BY source_event",
        )
        .fetch_all(&pool)
        .await
        .expect("list tasks")
        .into_iter()
        .map(|row| row.get::<String, _>("source_event"))
        .collect();
        assert_eq!(
            source_events,
            vec![
                "booking_payment:bk-1".to_string(),
                "final_payment:trip-1".to_string(),
                "pre_travel_checklist:trip-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn trips_outside_the_lead_window_produce_nothing() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        let mut trip = fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now);
        trip.travel_start = Some(now + Duration::days(90));
        trip.final_payment_due = Some(now + Duration::days(60));
        trips.save(trip).await.expect("save trip");

        let outcome = super::run(&pool, now, 14).await.expect("run");
        assert_eq!(outcome.tasks_created, 0);
    }
}
