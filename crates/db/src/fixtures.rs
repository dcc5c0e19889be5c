//! Deterministic seed data for tests and the `seed` CLI command.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use tripflow_core::domain::approval::{
    ApprovalAction, ApprovalRequest, ApprovalRequestId, ApprovalStatus,
};
use tripflow_core::domain::booking::{Booking, BookingId, BookingStatus, PaymentStatus};
use tripflow_core::domain::client::{Client, ClientId};
use tripflow_core::domain::commission::{Commission, CommissionId, CommissionStatus};
use tripflow_core::domain::task::{Task, TaskId, TaskPriority, TaskStatus};
use tripflow_core::domain::trip::{Trip, TripId, TripStage};
use tripflow_core::domain::user::{User, UserId, UserRole};
use tripflow_core::domain::AgencyId;

use crate::repositories::{
    BookingRepository, ClientRepository, CommissionRepository, RepositoryError,
    SqlBookingRepository, SqlClientRepository, SqlCommissionRepository, SqlTripRepository,
    SqlUserRepository, TripRepository, UserRepository,
};
use crate::{connect_with_settings, migrations, DbPool};

/// Tenant scaffold shared by most repository and engine tests: one agency,
/// one admin, one planner, one client.
#[derive(Clone, Debug)]
pub struct Baseline {
    pub agency_id: AgencyId,
    pub admin_id: UserId,
    pub planner_id: UserId,
    pub client_id: ClientId,
}

pub async fn workflow_baseline() -> (DbPool, Baseline) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let baseline = seed_baseline(&pool).await.expect("seed baseline");
    (pool, baseline)
}

pub async fn seed_baseline(pool: &DbPool) -> Result<Baseline, RepositoryError> {
    let now = Utc::now();
    let agency_id = AgencyId("agency-1".to_string());
    seed_agency(pool, &agency_id, "Meridian Travel", now).await?;

    let users = SqlUserRepository::new(pool.clone());
    let admin_id = UserId("user-admin".to_string());
    users
        .save(User {
            id: admin_id.clone(),
            agency_id: agency_id.clone(),
            display_name: "Avery Admin".to_string(),
            role: UserRole::Admin,
            created_at: now,
        })
        .await?;
    let planner_id = UserId("user-planner".to_string());
    users
        .save(User {
            id: planner_id.clone(),
            agency_id: agency_id.clone(),
            display_name: "Piper Planner".to_string(),
            role: UserRole::Planner,
            created_at: now,
        })
        .await?;

    let clients = SqlClientRepository::new(pool.clone());
    let client_id = ClientId("client-1".to_string());
    clients
        .save(Client {
            id: client_id.clone(),
            agency_id: agency_id.clone(),
            display_name: "Dana Reyes".to_string(),
            email: Some("dana@example.com".to_string()),
            phone: Some("+1-555-0100".to_string()),
            created_at: now,
        })
        .await?;

    Ok(Baseline { agency_id, admin_id, planner_id, client_id })
}

pub async fn seed_agency(
    pool: &DbPool,
    agency_id: &AgencyId,
    name: &str,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO agencies (id, name, created_at) VALUES (?, ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&agency_id.0)
    .bind(name)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_feedback(pool: &DbPool, baseline: &Baseline, trip_id: &str, rating: i64) {
    sqlx::query(
        "INSERT INTO trip_feedback (id, agency_id, trip_id, rating, comment, created_at)
         VALUES (?, ?, ?, ?, NULL, ?)",
    )
    .bind(format!("fb-{trip_id}"))
    .bind(&baseline.agency_id.0)
    .bind(trip_id)
    .bind(rating)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("seed feedback");
}

pub fn sample_trip(baseline: &Baseline, id: &str, stage: TripStage, now: DateTime<Utc>) -> Trip {
    Trip {
        id: TripId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        client_id: baseline.client_id.clone(),
        planner_id: baseline.planner_id.clone(),
        stage,
        locked: false,
        destination: "Lisbon".to_string(),
        travel_start: None,
        travel_end: None,
        final_payment_due: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_booking(
    baseline: &Baseline,
    id: &str,
    trip_id: &str,
    now: DateTime<Utc>,
) -> Booking {
    Booking {
        id: BookingId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        trip_id: TripId(trip_id.to_string()),
        supplier: "Iberia".to_string(),
        status: BookingStatus::Quoted,
        confirmation_number: None,
        payment_status: PaymentStatus::DepositPaid,
        total_amount: Decimal::new(250_000, 2),
        payment_due: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_task(baseline: &Baseline, id: &str, now: DateTime<Utc>) -> Task {
    Task {
        id: TaskId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        trip_id: None,
        assignee_id: baseline.planner_id.clone(),
        title: "Call the client".to_string(),
        description: "Check in about the itinerary".to_string(),
        due_at: now + Duration::days(2),
        status: TaskStatus::Open,
        priority: TaskPriority::Normal,
        category: "general".to_string(),
        is_system_generated: false,
        source_event: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_system_task(
    baseline: &Baseline,
    id: &str,
    trip_id: &str,
    source_event: &str,
    now: DateTime<Utc>,
) -> Task {
    Task {
        id: TaskId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        trip_id: Some(TripId(trip_id.to_string())),
        assignee_id: baseline.planner_id.clone(),
        title: "Collect final payment".to_string(),
        description: "Automatically generated deadline task".to_string(),
        due_at: now + Duration::days(7),
        status: TaskStatus::Open,
        priority: TaskPriority::Urgent,
        category: "deadline".to_string(),
        is_system_generated: true,
        source_event: Some(source_event.to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn sample_commission(
    baseline: &Baseline,
    id: &str,
    trip_id: &str,
    booking_id: &str,
    supplier: &str,
    expected_amount: Decimal,
    status: CommissionStatus,
    now: DateTime<Utc>,
) -> Commission {
    Commission {
        id: CommissionId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        trip_id: TripId(trip_id.to_string()),
        booking_id: BookingId(booking_id.to_string()),
        supplier: supplier.to_string(),
        expected_amount,
        status,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_approval(
    baseline: &Baseline,
    id: &str,
    action: ApprovalAction,
    entity_type: &str,
    entity_id: &str,
) -> ApprovalRequest {
    ApprovalRequest {
        id: ApprovalRequestId(id.to_string()),
        agency_id: baseline.agency_id.clone(),
        action,
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        status: ApprovalStatus::Pending,
        requested_by: baseline.planner_id.clone(),
        resolved_by: None,
        response_note: None,
        created_at: Utc::now(),
        resolved_at: None,
    }
}

/// Counts reported by the demo seed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SeedSummary {
    pub users: u64,
    pub clients: u64,
    pub trips: u64,
    pub bookings: u64,
    pub commissions: u64,
}

/// Load a small deterministic demo dataset covering each scanner's window.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let baseline = seed_baseline(pool).await?;
    let now = Utc::now();

    let trips = SqlTripRepository::new(pool.clone());
    let bookings = SqlBookingRepository::new(pool.clone());
    let commissions = SqlCommissionRepository::new(pool.clone());

    let mut stale_quote = sample_trip(&baseline, "trip-quoted", TripStage::Quoted, now);
    stale_quote.updated_at = now - Duration::days(5);
    trips.save(stale_quote).await?;

    let mut departing = sample_trip(&baseline, "trip-departing", TripStage::Booked, now);
    departing.travel_start = Some(now + Duration::hours(36));
    departing.final_payment_due = Some(now + Duration::days(10));
    trips.save(departing).await?;

    let mut completed = sample_trip(&baseline, "trip-completed", TripStage::Completed, now);
    completed.updated_at = now - Duration::days(40);
    trips.save(completed).await?;

    let mut due_booking = sample_booking(&baseline, "bk-due", "trip-departing", now);
    due_booking.payment_due = Some(now + Duration::hours(30));
    bookings.save(due_booking).await?;

    let mut confirmed = sample_booking(&baseline, "bk-confirmed", "trip-completed", now);
    confirmed.status = BookingStatus::Booked;
    confirmed.confirmation_number = Some("CONF-881".to_string());
    confirmed.payment_status = PaymentStatus::PaidInFull;
    bookings.save(confirmed).await?;

    commissions
        .save(sample_commission(
            &baseline,
            "com-1",
            "trip-completed",
            "bk-confirmed",
            "Iberia",
            Decimal::new(18_000, 2),
            CommissionStatus::Expected,
            now,
        ))
        .await?;

    Ok(SeedSummary { users: 2, clients: 1, trips: 3, bookings: 2, commissions: 1 })
}
