use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tripflow_core::audit::{AuditEvent, FieldChange};
use tripflow_core::domain::approval::{ApprovalRequest, ApprovalRequestId, ApprovalStatus};
use tripflow_core::domain::booking::{Booking, BookingId};
use tripflow_core::domain::client::{Client, ClientId};
use tripflow_core::domain::commission::Commission;
use tripflow_core::domain::notification::{NewNotification, Notification, NotificationId};
use tripflow_core::domain::task::{Task, TaskId};
use tripflow_core::domain::traveler::Traveler;
use tripflow_core::domain::trip::{Trip, TripId, TripStage};
use tripflow_core::domain::user::{User, UserId};
use tripflow_core::domain::AgencyId;

pub mod approval;
pub mod booking;
pub mod client;
pub mod commission;
pub mod history;
pub mod notification;
pub mod task;
pub mod trip;
pub mod users;

pub use approval::SqlApprovalRepository;
pub use booking::SqlBookingRepository;
pub use client::{SqlClientRepository, SqlTravelerRepository};
pub use commission::{ExpectedCommission, SqlCommissionRepository};
pub use history::{SqlAuditLogRepository, SqlFieldChangeRepository};
pub use notification::SqlNotificationRepository;
pub use task::SqlTaskRepository;
pub use trip::SqlTripRepository;
pub use users::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// True when the underlying failure is a unique-constraint violation,
    /// i.e. a dedup race lost to a concurrent writer.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(error) if is_unique_violation(error))
    }
}

/// Outcome of the deduplicating notification insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub created: bool,
    pub duplicate: bool,
    pub id: Option<NotificationId>,
}

impl DeliveryOutcome {
    pub fn created(id: NotificationId) -> Self {
        Self { created: true, duplicate: false, id: Some(id) }
    }

    pub fn duplicate() -> Self {
        Self { created: false, duplicate: true, id: None }
    }
}

/// Outcome of the guarded system-task insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInsertOutcome {
    pub created: bool,
    pub duplicate: bool,
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn find_by_id(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError>;
    async fn save(&self, trip: Trip) -> Result<(), RepositoryError>;

    /// Quoted trips with no modification for at least `days` days.
    async fn list_stale_quoted(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError>;

    /// Completed trips at least `days` old with no feedback record.
    async fn list_completed_without_feedback(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError>;

    /// Booked trips departing within the next `hours` hours.
    async fn list_departing_within(
        &self,
        now: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<Trip>, RepositoryError>;

    /// Trips whose final payment falls due within the next `days` days.
    async fn list_final_payment_due_within(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError>;
    async fn save(&self, booking: Booking) -> Result<(), RepositoryError>;
    async fn list_for_trip(&self, trip_id: &TripId) -> Result<Vec<Booking>, RepositoryError>;

    /// Non-canceled bookings not fully paid whose payment falls due within
    /// the next `hours` hours.
    async fn list_payment_due_within(
        &self,
        now: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<Booking>, RepositoryError>;
}

#[async_trait]
pub trait TravelerRepository: Send + Sync {
    async fn list_for_trip(&self, trip_id: &TripId) -> Result<Vec<Traveler>, RepositoryError>;
    async fn save(&self, traveler: Traveler) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn save(&self, client: Client) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;
    async fn save(&self, task: Task) -> Result<(), RepositoryError>;

    /// Open normal-priority tasks due within the next `days` days.
    async fn list_open_due_within(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Task>, RepositoryError>;

    /// Insert a system-generated task unless an open one with the same
    /// `source_event` already exists for the trip. The partial unique index
    /// is the race-safety net under the existence pre-check.
    async fn try_create_system_task(
        &self,
        task: Task,
    ) -> Result<TaskInsertOutcome, RepositoryError>;

    /// Relabel open tasks whose due date has passed. Returns the number of
    /// rows updated.
    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert-if-absent keyed on `(recipient_id, event_key)`. A lost race
    /// against a concurrent inserter reports `duplicate`, never an error.
    async fn try_create(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, RepositoryError>;

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError>;
}

#[async_trait]
pub trait CommissionRepository: Send + Sync {
    async fn save(&self, commission: Commission) -> Result<(), RepositoryError>;

    /// Expected commissions on trips completed at least `days` ago, joined
    /// with the owning trip for message building.
    async fn list_expected_for_completed_trips(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<commission::ExpectedCommission>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;

    async fn has_pending(
        &self,
        agency_id: &AgencyId,
        entity_type: &str,
        entity_id: &str,
        action_type: &str,
    ) -> Result<bool, RepositoryError>;

    /// All requests for the agency, newest first; optionally narrowed to one
    /// requester and/or status.
    async fn list(
        &self,
        agency_id: &AgencyId,
        requested_by: Option<&UserId>,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    /// Transition a pending request to a terminal status. Returns false when
    /// the request was already resolved (or missing), leaving it untouched.
    async fn resolve(
        &self,
        id: &ApprovalRequestId,
        status: ApprovalStatus,
        resolved_by: &UserId,
        response_note: Option<String>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn list_admins(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

#[async_trait]
pub trait FieldChangeRepository: Send + Sync {
    async fn append(&self, change: FieldChange) -> Result<(), RepositoryError>;
    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<FieldChange>, RepositoryError>;
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal, RepositoryError> {
    value
        .parse::<Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("invalid decimal `{value}`: {e}")))
}

pub(crate) fn parse_stage(value: &str) -> Result<TripStage, RepositoryError> {
    TripStage::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown trip stage `{value}`")))
}

/// True when the error is the unique-constraint violation a lost dedup race
/// produces.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
