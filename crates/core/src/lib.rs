pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod format;
pub mod idempotency;
pub mod readiness;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, FieldChange};
pub use domain::approval::{
    ActionValidationError, ApprovalAction, ApprovalRequest, ApprovalRequestId, ApprovalStatus,
    ProposedFieldChange,
};
pub use domain::booking::{Booking, BookingId, BookingStatus, PaymentStatus};
pub use domain::client::{Client, ClientId};
pub use domain::commission::{Commission, CommissionId, CommissionStatus};
pub use domain::notification::{
    NewNotification, Notification, NotificationId, NotificationKind,
};
pub use domain::task::{Task, TaskId, TaskPriority, TaskStatus};
pub use domain::traveler::{PassportStatus, Traveler, TravelerId};
pub use domain::trip::{Trip, TripId, TripStage};
pub use domain::user::{User, UserId, UserRole};
pub use domain::AgencyId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::EventKey;
pub use idempotency::{
    BeginOutcome, CachedResponse, IdempotencyKey, IdempotencyStore, InMemoryIdempotencyStore,
};
pub use readiness::{evaluate_trip_readiness, ReadinessGap, ReadinessReport};
