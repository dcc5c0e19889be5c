use serde::{Deserialize, Serialize};

pub mod approval;
pub mod booking;
pub mod client;
pub mod commission;
pub mod notification;
pub mod task;
pub mod traveler;
pub mod trip;
pub mod user;

/// Tenant identifier. Every persisted row is scoped to one agency.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgencyId(pub String);
