use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::user::UserId;
use crate::domain::AgencyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStage {
    Inquiry,
    Quoted,
    Booked,
    Traveling,
    Completed,
    Canceled,
}

impl TripStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::Quoted => "quoted",
            Self::Booked => "booked",
            Self::Traveling => "traveling",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inquiry" => Some(Self::Inquiry),
            "quoted" => Some(Self::Quoted),
            "booked" => Some(Self::Booked),
            "traveling" => Some(Self::Traveling),
            "completed" => Some(Self::Completed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Stages a trip can be reopened out of.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl std::fmt::Display for TripStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub agency_id: AgencyId,
    pub client_id: ClientId,
    pub planner_id: UserId,
    pub stage: TripStage,
    pub locked: bool,
    pub destination: String,
    pub travel_start: Option<DateTime<Utc>>,
    pub travel_end: Option<DateTime<Utc>>,
    pub final_payment_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::TripStage;

    #[test]
    fn trip_stage_round_trips_from_storage_encoding() {
        let cases = [
            TripStage::Inquiry,
            TripStage::Quoted,
            TripStage::Booked,
            TripStage::Traveling,
            TripStage::Completed,
            TripStage::Canceled,
        ];

        for stage in cases {
            let decoded = TripStage::parse(stage.as_str());
            assert_eq!(decoded, Some(stage));
        }
    }

    #[test]
    fn only_completed_and_canceled_are_terminal() {
        assert!(TripStage::Completed.is_terminal());
        assert!(TripStage::Canceled.is_terminal());
        assert!(!TripStage::Quoted.is_terminal());
        assert!(!TripStage::Booked.is_terminal());
    }
}
