use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::trip::TripId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TravelerId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassportStatus {
    Yes,
    No,
    Unknown,
}

impl PassportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    pub id: TravelerId,
    pub trip_id: TripId,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub passport_status: PassportStatus,
    pub passport_expiry: Option<NaiveDate>,
}
