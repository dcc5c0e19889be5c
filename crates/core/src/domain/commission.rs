use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingId;
use crate::domain::trip::TripId;
use crate::domain::AgencyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommissionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Expected,
    Invoiced,
    Received,
    WrittenOff,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expected => "expected",
            Self::Invoiced => "invoiced",
            Self::Received => "received",
            Self::WrittenOff => "written_off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expected" => Some(Self::Expected),
            "invoiced" => Some(Self::Invoiced),
            "received" => Some(Self::Received),
            "written_off" => Some(Self::WrittenOff),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub agency_id: AgencyId,
    pub trip_id: TripId,
    pub booking_id: BookingId,
    pub supplier: String,
    pub expected_amount: Decimal,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::CommissionStatus;

    #[test]
    fn commission_status_round_trips_from_storage_encoding() {
        let cases = [
            CommissionStatus::Expected,
            CommissionStatus::Invoiced,
            CommissionStatus::Received,
            CommissionStatus::WrittenOff,
        ];

        for status in cases {
            assert_eq!(CommissionStatus::parse(status.as_str()), Some(status));
        }
    }
}
