//! Travel-readiness evaluation.
//!
//! Pure check over a trip's travelers, bookings and client contact data.
//! Findings accumulate; nothing short-circuits, so callers always see the
//! full gap list.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::booking::{Booking, BookingStatus, PaymentStatus};
use crate::domain::traveler::{PassportStatus, Traveler};

/// Passports expiring within this many months of departure are flagged.
const PASSPORT_VALIDITY_MONTHS: u32 = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessGap {
    NoTravelers,
    PassportMissing { traveler: String },
    PassportExpiringSoon { traveler: String, expires: NaiveDate },
    DateOfBirthMissing { traveler: String },
    NoActiveBookings,
    BookingUnconfirmed { supplier: String, status: BookingStatus },
    ConfirmationNumberMissing { supplier: String },
    PaymentOutstanding { supplier: String, payment_status: PaymentStatus },
    NoClientContact,
}

impl ReadinessGap {
    pub fn describe(&self) -> String {
        match self {
            Self::NoTravelers => "no travelers on the trip".to_string(),
            Self::PassportMissing { traveler } => {
                format!("{traveler} has no confirmed passport")
            }
            Self::PassportExpiringSoon { traveler, expires } => {
                format!("{traveler}'s passport expires {expires}, within 6 months of departure")
            }
            Self::DateOfBirthMissing { traveler } => {
                format!("{traveler} is missing a date of birth")
            }
            Self::NoActiveBookings => "no active bookings on the trip".to_string(),
            Self::BookingUnconfirmed { supplier, status } => {
                format!("booking with {supplier} is still {status}")
            }
            Self::ConfirmationNumberMissing { supplier } => {
                format!("booking with {supplier} has no confirmation number")
            }
            Self::PaymentOutstanding { supplier, payment_status } => {
                format!("booking with {supplier} is {payment_status}")
            }
            Self::NoClientContact => "client has no email or phone on file".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub is_complete: bool,
    pub gaps: Vec<ReadinessGap>,
}

pub fn evaluate_trip_readiness(
    travel_start: Option<DateTime<Utc>>,
    travelers: &[Traveler],
    bookings: &[Booking],
    client_email: Option<&str>,
    client_phone: Option<&str>,
) -> ReadinessReport {
    let mut gaps = Vec::new();

    if travelers.is_empty() {
        gaps.push(ReadinessGap::NoTravelers);
    }
    for traveler in travelers {
        match traveler.passport_status {
            PassportStatus::No | PassportStatus::Unknown => {
                gaps.push(ReadinessGap::PassportMissing { traveler: traveler.full_name.clone() });
            }
            PassportStatus::Yes => {
                if let (Some(expiry), Some(start)) = (traveler.passport_expiry, travel_start) {
                    if expires_within_validity_window(expiry, start) {
                        gaps.push(ReadinessGap::PassportExpiringSoon {
                            traveler: traveler.full_name.clone(),
                            expires: expiry,
                        });
                    }
                }
            }
        }
        if traveler.date_of_birth.is_none() {
            gaps.push(ReadinessGap::DateOfBirthMissing { traveler: traveler.full_name.clone() });
        }
    }

    let active: Vec<&Booking> =
        bookings.iter().filter(|booking| booking.status != BookingStatus::Canceled).collect();
    if active.is_empty() {
        gaps.push(ReadinessGap::NoActiveBookings);
    }
    for booking in &active {
        match booking.status {
            BookingStatus::Planned | BookingStatus::Quoted => {
                gaps.push(ReadinessGap::BookingUnconfirmed {
                    supplier: booking.supplier.clone(),
                    status: booking.status,
                });
            }
            BookingStatus::Booked => {
                let missing_confirmation = booking
                    .confirmation_number
                    .as_deref()
                    .map(|value| value.trim().is_empty())
                    .unwrap_or(true);
                if missing_confirmation {
                    gaps.push(ReadinessGap::ConfirmationNumberMissing {
                        supplier: booking.supplier.clone(),
                    });
                }
            }
            BookingStatus::Canceled => {}
        }
        if booking.payment_status != PaymentStatus::PaidInFull {
            gaps.push(ReadinessGap::PaymentOutstanding {
                supplier: booking.supplier.clone(),
                payment_status: booking.payment_status,
            });
        }
    }

    let has_email = client_email.is_some_and(|value| !value.trim().is_empty());
    let has_phone = client_phone.is_some_and(|value| !value.trim().is_empty());
    if !has_email && !has_phone {
        gaps.push(ReadinessGap::NoClientContact);
    }

    ReadinessReport { is_complete: gaps.is_empty(), gaps }
}

fn expires_within_validity_window(expiry: NaiveDate, travel_start: DateTime<Utc>) -> bool {
    let start = travel_start.date_naive();
    match start.checked_add_months(Months::new(PASSPORT_VALIDITY_MONTHS)) {
        Some(limit) => expiry < limit,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{evaluate_trip_readiness, ReadinessGap};
    use crate::domain::booking::{Booking, BookingId, BookingStatus, PaymentStatus};
    use crate::domain::traveler::{PassportStatus, Traveler, TravelerId};
    use crate::domain::trip::TripId;
    use crate::domain::AgencyId;

    fn traveler(name: &str, passport: PassportStatus) -> Traveler {
        Traveler {
            id: TravelerId(format!("tv-{name}")),
            trip_id: TripId("trip-1".to_string()),
            full_name: name.to_string(),
            date_of_birth: Some(NaiveDate::from_ymd_opt(1985, 6, 1).unwrap()),
            passport_status: passport,
            passport_expiry: None,
        }
    }

    fn booking(supplier: &str, status: BookingStatus, payment: PaymentStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId(format!("bk-{supplier}")),
            agency_id: AgencyId("agency-1".to_string()),
            trip_id: TripId("trip-1".to_string()),
            supplier: supplier.to_string(),
            status,
            confirmation_number: Some("CONF-1".to_string()),
            payment_status: payment,
            total_amount: Decimal::new(250_000, 2),
            payment_due: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fully_prepared_trip_reports_complete() {
        let report = evaluate_trip_readiness(
            Some(Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap()),
            &[traveler("Ana", PassportStatus::Yes)],
            &[booking("Iberia", BookingStatus::Booked, PaymentStatus::PaidInFull)],
            Some("ana@example.com"),
            None,
        );

        assert!(report.is_complete);
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn accumulates_gaps_across_all_categories() {
        let report = evaluate_trip_readiness(
            None,
            &[],
            &[booking("Iberia", BookingStatus::Quoted, PaymentStatus::DepositPaid)],
            None,
            None,
        );

        assert!(!report.is_complete);
        assert!(report.gaps.contains(&ReadinessGap::NoTravelers));
        assert!(report.gaps.contains(&ReadinessGap::BookingUnconfirmed {
            supplier: "Iberia".to_string(),
            status: BookingStatus::Quoted,
        }));
        assert!(report.gaps.contains(&ReadinessGap::PaymentOutstanding {
            supplier: "Iberia".to_string(),
            payment_status: PaymentStatus::DepositPaid,
        }));
        assert!(report.gaps.contains(&ReadinessGap::NoClientContact));
    }

    #[test]
    fn unknown_passport_status_is_flagged() {
        let report = evaluate_trip_readiness(
            None,
            &[traveler("Luis", PassportStatus::Unknown)],
            &[booking("Iberia", BookingStatus::Booked, PaymentStatus::PaidInFull)],
            Some("luis@example.com"),
            None,
        );

        assert!(report
            .gaps
            .contains(&ReadinessGap::PassportMissing { traveler: "Luis".to_string() }));
    }

    #[test]
    fn passport_expiring_within_six_months_of_departure_is_flagged() {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap();
        let mut inside = traveler("Ana", PassportStatus::Yes);
        inside.passport_expiry = Some(NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        let mut outside = traveler("Bea", PassportStatus::Yes);
        outside.passport_expiry = Some(NaiveDate::from_ymd_opt(2027, 6, 1).unwrap());

        let report = evaluate_trip_readiness(
            Some(start),
            &[inside, outside],
            &[booking("Iberia", BookingStatus::Booked, PaymentStatus::PaidInFull)],
            Some("ana@example.com"),
            None,
        );

        assert!(report.gaps.contains(&ReadinessGap::PassportExpiringSoon {
            traveler: "Ana".to_string(),
            expires: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
        }));
        assert!(!report
            .gaps
            .iter()
            .any(|gap| matches!(gap, ReadinessGap::PassportExpiringSoon { traveler, .. } if traveler == "Bea")));
    }

    #[test]
    fn missing_date_of_birth_is_flagged() {
        let mut no_dob = traveler("Caro", PassportStatus::Yes);
        no_dob.date_of_birth = None;

        let report = evaluate_trip_readiness(
            None,
            &[no_dob],
            &[booking("Iberia", BookingStatus::Booked, PaymentStatus::PaidInFull)],
            Some("caro@example.com"),
            None,
        );

        assert!(report
            .gaps
            .contains(&ReadinessGap::DateOfBirthMissing { traveler: "Caro".to_string() }));
    }

    #[test]
    fn canceled_bookings_do_not_count_as_active() {
        let report = evaluate_trip_readiness(
            None,
            &[traveler("Ana", PassportStatus::Yes)],
            &[booking("Iberia", BookingStatus::Canceled, PaymentStatus::Unpaid)],
            Some("ana@example.com"),
            None,
        );

        assert!(report.gaps.contains(&ReadinessGap::NoActiveBookings));
        // A canceled booking contributes no per-booking findings.
        assert!(!report
            .gaps
            .iter()
            .any(|gap| matches!(gap, ReadinessGap::PaymentOutstanding { .. })));
    }

    #[test]
    fn booked_without_confirmation_number_is_flagged() {
        let mut unconfirmed = booking("Iberia", BookingStatus::Booked, PaymentStatus::PaidInFull);
        unconfirmed.confirmation_number = None;

        let report = evaluate_trip_readiness(
            None,
            &[traveler("Ana", PassportStatus::Yes)],
            &[unconfirmed],
            Some("ana@example.com"),
            None,
        );

        assert!(report
            .gaps
            .contains(&ReadinessGap::ConfirmationNumberMissing { supplier: "Iberia".to_string() }));
    }
}
