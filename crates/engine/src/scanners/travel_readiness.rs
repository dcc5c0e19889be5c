//! Imminent departures with unresolved readiness gaps.

use chrono::{DateTime, Utc};

use tripflow_core::domain::notification::NotificationKind;
use tripflow_core::events::EventKey;
use tripflow_core::format::departure_phrase;
use tripflow_core::readiness::evaluate_trip_readiness;
use tripflow_db::repositories::{
    BookingRepository, ClientRepository, RepositoryError, SqlBookingRepository,
    SqlClientRepository, SqlTravelerRepository, SqlTripRepository, SqlUserRepository,
    TravelerRepository, TripRepository, UserRepository,
};
use tripflow_db::DbPool;

use super::{ScanOutcome, TRAVEL_READINESS};
use crate::notify::{fan_out_recipients, NotificationTemplate, Notifier};

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    hours: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let trips = SqlTripRepository::new(pool.clone());
    let travelers = SqlTravelerRepository::new(pool.clone());
    let bookings = SqlBookingRepository::new(pool.clone());
    let clients = SqlClientRepository::new(pool.clone());
    let users = SqlUserRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let departing = trips.list_departing_within(now, hours).await?;
    let mut created = 0;

    for trip in &departing {
        let trip_travelers = travelers.list_for_trip(&trip.id).await?;
        let trip_bookings = bookings.list_for_trip(&trip.id).await?;
        let client = clients.find_by_id(&trip.client_id).await?;

        let report = evaluate_trip_readiness(
            trip.travel_start,
            &trip_travelers,
            &trip_bookings,
            client.as_ref().and_then(|c| c.email.as_deref()),
            client.as_ref().and_then(|c| c.phone.as_deref()),
        );
        if report.is_complete {
            continue;
        }

        let admins =
            users.list_admins(&trip.agency_id).await?.into_iter().map(|user| user.id).collect();
        let recipients = fan_out_recipients(admins, &trip.planner_id);

        let hours_until =
            trip.travel_start.map(|start| (start - now).num_hours()).unwrap_or_default();
        let gap_list: Vec<String> = report.gaps.iter().map(|gap| gap.describe()).collect();
        let template = NotificationTemplate {
            agency_id: trip.agency_id.clone(),
            kind: NotificationKind::Urgent,
            title: "Trip not travel-ready".to_string(),
            message: format!(
                "Trip to {} {} with {} readiness gap(s): {}",
                trip.destination,
                departure_phrase(hours_until),
                report.gaps.len(),
                gap_list.join("; ")
            ),
            entity_type: Some("trip".to_string()),
            entity_id: Some(trip.id.0.clone()),
            event_key: Some(EventKey::daily(TRAVEL_READINESS, "trip", &trip.id.0, now)),
        };

        let counts = notifier.notify_many(&recipients, &template, now).await?;
        created += counts.created;
    }

    Ok(ScanOutcome::notifications(TRAVEL_READINESS, departing.len() as u64, created))
}
