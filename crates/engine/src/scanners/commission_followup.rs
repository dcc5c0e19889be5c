//! Commissions still expected long after trip completion.
//!
//! Amounts are aggregated per trip across suppliers so the planner gets one
//! notification per trip, not one per commission row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::events::EventKey;
use tripflow_core::format::day_count;
use tripflow_db::repositories::{
    CommissionRepository, ExpectedCommission, RepositoryError, SqlCommissionRepository,
};
use tripflow_db::DbPool;

use super::{ScanOutcome, COMMISSION_FOLLOWUP};
use crate::notify::Notifier;

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    days: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let commissions = SqlCommissionRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let outstanding = commissions.list_expected_for_completed_trips(now, days).await?;

    let mut by_trip: BTreeMap<String, Vec<&ExpectedCommission>> = BTreeMap::new();
    for row in &outstanding {
        by_trip.entry(row.trip_id.0.clone()).or_default().push(row);
    }

    let mut created = 0;
    let checked = by_trip.len() as u64;

    for (trip_id, rows) in by_trip {
        let first = rows[0];
        let total: Decimal = rows.iter().map(|row| row.expected_amount).sum();
        let days_since = (now - first.completed_at).num_days();
        let outcome = notifier
            .notify(
                NewNotification {
                    agency_id: first.agency_id.clone(),
                    recipient_id: first.planner_id.clone(),
                    kind: NotificationKind::Normal,
                    title: "Commission follow-up".to_string(),
                    message: format!(
                        "{} commission(s) totaling {} still expected for trip to {}, completed {} ago",
                        rows.len(),
                        total,
                        first.destination,
                        day_count(days_since)
                    ),
                    entity_type: Some("trip".to_string()),
                    entity_id: Some(trip_id.clone()),
                    event_key: Some(
                        EventKey::daily(COMMISSION_FOLLOWUP, "trip", &trip_id, now).into_string(),
                    ),
                },
                now,
            )
            .await?;
        if outcome.created {
            created += 1;
        }
    }

    Ok(ScanOutcome::notifications(COMMISSION_FOLLOWUP, checked, created))
}
