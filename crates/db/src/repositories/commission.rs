use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use tripflow_core::domain::commission::Commission;
use tripflow_core::domain::trip::TripId;
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, parse_decimal, CommissionRepository, RepositoryError};
use crate::DbPool;

/// An `expected` commission joined with its completed trip, as consumed by
/// the commission follow-up scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedCommission {
    pub trip_id: TripId,
    pub agency_id: AgencyId,
    pub planner_id: UserId,
    pub destination: String,
    pub completed_at: DateTime<Utc>,
    pub supplier: String,
    pub expected_amount: Decimal,
}

pub struct SqlCommissionRepository {
    pool: DbPool,
}

impl SqlCommissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CommissionRepository for SqlCommissionRepository {
    async fn save(&self, commission: Commission) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO commissions (id, agency_id, trip_id, booking_id, supplier,
                                      expected_amount, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 supplier = excluded.supplier,
                 expected_amount = excluded.expected_amount,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&commission.id.0)
        .bind(&commission.agency_id.0)
        .bind(&commission.trip_id.0)
        .bind(&commission.booking_id.0)
        .bind(&commission.supplier)
        .bind(commission.expected_amount.to_string())
        .bind(commission.status.as_str())
        .bind(commission.created_at.to_rfc3339())
        .bind(commission.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_expected_for_completed_trips(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<ExpectedCommission>, RepositoryError> {
        let cutoff = (now - Duration::days(days)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT commissions.trip_id, commissions.agency_id, commissions.supplier,
                    commissions.expected_amount, trips.planner_id, trips.destination,
                    trips.updated_at AS completed_at
             FROM commissions
             JOIN trips ON trips.id = commissions.trip_id
             WHERE commissions.status = 'expected'
               AND trips.stage = 'completed'
               AND trips.updated_at <= ?
             ORDER BY commissions.trip_id, commissions.supplier",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let trip_id: String =
                    row.try_get("trip_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let agency_id: String = row
                    .try_get("agency_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let planner_id: String = row
                    .try_get("planner_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let destination: String = row
                    .try_get("destination")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let completed_at: String = row
                    .try_get("completed_at")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let supplier: String =
                    row.try_get("supplier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let expected_amount: String = row
                    .try_get("expected_amount")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;

                Ok(ExpectedCommission {
                    trip_id: TripId(trip_id),
                    agency_id: AgencyId(agency_id),
                    planner_id: UserId(planner_id),
                    destination,
                    completed_at: parse_datetime(&completed_at)?,
                    supplier,
                    expected_amount: parse_decimal(&expected_amount)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use tripflow_core::domain::commission::CommissionStatus;
    use tripflow_core::domain::trip::TripStage;

    use super::SqlCommissionRepository;
    use crate::fixtures;
    use crate::repositories::{
        BookingRepository, CommissionRepository, SqlBookingRepository, SqlTripRepository,
        TripRepository,
    };

    #[tokio::test]
    async fn expected_commissions_join_old_completed_trips_only() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let trips = SqlTripRepository::new(pool.clone());
        let bookings = SqlBookingRepository::new(pool.clone());
        let repo = SqlCommissionRepository::new(pool);

        let mut old_completed =
            fixtures::sample_trip(&baseline, "trip-old", TripStage::Completed, now);
        old_completed.updated_at = now - Duration::days(45);
        trips.save(old_completed).await.expect("save old");
        bookings
            .save(fixtures::sample_booking(&baseline, "bk-old", "trip-old", now))
            .await
            .expect("save booking");

        let mut fresh_completed =
            fixtures::sample_trip(&baseline, "trip-fresh", TripStage::Completed, now);
        fresh_completed.updated_at = now - Duration::days(5);
        trips.save(fresh_completed).await.expect("save fresh");
        bookings
            .save(fixtures::sample_booking(&baseline, "bk-fresh", "trip-fresh", now))
            .await
            .expect("save booking");

        repo.save(fixtures::sample_commission(
            &baseline,
            "com-1",
            "trip-old",
            "bk-old",
            "Iberia",
            Decimal::new(12_000, 2),
            CommissionStatus::Expected,
            now,
        ))
        .await
        .expect("save com-1");
        repo.save(fixtures::sample_commission(
            &baseline,
            "com-2",
            "trip-old",
            "bk-old",
            "Melia",
            Decimal::new(8_000, 2),
            CommissionStatus::Expected,
            now,
        ))
        .await
        .expect("save com-2");
        repo.save(fixtures::sample_commission(
            &baseline,
            "com-3",
            "trip-old",
            "bk-old",
            "Avis",
            Decimal::new(3_000, 2),
            CommissionStatus::Received,
            now,
        ))
        .await
        .expect("save com-3");
        repo.save(fixtures::sample_commission(
            &baseline,
            "com-4",
            "trip-fresh",
            "bk-fresh",
            "Iberia",
            Decimal::new(5_000, 2),
            CommissionStatus::Expected,
            now,
        ))
        .await
        .expect("save com-4");

        let expected = repo.list_expected_for_completed_trips(now, 30).await.expect("list");
        assert_eq!(expected.len(), 2, "received commissions and fresh trips are excluded");
        assert!(expected.iter().all(|row| row.trip_id.0 == "trip-old"));
        let total: Decimal = expected.iter().map(|row| row.expected_amount).sum();
        assert_eq!(total, Decimal::new(20_000, 2));
    }
}
