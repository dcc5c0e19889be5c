use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use tripflow_core::domain::booking::{Booking, BookingId, BookingStatus, PaymentStatus};
use tripflow_core::domain::trip::TripId;
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, parse_decimal, BookingRepository, RepositoryError};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id, agency_id, trip_id, supplier, status, confirmation_number,
             payment_status, total_amount, payment_due, created_at, updated_at";

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let trip_id: String =
        row.try_get("trip_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supplier: String =
        row.try_get("supplier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confirmation_number: Option<String> =
        row.try_get("confirmation_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payment_status_str: String =
        row.try_get("payment_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_amount: String =
        row.try_get("total_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payment_due: Option<String> =
        row.try_get("payment_due").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Booking {
        id: BookingId(id),
        agency_id: AgencyId(agency_id),
        trip_id: TripId(trip_id),
        supplier,
        status: BookingStatus::parse(&status_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown booking status `{status_str}`"))
        })?,
        confirmation_number,
        payment_status: PaymentStatus::parse(&payment_status_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown payment status `{payment_status_str}`"))
        })?,
        total_amount: parse_decimal(&total_amount)?,
        payment_due: payment_due.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_booking(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, booking: Booking) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO bookings (id, agency_id, trip_id, supplier, status, confirmation_number,
                                   payment_status, total_amount, payment_due, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 supplier = excluded.supplier,
                 status = excluded.status,
                 confirmation_number = excluded.confirmation_number,
                 payment_status = excluded.payment_status,
                 total_amount = excluded.total_amount,
                 payment_due = excluded.payment_due,
                 updated_at = excluded.updated_at",
        )
        .bind(&booking.id.0)
        .bind(&booking.agency_id.0)
        .bind(&booking.trip_id.0)
        .bind(&booking.supplier)
        .bind(booking.status.as_str())
        .bind(&booking.confirmation_number)
        .bind(booking.payment_status.as_str())
        .bind(booking.total_amount.to_string())
        .bind(booking.payment_due.map(|dt| dt.to_rfc3339()))
        .bind(booking.created_at.to_rfc3339())
        .bind(booking.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_trip(&self, trip_id: &TripId) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE trip_id = ? ORDER BY created_at ASC"
        ))
        .bind(&trip_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn list_payment_due_within(
        &self,
        now: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let horizon = (now + Duration::hours(hours)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE status != 'canceled'
               AND payment_status != 'paid_in_full'
               AND payment_due IS NOT NULL
               AND payment_due > ?
               AND payment_due <= ?
             ORDER BY payment_due ASC"
        ))
        .bind(now.to_rfc3339())
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use tripflow_core::domain::booking::{BookingId, BookingStatus, PaymentStatus};
    use tripflow_core::domain::trip::{TripId, TripStage};

    use super::SqlBookingRepository;
    use crate::fixtures;
    use crate::repositories::{BookingRepository, SqlTripRepository, TripRepository};

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc::now();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let repo = SqlBookingRepository::new(pool);
        let booking = fixtures::sample_booking(&baseline, "bk-1", "trip-1", now);
        repo.save(booking.clone()).await.expect("save booking");

        let found = repo.find_by_id(&BookingId("bk-1".to_string())).await.expect("find");
        assert_eq!(found, Some(booking));
    }

    #[tokio::test]
    async fn payment_window_excludes_paid_canceled_and_distant_bookings() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let repo = SqlBookingRepository::new(pool);

        let mut due_soon = fixtures::sample_booking(&baseline, "bk-due", "trip-1", now);
        due_soon.payment_due = Some(now + Duration::hours(30));
        due_soon.payment_status = PaymentStatus::DepositPaid;
        repo.save(due_soon).await.expect("save due");

        let mut paid = fixtures::sample_booking(&baseline, "bk-paid", "trip-1", now);
        paid.payment_due = Some(now + Duration::hours(30));
        paid.payment_status = PaymentStatus::PaidInFull;
        repo.save(paid).await.expect("save paid");

        let mut canceled = fixtures::sample_booking(&baseline, "bk-canceled", "trip-1", now);
        canceled.payment_due = Some(now + Duration::hours(30));
        canceled.status = BookingStatus::Canceled;
        repo.save(canceled).await.expect("save canceled");

        let mut distant = fixtures::sample_booking(&baseline, "bk-distant", "trip-1", now);
        distant.payment_due = Some(now + Duration::hours(90));
        repo.save(distant).await.expect("save distant");

        let due = repo.list_payment_due_within(now, 48).await.expect("list");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id.0, "bk-due");
    }

    #[tokio::test]
    async fn list_for_trip_returns_only_that_trips_bookings() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc::now();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip 1");
        trips
            .save(fixtures::sample_trip(&baseline, "trip-2", TripStage::Booked, now))
            .await
            .expect("save trip 2");

        let repo = SqlBookingRepository::new(pool);
        repo.save(fixtures::sample_booking(&baseline, "bk-1", "trip-1", now))
            .await
            .expect("save 1");
        repo.save(fixtures::sample_booking(&baseline, "bk-2", "trip-1", now))
            .await
            .expect("save 2");
        repo.save(fixtures::sample_booking(&baseline, "bk-3", "trip-2", now))
            .await
            .expect("save 3");

        let bookings = repo.list_for_trip(&TripId("trip-1".to_string())).await.expect("list");
        assert_eq!(bookings.len(), 2);
    }
}
