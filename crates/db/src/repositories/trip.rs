use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use tripflow_core::domain::client::ClientId;
use tripflow_core::domain::trip::{Trip, TripId};
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, parse_stage, RepositoryError, TripRepository};
use crate::DbPool;

const TRIP_COLUMNS: &str = "id, agency_id, client_id, planner_id, stage, locked, destination,
             travel_start, travel_end, final_payment_due, created_at, updated_at";

pub struct SqlTripRepository {
    pool: DbPool,
}

impl SqlTripRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_trip(row: &sqlx::sqlite::SqliteRow) -> Result<Trip, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let client_id: String =
        row.try_get("client_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let planner_id: String =
        row.try_get("planner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_str: String =
        row.try_get("stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let locked: bool =
        row.try_get("locked").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let destination: String =
        row.try_get("destination").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let travel_start: Option<String> =
        row.try_get("travel_start").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let travel_end: Option<String> =
        row.try_get("travel_end").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_payment_due: Option<String> =
        row.try_get("final_payment_due").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Trip {
        id: TripId(id),
        agency_id: AgencyId(agency_id),
        client_id: ClientId(client_id),
        planner_id: UserId(planner_id),
        stage: parse_stage(&stage_str)?,
        locked,
        destination,
        travel_start: travel_start.as_deref().map(parse_datetime).transpose()?,
        travel_end: travel_end.as_deref().map(parse_datetime).transpose()?,
        final_payment_due: final_payment_due.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl TripRepository for SqlTripRepository {
    async fn find_by_id(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_trip(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, trip: Trip) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trips (id, agency_id, client_id, planner_id, stage, locked, destination,
                                travel_start, travel_end, final_payment_due, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 client_id = excluded.client_id,
                 planner_id = excluded.planner_id,
                 stage = excluded.stage,
                 locked = excluded.locked,
                 destination = excluded.destination,
                 travel_start = excluded.travel_start,
                 travel_end = excluded.travel_end,
                 final_payment_due = excluded.final_payment_due,
                 updated_at = excluded.updated_at",
        )
        .bind(&trip.id.0)
        .bind(&trip.agency_id.0)
        .bind(&trip.client_id.0)
        .bind(&trip.planner_id.0)
        .bind(trip.stage.as_str())
        .bind(trip.locked)
        .bind(&trip.destination)
        .bind(trip.travel_start.map(|dt| dt.to_rfc3339()))
        .bind(trip.travel_end.map(|dt| dt.to_rfc3339()))
        .bind(trip.final_payment_due.map(|dt| dt.to_rfc3339()))
        .bind(trip.created_at.to_rfc3339())
        .bind(trip.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_stale_quoted(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let cutoff = (now - Duration::days(days)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE stage = 'quoted' AND updated_at <= ?
             ORDER BY updated_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trip).collect()
    }

    async fn list_completed_without_feedback(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let cutoff = (now - Duration::days(days)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE stage = 'completed'
               AND updated_at <= ?
               AND NOT EXISTS (SELECT 1 FROM trip_feedback WHERE trip_feedback.trip_id = trips.id)
             ORDER BY updated_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trip).collect()
    }

    async fn list_departing_within(
        &self,
        now: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let horizon = (now + Duration::hours(hours)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE stage = 'booked'
               AND travel_start IS NOT NULL
               AND travel_start > ?
               AND travel_start <= ?
             ORDER BY travel_start ASC"
        ))
        .bind(now.to_rfc3339())
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trip).collect()
    }

    async fn list_final_payment_due_within(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let horizon = (now + Duration::days(days)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE stage = 'booked'
               AND final_payment_due IS NOT NULL
               AND final_payment_due <= ?
             ORDER BY final_payment_due ASC"
        ))
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trip).collect()
    }
}
