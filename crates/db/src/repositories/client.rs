use chrono::NaiveDate;
use sqlx::Row;

use tripflow_core::domain::client::{Client, ClientId};
use tripflow_core::domain::traveler::{PassportStatus, Traveler, TravelerId};
use tripflow_core::domain::trip::TripId;
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, ClientRepository, RepositoryError, TravelerRepository};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<Client, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: Option<String> =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Client {
        id: ClientId(id),
        agency_id: AgencyId(agency_id),
        display_name,
        email,
        phone,
        created_at: parse_datetime(&created_at)?,
    })
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, agency_id, display_name, email, phone, created_at
             FROM clients WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_client(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, client: Client) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO clients (id, agency_id, display_name, email, phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 phone = excluded.phone",
        )
        .bind(&client.id.0)
        .bind(&client.agency_id.0)
        .bind(&client.display_name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlTravelerRepository {
    pool: DbPool,
}

impl SqlTravelerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    value
        .parse::<NaiveDate>()
        .map_err(|e| RepositoryError::Decode(format!("invalid date `{value}`: {e}")))
}

fn row_to_traveler(row: &sqlx::sqlite::SqliteRow) -> Result<Traveler, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let trip_id: String =
        row.try_get("trip_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let full_name: String =
        row.try_get("full_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let date_of_birth: Option<String> =
        row.try_get("date_of_birth").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let passport_status: String =
        row.try_get("passport_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let passport_expiry: Option<String> =
        row.try_get("passport_expiry").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Traveler {
        id: TravelerId(id),
        trip_id: TripId(trip_id),
        full_name,
        date_of_birth: date_of_birth.as_deref().map(parse_date).transpose()?,
        passport_status: PassportStatus::parse(&passport_status).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown passport status `{passport_status}`"))
        })?,
        passport_expiry: passport_expiry.as_deref().map(parse_date).transpose()?,
    })
}

#[async_trait::async_trait]
impl TravelerRepository for SqlTravelerRepository {
    async fn list_for_trip(&self, trip_id: &TripId) -> Result<Vec<Traveler>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, trip_id, full_name, date_of_birth, passport_status, passport_expiry
             FROM travelers WHERE trip_id = ? ORDER BY full_name ASC",
        )
        .bind(&trip_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_traveler).collect()
    }

    async fn save(&self, traveler: Traveler) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO travelers (id, trip_id, full_name, date_of_birth, passport_status,
                                    passport_expiry)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 full_name = excluded.full_name,
                 date_of_birth = excluded.date_of_birth,
                 passport_status = excluded.passport_status,
                 passport_expiry = excluded.passport_expiry",
        )
        .bind(&traveler.id.0)
        .bind(&traveler.trip_id.0)
        .bind(&traveler.full_name)
        .bind(traveler.date_of_birth.map(|d| d.to_string()))
        .bind(traveler.passport_status.as_str())
        .bind(traveler.passport_expiry.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use tripflow_core::domain::client::ClientId;
    use tripflow_core::domain::traveler::{PassportStatus, Traveler, TravelerId};
    use tripflow_core::domain::trip::{TripId, TripStage};

    use super::{SqlClientRepository, SqlTravelerRepository};
    use crate::fixtures;
    use crate::repositories::{
        ClientRepository, SqlTripRepository, TravelerRepository, TripRepository,
    };

    #[tokio::test]
    async fn client_round_trips_contact_fields() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlClientRepository::new(pool);

        let found =
            repo.find_by_id(&baseline.client_id).await.expect("find").expect("seeded client");
        assert_eq!(found.email.as_deref(), Some("dana@example.com"));

        let mut updated = found;
        updated.email = None;
        updated.phone = None;
        repo.save(updated).await.expect("save");

        let reread =
            repo.find_by_id(&baseline.client_id).await.expect("find again").expect("exists");
        assert!(!reread.has_contact_method());
    }

    #[tokio::test]
    async fn missing_client_is_none() {
        let (pool, _baseline) = fixtures::workflow_baseline().await;
        let repo = SqlClientRepository::new(pool);

        let found = repo.find_by_id(&ClientId("client-ghost".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn travelers_list_per_trip() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc::now();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let repo = SqlTravelerRepository::new(pool);
        repo.save(Traveler {
            id: TravelerId("tv-1".to_string()),
            trip_id: TripId("trip-1".to_string()),
            full_name: "Ana Duarte".to_string(),
            date_of_birth: Some(NaiveDate::from_ymd_opt(1985, 6, 1).unwrap()),
            passport_status: PassportStatus::Yes,
            passport_expiry: Some(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()),
        })
        .await
        .expect("save traveler");

        let travelers = repo.list_for_trip(&TripId("trip-1".to_string())).await.expect("list");
        assert_eq!(travelers.len(), 1);
        assert_eq!(travelers[0].full_name, "Ana Duarte");
        assert_eq!(travelers[0].passport_status, PassportStatus::Yes);
    }
}
