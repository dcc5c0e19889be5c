use sqlx::Row;

use tripflow_core::domain::user::{User, UserId, UserRole};
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User {
        id: UserId(id),
        agency_id: AgencyId(agency_id),
        display_name,
        role: UserRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{role}`")))?,
        created_at: parse_datetime(&created_at)?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, agency_id, display_name, role, created_at FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, agency_id, display_name, role, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role",
        )
        .bind(&user.id.0)
        .bind(&user.agency_id.0)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_admins(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, agency_id, display_name, role, created_at
             FROM users WHERE agency_id = ? AND role = 'admin' ORDER BY id ASC",
        )
        .bind(&agency_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}

#[cfg(test)]
mod tests {
    use tripflow_core::domain::user::UserRole;

    use super::SqlUserRepository;
    use crate::fixtures;
    use crate::repositories::UserRepository;

    #[tokio::test]
    async fn list_admins_excludes_planners() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlUserRepository::new(pool);

        let admins = repo.list_admins(&baseline.agency_id).await.expect("list admins");
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, baseline.admin_id);
        assert!(admins[0].role.is_admin());

        let planner =
            repo.find_by_id(&baseline.planner_id).await.expect("find planner").expect("exists");
        assert_eq!(planner.role, UserRole::Planner);
    }
}
