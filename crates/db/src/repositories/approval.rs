use chrono::{DateTime, Utc};
use sqlx::Row;

use tripflow_core::domain::approval::{
    ApprovalAction, ApprovalRequest, ApprovalRequestId, ApprovalStatus,
};
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, ApprovalRepository, RepositoryError};
use crate::DbPool;

const APPROVAL_COLUMNS: &str = "id, agency_id, action_type, action_payload, entity_type,
             entity_id, status, requested_by, resolved_by, response_note, created_at, resolved_at";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, RepositoryError> {
    ApprovalStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval status `{value}`")))
}

pub(crate) fn row_to_approval(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ApprovalRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_payload: String =
        row.try_get("action_payload").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: String =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: String =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_by: Option<String> =
        row.try_get("resolved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response_note: Option<String> =
        row.try_get("response_note").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let action: ApprovalAction = serde_json::from_str(&action_payload)
        .map_err(|e| RepositoryError::Decode(format!("invalid action payload: {e}")))?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId(id),
        agency_id: AgencyId(agency_id),
        action,
        entity_type,
        entity_id,
        status: parse_status(&status_str)?,
        requested_by: UserId(requested_by),
        resolved_by: resolved_by.map(UserId),
        response_note,
        created_at: parse_datetime(&created_at)?,
        resolved_at: resolved_at.as_deref().map(parse_datetime).transpose()?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let action_payload = serde_json::to_string(&request.action)
            .map_err(|e| RepositoryError::Decode(format!("unencodable action: {e}")))?;

        sqlx::query(
            "INSERT INTO approval_requests (id, agency_id, action_type, action_payload,
                                            entity_type, entity_id, status, requested_by,
                                            resolved_by, response_note, created_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.agency_id.0)
        .bind(request.action.action_type())
        .bind(action_payload)
        .bind(&request.entity_type)
        .bind(&request.entity_id)
        .bind(request.status.as_str())
        .bind(&request.requested_by.0)
        .bind(request.resolved_by.as_ref().map(|id| id.0.clone()))
        .bind(&request.response_note)
        .bind(request.created_at.to_rfc3339())
        .bind(request.resolved_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn has_pending(
        &self,
        agency_id: &AgencyId,
        entity_type: &str,
        entity_id: &str,
        action_type: &str,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_requests
             WHERE agency_id = ? AND entity_type = ? AND entity_id = ? AND action_type = ?
               AND status = 'pending'",
        )
        .bind(&agency_id.0)
        .bind(entity_type)
        .bind(entity_id)
        .bind(action_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn list(
        &self,
        agency_id: &AgencyId,
        requested_by: Option<&UserId>,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE agency_id = ?"
        );
        if requested_by.is_some() {
            sql.push_str(" AND requested_by = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql).bind(&agency_id.0);
        if let Some(requester) = requested_by {
            query = query.bind(&requester.0);
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }

        let rows: Vec<sqlx::sqlite::SqliteRow> = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_approval).collect()
    }

    async fn resolve(
        &self,
        id: &ApprovalRequestId,
        status: ApprovalStatus,
        resolved_by: &UserId,
        response_note: Option<String>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_requests
             SET status = ?, resolved_by = ?, response_note = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(&resolved_by.0)
        .bind(&response_note)
        .bind(resolved_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tripflow_core::domain::approval::{
        ApprovalAction, ApprovalRequestId, ApprovalStatus,
    };
    use tripflow_core::domain::trip::TripStage;
    use tripflow_core::domain::user::UserId;

    use super::SqlApprovalRepository;
    use crate::fixtures;
    use crate::repositories::ApprovalRepository;

    #[tokio::test]
    async fn insert_and_find_round_trips_the_typed_action() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlApprovalRepository::new(pool);

        let request = fixtures::sample_approval(
            &baseline,
            "apr-1",
            ApprovalAction::StageChange {
                from_stage: TripStage::Quoted,
                to_stage: TripStage::Booked,
            },
            "trip",
            "trip-1",
        );
        repo.insert(request.clone()).await.expect("insert");

        let found =
            repo.find_by_id(&ApprovalRequestId("apr-1".to_string())).await.expect("find").unwrap();
        assert_eq!(found.action, request.action);
        assert_eq!(found.status, ApprovalStatus::Pending);
        assert_eq!(found.entity_id, "trip-1");
    }

    #[tokio::test]
    async fn pending_uniqueness_is_enforced_by_the_partial_index() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlApprovalRepository::new(pool);

        let first = fixtures::sample_approval(
            &baseline,
            "apr-1",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-1",
        );
        repo.insert(first).await.expect("first insert");

        assert!(repo
            .has_pending(&baseline.agency_id, "booking", "bk-1", "confirm_booking")
            .await
            .expect("has_pending"));

        let second = fixtures::sample_approval(
            &baseline,
            "apr-2",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-1",
        );
        let error = repo.insert(second).await.expect_err("duplicate pending should fail");
        assert!(error.is_unique_violation());
    }

    #[tokio::test]
    async fn resolve_transitions_exactly_once() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlApprovalRepository::new(pool);
        let now = Utc::now();

        let request = fixtures::sample_approval(
            &baseline,
            "apr-1",
            ApprovalAction::MarkPaymentReceived,
            "booking",
            "bk-1",
        );
        repo.insert(request).await.expect("insert");

        let id = ApprovalRequestId("apr-1".to_string());
        let first = repo
            .resolve(
                &id,
                ApprovalStatus::Denied,
                &baseline.admin_id,
                Some("not yet".to_string()),
                now,
            )
            .await
            .expect("first resolve");
        assert!(first);

        let second = repo
            .resolve(&id, ApprovalStatus::Approved, &baseline.admin_id, None, now)
            .await
            .expect("second resolve");
        assert!(!second, "a resolved request must stay resolved");

        let found = repo.find_by_id(&id).await.expect("find").unwrap();
        assert_eq!(found.status, ApprovalStatus::Denied);
        assert_eq!(found.response_note.as_deref(), Some("not yet"));
    }

    #[tokio::test]
    async fn resolved_request_allows_a_new_pending_one() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlApprovalRepository::new(pool);
        let now = Utc::now();

        let first = fixtures::sample_approval(
            &baseline,
            "apr-1",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-1",
        );
        repo.insert(first).await.expect("insert");
        repo.resolve(
            &ApprovalRequestId("apr-1".to_string()),
            ApprovalStatus::Denied,
            &baseline.admin_id,
            None,
            now,
        )
        .await
        .expect("resolve");

        let second = fixtures::sample_approval(
            &baseline,
            "apr-2",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-1",
        );
        repo.insert(second).await.expect("second insert succeeds after resolution");
    }

    #[tokio::test]
    async fn list_filters_by_requester_and_status() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlApprovalRepository::new(pool);

        let mut mine = fixtures::sample_approval(
            &baseline,
            "apr-1",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-1",
        );
        mine.requested_by = baseline.planner_id.clone();
        repo.insert(mine).await.expect("insert mine");

        let mut theirs = fixtures::sample_approval(
            &baseline,
            "apr-2",
            ApprovalAction::ConfirmBooking,
            "booking",
            "bk-2",
        );
        theirs.requested_by = baseline.admin_id.clone();
        repo.insert(theirs).await.expect("insert theirs");

        let all = repo.list(&baseline.agency_id, None, None).await.expect("list all");
        assert_eq!(all.len(), 2);

        let mine_only = repo
            .list(&baseline.agency_id, Some(&baseline.planner_id), None)
            .await
            .expect("list mine");
        assert_eq!(mine_only.len(), 1);
        assert_eq!(mine_only[0].requested_by, baseline.planner_id);

        let none = repo
            .list(
                &baseline.agency_id,
                Some(&UserId("user-ghost".to_string())),
                Some(ApprovalStatus::Pending),
            )
            .await
            .expect("list ghost");
        assert!(none.is_empty());
    }
}
