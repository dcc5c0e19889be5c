use std::collections::BTreeMap;

use sqlx::Row;

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, FieldChange};
use tripflow_core::domain::AgencyId;

use super::{parse_datetime, AuditLogRepository, FieldChangeRepository, RepositoryError};
use crate::DbPool;

/// Insert an audit row through any executor, so the approval executor can
/// write it inside the same transaction as the primary mutation.
pub async fn insert_audit_event<'e, E>(executor: E, event: &AuditEvent) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let metadata =
        serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".to_string());

    sqlx::query(
        "INSERT INTO audit_log (id, agency_id, correlation_id, event_type, category, actor,
                                outcome, entity_type, entity_id, metadata, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(event.agency_id.as_ref().map(|id| id.0.clone()))
    .bind(&event.correlation_id)
    .bind(&event.event_type)
    .bind(event.category.as_str())
    .bind(&event.actor)
    .bind(event.outcome.as_str())
    .bind(&event.entity_type)
    .bind(&event.entity_id)
    .bind(metadata)
    .bind(event.occurred_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Transaction-friendly change-history insert, one row per applied field.
pub async fn insert_field_change<'e, E>(
    executor: E,
    change: &FieldChange,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO field_changes (id, agency_id, entity_type, entity_id, field, old_value,
                                    new_value, changed_by, changed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&change.id)
    .bind(&change.agency_id.0)
    .bind(&change.entity_type)
    .bind(&change.entity_id)
    .bind(&change.field)
    .bind(&change.old_value)
    .bind(&change.new_value)
    .bind(&change.changed_by)
    .bind(change.changed_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_audit_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String =
        row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: Option<String> =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String =
        row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome: String =
        row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: Option<String> =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: Option<String> =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)
        .map_err(|e| RepositoryError::Decode(format!("invalid audit metadata: {e}")))?;

    Ok(AuditEvent {
        event_id,
        agency_id: agency_id.map(AgencyId),
        correlation_id,
        event_type,
        category: AuditCategory::parse(&category).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown audit category `{category}`"))
        })?,
        actor,
        outcome: AuditOutcome::parse(&outcome).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown audit outcome `{outcome}`"))
        })?,
        entity_type,
        entity_id,
        metadata,
        occurred_at: parse_datetime(&occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        insert_audit_event(&self.pool, &event).await?;
        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, agency_id, correlation_id, event_type, category, actor, outcome,
                    entity_type, entity_id, metadata, occurred_at
             FROM audit_log
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY occurred_at ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit_event).collect()
    }
}

pub struct SqlFieldChangeRepository {
    pool: DbPool,
}

impl SqlFieldChangeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_field_change(row: &sqlx::sqlite::SqliteRow) -> Result<FieldChange, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: String =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: String =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let field: String =
        row.try_get("field").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let old_value: Option<String> =
        row.try_get("old_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let new_value: String =
        row.try_get("new_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let changed_by: String =
        row.try_get("changed_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let changed_at: String =
        row.try_get("changed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(FieldChange {
        id,
        agency_id: AgencyId(agency_id),
        entity_type,
        entity_id,
        field,
        old_value,
        new_value,
        changed_by,
        changed_at: parse_datetime(&changed_at)?,
    })
}

#[async_trait::async_trait]
impl FieldChangeRepository for SqlFieldChangeRepository {
    async fn append(&self, change: FieldChange) -> Result<(), RepositoryError> {
        insert_field_change(&self.pool, &change).await?;
        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<FieldChange>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, agency_id, entity_type, entity_id, field, old_value, new_value,
                    changed_by, changed_at
             FROM field_changes
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY changed_at ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_field_change).collect()
    }
}
