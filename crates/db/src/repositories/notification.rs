use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use tripflow_core::domain::notification::{
    NewNotification, Notification, NotificationId, NotificationKind,
};
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;

use super::{
    is_unique_violation, parse_datetime, DeliveryOutcome, NotificationRepository, RepositoryError,
};
use crate::DbPool;

const NOTIFICATION_COLUMNS: &str = "id, agency_id, recipient_id, kind, title, message,
             entity_type, entity_id, event_key, read, created_at";

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Notification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recipient_id: String =
        row.try_get("recipient_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: Option<String> =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: Option<String> =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_key: Option<String> =
        row.try_get("event_key").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let read: bool = row.try_get("read").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Notification {
        id: NotificationId(id),
        agency_id: AgencyId(agency_id),
        recipient_id: UserId(recipient_id),
        kind: NotificationKind::parse(&kind_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown notification kind `{kind_str}`"))
        })?,
        title,
        message,
        entity_type,
        entity_id,
        event_key,
        read,
        created_at: parse_datetime(&created_at)?,
    })
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn try_create(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, RepositoryError> {
        // Fast path: the condition already fired for this recipient.
        if let Some(event_key) = new.event_key.as_deref() {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM notifications WHERE recipient_id = ? AND event_key = ?",
            )
            .bind(&new.recipient_id.0)
            .bind(event_key)
            .fetch_optional(&self.pool)
            .await?;
            if existing.is_some() {
                return Ok(DeliveryOutcome::duplicate());
            }
        }

        let id = NotificationId(Uuid::new_v4().to_string());
        let result = sqlx::query(
            "INSERT INTO notifications (id, agency_id, recipient_id, kind, title, message,
                                        entity_type, entity_id, event_key, read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id.0)
        .bind(&new.agency_id.0)
        .bind(&new.recipient_id.0)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.entity_type)
        .bind(&new.entity_id)
        .bind(&new.event_key)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(DeliveryOutcome::created(id)),
            // A concurrent racer inserted between the check and the write;
            // the unique index on (recipient_id, event_key) is the net.
            Err(error) if is_unique_violation(&error) => Ok(DeliveryOutcome::duplicate()),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE recipient_id = ?
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(&recipient_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }
}
