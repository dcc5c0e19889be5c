use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use tripflow_core::domain::task::{Task, TaskId, TaskPriority, TaskStatus};
use tripflow_core::domain::trip::TripId;
use tripflow_core::domain::user::UserId;
use tripflow_core::domain::AgencyId;

use super::{is_unique_violation, parse_datetime, RepositoryError, TaskInsertOutcome, TaskRepository};
use crate::DbPool;

const TASK_COLUMNS: &str = "id, agency_id, trip_id, assignee_id, title, description, due_at,
             status, priority, category, is_system_generated, source_event, created_at, updated_at";

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agency_id: String =
        row.try_get("agency_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let trip_id: Option<String> =
        row.try_get("trip_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assignee_id: String =
        row.try_get("assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let due_at: String =
        row.try_get("due_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority_str: String =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_system_generated: bool =
        row.try_get("is_system_generated").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_event: Option<String> =
        row.try_get("source_event").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Task {
        id: TaskId(id),
        agency_id: AgencyId(agency_id),
        trip_id: trip_id.map(TripId),
        assignee_id: UserId(assignee_id),
        title,
        description,
        due_at: parse_datetime(&due_at)?,
        status: TaskStatus::parse(&status_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown task status `{status_str}`"))
        })?,
        priority: TaskPriority::parse(&priority_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown task priority `{priority_str}`"))
        })?,
        category,
        is_system_generated,
        source_event,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

async fn insert_task(pool: &DbPool, task: &Task) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tasks (id, agency_id, trip_id, assignee_id, title, description, due_at,
                            status, priority, category, is_system_generated, source_event,
                            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id.0)
    .bind(&task.agency_id.0)
    .bind(task.trip_id.as_ref().map(|id| id.0.clone()))
    .bind(&task.assignee_id.0)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.due_at.to_rfc3339())
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(&task.category)
    .bind(task.is_system_generated)
    .bind(&task.source_event)
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_task(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, task: Task) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tasks (id, agency_id, trip_id, assignee_id, title, description, due_at,
                                status, priority, category, is_system_generated, source_event,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 due_at = excluded.due_at,
                 status = excluded.status,
                 priority = excluded.priority,
                 category = excluded.category,
                 updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(&task.agency_id.0)
        .bind(task.trip_id.as_ref().map(|id| id.0.clone()))
        .bind(&task.assignee_id.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_at.to_rfc3339())
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.category)
        .bind(task.is_system_generated)
        .bind(&task.source_event)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_open_due_within(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<Task>, RepositoryError> {
        let horizon = (now + Duration::days(days)).to_rfc3339();
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'open'
               AND priority = 'normal'
               AND due_at > ?
               AND due_at <= ?
             ORDER BY due_at ASC"
        ))
        .bind(now.to_rfc3339())
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn try_create_system_task(
        &self,
        task: Task,
    ) -> Result<TaskInsertOutcome, RepositoryError> {
        let source_event = task.source_event.as_deref().ok_or_else(|| {
            RepositoryError::Decode("system task requires a source_event".to_string())
        })?;

        // Fast path: an open system task for this rule already exists.
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks
             WHERE trip_id = ?
               AND source_event = ?
               AND status = 'open'
               AND is_system_generated = 1",
        )
        .bind(task.trip_id.as_ref().map(|id| id.0.clone()))
        .bind(source_event)
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Ok(TaskInsertOutcome { created: false, duplicate: true });
        }

        match insert_task(&self.pool, &task).await {
            Ok(()) => Ok(TaskInsertOutcome { created: true, duplicate: false }),
            // A concurrent scan won the race; the partial unique index is the
            // safety net underneath the pre-check above.
            Err(error) if is_unique_violation(&error) => {
                Ok(TaskInsertOutcome { created: false, duplicate: true })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'overdue', updated_at = ?
             WHERE status = 'open' AND due_at < ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use tripflow_core::domain::task::{TaskId, TaskPriority, TaskStatus};
    use tripflow_core::domain::trip::TripStage;

    use super::SqlTaskRepository;
    use crate::fixtures;
    use crate::repositories::{SqlTripRepository, TaskRepository, TripRepository};

    #[tokio::test]
    async fn open_due_within_filters_priority_and_window() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlTaskRepository::new(pool);
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let mut soon = fixtures::sample_task(&baseline, "task-soon", now);
        soon.due_at = now + Duration::days(3);
        repo.save(soon).await.expect("save soon");

        let mut urgent = fixtures::sample_task(&baseline, "task-urgent", now);
        urgent.due_at = now + Duration::days(3);
        urgent.priority = TaskPriority::Urgent;
        repo.save(urgent).await.expect("save urgent");

        let mut distant = fixtures::sample_task(&baseline, "task-distant", now);
        distant.due_at = now + Duration::days(30);
        repo.save(distant).await.expect("save distant");

        let mut done = fixtures::sample_task(&baseline, "task-done", now);
        done.due_at = now + Duration::days(3);
        done.status = TaskStatus::Completed;
        repo.save(done).await.expect("save done");

        let due = repo.list_open_due_within(now, 7).await.expect("list");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id.0, "task-soon");
    }

    #[tokio::test]
    async fn system_task_guard_skips_while_one_is_open() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc::now();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let repo = SqlTaskRepository::new(pool);
        let task = fixtures::sample_system_task(
            &baseline,
            "task-1",
            "trip-1",
            "final_payment:trip-1",
            now,
        );

        let first = repo.try_create_system_task(task.clone()).await.expect("first insert");
        assert!(first.created);

        let mut retry = task.clone();
        retry.id = TaskId("task-2".to_string());
        let second = repo.try_create_system_task(retry).await.expect("second insert");
        assert!(second.duplicate);
        assert!(!second.created);
    }

    #[tokio::test]
    async fn completed_system_task_allows_recreation() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc::now();
        let trips = SqlTripRepository::new(pool.clone());
        trips
            .save(fixtures::sample_trip(&baseline, "trip-1", TripStage::Booked, now))
            .await
            .expect("save trip");

        let repo = SqlTaskRepository::new(pool);
        let mut task = fixtures::sample_system_task(
            &baseline,
            "task-1",
            "trip-1",
            "pre_travel_checklist:trip-1",
            now,
        );
        repo.try_create_system_task(task.clone()).await.expect("first insert");

        task.status = TaskStatus::Completed;
        repo.save(task.clone()).await.expect("complete");

        let mut recreated = task.clone();
        recreated.id = TaskId("task-2".to_string());
        recreated.status = TaskStatus::Open;
        let outcome = repo.try_create_system_task(recreated).await.expect("recreate");
        assert!(outcome.created);
    }

    #[tokio::test]
    async fn mark_overdue_relabels_only_past_due_open_tasks() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let repo = SqlTaskRepository::new(pool);
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        let mut past = fixtures::sample_task(&baseline, "task-past", now);
        past.due_at = now - Duration::days(1);
        repo.save(past).await.expect("save past");

        let mut future = fixtures::sample_task(&baseline, "task-future", now);
        future.due_at = now + Duration::days(1);
        repo.save(future).await.expect("save future");

        let updated = repo.mark_overdue(now).await.expect("mark overdue");
        assert_eq!(updated, 1);

        let past = repo.find_by_id(&TaskId("task-past".to_string())).await.expect("find").unwrap();
        assert_eq!(past.status, TaskStatus::Overdue);
        let future =
            repo.find_by_id(&TaskId("task-future".to_string())).await.expect("find").unwrap();
        assert_eq!(future.status, TaskStatus::Open);
    }
}
