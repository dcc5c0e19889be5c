//! Upcoming due dates on open normal-priority tasks.

use chrono::{DateTime, Utc};

use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::events::EventKey;
use tripflow_core::format::deadline_phrase;
use tripflow_db::repositories::{RepositoryError, SqlTaskRepository, TaskRepository};
use tripflow_db::DbPool;

use super::{ScanOutcome, TASK_REMINDER};
use crate::notify::Notifier;

pub async fn run(
    pool: &DbPool,
    now: DateTime<Utc>,
    days: i64,
) -> Result<ScanOutcome, RepositoryError> {
    let tasks = SqlTaskRepository::new(pool.clone());
    let notifier = Notifier::new(pool.clone());

    let due = tasks.list_open_due_within(now, days).await?;
    let mut created = 0;

    for task in &due {
        let hours_until = (task.due_at - now).num_hours();
        let outcome = notifier
            .notify(
                NewNotification {
                    agency_id: task.agency_id.clone(),
                    recipient_id: task.assignee_id.clone(),
                    kind: NotificationKind::Normal,
                    title: "Task due soon".to_string(),
                    message: format!("Task \"{}\" is {}", task.title, deadline_phrase(hours_until)),
                    entity_type: Some("task".to_string()),
                    entity_id: Some(task.id.0.clone()),
                    event_key: Some(
                        EventKey::daily(TASK_REMINDER, "task", &task.id.0, now).into_string(),
                    ),
                },
                now,
            )
            .await?;
        if outcome.created {
            created += 1;
        }
    }

    Ok(ScanOutcome::notifications(TASK_REMINDER, due.len() as u64, created))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use tripflow_core::domain::task::TaskPriority;
    use tripflow_db::fixtures;
    use tripflow_db::repositories::{
        NotificationRepository, SqlNotificationRepository, SqlTaskRepository, TaskRepository,
    };

    #[tokio::test]
    async fn reminds_assignee_about_upcoming_normal_tasks_only() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let tasks = SqlTaskRepository::new(pool.clone());

        let mut upcoming = fixtures::sample_task(&baseline, "task-upcoming", now);
        upcoming.title = "Send itinerary".to_string();
        upcoming.due_at = now + Duration::days(3);
        tasks.save(upcoming).await.expect("save upcoming");

        let mut urgent = fixtures::sample_task(&baseline, "task-urgent", now);
        urgent.priority = TaskPriority::Urgent;
        urgent.due_at = now + Duration::days(3);
        tasks.save(urgent).await.expect("save urgent");

        let outcome = super::run(&pool, now, 7).await.expect("run");
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.notifications_created, 1);

        let inbox = SqlNotificationRepository::new(pool)
            .list_for_recipient(&baseline.planner_id, 10)
            .await
            .expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].message.contains("Send itinerary"));
        assert!(inbox[0].message.contains("due in 3 days"));
    }

    #[tokio::test]
    async fn rerun_within_the_same_day_is_idempotent() {
        let (pool, baseline) = fixtures::workflow_baseline().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let tasks = SqlTaskRepository::new(pool.clone());

        let mut upcoming = fixtures::sample_task(&baseline, "task-upcoming", now);
        upcoming.due_at = now + Duration::days(2);
        tasks.save(upcoming).await.expect("save");

        super::run(&pool, now, 7).await.expect("first");
        let second = super::run(&pool, now, 7).await.expect("second");
        assert_eq!(second.notifications_created, 0);
    }
}
