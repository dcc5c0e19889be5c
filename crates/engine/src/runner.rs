//! Aggregate scan entry point.
//!
//! Runs every rule with its configured window, isolating failures per rule:
//! one rule erroring never prevents the rest from running. The explicit
//! overdue-task reconciliation also lives here so read paths stay free of
//! writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tripflow_core::config::AutomationConfig;
use tripflow_db::repositories::{history, RepositoryError, SqlTaskRepository, TaskRepository};
use tripflow_db::DbPool;

use crate::scanners::{self, ScanOutcome};

const AUTOMATION_ACTOR: &str = "automation";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown automation rule `{0}`")]
    UnknownRule(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub outcome: Option<ScanOutcome>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AutomationSummary {
    pub ran_at: DateTime<Utc>,
    pub overdue_tasks_marked: u64,
    pub checked: u64,
    pub notifications_created: u64,
    pub tasks_created: u64,
    pub reports: Vec<RuleReport>,
}

#[derive(Clone)]
pub struct AutomationEngine {
    pool: DbPool,
    config: AutomationConfig,
}

impl AutomationEngine {
    pub fn new(pool: DbPool, config: AutomationConfig) -> Self {
        Self { pool, config }
    }

    fn default_threshold(&self, rule: &str) -> Option<i64> {
        match rule {
            scanners::QUOTE_FOLLOWUP => Some(self.config.quote_followup_days),
            scanners::TASK_REMINDER => Some(self.config.task_reminder_days),
            scanners::FEEDBACK_REMINDER => Some(self.config.feedback_days),
            scanners::COMMISSION_FOLLOWUP => Some(self.config.commission_days),
            scanners::PAYMENT_DEADLINE => Some(self.config.payment_deadline_hours),
            scanners::TRAVEL_READINESS => Some(self.config.travel_readiness_hours),
            scanners::DEADLINE_TASKS => Some(self.config.deadline_task_lead_days),
            _ => None,
        }
    }

    /// Run one rule. `threshold` overrides the configured window (days or
    /// hours, depending on the rule).
    pub async fn run_rule(
        &self,
        rule: &str,
        threshold: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, EngineError> {
        let window = match threshold.or_else(|| self.default_threshold(rule)) {
            Some(window) => window,
            None => return Err(EngineError::UnknownRule(rule.to_string())),
        };

        let outcome = match rule {
            scanners::QUOTE_FOLLOWUP => scanners::quote_followup::run(&self.pool, now, window).await,
            scanners::TASK_REMINDER => scanners::task_reminder::run(&self.pool, now, window).await,
            scanners::FEEDBACK_REMINDER => {
                scanners::feedback_reminder::run(&self.pool, now, window).await
            }
            scanners::COMMISSION_FOLLOWUP => {
                scanners::commission_followup::run(&self.pool, now, window).await
            }
            scanners::PAYMENT_DEADLINE => {
                scanners::payment_deadline::run(&self.pool, now, window).await
            }
            scanners::TRAVEL_READINESS => {
                scanners::travel_readiness::run(&self.pool, now, window).await
            }
            scanners::DEADLINE_TASKS => {
                scanners::deadline_tasks::run(&self.pool, now, window).await
            }
            _ => return Err(EngineError::UnknownRule(rule.to_string())),
        }?;

        info!(
            event_name = "automation.rule_completed",
            rule,
            checked = outcome.checked,
            notifications_created = outcome.notifications_created,
            tasks_created = outcome.tasks_created,
            "rule scan completed"
        );

        Ok(outcome)
    }

    /// Run the overdue reconciliation and every rule, merging the results.
    pub async fn run_all(&self, now: DateTime<Utc>) -> AutomationSummary {
        let tasks = SqlTaskRepository::new(self.pool.clone());
        let overdue_tasks_marked = match tasks.mark_overdue(now).await {
            Ok(count) => count,
            Err(err) => {
                error!(
                    event_name = "automation.overdue_reconciliation_failed",
                    error = %err,
                    "overdue task reconciliation failed"
                );
                0
            }
        };

        let mut reports = Vec::with_capacity(scanners::ALL_RULES.len());
        let mut checked = 0;
        let mut notifications_created = 0;
        let mut tasks_created = 0;

        for rule in scanners::ALL_RULES {
            match self.run_rule(rule, None, now).await {
                Ok(outcome) => {
                    checked += outcome.checked;
                    notifications_created += outcome.notifications_created;
                    tasks_created += outcome.tasks_created;
                    reports.push(RuleReport {
                        rule: rule.to_string(),
                        outcome: Some(outcome),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(
                        event_name = "automation.rule_failed",
                        rule,
                        error = %err,
                        "rule scan failed, continuing with remaining rules"
                    );
                    reports.push(RuleReport {
                        rule: rule.to_string(),
                        outcome: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let summary = AutomationSummary {
            ran_at: now,
            overdue_tasks_marked,
            checked,
            notifications_created,
            tasks_created,
            reports,
        };

        let audit = AuditEvent::new(
            None,
            format!("scan-{}", now.timestamp()),
            "automation.run_all",
            AuditCategory::Scanner,
            AUTOMATION_ACTOR,
            AuditOutcome::Success,
        )
        .with_metadata("checked", summary.checked.to_string())
        .with_metadata("notifications_created", summary.notifications_created.to_string())
        .with_metadata("tasks_created", summary.tasks_created.to_string())
        .with_metadata("overdue_tasks_marked", summary.overdue_tasks_marked.to_string());
        if let Err(err) = history::insert_audit_event(&self.pool, &audit).await {
            error!(
                event_name = "automation.audit_append_failed",
                error = %err,
                "failed to append scan summary to the audit log"
            );
        }

        summary
    }
}
