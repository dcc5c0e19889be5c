//! Time-window rule scanners.
//!
//! Each scanner is a bounded query over entities crossing a threshold plus a
//! deduplicated emission per qualifying entity. All scanners take an
//! explicit `now` so re-runs are deterministic under test; day-bucketed
//! event keys make a same-day re-run a no-op.

use serde::Serialize;

pub mod commission_followup;
pub mod deadline_tasks;
pub mod feedback_reminder;
pub mod payment_deadline;
pub mod quote_followup;
pub mod task_reminder;
pub mod travel_readiness;

pub const QUOTE_FOLLOWUP: &str = "quote_followup";
pub const TASK_REMINDER: &str = "task_reminder";
pub const FEEDBACK_REMINDER: &str = "feedback_reminder";
pub const COMMISSION_FOLLOWUP: &str = "commission_followup";
pub const PAYMENT_DEADLINE: &str = "payment_deadline";
pub const TRAVEL_READINESS: &str = "travel_readiness";
pub const DEADLINE_TASKS: &str = "deadline_tasks";

pub const ALL_RULES: &[&str] = &[
    QUOTE_FOLLOWUP,
    TASK_REMINDER,
    FEEDBACK_REMINDER,
    COMMISSION_FOLLOWUP,
    PAYMENT_DEADLINE,
    TRAVEL_READINESS,
    DEADLINE_TASKS,
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub rule: &'static str,
    /// Entities that crossed the threshold and were examined.
    pub checked: u64,
    pub notifications_created: u64,
    pub tasks_created: u64,
}

impl ScanOutcome {
    pub fn notifications(rule: &'static str, checked: u64, created: u64) -> Self {
        Self { rule, checked, notifications_created: created, tasks_created: 0 }
    }

    pub fn tasks(rule: &'static str, checked: u64, created: u64) -> Self {
        Self { rule, checked, notifications_created: 0, tasks_created: created }
    }
}
