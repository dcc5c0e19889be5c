pub mod approvals;
pub mod executor;
pub mod notify;
pub mod runner;
pub mod scanners;

pub use approvals::{ApprovalService, ApprovalServiceError};
pub use executor::{ActionExecutor, ExecutionOutcome};
pub use notify::{EmissionCounts, Notifier, NotificationTemplate};
pub use runner::{AutomationEngine, AutomationSummary, EngineError, RuleReport};
pub use scanners::ScanOutcome;
