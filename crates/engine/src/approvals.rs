//! Approval request lifecycle.
//!
//! `pending --approve--> approved` / `pending --deny--> denied`, both
//! terminal. Approval executes the action inline (see `executor`); per the
//! execute-first resolution, a business-rule failure lands the request in
//! the terminal `execution_failed` state instead of `approved`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tripflow_core::domain::approval::{
    ActionValidationError, ApprovalAction, ApprovalRequest, ApprovalRequestId, ApprovalStatus,
};
use tripflow_core::domain::notification::{NewNotification, NotificationKind};
use tripflow_core::domain::user::{UserId, UserRole};
use tripflow_core::domain::AgencyId;
use tripflow_core::events::EventKey;
use tripflow_db::repositories::{
    ApprovalRepository, RepositoryError, SqlApprovalRepository, SqlAuditLogRepository,
    AuditLogRepository,
};
use tripflow_db::DbPool;

use crate::executor::{ActionExecutor, ExecutionOutcome, ExecutorError};
use crate::notify::Notifier;

#[derive(Debug, Error)]
pub enum ApprovalServiceError {
    #[error("a pending approval request already exists for this entity and action")]
    DuplicatePending,
    #[error(transparent)]
    Validation(#[from] ActionValidationError),
    #[error("approval request not found")]
    NotFound,
    #[error("approval request is already resolved")]
    AlreadyResolved,
    #[error("only admins may resolve approval requests")]
    NotAuthorized,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ExecutorError> for ApprovalServiceError {
    fn from(value: ExecutorError) -> Self {
        match value {
            ExecutorError::ResolvedConcurrently => Self::AlreadyResolved,
            ExecutorError::Repository(error) => Self::Repository(error),
            ExecutorError::Database(error) => Self::Repository(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct ApprovalService {
    pool: DbPool,
}

impl ApprovalService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// File a new request. The action payload is validated here, at creation
    /// time; a pending duplicate for the same (entity, action) is a conflict.
    pub async fn create(
        &self,
        agency_id: &AgencyId,
        requested_by: &UserId,
        action: ApprovalAction,
        entity_type: &str,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, ApprovalServiceError> {
        action.validate(entity_type)?;

        let repo = SqlApprovalRepository::new(self.pool.clone());
        if repo.has_pending(agency_id, entity_type, entity_id, action.action_type()).await? {
            return Err(ApprovalServiceError::DuplicatePending);
        }

        let request = ApprovalRequest {
            id: ApprovalRequestId(Uuid::new_v4().to_string()),
            agency_id: agency_id.clone(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            status: ApprovalStatus::Pending,
            requested_by: requested_by.clone(),
            resolved_by: None,
            response_note: None,
            created_at: now,
            resolved_at: None,
        };

        match repo.insert(request.clone()).await {
            Ok(()) => {}
            // A concurrent creator won; the partial unique index on pending
            // rows is the net beneath the pre-check above.
            Err(error) if error.is_unique_violation() => {
                return Err(ApprovalServiceError::DuplicatePending)
            }
            Err(error) => return Err(error.into()),
        }

        let audit = SqlAuditLogRepository::new(self.pool.clone());
        audit
            .append(
                AuditEvent::new(
                    Some(agency_id.clone()),
                    request.id.0.clone(),
                    "approval.requested",
                    AuditCategory::Approval,
                    requested_by.0.clone(),
                    AuditOutcome::Success,
                )
                .with_entity(entity_type, entity_id)
                .with_metadata("action_type", request.action.action_type()),
            )
            .await?;

        Ok(request)
    }

    /// Admins see every request for the agency; everyone else only their
    /// own.
    pub async fn list(
        &self,
        agency_id: &AgencyId,
        actor: &UserId,
        role: UserRole,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalRequest>, ApprovalServiceError> {
        let repo = SqlApprovalRepository::new(self.pool.clone());
        let requester = if role.is_admin() { None } else { Some(actor) };
        Ok(repo.list(agency_id, requester, status).await?)
    }

    /// Approve and execute. The execution outcome (including structured
    /// drift failures) is returned inline alongside the resolved request.
    pub async fn approve(
        &self,
        agency_id: &AgencyId,
        id: &ApprovalRequestId,
        approver: &UserId,
        role: UserRole,
        response_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(ApprovalRequest, ExecutionOutcome), ApprovalServiceError> {
        if !role.is_admin() {
            return Err(ApprovalServiceError::NotAuthorized);
        }

        let repo = SqlApprovalRepository::new(self.pool.clone());
        let request = self.load_for_agency(&repo, agency_id, id).await?;
        if request.status.is_resolved() {
            return Err(ApprovalServiceError::AlreadyResolved);
        }

        let executor = ActionExecutor::new(self.pool.clone());
        let outcome = executor.execute_and_resolve(&request, approver, response_note, now).await?;

        let resolved = self.load_for_agency(&repo, agency_id, id).await?;
        self.notify_requester(&resolved, now).await?;

        Ok((resolved, outcome))
    }

    pub async fn deny(
        &self,
        agency_id: &AgencyId,
        id: &ApprovalRequestId,
        approver: &UserId,
        role: UserRole,
        response_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, ApprovalServiceError> {
        if !role.is_admin() {
            return Err(ApprovalServiceError::NotAuthorized);
        }

        let repo = SqlApprovalRepository::new(self.pool.clone());
        let request = self.load_for_agency(&repo, agency_id, id).await?;

        let transitioned =
            repo.resolve(id, ApprovalStatus::Denied, approver, response_note, now).await?;
        if !transitioned {
            return Err(ApprovalServiceError::AlreadyResolved);
        }

        let audit = SqlAuditLogRepository::new(self.pool.clone());
        audit
            .append(
                AuditEvent::new(
                    Some(agency_id.clone()),
                    request.id.0.clone(),
                    "approval.denied",
                    AuditCategory::Approval,
                    approver.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_entity(request.entity_type.clone(), request.entity_id.clone())
                .with_metadata("action_type", request.action.action_type()),
            )
            .await?;

        let resolved = self.load_for_agency(&repo, agency_id, id).await?;
        self.notify_requester(&resolved, now).await?;
        Ok(resolved)
    }

    async fn load_for_agency(
        &self,
        repo: &SqlApprovalRepository,
        agency_id: &AgencyId,
        id: &ApprovalRequestId,
    ) -> Result<ApprovalRequest, ApprovalServiceError> {
        let request = repo.find_by_id(id).await?.ok_or(ApprovalServiceError::NotFound)?;
        if request.agency_id != *agency_id {
            return Err(ApprovalServiceError::NotFound);
        }
        Ok(request)
    }

    /// Tell the requester how the request was resolved. Keyed on the request
    /// id so a retried resolution never double-notifies.
    async fn notify_requester(
        &self,
        request: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalServiceError> {
        let word = match request.status {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::ExecutionFailed => "approved but failed to execute",
            ApprovalStatus::Pending => return Ok(()),
        };

        let notifier = Notifier::new(self.pool.clone());
        notifier
            .notify(
                NewNotification {
                    agency_id: request.agency_id.clone(),
                    recipient_id: request.requested_by.clone(),
                    kind: NotificationKind::Normal,
                    title: "Approval request resolved".to_string(),
                    message: format!(
                        "Your {} request for {} {} was {}",
                        request.action.action_type(),
                        request.entity_type,
                        request.entity_id,
                        word
                    ),
                    entity_type: Some(request.entity_type.clone()),
                    entity_id: Some(request.entity_id.clone()),
                    event_key: Some(
                        EventKey::build("approval_resolved", "approval_request", &request.id.0, &[])
                            .into_string(),
                    ),
                },
                now,
            )
            .await?;
        Ok(())
    }
}
