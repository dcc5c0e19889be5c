//! Approved-action execution.
//!
//! Dispatches on the typed action union, re-reading current entity state so
//! stage guards see drift that happened between request and approval. The
//! entity mutation, one change-history row per applied field, the audit row
//! and the approval status update all commit in a single transaction; a
//! failed audit write rolls back everything.
//!
//! Business-rule failures (drift, missing entity) are structured outcomes,
//! not errors: the request is persisted as `execution_failed` and the
//! outcome travels back to the caller inline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use thiserror::Error;

use tripflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, FieldChange};
use tripflow_core::domain::approval::{ApprovalAction, ApprovalRequest, ApprovalStatus};
use tripflow_core::domain::commission::CommissionStatus;
use tripflow_core::domain::trip::TripStage;
use tripflow_core::domain::user::UserId;
use tripflow_db::repositories::{history, RepositoryError};
use tripflow_db::DbPool;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("approval request was resolved concurrently")]
    ResolvedConcurrently,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Applied {
        action_type: String,
        entity_type: String,
        entity_id: String,
        fields_changed: Vec<String>,
    },
    /// The entity's stage moved between request and approval; nothing was
    /// mutated.
    StageDrift {
        expected: TripStage,
        current: TripStage,
    },
    EntityMissing {
        entity_type: String,
        entity_id: String,
    },
}

impl ExecutionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    fn failure_note(&self) -> Option<String> {
        if self.is_applied() {
            None
        } else {
            serde_json::to_string(self).ok()
        }
    }
}

#[derive(Clone)]
pub struct ActionExecutor {
    pool: DbPool,
}

impl ActionExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Execute the action and persist the resolution atomically. `approved`
    /// is only ever stored when the mutation succeeded; business-rule
    /// failures store the terminal `execution_failed` status with the
    /// structured outcome as the response note.
    pub async fn execute_and_resolve(
        &self,
        request: &ApprovalRequest,
        approver: &UserId,
        response_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let mut tx = self.pool.begin().await?;

        let outcome = self.apply_action(&mut tx, request, approver, now).await?;

        let (status, note) = if outcome.is_applied() {
            (ApprovalStatus::Approved, response_note)
        } else {
            (ApprovalStatus::ExecutionFailed, response_note.or_else(|| outcome.failure_note()))
        };

        let updated = sqlx::query(
            "UPDATE approval_requests
             SET status = ?, resolved_by = ?, response_note = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(&approver.0)
        .bind(&note)
        .bind(now.to_rfc3339())
        .bind(&request.id.0)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ExecutorError::ResolvedConcurrently);
        }

        let audit = AuditEvent::new(
            Some(request.agency_id.clone()),
            request.id.0.clone(),
            format!("approval.{}", request.action.action_type()),
            AuditCategory::Approval,
            approver.0.clone(),
            if outcome.is_applied() { AuditOutcome::Success } else { AuditOutcome::Failed },
        )
        .with_entity(request.entity_type.clone(), request.entity_id.clone())
        .with_metadata("status", status.as_str());
        history::insert_audit_event(&mut *tx, &audit).await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_action(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ApprovalRequest,
        approver: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        match &request.action {
            ApprovalAction::ConfirmBooking => {
                self.update_single_field(
                    tx,
                    request,
                    approver,
                    now,
                    "bookings",
                    "status",
                    "booked",
                )
                .await
            }
            ApprovalAction::MarkPaymentReceived => {
                self.update_single_field(
                    tx,
                    request,
                    approver,
                    now,
                    "bookings",
                    "payment_status",
                    "paid_in_full",
                )
                .await
            }
            ApprovalAction::ChangeCommissionStatus { target_status } => {
                self.change_commission_status(tx, request, approver, now, *target_status).await
            }
            ApprovalAction::StageChange { from_stage, to_stage }
            | ApprovalAction::ReopenTrip { from_stage, to_stage } => {
                self.change_stage(tx, request, approver, now, *from_stage, *to_stage).await
            }
            ApprovalAction::ModifyLockedTrip { proposed_changes } => {
                self.modify_locked_trip(tx, request, approver, now, proposed_changes).await
            }
        }
    }

    async fn update_single_field(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ApprovalRequest,
        approver: &UserId,
        now: DateTime<Utc>,
        table: &str,
        field: &str,
        new_value: &str,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let current: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT {field} FROM {table} WHERE id = ? AND agency_id = ?"
        ))
        .bind(&request.entity_id)
        .bind(&request.agency_id.0)
        .fetch_optional(&mut **tx)
        .await?;
        let Some((old_value,)) = current else {
            return Ok(ExecutionOutcome::EntityMissing {
                entity_type: request.entity_type.clone(),
                entity_id: request.entity_id.clone(),
            });
        };

        sqlx::query(&format!("UPDATE {table} SET {field} = ?, updated_at = ? WHERE id = ?"))
            .bind(new_value)
            .bind(now.to_rfc3339())
            .bind(&request.entity_id)
            .execute(&mut **tx)
            .await?;

        let change = FieldChange::new(
            request.agency_id.clone(),
            request.entity_type.clone(),
            request.entity_id.clone(),
            field,
            Some(old_value),
            new_value,
            approver.0.clone(),
            now,
        );
        history::insert_field_change(&mut **tx, &change).await?;

        Ok(ExecutionOutcome::Applied {
            action_type: request.action.action_type().to_string(),
            entity_type: request.entity_type.clone(),
            entity_id: request.entity_id.clone(),
            fields_changed: vec![field.to_string()],
        })
    }

    async fn change_commission_status(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ApprovalRequest,
        approver: &UserId,
        now: DateTime<Utc>,
        target_status: CommissionStatus,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        self.update_single_field(
            tx,
            request,
            approver,
            now,
            "commissions",
            "status",
            target_status.as_str(),
        )
        .await
    }

    async fn change_stage(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ApprovalRequest,
        approver: &UserId,
        now: DateTime<Utc>,
        from_stage: TripStage,
        to_stage: TripStage,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let current: Option<(String,)> =
            sqlx::query_as("SELECT stage FROM trips WHERE id = ? AND agency_id = ?")
                .bind(&request.entity_id)
                .bind(&request.agency_id.0)
                .fetch_optional(&mut **tx)
                .await?;
        let Some((stage_str,)) = current else {
            return Ok(ExecutionOutcome::EntityMissing {
                entity_type: request.entity_type.clone(),
                entity_id: request.entity_id.clone(),
            });
        };
        let current_stage = TripStage::parse(&stage_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown trip stage `{stage_str}`"))
        })?;

        // The optimistic-concurrency guard: the stage recorded at request
        // time must still hold at approval time.
        if current_stage != from_stage {
            return Ok(ExecutionOutcome::StageDrift {
                expected: from_stage,
                current: current_stage,
            });
        }

        sqlx::query("UPDATE trips SET stage = ?, updated_at = ? WHERE id = ?")
            .bind(to_stage.as_str())
            .bind(now.to_rfc3339())
            .bind(&request.entity_id)
            .execute(&mut **tx)
            .await?;

        let change = FieldChange::new(
            request.agency_id.clone(),
            request.entity_type.clone(),
            request.entity_id.clone(),
            "stage",
            Some(from_stage.as_str().to_string()),
            to_stage.as_str(),
            approver.0.clone(),
            now,
        );
        history::insert_field_change(&mut **tx, &change).await?;

        Ok(ExecutionOutcome::Applied {
            action_type: request.action.action_type().to_string(),
            entity_type: request.entity_type.clone(),
            entity_id: request.entity_id.clone(),
            fields_changed: vec!["stage".to_string()],
        })
    }

    async fn modify_locked_trip(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ApprovalRequest,
        approver: &UserId,
        now: DateTime<Utc>,
        proposed_changes: &[tripflow_core::domain::approval::ProposedFieldChange],
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let current = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>)>(
            "SELECT destination, travel_start, travel_end, final_payment_due
             FROM trips WHERE id = ? AND agency_id = ?",
        )
        .bind(&request.entity_id)
        .bind(&request.agency_id.0)
        .fetch_optional(&mut **tx)
        .await?;
        let Some((destination, travel_start, travel_end, final_payment_due)) = current else {
            return Ok(ExecutionOutcome::EntityMissing {
                entity_type: request.entity_type.clone(),
                entity_id: request.entity_id.clone(),
            });
        };

        let mut fields_changed = Vec::with_capacity(proposed_changes.len());
        for proposed in proposed_changes {
            // Field names were checked against the modifiable allowlist when
            // the request was created.
            let old_value = match proposed.field.as_str() {
                "destination" => Some(destination.clone()),
                "travel_start" => travel_start.clone(),
                "travel_end" => travel_end.clone(),
                "final_payment_due" => final_payment_due.clone(),
                other => {
                    return Err(RepositoryError::Decode(format!(
                        "unexpected trip field `{other}` in approved change set"
                    ))
                    .into())
                }
            };

            sqlx::query(&format!(
                "UPDATE trips SET {} = ?, updated_at = ? WHERE id = ?",
                proposed.field
            ))
            .bind(&proposed.new)
            .bind(now.to_rfc3339())
            .bind(&request.entity_id)
            .execute(&mut **tx)
            .await?;

            let change = FieldChange::new(
                request.agency_id.clone(),
                request.entity_type.clone(),
                request.entity_id.clone(),
                proposed.field.clone(),
                old_value,
                proposed.new.clone(),
                approver.0.clone(),
                now,
            );
            history::insert_field_change(&mut **tx, &change).await?;
            fields_changed.push(proposed.field.clone());
        }

        Ok(ExecutionOutcome::Applied {
            action_type: request.action.action_type().to_string(),
            entity_type: request.entity_type.clone(),
            entity_id: request.entity_id.clone(),
            fields_changed,
        })
    }
}
