use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::commission::CommissionStatus;
use crate::domain::trip::TripStage;
use crate::domain::user::UserId;
use crate::domain::AgencyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    ExecutionFailed,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::ExecutionFailed => "execution_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            "execution_failed" => Some(Self::ExecutionFailed),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One proposed field edit on a locked trip. `old` is the value captured at
/// request time; `new` is what the requester wants applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedFieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

/// Fields a `modify_locked_trip` request may touch.
pub const MODIFIABLE_TRIP_FIELDS: &[&str] =
    &["destination", "travel_start", "travel_end", "final_payment_due"];

/// Sensitive action deferred behind an approval, one typed payload per
/// variant. Payloads are validated when the request is created, not when it
/// is executed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ApprovalAction {
    ConfirmBooking,
    MarkPaymentReceived,
    ChangeCommissionStatus {
        target_status: CommissionStatus,
    },
    StageChange {
        from_stage: TripStage,
        to_stage: TripStage,
    },
    ReopenTrip {
        from_stage: TripStage,
        to_stage: TripStage,
    },
    ModifyLockedTrip {
        proposed_changes: Vec<ProposedFieldChange>,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionValidationError {
    #[error("action `{action_type}` targets `{expected}` entities, got `{got}`")]
    EntityTypeMismatch { action_type: &'static str, expected: &'static str, got: String },
    #[error("stage change must move between distinct stages (got `{stage}` twice)")]
    StageUnchanged { stage: TripStage },
    #[error("reopen requires a terminal source stage, `{from_stage}` is not terminal")]
    ReopenFromNonTerminal { from_stage: TripStage },
    #[error("reopen target stage `{to_stage}` is itself terminal")]
    ReopenIntoTerminal { to_stage: TripStage },
    #[error("modify_locked_trip carries no proposed changes")]
    EmptyChangeSet,
    #[error("field `{field}` is not modifiable on a locked trip")]
    UnknownField { field: String },
    #[error("duplicate change for field `{field}`")]
    DuplicateField { field: String },
}

impl ApprovalAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::ConfirmBooking => "confirm_booking",
            Self::MarkPaymentReceived => "mark_payment_received",
            Self::ChangeCommissionStatus { .. } => "change_commission_status",
            Self::StageChange { .. } => "stage_change",
            Self::ReopenTrip { .. } => "reopen_trip",
            Self::ModifyLockedTrip { .. } => "modify_locked_trip",
        }
    }

    /// Entity type the action must be filed against.
    pub fn expected_entity_type(&self) -> &'static str {
        match self {
            Self::ConfirmBooking | Self::MarkPaymentReceived => "booking",
            Self::ChangeCommissionStatus { .. } => "commission",
            Self::StageChange { .. } | Self::ReopenTrip { .. } | Self::ModifyLockedTrip { .. } => {
                "trip"
            }
        }
    }

    pub fn validate(&self, entity_type: &str) -> Result<(), ActionValidationError> {
        if entity_type != self.expected_entity_type() {
            return Err(ActionValidationError::EntityTypeMismatch {
                action_type: self.action_type(),
                expected: self.expected_entity_type(),
                got: entity_type.to_string(),
            });
        }

        match self {
            Self::ConfirmBooking
            | Self::MarkPaymentReceived
            | Self::ChangeCommissionStatus { .. } => Ok(()),
            Self::StageChange { from_stage, to_stage } => {
                if from_stage == to_stage {
                    return Err(ActionValidationError::StageUnchanged { stage: *from_stage });
                }
                Ok(())
            }
            Self::ReopenTrip { from_stage, to_stage } => {
                if !from_stage.is_terminal() {
                    return Err(ActionValidationError::ReopenFromNonTerminal {
                        from_stage: *from_stage,
                    });
                }
                if to_stage.is_terminal() {
                    return Err(ActionValidationError::ReopenIntoTerminal {
                        to_stage: *to_stage,
                    });
                }
                Ok(())
            }
            Self::ModifyLockedTrip { proposed_changes } => {
                if proposed_changes.is_empty() {
                    return Err(ActionValidationError::EmptyChangeSet);
                }
                let mut seen = std::collections::HashSet::new();
                for change in proposed_changes {
                    if !MODIFIABLE_TRIP_FIELDS.contains(&change.field.as_str()) {
                        return Err(ActionValidationError::UnknownField {
                            field: change.field.clone(),
                        });
                    }
                    if !seen.insert(change.field.as_str()) {
                        return Err(ActionValidationError::DuplicateField {
                            field: change.field.clone(),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub agency_id: AgencyId,
    pub action: ApprovalAction,
    pub entity_type: String,
    pub entity_id: String,
    pub status: ApprovalStatus,
    pub requested_by: UserId,
    pub resolved_by: Option<UserId>,
    pub response_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::{ActionValidationError, ApprovalAction, ApprovalStatus, ProposedFieldChange};
    use crate::domain::commission::CommissionStatus;
    use crate::domain::trip::TripStage;

    #[test]
    fn approval_status_round_trips_from_storage_encoding() {
        let cases = [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Denied,
            ApprovalStatus::ExecutionFailed,
        ];

        for status in cases {
            assert_eq!(ApprovalStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn action_payloads_round_trip_through_tagged_json() {
        let action = ApprovalAction::StageChange {
            from_stage: TripStage::Quoted,
            to_stage: TripStage::Booked,
        };

        let encoded = serde_json::to_string(&action).expect("encode");
        assert!(encoded.contains("\"action_type\":\"stage_change\""));
        assert!(encoded.contains("\"from_stage\":\"quoted\""));

        let decoded: ApprovalAction = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, action);
    }

    #[test]
    fn unknown_action_type_fails_to_decode() {
        let raw = r#"{"action_type":"delete_everything"}"#;
        assert!(serde_json::from_str::<ApprovalAction>(raw).is_err());
    }

    #[test]
    fn entity_type_must_match_the_action() {
        let action = ApprovalAction::ConfirmBooking;
        assert!(action.validate("booking").is_ok());
        assert_eq!(
            action.validate("trip"),
            Err(ActionValidationError::EntityTypeMismatch {
                action_type: "confirm_booking",
                expected: "booking",
                got: "trip".to_string(),
            })
        );
    }

    #[test]
    fn stage_change_rejects_identical_stages() {
        let action = ApprovalAction::StageChange {
            from_stage: TripStage::Booked,
            to_stage: TripStage::Booked,
        };
        assert_eq!(
            action.validate("trip"),
            Err(ActionValidationError::StageUnchanged { stage: TripStage::Booked })
        );
    }

    #[test]
    fn reopen_requires_terminal_source_and_open_target() {
        let bad_source = ApprovalAction::ReopenTrip {
            from_stage: TripStage::Booked,
            to_stage: TripStage::Quoted,
        };
        assert!(matches!(
            bad_source.validate("trip"),
            Err(ActionValidationError::ReopenFromNonTerminal { .. })
        ));

        let bad_target = ApprovalAction::ReopenTrip {
            from_stage: TripStage::Completed,
            to_stage: TripStage::Canceled,
        };
        assert!(matches!(
            bad_target.validate("trip"),
            Err(ActionValidationError::ReopenIntoTerminal { .. })
        ));

        let ok = ApprovalAction::ReopenTrip {
            from_stage: TripStage::Completed,
            to_stage: TripStage::Booked,
        };
        assert!(ok.validate("trip").is_ok());
    }

    #[test]
    fn modify_locked_trip_rejects_empty_unknown_and_duplicate_fields() {
        let empty = ApprovalAction::ModifyLockedTrip { proposed_changes: vec![] };
        assert_eq!(empty.validate("trip"), Err(ActionValidationError::EmptyChangeSet));

        let unknown = ApprovalAction::ModifyLockedTrip {
            proposed_changes: vec![ProposedFieldChange {
                field: "stage".to_string(),
                old: None,
                new: "booked".to_string(),
            }],
        };
        assert!(matches!(
            unknown.validate("trip"),
            Err(ActionValidationError::UnknownField { .. })
        ));

        let duplicated = ApprovalAction::ModifyLockedTrip {
            proposed_changes: vec![
                ProposedFieldChange {
                    field: "destination".to_string(),
                    old: Some("Lisbon".to_string()),
                    new: "Porto".to_string(),
                },
                ProposedFieldChange {
                    field: "destination".to_string(),
                    old: Some("Lisbon".to_string()),
                    new: "Faro".to_string(),
                },
            ],
        };
        assert!(matches!(
            duplicated.validate("trip"),
            Err(ActionValidationError::DuplicateField { .. })
        ));
    }

    #[test]
    fn commission_status_payload_decodes_target() {
        let raw = r#"{"action_type":"change_commission_status","target_status":"received"}"#;
        let decoded: ApprovalAction = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            decoded,
            ApprovalAction::ChangeCommissionStatus { target_status: CommissionStatus::Received }
        );
    }
}
