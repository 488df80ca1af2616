use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalFlowId(pub String);

impl fmt::Display for ApprovalFlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptionId(pub String);

impl fmt::Display for JobDescriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowHistoryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FlowStatus {
    Draft,
    PendingLevel(u8),
    Approved,
    Rejected,
    Returned,
}

impl FlowStatus {
    pub fn as_string(&self) -> String {
        match self {
            Self::Draft => "draft".to_string(),
            Self::PendingLevel(level) => format!("pending_level_{level}"),
            Self::Approved => "approved".to_string(),
            Self::Rejected => "rejected".to_string(),
            Self::Returned => "returned".to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "draft" => Some(Self::Draft),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            other => other
                .strip_prefix("pending_level_")
                .and_then(|level| level.parse::<u8>().ok())
                .filter(|level| *level > 0)
                .map(Self::PendingLevel),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn is_submittable(&self) -> bool {
        matches!(self, Self::Draft | Self::Returned)
    }
}

impl From<FlowStatus> for String {
    fn from(value: FlowStatus) -> Self {
        value.as_string()
    }
}

impl TryFrom<String> for FlowStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown flow status `{value}`"))
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub level: u8,
    pub level_key: String,
    pub approver_id: EmployeeId,
    pub status: RecordStatus,
    pub comments: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Job description sign-off state. `approvals` always holds the records of the
/// current `revision`; earlier revisions live only in storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    pub id: ApprovalFlowId,
    pub job_description_id: JobDescriptionId,
    pub requested_by: EmployeeId,
    pub revision: u32,
    pub current_level: u8,
    pub status: FlowStatus,
    pub approvals: Vec<ApprovalRecord>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalFlow {
    pub fn record(&self, level: u8) -> Option<&ApprovalRecord> {
        self.approvals.iter().find(|record| record.level == level)
    }

    pub fn record_mut(&mut self, level: u8) -> Option<&mut ApprovalRecord> {
        self.approvals.iter_mut().find(|record| record.level == level)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Created,
    Submitted,
    Approved,
    Rejected,
    Returned,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: WorkflowHistoryId,
    pub flow_id: ApprovalFlowId,
    pub job_description_id: JobDescriptionId,
    pub revision: u32,
    pub action: WorkflowAction,
    pub level: u8,
    pub actor_id: EmployeeId,
    pub comments: Option<String>,
    pub previous_status: FlowStatus,
    pub new_status: FlowStatus,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{FlowStatus, RecordStatus, WorkflowAction};

    #[test]
    fn flow_status_round_trips_from_storage_encoding() {
        let cases = [
            FlowStatus::Draft,
            FlowStatus::PendingLevel(1),
            FlowStatus::PendingLevel(5),
            FlowStatus::Approved,
            FlowStatus::Rejected,
            FlowStatus::Returned,
        ];

        for status in cases {
            assert_eq!(FlowStatus::parse(&status.as_string()), Some(status));
        }
    }

    #[test]
    fn pending_level_zero_and_garbage_are_not_statuses() {
        assert_eq!(FlowStatus::parse("pending_level_0"), None);
        assert_eq!(FlowStatus::parse("pending_level_x"), None);
        assert_eq!(FlowStatus::parse("pending_hr"), None);
    }

    #[test]
    fn only_approved_and_rejected_are_terminal() {
        assert!(FlowStatus::Approved.is_terminal());
        assert!(FlowStatus::Rejected.is_terminal());
        assert!(!FlowStatus::Returned.is_terminal());
        assert!(FlowStatus::Returned.is_submittable());
        assert!(!FlowStatus::PendingLevel(2).is_submittable());
    }

    #[test]
    fn record_and_action_encodings_are_stable() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Approved,
            RecordStatus::Rejected,
            RecordStatus::Returned,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WorkflowAction::parse("returned"), Some(WorkflowAction::Returned));
        assert_eq!(WorkflowAction::parse("escalated"), None);
    }
}
