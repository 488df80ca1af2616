use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orgflow_core::domain::approval::{
    ApprovalFlow, ApprovalFlowId, ApprovalRecord, JobDescriptionId, WorkflowHistoryEntry,
};
use orgflow_core::domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove};
use orgflow_core::domain::nps::{
    AlertId, AlertStatus, DetractorAlert, ProcessId, ScheduledTrigger, Survey, SurveyId,
    SurveyResponse, TriggerId, TriggerStatus,
};
use orgflow_core::errors::ApplicationError;
use orgflow_core::workflow::ApprovalTransition;

pub mod approval;
pub mod audit;
pub mod employee;
pub mod memory;
pub mod nps;

pub use approval::SqlApprovalFlowRepository;
pub use audit::SqlAuditSink;
pub use employee::SqlEmployeeRepository;
pub use memory::{InMemoryApprovalFlowRepository, InMemoryEmployeeRepository, InMemoryNpsRepository};
pub use nps::SqlNpsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// An approval record tagged with the submission it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionedRecord {
    pub revision: u32,
    #[serde(flatten)]
    pub record: ApprovalRecord,
}

/// Natural key of a scheduled trigger and of the response that answers it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriggerTuple<'a> {
    pub survey_id: &'a SurveyId,
    pub employee_id: &'a EmployeeId,
    pub process_id: &'a ProcessId,
}

impl TriggerTuple<'_> {
    pub fn matches_trigger(&self, trigger: &ScheduledTrigger) -> bool {
        &trigger.survey_id == self.survey_id
            && &trigger.employee_id == self.employee_id
            && &trigger.process_id == self.process_id
    }

    pub fn matches_response(&self, response: &SurveyResponse) -> bool {
        &response.survey_id == self.survey_id
            && &response.employee_id == self.employee_id
            && &response.process_id == self.process_id
    }
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, RepositoryError>;
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;

    /// Re-parents `movement.employee_id` only while its stored manager still
    /// equals `movement.previous_manager_id`, recording the move in the same
    /// transaction. `false` means the precondition no longer held.
    async fn apply_move(&self, movement: &HierarchyMove) -> Result<bool, RepositoryError>;

    async fn list_moves(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<HierarchyMove>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalFlowRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApprovalFlowId)
        -> Result<Option<ApprovalFlow>, RepositoryError>;

    async fn find_by_job_description(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError>;

    /// Stores a freshly created draft. `false` when the job description
    /// already has a flow.
    async fn insert_draft(&self, transition: &ApprovalTransition) -> Result<bool, RepositoryError>;

    /// Persists the flow, its current-revision records and the history entry
    /// only while the stored `state_version` equals `expected_version`.
    async fn save_transition(
        &self,
        transition: &ApprovalTransition,
    ) -> Result<bool, RepositoryError>;

    async fn history(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError>;

    /// Every record of every revision, oldest revision first.
    async fn records(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<RevisionedRecord>, RepositoryError>;

    /// Flows currently waiting on `approver_id` at `level`.
    async fn pending_for_approver(
        &self,
        level: u8,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError>;
}

#[async_trait]
pub trait SurveyRepository: Send + Sync {
    async fn find_survey(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError>;

    /// First active survey listening to `trigger_event`, oldest id first.
    async fn active_survey_for_event(
        &self,
        trigger_event: &str,
    ) -> Result<Option<Survey>, RepositoryError>;

    async fn save_survey(&self, survey: Survey) -> Result<(), RepositoryError>;

    /// Latest response for the tuple, if any.
    async fn find_response(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<SurveyResponse>, RepositoryError>;

    async fn save_response(&self, response: SurveyResponse) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn find_trigger(&self, id: &TriggerId)
        -> Result<Option<ScheduledTrigger>, RepositoryError>;

    async fn find_pending_trigger(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<ScheduledTrigger>, RepositoryError>;

    /// `false` when another pending trigger already holds the tuple.
    async fn insert_pending_trigger(
        &self,
        trigger: &ScheduledTrigger,
    ) -> Result<bool, RepositoryError>;

    /// Pending triggers with `scheduled_for <= now`, earliest first.
    async fn due_triggers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError>;

    /// Triggers for the tuple that a response can still close (pending or sent).
    async fn open_triggers(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError>;

    /// Writes `trigger` only while the stored status equals `expected`.
    async fn transition_trigger(
        &self,
        trigger: &ScheduledTrigger,
        expected: TriggerStatus,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait DetractorAlertRepository: Send + Sync {
    async fn insert_alert(&self, alert: &DetractorAlert) -> Result<(), RepositoryError>;
    async fn find_alert(&self, id: &AlertId) -> Result<Option<DetractorAlert>, RepositoryError>;

    /// Newest first.
    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
    ) -> Result<Vec<DetractorAlert>, RepositoryError>;

    /// Writes `alert` only while the stored status equals `expected`.
    async fn update_alert(
        &self,
        alert: &DetractorAlert,
        expected: AlertStatus,
    ) -> Result<bool, RepositoryError>;
}

/// Fixed-width UTC encoding so that string order in SQLite is time order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_optional_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(format_timestamp)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u8(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected 0..=255): {value}"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_timestamp, parse_timestamp, parse_u32, parse_u8, RepositoryError};

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let early = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).single().expect("timestamp");
        let late = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).single().expect("timestamp");

        let encoded_early = format_timestamp(early);
        let encoded_late = format_timestamp(late);

        assert_eq!(encoded_early, "2026-05-04T09:00:00.000000Z");
        assert!(encoded_early < encoded_late);
        assert_eq!(parse_timestamp("at", encoded_late).expect("parse"), late);
    }

    #[test]
    fn out_of_range_integers_are_decode_errors() {
        assert!(matches!(parse_u32("revision", -1), Err(RepositoryError::Decode(_))));
        assert!(matches!(parse_u8("level", 300), Err(RepositoryError::Decode(_))));
        assert_eq!(parse_u8("level", 4).expect("level"), 4);
    }
}
