use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurveyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

/// Business event a survey is dispatched after.
pub const PROCESS_COMPLETED_EVENT: &str = "process_completed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Draft,
    Active,
    Closed,
}

impl SurveyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: SurveyId,
    pub name: String,
    pub status: SurveyStatus,
    pub trigger_event: String,
    pub delay_minutes: Option<u32>,
}

impl Survey {
    pub fn is_active(&self) -> bool {
        self.status == SurveyStatus::Active
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Pending,
    Sent,
    Responded,
    Expired,
    Cancelled,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Responded => "responded",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "responded" => Some(Self::Responded),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    pub id: TriggerId,
    pub survey_id: SurveyId,
    pub employee_id: EmployeeId,
    pub process_id: ProcessId,
    pub scheduled_for: DateTime<Utc>,
    pub delay_minutes: u32,
    pub status: TriggerStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub response_id: Option<ResponseId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTrigger {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TriggerStatus::Pending && self.scheduled_for <= now
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: ResponseId,
    pub survey_id: SurveyId,
    pub employee_id: EmployeeId,
    pub process_id: ProcessId,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Acknowledged => "acknowledged",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "acknowledged" => Some(Self::Acknowledged),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetractorAlert {
    pub id: AlertId,
    pub response_id: ResponseId,
    pub employee_id: EmployeeId,
    pub survey_id: SurveyId,
    pub score: u8,
    pub comment: Option<String>,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{AlertStatus, SurveyStatus, TriggerStatus};

    #[test]
    fn trigger_status_round_trips_from_storage_encoding() {
        let cases = [
            TriggerStatus::Pending,
            TriggerStatus::Sent,
            TriggerStatus::Responded,
            TriggerStatus::Expired,
            TriggerStatus::Cancelled,
        ];

        for status in cases {
            assert_eq!(TriggerStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn alert_and_survey_status_parse_case_insensitively() {
        assert_eq!(AlertStatus::parse("IN_PROGRESS"), Some(AlertStatus::InProgress));
        assert_eq!(SurveyStatus::parse(" Active "), Some(SurveyStatus::Active));
        assert_eq!(AlertStatus::parse("escalated"), None);
        assert!(AlertStatus::Dismissed.is_closed());
        assert!(!AlertStatus::Acknowledged.is_closed());
    }
}
