use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::EmployeeId;
use crate::domain::nps::{
    ProcessId, ResponseId, ScheduledTrigger, Survey, SurveyResponse, TriggerId, TriggerStatus,
    PROCESS_COMPLETED_EVENT,
};
use crate::nps::NpsSettings;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub process_id: ProcessId,
    pub employee_id: EmployeeId,
    pub delay_minutes: Option<u32>,
}

/// Reasons a trigger is not scheduled. These are results, not failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ScheduleRefusal {
    AutoTriggerDisabled,
    NoActiveSurvey,
    AlreadyPending { trigger_id: TriggerId },
}

impl ScheduleRefusal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoTriggerDisabled => "auto_trigger_disabled",
            Self::NoActiveSurvey => "no_active_survey",
            Self::AlreadyPending { .. } => "already_pending",
        }
    }
}

impl fmt::Display for ScheduleRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoTriggerDisabled => f.write_str("automatic NPS triggering is disabled"),
            Self::NoActiveSurvey => {
                write!(f, "no active survey listens to `{PROCESS_COMPLETED_EVENT}`")
            }
            Self::AlreadyPending { trigger_id } => {
                write!(f, "trigger `{}` is already pending for this process", trigger_id.0)
            }
        }
    }
}

/// Decides whether to schedule and builds the pending trigger.
/// Delay precedence: request override, survey delay, settings default.
pub fn plan_trigger(
    settings: &NpsSettings,
    survey: Option<&Survey>,
    existing_pending: Option<&ScheduledTrigger>,
    request: &TriggerRequest,
    now: DateTime<Utc>,
) -> Result<ScheduledTrigger, ScheduleRefusal> {
    if !settings.auto_trigger_enabled {
        return Err(ScheduleRefusal::AutoTriggerDisabled);
    }

    let survey = survey
        .filter(|survey| survey.is_active() && survey.trigger_event == PROCESS_COMPLETED_EVENT)
        .ok_or(ScheduleRefusal::NoActiveSurvey)?;

    if let Some(existing) = existing_pending.filter(|trigger| trigger.status == TriggerStatus::Pending)
    {
        return Err(ScheduleRefusal::AlreadyPending { trigger_id: existing.id.clone() });
    }

    let delay_minutes = request
        .delay_minutes
        .or(survey.delay_minutes)
        .unwrap_or(settings.default_delay_minutes);

    Ok(ScheduledTrigger {
        id: TriggerId(format!("TRG-{}", Uuid::new_v4())),
        survey_id: survey.id.clone(),
        employee_id: request.employee_id.clone(),
        process_id: request.process_id.clone(),
        scheduled_for: now + Duration::minutes(i64::from(delay_minutes)),
        delay_minutes,
        status: TriggerStatus::Pending,
        sent_at: None,
        responded_at: None,
        response_id: None,
        created_at: now,
        updated_at: now,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerResolution {
    Cancel,
    Respond { response_id: ResponseId, responded_at: DateTime<Utc> },
    Expire,
    Send,
}

impl TriggerResolution {
    pub fn status(&self) -> TriggerStatus {
        match self {
            Self::Cancel => TriggerStatus::Cancelled,
            Self::Respond { .. } => TriggerStatus::Responded,
            Self::Expire => TriggerStatus::Expired,
            Self::Send => TriggerStatus::Sent,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Cancel => "survey is no longer active",
            Self::Respond { .. } => "employee already answered the survey",
            Self::Expire => "survey window elapsed before dispatch",
            Self::Send => "survey dispatched",
        }
    }

    /// Trigger as it looks after the resolution is applied.
    pub fn apply(&self, trigger: &ScheduledTrigger, now: DateTime<Utc>) -> ScheduledTrigger {
        let mut next = trigger.clone();
        next.status = self.status();
        next.updated_at = now;
        match self {
            Self::Respond { response_id, responded_at } => {
                next.response_id = Some(response_id.clone());
                next.responded_at = Some(*responded_at);
            }
            Self::Send => next.sent_at = Some(now),
            Self::Cancel | Self::Expire => {}
        }
        next
    }
}

/// Fate of a due pending trigger. A zero `survey_expiration_days` never expires.
pub fn resolve_due_trigger(
    trigger: &ScheduledTrigger,
    survey: Option<&Survey>,
    response: Option<&SurveyResponse>,
    settings: &NpsSettings,
    now: DateTime<Utc>,
) -> TriggerResolution {
    if !survey.is_some_and(Survey::is_active) {
        return TriggerResolution::Cancel;
    }

    if let Some(response) = response {
        return TriggerResolution::Respond {
            response_id: response.id.clone(),
            responded_at: response.created_at,
        };
    }

    if settings.survey_expiration_days > 0 {
        let window = Duration::days(i64::from(settings.survey_expiration_days));
        if now - trigger.scheduled_for > window {
            return TriggerResolution::Expire;
        }
    }

    TriggerResolution::Send
}
