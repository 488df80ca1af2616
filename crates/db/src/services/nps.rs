use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use orgflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use orgflow_core::domain::employee::EmployeeId;
use orgflow_core::domain::nps::{
    AlertId, AlertStatus, DetractorAlert, ProcessId, ResponseId, ScheduledTrigger, SurveyId,
    SurveyResponse, TriggerId, TriggerStatus, PROCESS_COMPLETED_EVENT,
};
use orgflow_core::errors::{ApplicationError, DomainError};
use orgflow_core::notify::{Notification, NotificationSink};
use orgflow_core::nps::{
    apply_alert_status, new_detractor_alert, plan_trigger, resolve_due_trigger, NpsSettings,
    ScheduleRefusal, TriggerRequest, TriggerResolution, MAX_SCORE,
};

use crate::repositories::{
    DetractorAlertRepository, EmployeeRepository, RepositoryError, SurveyRepository,
    TriggerRepository, TriggerTuple,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Scheduled { trigger: ScheduledTrigger },
    Refused { refusal: ScheduleRefusal, message: String },
    Failed { message: String },
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDetail {
    pub trigger_id: TriggerId,
    /// Resulting trigger status, or `error`.
    pub status: String,
    pub message: String,
}

/// Summary of one poller pass. `processed` counts every due trigger found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub sent: usize,
    pub errors: usize,
    pub details: Vec<TriggerDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResponse {
    pub survey_id: SurveyId,
    pub employee_id: EmployeeId,
    pub process_id: ProcessId,
    pub score: u8,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub response: SurveyResponse,
    pub closed_triggers: Vec<TriggerId>,
    pub alert: Option<DetractorAlert>,
}

/// Alert enriched with display names for the follow-up queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: DetractorAlert,
    pub employee_name: Option<String>,
    pub survey_name: Option<String>,
}

/// Post-process NPS surveys. Poller paths fail closed: storage errors are
/// logged and degrade to empty or negative results instead of propagating.
pub struct NpsService<N, E> {
    repository: N,
    directory: E,
    settings: NpsSettings,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl<N, E> NpsService<N, E>
where
    N: SurveyRepository + TriggerRepository + DetractorAlertRepository,
    E: EmployeeRepository,
{
    pub fn new(
        repository: N,
        directory: E,
        settings: NpsSettings,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { repository, directory, settings, audit, notifier }
    }

    pub fn settings(&self) -> &NpsSettings {
        &self.settings
    }

    pub fn repository(&self) -> &N {
        &self.repository
    }

    pub async fn schedule(&self, request: &TriggerRequest, context: &AuditContext) -> ScheduleOutcome {
        self.schedule_at(request, context, Utc::now()).await
    }

    pub async fn schedule_at(
        &self,
        request: &TriggerRequest,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> ScheduleOutcome {
        match self.try_schedule(request, now).await {
            Ok(Ok(trigger)) => {
                info!(
                    event_name = "nps.trigger.scheduled",
                    correlation_id = %context.correlation_id,
                    trigger_id = %trigger.id.0,
                    scheduled_for = %trigger.scheduled_for,
                    "nps trigger scheduled"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(trigger.id.0.clone()),
                        context,
                        "nps.trigger.scheduled",
                        AuditCategory::Nps,
                        AuditOutcome::Success,
                    )
                    .with_metadata("process_id", request.process_id.0.as_str())
                    .with_metadata("employee_id", request.employee_id.as_str()),
                );
                ScheduleOutcome::Scheduled { trigger }
            }
            Ok(Err(reason)) => {
                info!(
                    event_name = "nps.trigger.skipped",
                    correlation_id = %context.correlation_id,
                    process_id = %request.process_id.0,
                    reason = reason.as_str(),
                    "nps trigger not scheduled"
                );
                ScheduleOutcome::Refused { message: reason.to_string(), refusal: reason }
            }
            Err(failure) => {
                error!(
                    event_name = "nps.trigger.schedule_failed",
                    correlation_id = %context.correlation_id,
                    process_id = %request.process_id.0,
                    error = %failure,
                    "failed to schedule nps trigger"
                );
                ScheduleOutcome::Failed { message: failure.to_string() }
            }
        }
    }

    async fn try_schedule(
        &self,
        request: &TriggerRequest,
        now: DateTime<Utc>,
    ) -> Result<Result<ScheduledTrigger, ScheduleRefusal>, RepositoryError> {
        if !self.settings.auto_trigger_enabled {
            return Ok(Err(ScheduleRefusal::AutoTriggerDisabled));
        }
        let survey = self.repository.active_survey_for_event(PROCESS_COMPLETED_EVENT).await?;
        let existing = match &survey {
            Some(survey) => {
                let tuple = TriggerTuple {
                    survey_id: &survey.id,
                    employee_id: &request.employee_id,
                    process_id: &request.process_id,
                };
                self.repository.find_pending_trigger(&tuple).await?
            }
            None => None,
        };

        let trigger =
            match plan_trigger(&self.settings, survey.as_ref(), existing.as_ref(), request, now) {
                Ok(trigger) => trigger,
                Err(reason) => return Ok(Err(reason)),
            };

        if self.repository.insert_pending_trigger(&trigger).await? {
            return Ok(Ok(trigger));
        }

        // Lost the race against a concurrent schedule for the same tuple.
        let tuple = TriggerTuple {
            survey_id: &trigger.survey_id,
            employee_id: &trigger.employee_id,
            process_id: &trigger.process_id,
        };
        let trigger_id = self
            .repository
            .find_pending_trigger(&tuple)
            .await?
            .map(|existing| existing.id)
            .unwrap_or(trigger.id);
        Ok(Err(ScheduleRefusal::AlreadyPending { trigger_id }))
    }

    pub async fn process_pending(&self) -> ProcessReport {
        self.process_pending_at(Utc::now()).await
    }

    /// Resolves every due pending trigger. Each write is conditioned on the
    /// trigger still being pending, so overlapping passes never double-send.
    pub async fn process_pending_at(&self, now: DateTime<Utc>) -> ProcessReport {
        let due = match self.repository.due_triggers(now).await {
            Ok(due) => due,
            Err(failure) => {
                error!(
                    event_name = "nps.poller.query_failed",
                    correlation_id = "nps-poller",
                    error = %failure,
                    "failed to load due nps triggers"
                );
                return ProcessReport { errors: 1, ..ProcessReport::default() };
            }
        };

        let mut report = ProcessReport { processed: due.len(), ..ProcessReport::default() };
        for trigger in &due {
            match self.resolve(trigger, now).await {
                Ok(Some((resolution, message))) => {
                    if matches!(resolution, TriggerResolution::Send) {
                        report.sent += 1;
                    }
                    report.details.push(TriggerDetail {
                        trigger_id: trigger.id.clone(),
                        status: resolution.status().as_str().to_string(),
                        message,
                    });
                }
                Ok(None) => {}
                Err(failure) => {
                    warn!(
                        event_name = "nps.poller.trigger_failed",
                        correlation_id = "nps-poller",
                        trigger_id = %trigger.id.0,
                        error = %failure,
                        "failed to resolve nps trigger"
                    );
                    report.errors += 1;
                    report.details.push(TriggerDetail {
                        trigger_id: trigger.id.clone(),
                        status: "error".to_string(),
                        message: failure.to_string(),
                    });
                }
            }
        }

        info!(
            event_name = "nps.poller.completed",
            correlation_id = "nps-poller",
            processed = report.processed,
            sent = report.sent,
            errors = report.errors,
            "nps poller pass finished"
        );
        report
    }

    /// `None` when another pass resolved the trigger first.
    async fn resolve(
        &self,
        trigger: &ScheduledTrigger,
        now: DateTime<Utc>,
    ) -> Result<Option<(TriggerResolution, String)>, RepositoryError> {
        let survey = self.repository.find_survey(&trigger.survey_id).await?;
        let tuple = TriggerTuple {
            survey_id: &trigger.survey_id,
            employee_id: &trigger.employee_id,
            process_id: &trigger.process_id,
        };
        let response = self.repository.find_response(&tuple).await?;

        let resolution =
            resolve_due_trigger(trigger, survey.as_ref(), response.as_ref(), &self.settings, now);
        let next = resolution.apply(trigger, now);
        if !self.repository.transition_trigger(&next, TriggerStatus::Pending).await? {
            return Ok(None);
        }

        let message = match (&resolution, &survey) {
            (TriggerResolution::Send, Some(survey)) => {
                let employee_name = self.employee_name(&trigger.employee_id).await;
                self.notifier.notify(Notification::to(
                    trigger.employee_id.clone(),
                    format!("New survey: {}", survey.name),
                    "Tell us how the process went. It takes less than a minute.",
                ));
                format!(
                    "survey sent to {}",
                    employee_name.as_deref().unwrap_or(trigger.employee_id.as_str())
                )
            }
            _ => resolution.message().to_string(),
        };

        self.audit.emit(
            AuditEvent::new(
                Some(trigger.id.0.clone()),
                &AuditContext::system("nps-poller"),
                format!("nps.trigger.{}", next.status.as_str()),
                AuditCategory::Nps,
                AuditOutcome::Success,
            )
            .with_metadata("survey_id", trigger.survey_id.0.as_str()),
        );
        Ok(Some((resolution, message)))
    }

    /// Stores a response, closes the triggers it answers and raises a
    /// detractor alert when the score calls for one.
    pub async fn record_response(
        &self,
        input: NewResponse,
        context: &AuditContext,
    ) -> Result<RecordedResponse, ApplicationError> {
        if input.score > MAX_SCORE {
            return Err(DomainError::InvalidScore(input.score).into());
        }
        if self.repository.find_survey(&input.survey_id).await?.is_none() {
            return Err(ApplicationError::NotFound(format!(
                "survey `{}` not found",
                input.survey_id.0
            )));
        }

        let now = Utc::now();
        let response = SurveyResponse {
            id: ResponseId(format!("RSP-{}", Uuid::new_v4())),
            survey_id: input.survey_id,
            employee_id: input.employee_id,
            process_id: input.process_id,
            score: input.score,
            comment: input.comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()),
            created_at: now,
        };
        self.repository.save_response(response.clone()).await?;

        let tuple = TriggerTuple {
            survey_id: &response.survey_id,
            employee_id: &response.employee_id,
            process_id: &response.process_id,
        };
        let resolution = TriggerResolution::Respond {
            response_id: response.id.clone(),
            responded_at: response.created_at,
        };
        let mut closed_triggers = Vec::new();
        for trigger in self.repository.open_triggers(&tuple).await? {
            let next = resolution.apply(&trigger, now);
            if self.repository.transition_trigger(&next, trigger.status).await? {
                closed_triggers.push(trigger.id);
            }
        }

        info!(
            event_name = "nps.response.recorded",
            correlation_id = %context.correlation_id,
            response_id = %response.id.0,
            score = response.score,
            closed_triggers = closed_triggers.len(),
            "nps response recorded"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(response.id.0.clone()),
                context,
                "nps.response.recorded",
                AuditCategory::Nps,
                AuditOutcome::Success,
            )
            .with_metadata("score", response.score.to_string()),
        );

        let alert = self.create_detractor_alert(&response).await;
        Ok(RecordedResponse { response, closed_triggers, alert })
    }

    /// No-op when alerting is off or the score is above the threshold.
    /// Storage failures are logged and yield `None`.
    pub async fn create_detractor_alert(&self, response: &SurveyResponse) -> Option<DetractorAlert> {
        let alert = new_detractor_alert(&self.settings, response, Utc::now())?;

        if let Err(failure) = self.repository.insert_alert(&alert).await {
            error!(
                event_name = "nps.alert.create_failed",
                correlation_id = %response.id.0,
                error = %failure,
                "failed to store detractor alert"
            );
            return None;
        }

        let survey_name = match self.repository.find_survey(&alert.survey_id).await {
            Ok(survey) => survey.map(|survey| survey.name),
            Err(_) => None,
        };
        let employee_name = self.employee_name(&alert.employee_id).await;
        self.notifier.notify(alert.notification(
            survey_name.as_deref().unwrap_or(alert.survey_id.0.as_str()),
            employee_name.as_deref().unwrap_or(alert.employee_id.as_str()),
        ));
        warn!(
            event_name = "nps.alert.created",
            correlation_id = %response.id.0,
            alert_id = %alert.id.0,
            score = alert.score,
            "detractor alert raised"
        );
        Some(alert)
    }

    /// Alerts still in `new`, newest first, with display names.
    pub async fn pending_alerts(&self) -> Vec<AlertView> {
        let alerts = match self.repository.list_alerts(Some(AlertStatus::New)).await {
            Ok(alerts) => alerts,
            Err(failure) => {
                error!(
                    event_name = "nps.alert.list_failed",
                    correlation_id = "nps-alerts",
                    error = %failure,
                    "failed to load pending detractor alerts"
                );
                return Vec::new();
            }
        };

        let mut views = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let survey_name = match self.repository.find_survey(&alert.survey_id).await {
                Ok(survey) => survey.map(|survey| survey.name),
                Err(_) => None,
            };
            let employee_name = self.employee_name(&alert.employee_id).await;
            views.push(AlertView { alert, employee_name, survey_name });
        }
        views
    }

    pub async fn update_alert_status(
        &self,
        alert_id: &AlertId,
        status: AlertStatus,
        notes: Option<String>,
        context: &AuditContext,
    ) -> Result<DetractorAlert, ApplicationError> {
        let alert = self
            .repository
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("alert `{}` not found", alert_id.0)))?;

        let next = apply_alert_status(&alert, status, &context.actor, notes, Utc::now())
            .map_err(DomainError::from)?;
        if !self.repository.update_alert(&next, alert.status).await? {
            return Err(ApplicationError::Conflict("alert changed, reload and retry".to_string()));
        }

        info!(
            event_name = "nps.alert.status_changed",
            correlation_id = %context.correlation_id,
            alert_id = %alert_id.0,
            from = alert.status.as_str(),
            to = next.status.as_str(),
            "detractor alert updated"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(alert_id.0.clone()),
                context,
                "nps.alert.status_changed",
                AuditCategory::Nps,
                AuditOutcome::Success,
            )
            .with_metadata("from", alert.status.as_str())
            .with_metadata("to", next.status.as_str()),
        );
        Ok(next)
    }

    async fn employee_name(&self, employee_id: &EmployeeId) -> Option<String> {
        match self.directory.find_by_id(employee_id).await {
            Ok(employee) => employee.map(|employee| employee.name),
            Err(failure) => {
                warn!(
                    event_name = "nps.directory.lookup_failed",
                    correlation_id = "nps",
                    employee_id = %employee_id,
                    error = %failure,
                    "employee lookup failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use orgflow_core::audit::{AuditContext, InMemoryAuditSink};
    use orgflow_core::domain::employee::{Employee, EmployeeId};
    use orgflow_core::domain::nps::{
        AlertStatus, ProcessId, Survey, SurveyId, SurveyStatus, TriggerStatus,
        PROCESS_COMPLETED_EVENT,
    };
    use orgflow_core::errors::{ApplicationError, DomainError};
    use orgflow_core::notify::InMemoryNotificationSink;
    use orgflow_core::nps::{NpsSettings, ScheduleRefusal, TriggerRequest};

    use super::{NewResponse, NpsService, ScheduleOutcome};
    use crate::repositories::{
        InMemoryEmployeeRepository, InMemoryNpsRepository, SurveyRepository, TriggerRepository,
    };

    type Service = NpsService<InMemoryNpsRepository, InMemoryEmployeeRepository>;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().expect("valid timestamp")
    }

    async fn service(settings: NpsSettings) -> (Service, InMemoryNotificationSink) {
        let repository = InMemoryNpsRepository::default();
        repository
            .save_survey(Survey {
                id: SurveyId("S-1".to_string()),
                name: "Post-PDI pulse".to_string(),
                status: SurveyStatus::Active,
                trigger_event: PROCESS_COMPLETED_EVENT.to_string(),
                delay_minutes: None,
            })
            .await
            .expect("seed survey");
        let directory =
            InMemoryEmployeeRepository::with_employees([Employee::new("E-1", "Ana Souza")]).await;
        let notifier = InMemoryNotificationSink::default();
        let service = NpsService::new(
            repository,
            directory,
            settings,
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(notifier.clone()),
        );
        (service, notifier)
    }

    fn request(process: &str, delay_minutes: Option<u32>) -> TriggerRequest {
        TriggerRequest {
            process_id: ProcessId(process.to_string()),
            employee_id: EmployeeId::new("E-1"),
            delay_minutes,
        }
    }

    fn context() -> AuditContext {
        AuditContext::new("req-nps", "hr-7")
    }

    #[tokio::test]
    async fn schedule_refuses_duplicates_and_uses_default_delay() {
        let (service, _) = service(NpsSettings::default()).await;

        let first = service.schedule_at(&request("P-1", None), &context(), now()).await;
        let ScheduleOutcome::Scheduled { trigger } = first else {
            panic!("expected a scheduled trigger, got {first:?}");
        };
        assert_eq!(trigger.scheduled_for, now() + Duration::minutes(1440));

        let second = service.schedule_at(&request("P-1", None), &context(), now()).await;
        assert!(matches!(
            second,
            ScheduleOutcome::Refused { refusal: ScheduleRefusal::AlreadyPending { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn disabled_auto_trigger_is_a_refusal() {
        let settings = NpsSettings { auto_trigger_enabled: false, ..NpsSettings::default() };
        let (service, _) = service(settings).await;

        let outcome = service.schedule_at(&request("P-1", None), &context(), now()).await;
        assert!(matches!(
            outcome,
            ScheduleOutcome::Refused { refusal: ScheduleRefusal::AutoTriggerDisabled, .. }
        ));
        assert!(!outcome.is_scheduled());
    }

    #[tokio::test]
    async fn due_trigger_is_sent_once_even_when_processed_twice() {
        let (service, notifier) = service(NpsSettings::default()).await;
        let outcome = service.schedule_at(&request("P-1", Some(0)), &context(), now()).await;
        assert!(outcome.is_scheduled());

        let first = service.process_pending_at(now()).await;
        assert_eq!((first.processed, first.sent, first.errors), (1, 1, 0));
        assert_eq!(first.details[0].status, "sent");
        assert!(first.details[0].message.contains("Ana Souza"));

        let second = service.process_pending_at(now() + Duration::minutes(5)).await;
        assert_eq!((second.processed, second.sent), (0, 0));
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn future_triggers_wait_and_stale_ones_expire() {
        let (service, _) = service(NpsSettings::default()).await;
        service.schedule_at(&request("P-1", Some(60)), &context(), now()).await;
        service.schedule_at(&request("P-2", Some(0)), &context(), now()).await;

        let early = service.process_pending_at(now()).await;
        assert_eq!(early.processed, 1);

        let late = service.process_pending_at(now() + Duration::days(9)).await;
        assert_eq!(late.processed, 1);
        assert_eq!(late.sent, 0);
        assert_eq!(late.details[0].status, "expired");
    }

    #[tokio::test]
    async fn response_closes_trigger_and_raises_detractor_alert() {
        let (service, notifier) = service(NpsSettings::default()).await;
        let outcome = service.schedule_at(&request("P-1", Some(0)), &context(), now()).await;
        let ScheduleOutcome::Scheduled { trigger } = outcome else {
            panic!("expected a scheduled trigger");
        };

        let recorded = service
            .record_response(
                NewResponse {
                    survey_id: SurveyId("S-1".to_string()),
                    employee_id: EmployeeId::new("E-1"),
                    process_id: ProcessId("P-1".to_string()),
                    score: 3,
                    comment: Some("  nobody explained the result  ".to_string()),
                },
                &context(),
            )
            .await
            .expect("record");

        assert_eq!(recorded.closed_triggers, vec![trigger.id.clone()]);
        let stored = service.repository().find_trigger(&trigger.id).await.expect("find").expect("row");
        assert_eq!(stored.status, TriggerStatus::Responded);
        assert_eq!(stored.response_id, Some(recorded.response.id.clone()));

        let alert = recorded.alert.expect("detractor alert");
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.comment.as_deref(), Some("nobody explained the result"));
        let owner_message = notifier.sent().pop().expect("owner notified");
        assert!(owner_message.recipient.is_none());
        assert!(owner_message.content.contains("Ana Souza"));

        let pending = service.pending_alerts().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].survey_name.as_deref(), Some("Post-PDI pulse"));

        assert_eq!(service.process_pending_at(now()).await.processed, 0);
    }

    #[tokio::test]
    async fn promoters_do_not_raise_alerts_and_scores_are_bounded() {
        let (service, _) = service(NpsSettings::default()).await;
        let input = |score| NewResponse {
            survey_id: SurveyId("S-1".to_string()),
            employee_id: EmployeeId::new("E-1"),
            process_id: ProcessId("P-9".to_string()),
            score,
            comment: None,
        };

        let promoter = service.record_response(input(9), &context()).await.expect("record");
        assert!(promoter.alert.is_none());
        assert!(promoter.closed_triggers.is_empty());

        assert!(matches!(
            service.record_response(input(11), &context()).await,
            Err(ApplicationError::Domain(DomainError::InvalidScore(11)))
        ));
    }

    #[tokio::test]
    async fn alert_lifecycle_refuses_changes_after_resolution() {
        let (service, _) = service(NpsSettings::default()).await;
        let recorded = service
            .record_response(
                NewResponse {
                    survey_id: SurveyId("S-1".to_string()),
                    employee_id: EmployeeId::new("E-1"),
                    process_id: ProcessId("P-3".to_string()),
                    score: 1,
                    comment: None,
                },
                &context(),
            )
            .await
            .expect("record");
        let alert = recorded.alert.expect("alert");

        let acknowledged = service
            .update_alert_status(&alert.id, AlertStatus::Acknowledged, None, &context())
            .await
            .expect("acknowledge");
        assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("hr-7"));

        service
            .update_alert_status(
                &alert.id,
                AlertStatus::Resolved,
                Some("called the employee".to_string()),
                &context(),
            )
            .await
            .expect("resolve");

        assert!(matches!(
            service
                .update_alert_status(&alert.id, AlertStatus::InProgress, None, &context())
                .await,
            Err(ApplicationError::Domain(DomainError::AlertTransition(_)))
        ));
        assert!(service.pending_alerts().await.is_empty());
    }
}
