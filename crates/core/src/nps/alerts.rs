use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::nps::{AlertId, AlertStatus, DetractorAlert, SurveyResponse};
use crate::notify::Notification;
use crate::nps::{NpsSettings, MAX_SCORE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpsCategory {
    Detractor,
    Passive,
    Promoter,
}

impl NpsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detractor => "detractor",
            Self::Passive => "passive",
            Self::Promoter => "promoter",
        }
    }
}

/// Standard NPS bands: 0-6, 7-8, 9-10. `None` above the scale.
pub fn classify_score(score: u8) -> Option<NpsCategory> {
    match score {
        0..=6 => Some(NpsCategory::Detractor),
        7 | 8 => Some(NpsCategory::Passive),
        9..=MAX_SCORE => Some(NpsCategory::Promoter),
        _ => None,
    }
}

pub fn should_alert(settings: &NpsSettings, score: u8) -> bool {
    settings.detractor_alert_enabled && score <= settings.detractor_threshold
}

/// `None` when alerting is off or the score is above the threshold.
pub fn new_detractor_alert(
    settings: &NpsSettings,
    response: &SurveyResponse,
    now: DateTime<Utc>,
) -> Option<DetractorAlert> {
    if !should_alert(settings, response.score) {
        return None;
    }

    Some(DetractorAlert {
        id: AlertId(format!("DA-{}", Uuid::new_v4())),
        response_id: response.id.clone(),
        employee_id: response.employee_id.clone(),
        survey_id: response.survey_id.clone(),
        score: response.score,
        comment: response.comment.clone(),
        status: AlertStatus::New,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
        resolution_notes: None,
        created_at: now,
    })
}

impl DetractorAlert {
    pub fn notification(&self, survey_name: &str, employee_name: &str) -> Notification {
        let mut content = format!(
            "Survey: {survey_name}\nEmployee: {employee_name}\nScore: {}/{MAX_SCORE}\nCategory: detractor",
            self.score
        );
        if let Some(comment) = &self.comment {
            content.push_str(&format!("\nComment: {comment}"));
        }
        content.push_str("\n\nReach out to the employee to understand the dissatisfaction.");
        Notification::owner(
            format!("NPS detractor alert - score {}/{MAX_SCORE}", self.score),
            content,
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AlertTransitionError {
    #[error("alert is already {0:?} and cannot change")]
    Closed(AlertStatus),
    #[error("alerts cannot be moved back to new")]
    Reopen,
}

/// Moves an alert along its lifecycle, stamping who did it and when.
pub fn apply_alert_status(
    alert: &DetractorAlert,
    status: AlertStatus,
    actor: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<DetractorAlert, AlertTransitionError> {
    if alert.status.is_closed() {
        return Err(AlertTransitionError::Closed(alert.status));
    }

    let mut next = alert.clone();
    next.status = status;
    match status {
        AlertStatus::New => return Err(AlertTransitionError::Reopen),
        AlertStatus::Acknowledged => {
            next.acknowledged_by = Some(actor.to_owned());
            next.acknowledged_at = Some(now);
        }
        AlertStatus::InProgress => {}
        AlertStatus::Resolved | AlertStatus::Dismissed => {
            next.resolved_by = Some(actor.to_owned());
            next.resolved_at = Some(now);
            next.resolution_notes = notes;
        }
    }
    Ok(next)
}

/// Aggregate over a batch of scores; out-of-range scores are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NpsSummary {
    pub responses: usize,
    pub promoters: usize,
    pub passives: usize,
    pub detractors: usize,
    /// Percentage of promoters minus percentage of detractors, -100..=100.
    pub score: f64,
}

impl NpsSummary {
    pub fn from_scores(scores: impl IntoIterator<Item = u8>) -> Self {
        let mut summary = Self::default();
        for score in scores {
            match classify_score(score) {
                Some(NpsCategory::Promoter) => summary.promoters += 1,
                Some(NpsCategory::Passive) => summary.passives += 1,
                Some(NpsCategory::Detractor) => summary.detractors += 1,
                None => continue,
            }
            summary.responses += 1;
        }

        if summary.responses > 0 {
            let total = summary.responses as f64;
            let raw = (summary.promoters as f64 - summary.detractors as f64) / total * 100.0;
            summary.score = (raw * 10.0).round() / 10.0;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::domain::employee::EmployeeId;
    use crate::domain::nps::{AlertStatus, ProcessId, ResponseId, SurveyId, SurveyResponse};
    use crate::nps::NpsSettings;

    use super::{
        apply_alert_status, classify_score, new_detractor_alert, AlertTransitionError, NpsCategory,
        NpsSummary,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().expect("valid timestamp")
    }

    fn response(score: u8) -> SurveyResponse {
        SurveyResponse {
            id: ResponseId("R-1".to_owned()),
            survey_id: SurveyId("S-1".to_owned()),
            employee_id: EmployeeId::new("E-1"),
            process_id: ProcessId("P-1".to_owned()),
            score,
            comment: Some("feedback session felt rushed".to_owned()),
            created_at: now(),
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let settings = NpsSettings::default();

        let at_threshold = new_detractor_alert(&settings, &response(6), now()).expect("alert");
        assert_eq!(at_threshold.status, AlertStatus::New);
        assert_eq!(at_threshold.score, 6);
        assert!(new_detractor_alert(&settings, &response(7), now()).is_none());
    }

    #[test]
    fn disabled_alerting_never_creates_alerts() {
        let settings = NpsSettings { detractor_alert_enabled: false, ..NpsSettings::default() };

        assert!(new_detractor_alert(&settings, &response(0), now()).is_none());
    }

    #[test]
    fn lifecycle_stamps_actors_and_refuses_reopening_closed_alerts() {
        let settings = NpsSettings::default();
        let alert = new_detractor_alert(&settings, &response(2), now()).expect("alert");

        let acknowledged =
            apply_alert_status(&alert, AlertStatus::Acknowledged, "hr-7", None, now()).expect("ack");
        assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("hr-7"));

        let resolved = apply_alert_status(
            &acknowledged,
            AlertStatus::Resolved,
            "hr-7",
            Some("talked it through".to_owned()),
            now(),
        )
        .expect("resolve");
        assert_eq!(resolved.resolved_by.as_deref(), Some("hr-7"));
        assert_eq!(resolved.resolution_notes.as_deref(), Some("talked it through"));

        assert_eq!(
            apply_alert_status(&resolved, AlertStatus::InProgress, "hr-8", None, now()),
            Err(AlertTransitionError::Closed(AlertStatus::Resolved))
        );
        assert_eq!(
            apply_alert_status(&alert, AlertStatus::New, "hr-8", None, now()),
            Err(AlertTransitionError::Reopen)
        );
    }

    #[test]
    fn scores_fall_into_standard_bands() {
        assert_eq!(classify_score(0), Some(NpsCategory::Detractor));
        assert_eq!(classify_score(6), Some(NpsCategory::Detractor));
        assert_eq!(classify_score(8), Some(NpsCategory::Passive));
        assert_eq!(classify_score(10), Some(NpsCategory::Promoter));
        assert_eq!(classify_score(11), None);
    }

    #[test]
    fn summary_subtracts_detractor_share_from_promoter_share() {
        let summary = NpsSummary::from_scores([10, 9, 9, 7, 3, 42]);

        assert_eq!(summary.responses, 5);
        assert_eq!(summary.promoters, 3);
        assert_eq!(summary.detractors, 1);
        assert_eq!(summary.score, 40.0);
    }

    #[test]
    fn alert_notification_goes_to_owner_channel() {
        let alert = new_detractor_alert(&NpsSettings::default(), &response(3), now()).expect("alert");
        let notification = alert.notification("Post-PDI pulse", "Ana");

        assert!(notification.recipient.is_none());
        assert!(notification.title.contains("3/10"));
        assert!(notification.content.contains("feedback session felt rushed"));
    }
}
