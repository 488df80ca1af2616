use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use orgflow_core::domain::employee::EmployeeId;
use orgflow_core::domain::nps::{
    AlertId, AlertStatus, DetractorAlert, ProcessId, ResponseId, ScheduledTrigger, Survey,
    SurveyId, SurveyResponse, SurveyStatus, TriggerId, TriggerStatus,
};

use super::{
    format_optional_timestamp, format_timestamp, parse_optional_timestamp, parse_timestamp,
    parse_u32, parse_u8, DetractorAlertRepository, RepositoryError, SurveyRepository,
    TriggerRepository, TriggerTuple,
};
use crate::DbPool;

const TRIGGER_COLUMNS: &str = "id, survey_id, employee_id, process_id, scheduled_for,
     delay_minutes, status, sent_at, responded_at, response_id, created_at, updated_at";

const ALERT_COLUMNS: &str = "id, response_id, employee_id, survey_id, score, comment, status,
     acknowledged_by, acknowledged_at, resolved_by, resolved_at, resolution_notes, created_at";

/// Surveys, scheduled triggers, responses and detractor alerts.
#[derive(Clone)]
pub struct SqlNpsRepository {
    pool: DbPool,
}

impl SqlNpsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SurveyRepository for SqlNpsRepository {
    async fn find_survey(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, status, trigger_event, delay_minutes FROM survey WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(survey_from_row).transpose()
    }

    async fn active_survey_for_event(
        &self,
        trigger_event: &str,
    ) -> Result<Option<Survey>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, status, trigger_event, delay_minutes
             FROM survey
             WHERE trigger_event = ? AND status = 'active'
             ORDER BY id ASC
             LIMIT 1",
        )
        .bind(trigger_event)
        .fetch_optional(&self.pool)
        .await?;

        row.map(survey_from_row).transpose()
    }

    async fn save_survey(&self, survey: Survey) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO survey (id, name, status, trigger_event, delay_minutes)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                trigger_event = excluded.trigger_event,
                delay_minutes = excluded.delay_minutes",
        )
        .bind(&survey.id.0)
        .bind(&survey.name)
        .bind(survey.status.as_str())
        .bind(&survey.trigger_event)
        .bind(survey.delay_minutes.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_response(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, survey_id, employee_id, process_id, score, comment, created_at
             FROM survey_response
             WHERE survey_id = ? AND employee_id = ? AND process_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(&tuple.survey_id.0)
        .bind(&tuple.employee_id.0)
        .bind(&tuple.process_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(response_from_row).transpose()
    }

    async fn save_response(&self, response: SurveyResponse) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO survey_response
                (id, survey_id, employee_id, process_id, score, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&response.id.0)
        .bind(&response.survey_id.0)
        .bind(&response.employee_id.0)
        .bind(&response.process_id.0)
        .bind(i64::from(response.score))
        .bind(&response.comment)
        .bind(format_timestamp(response.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TriggerRepository for SqlNpsRepository {
    async fn find_trigger(
        &self,
        id: &TriggerId,
    ) -> Result<Option<ScheduledTrigger>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {TRIGGER_COLUMNS} FROM scheduled_trigger WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(trigger_from_row).transpose()
    }

    async fn find_pending_trigger(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<ScheduledTrigger>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM scheduled_trigger
             WHERE survey_id = ? AND employee_id = ? AND process_id = ? AND status = 'pending'"
        ))
        .bind(&tuple.survey_id.0)
        .bind(&tuple.employee_id.0)
        .bind(&tuple.process_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(trigger_from_row).transpose()
    }

    async fn insert_pending_trigger(
        &self,
        trigger: &ScheduledTrigger,
    ) -> Result<bool, RepositoryError> {
        // The partial unique index on pending tuples turns a duplicate into a no-op.
        let inserted = sqlx::query(
            "INSERT INTO scheduled_trigger
                (id, survey_id, employee_id, process_id, scheduled_for, delay_minutes, status,
                 sent_at, responded_at, response_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&trigger.id.0)
        .bind(&trigger.survey_id.0)
        .bind(&trigger.employee_id.0)
        .bind(&trigger.process_id.0)
        .bind(format_timestamp(trigger.scheduled_for))
        .bind(i64::from(trigger.delay_minutes))
        .bind(trigger.status.as_str())
        .bind(format_optional_timestamp(trigger.sent_at))
        .bind(format_optional_timestamp(trigger.responded_at))
        .bind(trigger.response_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(trigger.created_at))
        .bind(format_timestamp(trigger.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn due_triggers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM scheduled_trigger
             WHERE status = 'pending' AND scheduled_for <= ?
             ORDER BY scheduled_for ASC, id ASC"
        ))
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(trigger_from_row).collect()
    }

    async fn open_triggers(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM scheduled_trigger
             WHERE survey_id = ? AND employee_id = ? AND process_id = ?
               AND status IN ('pending', 'sent')
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&tuple.survey_id.0)
        .bind(&tuple.employee_id.0)
        .bind(&tuple.process_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(trigger_from_row).collect()
    }

    async fn transition_trigger(
        &self,
        trigger: &ScheduledTrigger,
        expected: TriggerStatus,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE scheduled_trigger
             SET status = ?, sent_at = ?, responded_at = ?, response_id = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(trigger.status.as_str())
        .bind(format_optional_timestamp(trigger.sent_at))
        .bind(format_optional_timestamp(trigger.responded_at))
        .bind(trigger.response_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(trigger.updated_at))
        .bind(&trigger.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl DetractorAlertRepository for SqlNpsRepository {
    async fn insert_alert(&self, alert: &DetractorAlert) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO detractor_alert ({ALERT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&alert.id.0)
        .bind(&alert.response_id.0)
        .bind(&alert.employee_id.0)
        .bind(&alert.survey_id.0)
        .bind(i64::from(alert.score))
        .bind(&alert.comment)
        .bind(alert.status.as_str())
        .bind(&alert.acknowledged_by)
        .bind(format_optional_timestamp(alert.acknowledged_at))
        .bind(&alert.resolved_by)
        .bind(format_optional_timestamp(alert.resolved_at))
        .bind(&alert.resolution_notes)
        .bind(format_timestamp(alert.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_alert(&self, id: &AlertId) -> Result<Option<DetractorAlert>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM detractor_alert WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(alert_from_row).transpose()
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
    ) -> Result<Vec<DetractorAlert>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ALERT_COLUMNS} FROM detractor_alert
                     WHERE status = ?
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ALERT_COLUMNS} FROM detractor_alert ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(alert_from_row).collect()
    }

    async fn update_alert(
        &self,
        alert: &DetractorAlert,
        expected: AlertStatus,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE detractor_alert
             SET status = ?, acknowledged_by = ?, acknowledged_at = ?, resolved_by = ?,
                 resolved_at = ?, resolution_notes = ?
             WHERE id = ? AND status = ?",
        )
        .bind(alert.status.as_str())
        .bind(&alert.acknowledged_by)
        .bind(format_optional_timestamp(alert.acknowledged_at))
        .bind(&alert.resolved_by)
        .bind(format_optional_timestamp(alert.resolved_at))
        .bind(&alert.resolution_notes)
        .bind(&alert.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }
}

fn survey_from_row(row: SqliteRow) -> Result<Survey, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = SurveyStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown survey status `{status}`")))?;
    let delay_minutes = row
        .try_get::<Option<i64>, _>("delay_minutes")?
        .map(|value| parse_u32("delay_minutes", value))
        .transpose()?;

    Ok(Survey {
        id: SurveyId(row.try_get("id")?),
        name: row.try_get("name")?,
        status,
        trigger_event: row.try_get("trigger_event")?,
        delay_minutes,
    })
}

fn trigger_from_row(row: SqliteRow) -> Result<ScheduledTrigger, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = TriggerStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown trigger status `{status}`")))?;

    Ok(ScheduledTrigger {
        id: TriggerId(row.try_get("id")?),
        survey_id: SurveyId(row.try_get("survey_id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        process_id: ProcessId(row.try_get("process_id")?),
        scheduled_for: parse_timestamp("scheduled_for", row.try_get("scheduled_for")?)?,
        delay_minutes: parse_u32("delay_minutes", row.try_get("delay_minutes")?)?,
        status,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
        responded_at: parse_optional_timestamp("responded_at", row.try_get("responded_at")?)?,
        response_id: row.try_get::<Option<String>, _>("response_id")?.map(ResponseId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn response_from_row(row: SqliteRow) -> Result<SurveyResponse, RepositoryError> {
    Ok(SurveyResponse {
        id: ResponseId(row.try_get("id")?),
        survey_id: SurveyId(row.try_get("survey_id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        process_id: ProcessId(row.try_get("process_id")?),
        score: parse_u8("score", row.try_get("score")?)?,
        comment: row.try_get("comment")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn alert_from_row(row: SqliteRow) -> Result<DetractorAlert, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = AlertStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown alert status `{status}`")))?;

    Ok(DetractorAlert {
        id: AlertId(row.try_get("id")?),
        response_id: ResponseId(row.try_get("response_id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        survey_id: SurveyId(row.try_get("survey_id")?),
        score: parse_u8("score", row.try_get("score")?)?,
        comment: row.try_get("comment")?,
        status,
        acknowledged_by: row.try_get("acknowledged_by")?,
        acknowledged_at: parse_optional_timestamp(
            "acknowledged_at",
            row.try_get("acknowledged_at")?,
        )?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        resolution_notes: row.try_get("resolution_notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
