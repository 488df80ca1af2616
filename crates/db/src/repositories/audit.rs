use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};
use tokio::runtime::Handle;
use tracing::warn;

use orgflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Writes audit events to `audit_event`. `emit` is fire-and-forget: the
/// insert runs on the current tokio runtime and failures are only logged.
#[derive(Clone)]
pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event
                (id, subject_id, correlation_id, event_type, category, actor, outcome,
                 metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.subject_id)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(format_timestamp(event.occurred_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, subject_id, correlation_id, event_type, category, actor, outcome,
                    metadata_json, occurred_at
             FROM audit_event
             WHERE subject_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(audit_event_from_row).collect()
    }
}

impl AuditSink for SqlAuditSink {
    fn emit(&self, event: AuditEvent) {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                event_name = "audit.emit.no_runtime",
                correlation_id = %event.correlation_id,
                event_type = %event.event_type,
                "audit event dropped outside of a tokio runtime"
            );
            return;
        };

        let sink = self.clone();
        handle.spawn(async move {
            if let Err(error) = sink.record(&event).await {
                warn!(
                    event_name = "audit.emit.failed",
                    correlation_id = %event.correlation_id,
                    event_type = %event.event_type,
                    error = %error,
                    "failed to persist audit event"
                );
            }
        });
    }
}

fn audit_event_from_row(row: SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category: String = row.try_get("category")?;
    let category = parse_category(&category)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit category `{category}`")))?;
    let outcome: String = row.try_get("outcome")?;
    let outcome = parse_outcome(&outcome)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit outcome `{outcome}`")))?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid metadata_json: {error}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        category,
        actor: row.try_get("actor")?,
        outcome,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn parse_category(value: &str) -> Option<AuditCategory> {
    [
        AuditCategory::Hierarchy,
        AuditCategory::Workflow,
        AuditCategory::Nps,
        AuditCategory::Persistence,
        AuditCategory::System,
    ]
    .into_iter()
    .find(|category| category.as_str() == value)
}

fn parse_outcome(value: &str) -> Option<AuditOutcome> {
    [AuditOutcome::Success, AuditOutcome::Rejected, AuditOutcome::Failed]
        .into_iter()
        .find(|outcome| outcome.as_str() == value)
}

#[cfg(test)]
mod tests {
    use orgflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};

    use super::SqlAuditSink;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn recorded_events_round_trip_with_metadata() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let sink = SqlAuditSink::new(pool.clone());

        let event = AuditEvent::new(
            Some("E-3".to_string()),
            &AuditContext::new("req-1", "hr-admin"),
            "hierarchy.move.applied",
            AuditCategory::Hierarchy,
            AuditOutcome::Success,
        )
        .with_metadata("new_manager_id", "E-2");
        sink.record(&event).await.expect("record");

        let stored = sink.list_for_subject("E-3").await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, "hierarchy.move.applied");
        assert_eq!(stored[0].metadata.get("new_manager_id").map(String::as_str), Some("E-2"));
        assert_eq!(stored[0].category, AuditCategory::Hierarchy);

        pool.close().await;
    }
}
