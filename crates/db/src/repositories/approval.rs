use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use orgflow_core::domain::approval::{
    ApprovalFlow, ApprovalFlowId, ApprovalRecord, FlowStatus, JobDescriptionId, RecordStatus,
    WorkflowAction, WorkflowHistoryEntry, WorkflowHistoryId,
};
use orgflow_core::domain::employee::EmployeeId;
use orgflow_core::workflow::ApprovalTransition;

use super::{
    format_optional_timestamp, format_timestamp, parse_optional_timestamp, parse_timestamp,
    parse_u32, parse_u8, ApprovalFlowRepository, RepositoryError, RevisionedRecord,
};
use crate::DbPool;

const FLOW_COLUMNS: &str = "id, job_description_id, requested_by, revision, current_level, status,
     state_version, created_at, updated_at";

#[derive(Clone)]
pub struct SqlApprovalFlowRepository {
    pool: DbPool,
}

impl SqlApprovalFlowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_current_records(
        &self,
        row: Option<SqliteRow>,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut flow = flow_from_row(row)?;
        flow.approvals = self
            .records(&flow.id)
            .await?
            .into_iter()
            .filter(|stored| stored.revision == flow.revision)
            .map(|stored| stored.record)
            .collect();
        Ok(Some(flow))
    }
}

#[async_trait::async_trait]
impl ApprovalFlowRepository for SqlApprovalFlowRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalFlowId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {FLOW_COLUMNS} FROM approval_flow WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        self.with_current_records(row).await
    }

    async fn find_by_job_description(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow WHERE job_description_id = ?"
        ))
        .bind(&job_description_id.0)
        .fetch_optional(&self.pool)
        .await?;

        self.with_current_records(row).await
    }

    async fn insert_draft(&self, transition: &ApprovalTransition) -> Result<bool, RepositoryError> {
        let flow = &transition.flow;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO approval_flow
                (id, job_description_id, requested_by, revision, current_level, status,
                 state_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(job_description_id) DO NOTHING",
        )
        .bind(&flow.id.0)
        .bind(&flow.job_description_id.0)
        .bind(&flow.requested_by.0)
        .bind(i64::from(flow.revision))
        .bind(i64::from(flow.current_level))
        .bind(flow.status.as_string())
        .bind(i64::from(flow.state_version))
        .bind(format_timestamp(flow.created_at))
        .bind(format_timestamp(flow.updated_at))
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_history(&mut tx, &transition.history).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn save_transition(
        &self,
        transition: &ApprovalTransition,
    ) -> Result<bool, RepositoryError> {
        let flow = &transition.flow;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE approval_flow
             SET revision = ?, current_level = ?, status = ?, state_version = ?, updated_at = ?
             WHERE id = ? AND state_version = ?",
        )
        .bind(i64::from(flow.revision))
        .bind(i64::from(flow.current_level))
        .bind(flow.status.as_string())
        .bind(i64::from(flow.state_version))
        .bind(format_timestamp(flow.updated_at))
        .bind(&flow.id.0)
        .bind(i64::from(transition.expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for record in &flow.approvals {
            sqlx::query(
                "INSERT INTO approval_record
                    (flow_id, revision, level, level_key, approver_id, status, comments, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(flow_id, revision, level) DO UPDATE SET
                    level_key = excluded.level_key,
                    approver_id = excluded.approver_id,
                    status = excluded.status,
                    comments = excluded.comments,
                    decided_at = excluded.decided_at",
            )
            .bind(&flow.id.0)
            .bind(i64::from(flow.revision))
            .bind(i64::from(record.level))
            .bind(&record.level_key)
            .bind(&record.approver_id.0)
            .bind(record.status.as_str())
            .bind(&record.comments)
            .bind(format_optional_timestamp(record.decided_at))
            .execute(&mut *tx)
            .await?;
        }

        insert_history(&mut tx, &transition.history).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn history(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, flow_id, job_description_id, revision, action, level, actor_id, comments,
                    previous_status, new_status, occurred_at
             FROM workflow_history
             WHERE flow_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&flow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    async fn records(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<RevisionedRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT revision, level, level_key, approver_id, status, comments, decided_at
             FROM approval_record
             WHERE flow_id = ?
             ORDER BY revision ASC, level ASC",
        )
        .bind(&flow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn pending_for_approver(
        &self,
        level: u8,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT f.id
             FROM approval_flow f
             JOIN approval_record r ON r.flow_id = f.id AND r.revision = f.revision
             WHERE r.level = ? AND r.approver_id = ? AND r.status = 'pending'
               AND f.current_level = ? AND f.status = ?
             ORDER BY f.updated_at ASC, f.id ASC",
        )
        .bind(i64::from(level))
        .bind(&approver_id.0)
        .bind(i64::from(level))
        .bind(FlowStatus::PendingLevel(level).as_string())
        .fetch_all(&self.pool)
        .await?;

        let mut flows = Vec::with_capacity(rows.len());
        for row in rows {
            let id = ApprovalFlowId(row.try_get("id")?);
            if let Some(flow) = self.find_by_id(&id).await? {
                flows.push(flow);
            }
        }
        Ok(flows)
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &WorkflowHistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO workflow_history
            (id, flow_id, job_description_id, revision, action, level, actor_id, comments,
             previous_status, new_status, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.flow_id.0)
    .bind(&entry.job_description_id.0)
    .bind(i64::from(entry.revision))
    .bind(entry.action.as_str())
    .bind(i64::from(entry.level))
    .bind(&entry.actor_id.0)
    .bind(&entry.comments)
    .bind(entry.previous_status.as_string())
    .bind(entry.new_status.as_string())
    .bind(format_timestamp(entry.occurred_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn flow_status(column: &str, raw: String) -> Result<FlowStatus, RepositoryError> {
    FlowStatus::parse(&raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown flow status in `{column}`: `{raw}`")))
}

fn flow_from_row(row: SqliteRow) -> Result<ApprovalFlow, RepositoryError> {
    Ok(ApprovalFlow {
        id: ApprovalFlowId(row.try_get("id")?),
        job_description_id: JobDescriptionId(row.try_get("job_description_id")?),
        requested_by: EmployeeId(row.try_get("requested_by")?),
        revision: parse_u32("revision", row.try_get("revision")?)?,
        current_level: parse_u8("current_level", row.try_get("current_level")?)?,
        status: flow_status("status", row.try_get("status")?)?,
        approvals: Vec::new(),
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn record_from_row(row: SqliteRow) -> Result<RevisionedRecord, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = RecordStatus::parse(&status).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval record status `{status}`"))
    })?;

    Ok(RevisionedRecord {
        revision: parse_u32("revision", row.try_get("revision")?)?,
        record: ApprovalRecord {
            level: parse_u8("level", row.try_get("level")?)?,
            level_key: row.try_get("level_key")?,
            approver_id: EmployeeId(row.try_get("approver_id")?),
            status,
            comments: row.try_get("comments")?,
            decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
        },
    })
}

fn history_from_row(row: SqliteRow) -> Result<WorkflowHistoryEntry, RepositoryError> {
    let action: String = row.try_get("action")?;
    let action = WorkflowAction::parse(&action)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown workflow action `{action}`")))?;

    Ok(WorkflowHistoryEntry {
        id: WorkflowHistoryId(row.try_get("id")?),
        flow_id: ApprovalFlowId(row.try_get("flow_id")?),
        job_description_id: JobDescriptionId(row.try_get("job_description_id")?),
        revision: parse_u32("revision", row.try_get("revision")?)?,
        action,
        level: parse_u8("level", row.try_get("level")?)?,
        actor_id: EmployeeId(row.try_get("actor_id")?),
        comments: row.try_get("comments")?,
        previous_status: flow_status("previous_status", row.try_get("previous_status")?)?,
        new_status: flow_status("new_status", row.try_get("new_status")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
