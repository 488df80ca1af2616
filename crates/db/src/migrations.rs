use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "employee",
        "hierarchy_move",
        "approval_flow",
        "approval_record",
        "workflow_history",
        "survey",
        "scheduled_trigger",
        "survey_response",
        "detractor_alert",
        "audit_event",
        "idx_employee_manager_id",
        "idx_employee_department_id",
        "idx_hierarchy_move_employee_id",
        "idx_approval_flow_status",
        "idx_approval_record_approver",
        "idx_workflow_history_flow_id",
        "idx_survey_trigger_event",
        "idx_scheduled_trigger_pending_tuple",
        "idx_scheduled_trigger_due",
        "idx_survey_response_tuple",
        "idx_detractor_alert_status",
        "idx_audit_event_subject_id",
        "idx_audit_event_occurred_at",
        "idx_audit_event_type",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in [
            "employee",
            "hierarchy_move",
            "approval_flow",
            "approval_record",
            "workflow_history",
            "scheduled_trigger",
            "detractor_alert",
            "audit_event",
        ] {
            assert_eq!(table_count(&pool, table).await, 1, "missing table `{table}`");
        }
    }

    #[tokio::test]
    async fn pending_trigger_tuple_is_unique_only_while_pending() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO survey (id, name, status, trigger_event) VALUES ('S-1', 'pulse', 'active', 'process_completed')",
        )
        .execute(&pool)
        .await
        .expect("insert survey");

        let insert = "INSERT INTO scheduled_trigger
            (id, survey_id, employee_id, process_id, scheduled_for, delay_minutes, status, created_at, updated_at)
            VALUES (?, 'S-1', 'E-1', 'P-1', '2026-05-04T12:00:00.000000Z', 0, ?, '2026-05-04T12:00:00.000000Z', '2026-05-04T12:00:00.000000Z')";

        sqlx::query(insert).bind("T-1").bind("pending").execute(&pool).await.expect("first");
        let duplicate = sqlx::query(insert).bind("T-2").bind("pending").execute(&pool).await;
        assert!(duplicate.is_err(), "second pending trigger for the tuple must be refused");

        sqlx::query(insert).bind("T-3").bind("sent").execute(&pool).await.expect("sent row");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "employee").await, 0);
        assert_eq!(table_count(&pool, "approval_flow").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
