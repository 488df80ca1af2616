use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_EMPLOYEE_IDS: &[&str] =
    &["emp-ceo", "emp-hrd", "emp-eng", "emp-hrbp", "emp-lead", "emp-dev1", "emp-dev2", "emp-gone"];

const SEED_SURVEY_IDS: &[&str] = &["survey-pdi-pulse", "survey-onboarding"];

/// Expected reporting lines of the demo organisation.
const SEED_REPORTING_LINES: &[SeedReportingLine] = &[
    SeedReportingLine { employee_id: "emp-ceo", manager_id: None, label: "ceo-is-root" },
    SeedReportingLine {
        employee_id: "emp-hrbp",
        manager_id: Some("emp-hrd"),
        label: "hrbp-reports-to-hr-director",
    },
    SeedReportingLine {
        employee_id: "emp-dev1",
        manager_id: Some("emp-lead"),
        label: "engineer-reports-to-lead",
    },
];

/// Deterministic demo organisation: a small two-branch hierarchy with one
/// inactive employee, an active post-process survey and a closed one.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            employees_seeded: SEED_EMPLOYEE_IDS.len(),
            surveys_seeded: SEED_SURVEY_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let employees = sql_array_from_ids(SEED_EMPLOYEE_IDS);
        let employee_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM employee WHERE id IN {employees}"))
                .fetch_one(pool)
                .await?;
        checks.push(("employees", employee_count == SEED_EMPLOYEE_IDS.len() as i64));

        let surveys = sql_array_from_ids(SEED_SURVEY_IDS);
        let survey_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM survey WHERE id IN {surveys}"))
                .fetch_one(pool)
                .await?;
        checks.push(("surveys", survey_count == SEED_SURVEY_IDS.len() as i64));

        let active_surveys: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM survey WHERE trigger_event = 'process_completed' AND status = 'active'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("single-active-survey", active_surveys == 1));

        for line in SEED_REPORTING_LINES {
            let matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM employee WHERE id = ?1 AND manager_id IS ?2)",
            )
            .bind(line.employee_id)
            .bind(line.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((line.label, matches == 1));
        }

        let inactive: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employee WHERE id = 'emp-gone' AND active = 0)")
                .fetch_one(pool)
                .await?;
        checks.push(("inactive-employee", inactive == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows and anything recorded against them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let employees = sql_array_from_ids(SEED_EMPLOYEE_IDS);
        let surveys = sql_array_from_ids(SEED_SURVEY_IDS);

        sqlx::query(&format!("DELETE FROM detractor_alert WHERE survey_id IN {surveys}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM survey_response WHERE survey_id IN {surveys}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM scheduled_trigger WHERE survey_id IN {surveys}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM survey WHERE id IN {surveys}")).execute(&mut *tx).await?;
        sqlx::query(&format!("DELETE FROM hierarchy_move WHERE employee_id IN {employees}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM employee WHERE id IN {employees}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedReportingLine {
    employee_id: &'static str,
    manager_id: Option<&'static str>,
    label: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub employees_seeded: usize,
    pub surveys_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
