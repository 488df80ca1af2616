use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use orgflow_core::domain::employee::{
    Employee, EmployeeFilter, EmployeeId, HierarchyMove, HierarchyMoveId,
};

use super::{
    format_timestamp, parse_timestamp, EmployeeRepository, RepositoryError,
};
use crate::DbPool;

const EMPLOYEE_COLUMNS: &str =
    "id, name, email, department_id, position_id, manager_id, active";

#[derive(Clone)]
pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE 1 = 1"));
        if !filter.include_inactive {
            query.push(" AND active = 1");
        }
        if let Some(department_id) = &filter.department_id {
            query.push(" AND department_id = ").push_bind(department_id.clone());
        }
        query.push(" ORDER BY name ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(employee_from_row).collect()
    }

    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(employee_from_row).transpose()
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, name, email, department_id, position_id, manager_id, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                department_id = excluded.department_id,
                position_id = excluded.position_id,
                manager_id = excluded.manager_id,
                active = excluded.active",
        )
        .bind(&employee.id.0)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(&employee.department_id)
        .bind(&employee.position_id)
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(employee.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_move(&self, movement: &HierarchyMove) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // `IS` so that a root (NULL manager) can be the expected value.
        let updated = sqlx::query(
            "UPDATE employee SET manager_id = ? WHERE id = ? AND manager_id IS ?",
        )
        .bind(&movement.new_manager_id.0)
        .bind(&movement.employee_id.0)
        .bind(movement.previous_manager_id.as_ref().map(|id| id.0.as_str()))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO hierarchy_move
                (id, employee_id, previous_manager_id, new_manager_id, moved_by, reason, moved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&movement.id.0)
        .bind(&movement.employee_id.0)
        .bind(movement.previous_manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(&movement.new_manager_id.0)
        .bind(&movement.moved_by)
        .bind(&movement.reason)
        .bind(format_timestamp(movement.moved_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_moves(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<HierarchyMove>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, previous_manager_id, new_manager_id, moved_by, reason, moved_at
             FROM hierarchy_move
             WHERE employee_id = ?
             ORDER BY moved_at ASC, id ASC",
        )
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(move_from_row).collect()
    }
}

fn employee_from_row(row: SqliteRow) -> Result<Employee, RepositoryError> {
    Ok(Employee {
        id: EmployeeId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        department_id: row.try_get("department_id")?,
        position_id: row.try_get("position_id")?,
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(EmployeeId),
        active: row.try_get("active")?,
    })
}

fn move_from_row(row: SqliteRow) -> Result<HierarchyMove, RepositoryError> {
    Ok(HierarchyMove {
        id: HierarchyMoveId(row.try_get("id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        previous_manager_id: row
            .try_get::<Option<String>, _>("previous_manager_id")?
            .map(EmployeeId),
        new_manager_id: EmployeeId(row.try_get("new_manager_id")?),
        moved_by: row.try_get("moved_by")?,
        reason: row.try_get("reason")?,
        moved_at: parse_timestamp("moved_at", row.try_get("moved_at")?)?,
    })
}
