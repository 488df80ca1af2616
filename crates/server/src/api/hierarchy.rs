use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use orgflow_core::domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove};
use orgflow_core::hierarchy::{HierarchyNode, HierarchyStats, MovePlan};
use orgflow_db::services::MoveRequest;
use serde::Deserialize;

use super::{ApiJson, ApiResult, RequestContext};
use crate::state::ApiState;

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/employees", get(list_employees))
        .route("/api/v1/employees/{id}/chain", get(chain_of_command))
        .route("/api/v1/employees/{id}/reports", get(direct_reports))
        .route("/api/v1/employees/{id}/subordinates", get(all_subordinates))
        .route("/api/v1/employees/{id}/moves", get(move_history))
        .route("/api/v1/hierarchy", get(forest))
        .route("/api/v1/hierarchy/stats", get(stats))
        .route("/api/v1/hierarchy/moves/validate", post(validate_move))
        .route("/api/v1/hierarchy/moves", post(apply_move))
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryQuery {
    department_id: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

impl DirectoryQuery {
    fn filter(&self) -> EmployeeFilter {
        EmployeeFilter {
            department_id: self.department_id.clone(),
            include_inactive: self.include_inactive,
        }
    }
}

/// `expanded` is a comma-separated id list; without it the whole tree is
/// materialised. `leaders=true` keeps only roots and managers.
#[derive(Debug, Default, Deserialize)]
struct ForestQuery {
    department_id: Option<String>,
    #[serde(default)]
    include_inactive: bool,
    expanded: Option<String>,
    #[serde(default)]
    leaders: bool,
}

async fn list_employees(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Json<Vec<Employee>>> {
    let employees =
        state.services.hierarchy.employees(&query.filter()).await.map_err(|e| ctx.reject(e))?;
    Ok(Json(employees))
}

async fn forest(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Query(query): Query<ForestQuery>,
) -> ApiResult<Json<Vec<HierarchyNode>>> {
    let hierarchy = &state.services.hierarchy;
    let filter = EmployeeFilter {
        department_id: query.department_id.clone(),
        include_inactive: query.include_inactive,
    };

    let nodes = if query.leaders {
        hierarchy.leaders(&filter).await
    } else if let Some(expanded) = query.expanded.as_deref() {
        let expanded: HashSet<EmployeeId> = expanded
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(EmployeeId::new)
            .collect();
        hierarchy.forest(&filter, &expanded).await
    } else {
        hierarchy.full_forest(&filter).await
    };

    nodes.map(Json).map_err(|e| ctx.reject(e))
}

async fn stats(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Json<HierarchyStats>> {
    state.services.hierarchy.stats(&query.filter()).await.map(Json).map_err(|e| ctx.reject(e))
}

async fn chain_of_command(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Employee>>> {
    state
        .services
        .hierarchy
        .chain_of_command(&EmployeeId::new(id))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn direct_reports(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Employee>>> {
    state
        .services
        .hierarchy
        .direct_reports(&EmployeeId::new(id))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn all_subordinates(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Employee>>> {
    state
        .services
        .hierarchy
        .all_subordinates(&EmployeeId::new(id))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn move_history(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<HierarchyMove>>> {
    state
        .services
        .hierarchy
        .move_history(&EmployeeId::new(id))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn validate_move(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<MoveRequest>,
) -> ApiResult<Json<MovePlan>> {
    state
        .services
        .hierarchy
        .validate_move(&request.employee_id, &request.new_manager_id)
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn apply_move(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<MoveRequest>,
) -> ApiResult<(StatusCode, Json<HierarchyMove>)> {
    let movement = state
        .services
        .hierarchy
        .apply_move(&request, &ctx.audit("anonymous"))
        .await
        .map_err(|e| ctx.reject(e))?;
    Ok((StatusCode::CREATED, Json(movement)))
}
