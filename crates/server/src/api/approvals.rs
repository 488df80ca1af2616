use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use orgflow_core::domain::approval::{ApprovalFlow, JobDescriptionId, WorkflowHistoryEntry};
use orgflow_core::domain::employee::EmployeeId;
use orgflow_core::workflow::ApproverAssignments;
use orgflow_db::repositories::RevisionedRecord;
use orgflow_db::services::BatchApprovalReport;
use serde::Deserialize;

use super::{ApiJson, ApiResult, RequestContext};
use crate::state::ApiState;

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/approvals", post(create_draft))
        .route("/api/v1/approvals/pending", get(pending_for_approver))
        .route("/api/v1/approvals/batch-approve", post(approve_batch))
        .route("/api/v1/approvals/{jd}", get(flow))
        .route("/api/v1/approvals/{jd}/history", get(history))
        .route("/api/v1/approvals/{jd}/records", get(records))
        .route("/api/v1/approvals/{jd}/submit", post(submit))
        .route("/api/v1/approvals/{jd}/approve", post(approve))
        .route("/api/v1/approvals/{jd}/reject", post(reject))
        .route("/api/v1/approvals/{jd}/return", post(return_flow))
}

#[derive(Debug, Deserialize)]
struct CreateDraft {
    job_description_id: JobDescriptionId,
    requested_by: EmployeeId,
}

#[derive(Debug, Deserialize)]
struct Submit {
    actor: EmployeeId,
    approvers: ApproverAssignments,
}

#[derive(Debug, Deserialize)]
struct Decision {
    level: u8,
    actor: EmployeeId,
    comments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchApprove {
    level: u8,
    actor: EmployeeId,
    job_description_ids: Vec<JobDescriptionId>,
    comments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    level: u8,
    approver_id: String,
}

async fn create_draft(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<CreateDraft>,
) -> ApiResult<(StatusCode, Json<ApprovalFlow>)> {
    let audit = ctx.audit(body.requested_by.as_str());
    let flow = state
        .services
        .approvals
        .create_draft(body.job_description_id, body.requested_by, &audit)
        .await
        .map_err(|e| ctx.reject(e))?;
    Ok((StatusCode::CREATED, Json(flow)))
}

async fn flow(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
) -> ApiResult<Json<ApprovalFlow>> {
    state.services.approvals.flow(&JobDescriptionId(jd)).await.map(Json).map_err(|e| ctx.reject(e))
}

async fn history(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
) -> ApiResult<Json<Vec<WorkflowHistoryEntry>>> {
    state
        .services
        .approvals
        .history(&JobDescriptionId(jd))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn records(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
) -> ApiResult<Json<Vec<RevisionedRecord>>> {
    state
        .services
        .approvals
        .records(&JobDescriptionId(jd))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn submit(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
    ApiJson(body): ApiJson<Submit>,
) -> ApiResult<Json<ApprovalFlow>> {
    let audit = ctx.audit(body.actor.as_str());
    state
        .services
        .approvals
        .submit(&JobDescriptionId(jd), &body.actor, &body.approvers, &audit)
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn approve(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
    ApiJson(body): ApiJson<Decision>,
) -> ApiResult<Json<ApprovalFlow>> {
    let audit = ctx.audit(body.actor.as_str());
    state
        .services
        .approvals
        .approve(&JobDescriptionId(jd), body.level, &body.actor, body.comments, &audit)
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

// Missing comments reach the workflow as empty text and fail its length rule.
async fn reject(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
    ApiJson(body): ApiJson<Decision>,
) -> ApiResult<Json<ApprovalFlow>> {
    let audit = ctx.audit(body.actor.as_str());
    let comments = body.comments.unwrap_or_default();
    state
        .services
        .approvals
        .reject(&JobDescriptionId(jd), body.level, &body.actor, &comments, &audit)
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn return_flow(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(jd): Path<String>,
    ApiJson(body): ApiJson<Decision>,
) -> ApiResult<Json<ApprovalFlow>> {
    let audit = ctx.audit(body.actor.as_str());
    let comments = body.comments.unwrap_or_default();
    state
        .services
        .approvals
        .return_flow(&JobDescriptionId(jd), body.level, &body.actor, &comments, &audit)
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

async fn approve_batch(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<BatchApprove>,
) -> Json<BatchApprovalReport> {
    let audit = ctx.audit(body.actor.as_str());
    Json(
        state
            .services
            .approvals
            .approve_batch(body.level, &body.actor, &body.job_description_ids, body.comments, &audit)
            .await,
    )
}

async fn pending_for_approver(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<Vec<ApprovalFlow>>> {
    state
        .services
        .approvals
        .pending_for_approver(query.level, &EmployeeId::new(query.approver_id))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::api::tests::{send, test_app, TestApp};

    async fn submitted(app: &TestApp, jd: &str) {
        let (status, _) = send(
            app,
            "POST",
            "/api/v1/approvals",
            Some(json!({"job_description_id": jd, "requested_by": "emp-dev1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, flow) = send(
            app,
            "POST",
            &format!("/api/v1/approvals/{jd}/submit"),
            Some(json!({
                "actor": "emp-dev1",
                "approvers": {
                    "cs_specialist": "emp-hrbp",
                    "direct_leader": "emp-lead",
                    "hr_manager": "emp-hrd",
                    "gai_director": "emp-ceo"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(flow["status"], "pending_level_1");
    }

    fn decision(level: u8, actor: &str, comments: Option<&str>) -> Option<Value> {
        Some(json!({"level": level, "actor": actor, "comments": comments}))
    }

    #[tokio::test]
    async fn approval_advances_one_level_and_shows_in_next_queue() {
        let app = test_app().await;
        submitted(&app, "JD-100").await;

        let (status, flow) = send(
            &app,
            "POST",
            "/api/v1/approvals/JD-100/approve",
            decision(1, "emp-hrbp", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(flow["status"], "pending_level_2");

        let (_, queue) =
            send(&app, "GET", "/api/v1/approvals/pending?level=2&approver_id=emp-lead", None).await;
        assert_eq!(queue.as_array().map(Vec::len), Some(1));

        let (_, history) = send(&app, "GET", "/api/v1/approvals/JD-100/history", None).await;
        assert_eq!(history.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn duplicate_draft_conflicts_and_unknown_flow_is_not_found() {
        let app = test_app().await;
        submitted(&app, "JD-200").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/approvals",
            Some(json!({"job_description_id": "JD-200", "requested_by": "emp-dev1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["retryable"], true);

        let (status, _) = send(&app, "GET", "/api/v1/approvals/JD-404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reject_needs_comment_and_wrong_level_is_refused() {
        let app = test_app().await;
        submitted(&app, "JD-300").await;

        let (status, _) =
            send(&app, "POST", "/api/v1/approvals/JD-300/reject", decision(1, "emp-hrbp", None))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/approvals/JD-300/approve",
            decision(2, "emp-lead", None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, flow) = send(
            &app,
            "POST",
            "/api/v1/approvals/JD-300/return",
            decision(1, "emp-hrbp", Some("missing salary band for the role")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(flow["status"], "returned");
    }

    #[tokio::test]
    async fn batch_reports_each_item() {
        let app = test_app().await;
        submitted(&app, "JD-400").await;

        let (status, report) = send(
            &app,
            "POST",
            "/api/v1/approvals/batch-approve",
            Some(json!({
                "level": 1,
                "actor": "emp-hrbp",
                "job_description_ids": ["JD-400", "JD-404"],
                "comments": null
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["approved"], json!(["JD-400"]));
        assert_eq!(report["failed"][0]["job_description_id"], "JD-404");
        assert!(!app.notifier.sent().is_empty());
    }
}
