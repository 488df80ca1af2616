use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use orgflow_core::domain::nps::{AlertId, AlertStatus, DetractorAlert};
use orgflow_core::nps::TriggerRequest;
use orgflow_db::services::{AlertView, NewResponse, ProcessReport, RecordedResponse, ScheduleOutcome};
use serde::Deserialize;

use super::{ApiJson, ApiResult, RequestContext};
use crate::state::ApiState;

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/nps/triggers", post(schedule))
        .route("/api/v1/nps/triggers/process", post(process_pending))
        .route("/api/v1/nps/responses", post(record_response))
        .route("/api/v1/nps/alerts", get(pending_alerts))
        .route("/api/v1/nps/alerts/{id}", patch(update_alert))
}

#[derive(Debug, Deserialize)]
struct AlertUpdate {
    status: AlertStatus,
    notes: Option<String>,
}

/// Refusals are answers, not errors; only a storage failure maps to 503.
async fn schedule(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<TriggerRequest>,
) -> (StatusCode, Json<ScheduleOutcome>) {
    let outcome = state.services.nps.schedule(&request, &ctx.audit("process-engine")).await;
    let status = match &outcome {
        ScheduleOutcome::Scheduled { .. } => StatusCode::CREATED,
        ScheduleOutcome::Refused { .. } => StatusCode::OK,
        ScheduleOutcome::Failed { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome))
}

async fn process_pending(State(state): State<ApiState>) -> Json<ProcessReport> {
    Json(state.services.nps.process_pending().await)
}

async fn record_response(
    State(state): State<ApiState>,
    ctx: RequestContext,
    ApiJson(input): ApiJson<NewResponse>,
) -> ApiResult<(StatusCode, Json<RecordedResponse>)> {
    let audit = ctx.audit(input.employee_id.as_str());
    let recorded =
        state.services.nps.record_response(input, &audit).await.map_err(|e| ctx.reject(e))?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

async fn pending_alerts(State(state): State<ApiState>) -> Json<Vec<AlertView>> {
    Json(state.services.nps.pending_alerts().await)
}

async fn update_alert(
    State(state): State<ApiState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<AlertUpdate>,
) -> ApiResult<Json<DetractorAlert>> {
    state
        .services
        .nps
        .update_alert_status(&AlertId(id), update.status, update.notes, &ctx.audit("anonymous"))
        .await
        .map(Json)
        .map_err(|e| ctx.reject(e))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::tests::{send, test_app};

    #[tokio::test]
    async fn trigger_is_scheduled_once_and_sent_by_a_pass() {
        let app = test_app().await;
        let request = json!({"process_id": "P-1", "employee_id": "emp-dev1", "delay_minutes": 0});

        let (status, outcome) =
            send(&app, "POST", "/api/v1/nps/triggers", Some(request.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(outcome["outcome"], "scheduled");

        let (status, again) = send(&app, "POST", "/api/v1/nps/triggers", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["outcome"], "refused");
        assert_eq!(again["refusal"]["reason"], "already_pending");

        let (_, report) = send(&app, "POST", "/api/v1/nps/triggers/process", None).await;
        assert_eq!(report["sent"], 1);
        assert_eq!(report["errors"], 0);
        assert!(app.notifier.sent().iter().any(|n| n.title == "New survey: Post-PDI pulse"));
    }

    #[tokio::test]
    async fn detractor_response_opens_alert_that_moves_forward_only() {
        let app = test_app().await;

        let (status, recorded) = send(
            &app,
            "POST",
            "/api/v1/nps/responses",
            Some(json!({
                "survey_id": "survey-pdi-pulse",
                "employee_id": "emp-dev1",
                "process_id": "P-9",
                "score": 3,
                "comment": "  too slow  "
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(recorded["response"]["comment"], "too slow");
        let alert_id = recorded["alert"]["id"].as_str().unwrap_or_default().to_owned();
        assert!(!alert_id.is_empty());

        let (_, queue) = send(&app, "GET", "/api/v1/nps/alerts", None).await;
        assert_eq!(queue[0]["employee_name"], "Diego Rocha");

        let uri = format!("/api/v1/nps/alerts/{alert_id}");
        let (status, alert) = send(
            &app,
            "PATCH",
            &uri,
            Some(json!({"status": "acknowledged", "notes": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alert["status"], "acknowledged");

        let (status, _) =
            send(&app, "PATCH", &uri, Some(json!({"status": "new", "notes": null}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_scale_score_is_bad_request() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/nps/responses",
            Some(json!({
                "survey_id": "survey-pdi-pulse",
                "employee_id": "emp-dev1",
                "process_id": "P-10",
                "score": 11,
                "comment": null
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }
}
