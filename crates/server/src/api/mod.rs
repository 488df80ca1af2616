//! JSON API under `/api/v1`.
//!
//! Hierarchy:
//! - `GET  /api/v1/employees`                        list directory
//! - `GET  /api/v1/employees/{id}/chain`             managers above, nearest first
//! - `GET  /api/v1/employees/{id}/reports`           direct reports
//! - `GET  /api/v1/employees/{id}/subordinates`      whole subtree
//! - `GET  /api/v1/employees/{id}/moves`             movement history
//! - `GET  /api/v1/hierarchy`                        forest (`expanded` or full, `leaders`)
//! - `GET  /api/v1/hierarchy/stats`                  shape statistics
//! - `POST /api/v1/hierarchy/moves/validate`         dry-run a move
//! - `POST /api/v1/hierarchy/moves`                  apply a move
//!
//! Approvals:
//! - `POST /api/v1/approvals`                        create draft
//! - `GET  /api/v1/approvals/pending`                flows waiting on an approver
//! - `POST /api/v1/approvals/batch-approve`          approve many at one level
//! - `GET  /api/v1/approvals/{jd}`                   flow state
//! - `GET  /api/v1/approvals/{jd}/history`           transition log
//! - `GET  /api/v1/approvals/{jd}/records`           records of every revision
//! - `POST /api/v1/approvals/{jd}/submit|approve|reject|return`
//!
//! NPS:
//! - `POST  /api/v1/nps/triggers`                    schedule after process completion
//! - `POST  /api/v1/nps/triggers/process`            run one poller pass
//! - `POST  /api/v1/nps/responses`                   record a survey response
//! - `GET   /api/v1/nps/alerts`                      open detractor alerts
//! - `PATCH /api/v1/nps/alerts/{id}`                 move an alert along its lifecycle

mod approvals;
mod hierarchy;
mod nps;

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use orgflow_core::audit::AuditContext;
use orgflow_core::errors::{ApplicationError, InterfaceError};
use orgflow_db::DbPool;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::health;
use crate::state::ApiState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

pub fn router(state: ApiState, db_pool: DbPool) -> Router {
    Router::new()
        .merge(hierarchy::routes())
        .merge(approvals::routes())
        .merge(nps::routes())
        .with_state(state)
        .merge(health::router(db_pool))
        .layer(TraceLayer::new_for_http())
}

/// Correlation id and acting user taken from request headers.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation_id: String,
    pub actor: Option<String>,
}

impl RequestContext {
    /// Audit context attributed to the header actor, else `fallback_actor`.
    pub fn audit(&self, fallback_actor: &str) -> AuditContext {
        AuditContext::new(
            self.correlation_id.clone(),
            self.actor.clone().unwrap_or_else(|| fallback_actor.to_owned()),
        )
    }

    pub fn reject(&self, error: ApplicationError) -> ApiError {
        ApiError(error.into_interface(self.correlation_id.clone()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            correlation_id: correlation_id(&parts.headers),
            actor: header_value(&parts.headers, ACTOR_HEADER),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn correlation_id(headers: &HeaderMap) -> String {
    header_value(headers, CORRELATION_HEADER).unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

/// JSON body whose rejection is rendered like every other API error.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(request.headers());
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(InterfaceError::BadRequest {
                message: "malformed request body".to_owned(),
                details: vec![rejection.body_text()],
                correlation_id,
            })),
        }
    }
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
    correlation_id: &'a str,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self.0 {
            InterfaceError::BadRequest { details, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", details.clone())
            }
            InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict", Vec::new()),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", Vec::new()),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", Vec::new())
            }
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", Vec::new())
            }
        };

        if status.is_server_error() {
            warn!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: code,
            message: self.0.user_message(),
            detail: self.0.to_string(),
            details,
            correlation_id: self.0.correlation_id(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use orgflow_core::audit::InMemoryAuditSink;
    use orgflow_core::config::AppConfig;
    use orgflow_core::notify::InMemoryNotificationSink;
    use orgflow_db::{connect_with_settings, migrations, DemoSeedDataset};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::state::{ApiState, AppServices};

    pub(crate) struct TestApp {
        pub router: Router,
        pub notifier: InMemoryNotificationSink,
    }

    pub(crate) async fn test_app() -> TestApp {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        DemoSeedDataset::load(&pool).await.expect("seed");
        let notifier = InMemoryNotificationSink::default();
        let services = AppServices::with_sinks(
            &AppConfig::default(),
            pool.clone(),
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(notifier.clone()),
        )
        .expect("services");

        TestApp { router: router(ApiState { services: Arc::new(services) }, pool), notifier }
    }

    pub(crate) async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-correlation-id", "test-correlation")
            .header("content-type", "application/json");
        let request = builder
            .body(body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty))
            .expect("request");

        let response = app.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_served_next_to_the_api() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn errors_carry_correlation_id_and_user_message() {
        let app = test_app().await;

        let (status, body) =
            send(&app, "GET", "/api/v1/employees/emp-missing/chain", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["correlation_id"], "test-correlation");
        assert_eq!(body["message"], "The requested record does not exist.");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn malformed_body_gets_the_json_error_shape() {
        let app = test_app().await;

        let (status, body) =
            send(&app, "POST", "/api/v1/hierarchy/moves", Some(json!({"employee_id": 7}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["correlation_id"], "test-correlation");
        assert_eq!(body["details"].as_array().map(Vec::len), Some(1));
    }
}
