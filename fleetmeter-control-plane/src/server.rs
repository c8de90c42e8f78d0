//! Admin HTTP API.
//!
//! Every JSON route answers with the `{success, data, error}` envelope.
//! `/metrics` answers with the Prometheus text format.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use fleetmeter_core::ErrorResponse;
use serde::Serialize;
use tracing::{info, warn};

use crate::shared::error::ControlPlaneError;
use crate::shared::types::{
    Capacity, LifecycleEvent, PoolKind, PoolResponse, RegisterPoolRequest, ResizePoolRequest,
    SetDesiredRequest,
};
use crate::ClusterStack;

#[derive(Clone)]
pub struct AdminState {
    pub stack: Arc<ClusterStack>,
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn status_for(error: &ControlPlaneError) -> StatusCode {
    if error.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    if error.is_capacity_error() {
        return StatusCode::CONFLICT;
    }
    match error {
        ControlPlaneError::InvalidRequest(_) | ControlPlaneError::ValidationError(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn envelope_error(status: StatusCode, error: ErrorResponse) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error),
        }),
    )
        .into_response()
}

fn error_response(error: ControlPlaneError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "Admin request failed");
    }
    envelope_error(status, error.into())
}

/// Body that failed to deserialize: 400 with the extractor's reason attached.
fn rejection_response(rejection: JsonRejection) -> Response {
    let mut details = HashMap::new();
    details.insert("reason".to_string(), rejection.body_text());
    let error: ErrorResponse =
        ControlPlaneError::InvalidRequest("malformed request body".to_string()).into();
    envelope_error(StatusCode::BAD_REQUEST, error.with_details(details))
}

fn parse_pool_kind(raw: &str) -> Result<PoolKind, ControlPlaneError> {
    raw.parse::<PoolKind>()
        .map_err(|_| ControlPlaneError::InvalidRequest(format!("unknown pool kind '{raw}'")))
}

pub fn admin_router(stack: Arc<ClusterStack>) -> Router {
    Router::new()
        .route("/pools", get(list_pools).post(register_pool))
        .route(
            "/pools/:kind",
            get(get_pool).put(resize_pool).delete(deregister_pool),
        )
        .route("/services", get(list_services))
        .route("/services/:name/desired", put(set_desired))
        .route("/services/:name/reconcile", post(reconcile_service))
        .route("/status", get(list_status))
        .route("/status/backfill", post(backfill_status))
        .route("/status/:task_id", get(get_status))
        .route("/events", post(ingest_event))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AdminState { stack })
}

// ── Pools ──────────────────────────────────────────────────────

/// GET /pools
pub async fn list_pools(State(state): State<AdminState>) -> Response {
    match state.stack.registry().list_pools().await {
        Ok(pools) => {
            let pools: Vec<PoolResponse> = pools.iter().map(PoolResponse::from).collect();
            ApiResponse::ok(pools).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /pools/:kind
pub async fn get_pool(State(state): State<AdminState>, Path(kind): Path<String>) -> Response {
    let kind = match parse_pool_kind(&kind) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    match state.stack.registry().pool(kind).await {
        Ok(pool) => ApiResponse::ok(PoolResponse::from(&pool)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /pools
pub async fn register_pool(
    State(state): State<AdminState>,
    payload: Result<Json<RegisterPoolRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };
    let capacity = Capacity::from_units(req.capacity);
    match state.stack.register_pool(req.kind, capacity).await {
        Ok(pool) => (StatusCode::CREATED, ApiResponse::ok(PoolResponse::from(&pool))).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /pools/:kind
pub async fn resize_pool(
    State(state): State<AdminState>,
    Path(kind): Path<String>,
    payload: Result<Json<ResizePoolRequest>, JsonRejection>,
) -> Response {
    let kind = match parse_pool_kind(&kind) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };
    let capacity = Capacity::from_units(req.capacity);
    match state.stack.registry().resize_pool(kind, capacity).await {
        Ok(pool) => ApiResponse::ok(PoolResponse::from(&pool)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /pools/:kind
pub async fn deregister_pool(
    State(state): State<AdminState>,
    Path(kind): Path<String>,
) -> Response {
    let kind = match parse_pool_kind(&kind) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    match state.stack.registry().deregister_pool(kind).await {
        Ok(()) => ApiResponse::ok(kind).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Services ───────────────────────────────────────────────────

/// GET /services
pub async fn list_services(State(state): State<AdminState>) -> Response {
    match state.stack.describe_services().await {
        Ok(services) => ApiResponse::ok(services).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /services/:name/desired
pub async fn set_desired(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    payload: Result<Json<SetDesiredRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.stack.set_desired(&name, req.count).await {
        Ok(record) => {
            info!(service = %name, desired = record.desired_count, "Desired count set via admin API");
            ApiResponse::ok(record).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /services/:name/reconcile
pub async fn reconcile_service(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Response {
    match state.stack.reconcile_service(&name).await {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /status
pub async fn list_status(State(state): State<AdminState>) -> Response {
    match state.stack.recorder().list().await {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /status/:task_id
pub async fn get_status(
    State(state): State<AdminState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.stack.get_status(&task_id).await {
        Ok(entry) => ApiResponse::ok(entry).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /status/backfill
pub async fn backfill_status(State(state): State<AdminState>) -> Response {
    match state.stack.backfill_status().await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Events ─────────────────────────────────────────────────────

/// POST /events
pub async fn ingest_event(State(state): State<AdminState>, body: String) -> Response {
    let event = match LifecycleEvent::from_json(&body) {
        Ok(event) => event,
        Err(e) => return error_response(e.into()),
    };
    let task_id = event.task_id().to_string();
    match state.stack.ingest(event) {
        Ok(()) => (StatusCode::ACCEPTED, ApiResponse::ok(task_id)).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AdminState>) -> Response {
    match state.stack.metrics().render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlPlaneConfig;
    use crate::shared::types::TaskStatus;
    use crate::{ELASTIC_SERVICE, FIXED_SERVICE};
    use axum::body::{to_bytes, Body};
    use axum::extract::FromRequest;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use chrono::Utc;
    use fleetmeter_core::TaskStateDetail;
    use serde::de::DeserializeOwned;
    use serde_json::Value;

    async fn test_state() -> AdminState {
        let stack = ClusterStack::bootstrap(ControlPlaneConfig::default())
            .await
            .unwrap();
        AdminState {
            stack: Arc::new(stack),
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Run the JSON extractor over a raw body, as the router would.
    async fn json_payload<T: DeserializeOwned>(raw: &'static str) -> Result<Json<T>, JsonRejection> {
        let req = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .unwrap();
        Json::<T>::from_request(req, &()).await
    }

    fn event_body(task_id: &str, status: TaskStatus) -> String {
        let event = LifecycleEvent::task_state_change(TaskStateDetail::new(
            task_id,
            status,
            Utc::now(),
        ));
        serde_json::to_string(&event).unwrap()
    }

    async fn assert_bad_request(resp: Response, code: &str) -> Value {
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["error_code"], code);
        body
    }

    #[tokio::test]
    async fn list_pools_reports_capacity() {
        let state = test_state().await;
        let resp = list_pools(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        let pools = body["data"].as_array().unwrap();
        assert_eq!(pools.len(), 2);
    }

    #[tokio::test]
    async fn get_pool_rejects_unknown_kind() {
        let state = test_state().await;
        let resp = get_pool(State(state), Path("spot".to_string())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["error_code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn register_pool_resizes() {
        let state = test_state().await;
        let req = RegisterPoolRequest {
            kind: PoolKind::Fixed,
            capacity: Some(5),
        };
        let resp = register_pool(State(state.clone()), Ok(Json(req))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_pool(State(state), Path("fixed".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["data"]["available"]["bounded"], 5);
    }

    #[tokio::test]
    async fn set_desired_unknown_service_is_not_found() {
        let state = test_state().await;
        let resp = set_desired(
            State(state),
            Path("nope".to_string()),
            Ok(Json(SetDesiredRequest { count: 1 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reconcile_then_list_services() {
        let state = test_state().await;
        let resp = reconcile_service(State(state.clone()), Path(FIXED_SERVICE.to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["started"].as_array().unwrap().len(), 2);

        let resp = list_services(State(state)).await;
        let body = body_json(resp).await;
        let services = body["data"].as_array().unwrap();
        let fixed = services
            .iter()
            .find(|s| s["serviceName"] == FIXED_SERVICE)
            .unwrap();
        assert_eq!(fixed["desiredCount"], 4);
        assert_eq!(fixed["runningCount"], 2);
        assert_eq!(fixed["poolKind"], "fixed");
        let elastic = services
            .iter()
            .find(|s| s["serviceName"] == ELASTIC_SERVICE)
            .unwrap();
        assert_eq!(elastic["runningCount"], 0);
    }

    #[tokio::test]
    async fn ingested_event_shows_up_in_status() {
        let state = test_state().await;
        let resp = ingest_event(State(state.clone()), event_body("abc", TaskStatus::Running)).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = get_status(State(state.clone()), Path("abc".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        state.stack.drain_events().await;
        let resp = get_status(State(state), Path("abc".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["lastStatus"], "RUNNING");
    }

    #[tokio::test]
    async fn ingest_rejects_blank_task_id() {
        let state = test_state().await;
        let resp = ingest_event(State(state), event_body(" ", TaskStatus::Running)).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;
    }

    #[tokio::test]
    async fn ingest_rejects_unknown_status_in_envelope() {
        let state = test_state().await;
        let raw = r#"{"source": "workload.lifecycle", "detailType": "TaskStateChange",
            "detail": {"taskId": "abc", "lastStatus": "DRAINING", "timestamp": "2024-03-01T12:00:00Z"}}"#;
        let resp = ingest_event(State(state.clone()), raw.to_string()).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;

        let resp = ingest_event(State(state.clone()), "not json".to_string()).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;
        assert_eq!(state.stack.drain_events().await, 0);
    }

    #[tokio::test]
    async fn register_pool_rejects_unknown_kind_in_body() {
        let state = test_state().await;
        let payload = json_payload::<RegisterPoolRequest>(r#"{"kind":"spot"}"#).await;
        assert!(payload.is_err());

        let resp = register_pool(State(state.clone()), payload).await;
        let body = assert_bad_request(resp, "INVALID_REQUEST").await;
        assert!(body["error"]["details"]["reason"]
            .as_str()
            .unwrap()
            .contains("spot"));

        let resp = get_pool(State(state), Path("fixed".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["data"]["capacity"]["bounded"], 2);
    }

    #[tokio::test]
    async fn set_desired_rejects_missing_count() {
        let state = test_state().await;
        let payload = json_payload::<SetDesiredRequest>(r#"{"replicas": 3}"#).await;
        let resp = set_desired(State(state.clone()), Path(FIXED_SERVICE.to_string()), payload).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;

        let record = state.stack.service(FIXED_SERVICE).unwrap().record().await;
        assert_eq!(record.desired_count, 4);
    }

    #[tokio::test]
    async fn resize_pool_route() {
        let state = test_state().await;
        let payload = json_payload::<ResizePoolRequest>(r#"{"capacity": 3}"#).await;
        let resp = resize_pool(State(state.clone()), Path("fixed".to_string()), payload).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["available"]["bounded"], 3);
        assert_eq!(body["data"]["poolId"], "fixed-pool");

        let payload = json_payload::<ResizePoolRequest>(r#"{"capacity": "lots"}"#).await;
        let resp = resize_pool(State(state.clone()), Path("fixed".to_string()), payload).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;

        let payload = json_payload::<ResizePoolRequest>(r#"{}"#).await;
        let resp = resize_pool(State(state), Path("spot".to_string()), payload).await;
        assert_bad_request(resp, "INVALID_REQUEST").await;
    }

    #[tokio::test]
    async fn deregister_pool_route_refuses_pool_in_use() {
        let state = test_state().await;
        state.stack.reconcile_service(FIXED_SERVICE).await.unwrap();

        let resp = deregister_pool(State(state.clone()), Path("fixed".to_string())).await;
        assert_bad_request(resp, "VALIDATION_ERROR").await;

        state.stack.set_desired(FIXED_SERVICE, 0).await.unwrap();
        state.stack.reconcile_service(FIXED_SERVICE).await.unwrap();

        let resp = deregister_pool(State(state.clone()), Path("fixed".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_pool(State(state), Path("fixed".to_string())).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["error_code"], "UNKNOWN_POOL");
    }

    #[tokio::test]
    async fn backfill_counts_running_tasks() {
        let state = test_state().await;
        state.stack.reconcile_all().await.unwrap();

        let resp = backfill_status(State(state)).await;
        let body = body_json(resp).await;
        assert_eq!(body["data"]["inserted"], 4);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state().await;
        let resp = prometheus_metrics(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&ControlPlaneError::TaskNotFound("t".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ControlPlaneError::ServiceNotFound("web".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ControlPlaneError::CapacityExhausted("fixed".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ControlPlaneError::UnknownPool("spot".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ControlPlaneError::RouterClosed("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ControlPlaneError::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ControlPlaneError::StorageError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
