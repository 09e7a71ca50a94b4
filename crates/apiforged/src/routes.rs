//! HTTP routes.
//!
//! Success bodies are `{success: true, ...}`; failures are `{error}` with
//! the status chosen by [`ApiError`]. The caller's session comes from the
//! `x-session-id` header and is echoed back, generated when absent.

use apiforge_core::error::store_timeout;
use apiforge_core::{AnalysisRequest, SessionId};
use apiforge_store::ProjectKeys;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

/// Key probed by `/readyz`; it never has to exist.
const READINESS_PROBE_KEY: &str = "projects/.readyz";

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/analysis", post(analyze))
        .route("/api/analysis/latest", get(latest_analysis))
        .route("/api/projects", get(list_projects))
        .route(
            "/api/projects/:project/specs",
            get(list_specs).post(save_spec),
        )
        .route("/api/projects/:project/specs/:id", get(load_spec))
        .route(
            "/api/projects/:project/specs/:id/docs",
            get(load_docs).post(generate_docs),
        )
        .route("/api/projects/:project/analysis", get(project_analysis))
        .with_state(state)
}

fn session_from(headers: &HeaderMap) -> ApiResult<SessionId> {
    match headers.get(SESSION_HEADER) {
        None => Ok(SessionId::generate()),
        Some(raw) => {
            let raw = raw
                .to_str()
                .map_err(|_| ApiError::BadRequest(format!("{SESSION_HEADER} must be ASCII")))?;
            Ok(SessionId::parse(raw)?)
        }
    }
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

async fn healthz() -> Json<Value> {
    Json(json!({"success": true, "status": "ok"}))
}

async fn readyz(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    store_timeout(
        state.probe_timeout,
        state.projects.blobs().exists(READINESS_PROBE_KEY),
    )
    .await
    .map_err(|e| {
        warn!(error = %e, "readiness probe failed");
        ApiError::Unavailable("blob store unavailable".to_string())
    })?;
    Ok(Json(json!({"success": true, "status": "ready"})))
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(bad_json)?;
    let session = session_from(&headers)?;

    let result = state.analysis.analyze(&session, request).await?;
    // Failures are recorded under the session as well.
    let session_header = [(SESSION_HEADER, session.to_string())];
    if !result.success {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "analysis failed".to_string());
        let error = if result.retryable {
            ApiError::UpstreamTimeout(error)
        } else {
            ApiError::Upstream(error)
        };
        return Ok((session_header, error).into_response());
    }
    Ok((session_header, Json(result)).into_response())
}

async fn latest_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let session = session_from(&headers)?;
    let latest = state
        .analysis
        .latest(&session)
        .await
        .ok_or_else(|| ApiError::NotFound("no analysis recorded for this session".to_string()))?;
    Ok(([(SESSION_HEADER, session.to_string())], Json(latest)))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let projects = store_timeout(state.store_timeout, state.projects.list_projects()).await?;
    Ok(Json(json!({"success": true, "projects": projects})))
}

async fn list_specs(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<Value>> {
    let specs = store_timeout(state.store_timeout, state.projects.list_specs(&project)).await?;
    Ok(Json(json!({"success": true, "specs": specs})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveSpecBody {
    spec: Value,
    #[serde(default)]
    spec_id: Option<String>,
}

async fn save_spec(
    State(state): State<AppState>,
    Path(project): Path<String>,
    body: Result<Json<SaveSpecBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body.map_err(bad_json)?;
    if !body.spec.is_object() {
        return Err(ApiError::BadRequest("spec must be a JSON object".to_string()));
    }
    let keys = ProjectKeys::new(&project)?;

    let spec_id = store_timeout(
        state.store_timeout,
        state
            .projects
            .save_spec(&project, &body.spec, body.spec_id.as_deref()),
    )
    .await?;
    let key = keys.spec(&spec_id)?;
    info!(project = %project, spec_id = %spec_id, "spec stored");
    Ok(Json(json!({"success": true, "specId": spec_id, "key": key})))
}

async fn load_spec(
    State(state): State<AppState>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let spec = store_timeout(state.store_timeout, state.projects.load_spec(&project, &id)).await?;
    Ok(Json(json!({"success": true, "spec": spec})))
}

async fn generate_docs(
    State(state): State<AppState>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let spec = store_timeout(state.store_timeout, state.projects.load_spec(&project, &id)).await?;
    let (key, docs) = state.docs.generate_and_store(&project, &id, &spec).await?;
    Ok(Json(json!({"success": true, "key": key, "docs": docs})))
}

async fn load_docs(
    State(state): State<AppState>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let docs = store_timeout(state.store_timeout, state.projects.load_docs(&project, &id)).await?;
    Ok(Json(json!({"success": true, "docs": docs})))
}

async fn project_analysis(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<Value>> {
    let analysis =
        store_timeout(state.store_timeout, state.projects.load_analysis(&project)).await?;
    Ok(Json(json!({"success": true, "analysis": analysis})))
}
