//! Router and handlers

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lence_core::{ErrorKind, ExecError, ExecutionResult, Params, ServerConfig};
use lence_reactive::{QueryClient, QuerySpec};
use lence_sources::SourceInfo;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Body of `POST /api/sources/query`
///
/// Unknown fields are rejected, so a client sending `sql` or `source`
/// learns that they are not accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    /// Document path, e.g. `/sales.md`
    pub page: String,

    pub query: String,

    #[serde(default)]
    pub params: Params,
}

/// Response of `GET /api/pages/queries`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQueries {
    pub page: String,
    pub queries: Vec<QuerySpec>,
}

#[derive(Debug, Deserialize)]
struct PageParam {
    page: String,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/sources", get(list_sources))
        .route("/api/sources/query", post(execute_query))
        .route("/api/sources/:name", get(get_source))
        .route("/api/pages/queries", get(page_queries))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if server.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn execute_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected query request");
        ApiError::invalid_request("Invalid request body")
    })?;

    let result = state
        .gateway()
        .execute(&request.page, &request.query, &request.params)
        .await?;
    Ok(Json(result))
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceInfo>> {
    Json(state.gateway().list_sources())
}

async fn get_source(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<SourceInfo>, ApiError> {
    state
        .gateway()
        .source_info(&name)
        .map(Json)
        .ok_or_else(|| ApiError(ExecError::new(ErrorKind::NotFound, "Source not found")))
}

async fn page_queries(
    State(state): State<AppState>,
    params: Result<Query<PageParam>, QueryRejection>,
) -> Result<Json<PageQueries>, ApiError> {
    let Query(PageParam { page }) =
        params.map_err(|_| ApiError::invalid_request("Missing page parameter"))?;

    let queries = state.gateway().page_queries(&page).await?;
    Ok(Json(PageQueries { page, queries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_defaults_params() {
        let request: QueryRequest = serde_json::from_value(json!({"page": "/a.md", "query": "q"})).unwrap();
        assert!(request.params.is_empty());
    }

    #[test]
    fn query_request_rejects_extra_fields() {
        let body = json!({"page": "/a.md", "query": "q", "sql": "DROP TABLE t"});
        assert!(serde_json::from_value::<QueryRequest>(body).is_err());
    }
}
