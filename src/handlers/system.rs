// ---------------------------------------------------------------------------
// handlers/system.rs -- Service overview, health, readiness, OpenAPI
// ---------------------------------------------------------------------------

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::models::{HealthResponse, ReadinessResponse, ServiceStatus};
use crate::state::AppState;

use super::now_rfc3339;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[utoipa::path(get, path = "/", tag = "system",
    responses((status = 200, description = "Service overview and route map", body = Value))
)]
pub async fn service_overview(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "mcp-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "HTTP bridge exposing database reads and MCP tool calls",
        "mcp": state.mcp_status().await,
        "database": state.store.is_some(),
        "endpoints": {
            "health": ["/health", "/health/ready", "/api/openapi.json"],
            "traditional": [
                "GET /api/v1/traditional/users",
                "GET /api/v1/traditional/users/{id}",
                "GET /api/v1/traditional/search/users?keyword=",
                "GET /api/v1/traditional/stats/users?table=",
                "GET /api/v1/user?table=",
                "GET /api/v1/user/{id}?table=",
            ],
            "mcp": [
                "POST /api/v1/mcp/chat",
                "GET /api/v1/mcp/analyze?type=",
                "POST /api/v1/mcp/query",
            ],
            "ai": [
                "POST /api/v1/ai/chat",
                "POST /api/v1/ai/smart-sql",
                "POST /api/v1/ai/analyze",
                "POST /api/v1/ai/query-analysis",
                "POST /api/v1/ai/insights",
                "POST /api/v1/ai/smart-query",
                "POST /api/v1/query",
            ],
            "comparison": [
                "GET /api/v1/comparison/services",
                "GET /api/v1/comparison/capabilities",
                "GET /api/v1/comparison/methods",
                "GET /api/v1/comparison/performance",
            ],
        },
        "timestamp": now_rfc3339(),
    }))
}

#[utoipa::path(get, path = "/health", tag = "health",
    responses((status = 200, description = "Liveness with dependency status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.store {
        None => "not_configured",
        Some(store) => match tokio::time::timeout(DB_PING_TIMEOUT, store.ping()).await {
            Ok(Ok(())) => "connected",
            _ => "disconnected",
        },
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: now_rfc3339(),
        services: ServiceStatus {
            database: database.to_string(),
            mcp: state.mcp_status().await.to_string(),
        },
    })
}

/// GET /health/ready -- 200 only once the MCP handshake has completed.
#[utoipa::path(get, path = "/health/ready", tag = "health",
    responses(
        (status = 200, description = "MCP session initialized", body = ReadinessResponse),
        (status = 503, description = "MCP session not initialized", body = ReadinessResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> axum::response::Response {
    let ready = state.mcp_client().await.is_some();
    let body = ReadinessResponse {
        ready,
        mcp: state.mcp_status().await.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    if ready {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(crate::ApiDoc::openapi())
}
