// ---------------------------------------------------------------------------
// handlers/traditional.rs -- Direct database reads (no MCP involved)
// ---------------------------------------------------------------------------

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::models::{KeywordQuery, TableQuery};
use crate::state::AppState;
use crate::users;

use super::{
    db_error, format_duration, non_empty, now_rfc3339, require_store, ApiError, HandlerResult,
};

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user ID: '{raw}'")))
}

fn require_table(query: TableQuery) -> Result<String, ApiError> {
    non_empty(query.table).ok_or_else(|| {
        ApiError::BadRequest(
            "Query parameter 'table' is required, e.g. ?table=mcp_user".to_string(),
        )
    })
}

// ---------------------------------------------------------------------------
// Marshaled user reads
// ---------------------------------------------------------------------------

#[utoipa::path(get, path = "/api/v1/traditional/users", tag = "traditional",
    responses(
        (status = 200, description = "Users from the configured table", body = Value),
        (status = 503, description = "Database not configured")
    )
)]
pub async fn list_users(State(state): State<AppState>) -> HandlerResult {
    let store = require_store(&state)?;
    let users = users::load_users(store, &state.user_table)
        .await
        .map_err(db_error)?;

    Ok(Json(json!({
        "data": users,
        "count": users.len(),
        "method": "traditional_database",
        "timestamp": now_rfc3339(),
    })))
}

#[utoipa::path(get, path = "/api/v1/traditional/users/{id}", tag = "traditional",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "One user", body = Value),
        (status = 400, description = "Non-numeric ID"),
        (status = 404, description = "No user with that ID")
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let id = parse_id(&id)?;
    let store = require_store(&state)?;
    let user = users::load_user(store, &state.user_table, id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    Ok(Json(json!({
        "data": user,
        "method": "traditional_database",
        "timestamp": now_rfc3339(),
    })))
}

#[utoipa::path(get, path = "/api/v1/traditional/search/users", tag = "traditional",
    params(KeywordQuery),
    responses(
        (status = 200, description = "Users matching the keyword", body = Value),
        (status = 400, description = "Missing keyword")
    )
)]
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<KeywordQuery>,
) -> HandlerResult {
    let keyword = non_empty(query.keyword)
        .ok_or_else(|| ApiError::BadRequest("keyword parameter is required".to_string()))?;
    let store = require_store(&state)?;
    let all = users::load_users(store, &state.user_table)
        .await
        .map_err(db_error)?;
    let matches = users::search(&all, &keyword);

    Ok(Json(json!({
        "data": matches,
        "count": matches.len(),
        "keyword": keyword,
        "method": "traditional_search",
        "timestamp": now_rfc3339(),
    })))
}

#[utoipa::path(get, path = "/api/v1/traditional/stats/users", tag = "traditional",
    params(TableQuery),
    responses(
        (status = 200, description = "Totals, averages and histograms", body = Value),
        (status = 400, description = "Missing table")
    )
)]
pub async fn user_stats(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> HandlerResult {
    let table = require_table(query)?;
    let store = require_store(&state)?;
    let start = Instant::now();
    let all = users::load_users(store, &table).await.map_err(db_error)?;
    let stats = users::compute_stats(&all);
    tracing::info!(
        table = %table,
        "user stats: {} users, avg age {:.1}",
        stats.total_users,
        stats.average_age
    );

    let mut body = serde_json::to_value(&stats)
        .map_err(|e| ApiError::Internal(format!("stats serialization failed: {e}")))?;
    if let Value::Object(map) = &mut body {
        map.insert("table_name".into(), Value::String(table));
        map.insert("query_method".into(), json!("traditional_database"));
        map.insert("query_time".into(), json!(format_duration(start.elapsed())));
    }
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Legacy raw-row reads
// ---------------------------------------------------------------------------

#[utoipa::path(get, path = "/api/v1/user", tag = "traditional",
    params(TableQuery),
    responses(
        (status = 200, description = "Raw rows of the given table", body = Value),
        (status = 400, description = "Missing table")
    )
)]
pub async fn list_users_direct(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> HandlerResult {
    let table = require_table(query)?;
    let store = require_store(&state)?;
    let start = Instant::now();
    let rows = store.query_rows(&table).await.map_err(db_error)?;

    Ok(Json(json!({
        "data": rows,
        "method": "direct_mysql",
        "table": table,
        "count": rows.len(),
        "response_time": format_duration(start.elapsed()),
        "timestamp": now_rfc3339(),
    })))
}

/// `table` falls back to the configured user table.
#[utoipa::path(get, path = "/api/v1/user/{id}", tag = "traditional",
    params(("id" = i64, Path, description = "Row ID"), TableQuery),
    responses(
        (status = 200, description = "One raw row", body = Value),
        (status = 400, description = "Non-numeric ID"),
        (status = 404, description = "No row with that ID")
    )
)]
pub async fn get_user_direct(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TableQuery>,
) -> HandlerResult {
    let id = parse_id(&id)?;
    let table = non_empty(query.table).unwrap_or_else(|| state.user_table.clone());
    let store = require_store(&state)?;
    let start = Instant::now();
    let row = store
        .query_row_by_id(&table, id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound(format!("No row with id {id} in '{table}'")))?;

    Ok(Json(json!({
        "data": row,
        "method": "direct_mysql",
        "table": table,
        "id": id,
        "response_time": format_duration(start.elapsed()),
        "timestamp": now_rfc3339(),
    })))
}
