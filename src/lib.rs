pub mod config;
pub mod db;
pub mod handlers;
pub mod mcp;
pub mod models;
pub mod state;
pub mod users;
pub mod watchdog;

use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

use state::AppState;

/// OpenAPI document for the HTTP surface, served at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MCP Bridge API",
        description = "HTTP bridge exposing direct database reads and MCP tool calls over JSON-RPC/WebSocket"
    ),
    paths(
        handlers::service_overview,
        handlers::health,
        handlers::readiness,
        handlers::list_users,
        handlers::get_user,
        handlers::search_users,
        handlers::user_stats,
        handlers::list_users_direct,
        handlers::get_user_direct,
        handlers::mcp_chat,
        handlers::mcp_analyze,
        handlers::mcp_query,
        handlers::ai_chat,
        handlers::ai_smart_sql,
        handlers::analyze_data,
        handlers::ai_query_analysis,
        handlers::ai_insights,
        handlers::ai_smart_query,
        handlers::ai_generate_sql,
        handlers::compare_services,
        handlers::capabilities,
        handlers::compare_methods,
        handlers::performance,
    ),
    components(schemas(
        models::HealthResponse,
        models::ServiceStatus,
        models::ReadinessResponse,
        models::McpChatRequest,
        models::McpQueryRequest,
        models::AiChatRequest,
        models::SmartSqlRequest,
        models::AnalyzeDataRequest,
        models::QueryAnalysisRequest,
        models::InsightsRequest,
        models::SmartQueryRequest,
        models::GenerateSqlRequest,
        users::User,
        users::UserStats,
        db::ColumnDescriptor,
    )),
    tags(
        (name = "system", description = "Service overview"),
        (name = "health", description = "Liveness and readiness"),
        (name = "traditional", description = "Direct database reads"),
        (name = "mcp", description = "MCP-enhanced endpoints"),
        (name = "ai", description = "AI tools invoked over MCP"),
        (name = "comparison", description = "Database vs MCP comparisons"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Traditional (database)
        .route("/traditional/users", get(handlers::list_users))
        .route("/traditional/users/{id}", get(handlers::get_user))
        .route("/traditional/search/users", get(handlers::search_users))
        .route("/traditional/stats/users", get(handlers::user_stats))
        .route("/user", get(handlers::list_users_direct))
        .route("/user/{id}", get(handlers::get_user_direct))
        // MCP-enhanced
        .route("/mcp/chat", post(handlers::mcp_chat))
        .route("/mcp/analyze", get(handlers::mcp_analyze))
        .route("/mcp/query", post(handlers::mcp_query))
        // AI tools
        .route("/ai/chat", post(handlers::ai_chat))
        .route("/ai/smart-sql", post(handlers::ai_smart_sql))
        .route("/ai/analyze", post(handlers::analyze_data))
        .route("/ai/query-analysis", post(handlers::ai_query_analysis))
        .route("/ai/insights", post(handlers::ai_insights))
        .route("/ai/smart-query", post(handlers::ai_smart_query))
        .route(
            "/query",
            get(handlers::ai_generate_sql).post(handlers::ai_generate_sql),
        )
        // Comparison
        .route("/comparison/services", get(handlers::compare_services))
        .route("/comparison/capabilities", get(handlers::capabilities))
        .route("/comparison/methods", get(handlers::compare_methods))
        .route("/comparison/performance", get(handlers::performance));

    Router::new()
        .route("/", get(handlers::service_overview))
        // Health
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::readiness))
        .route("/api/openapi.json", get(handlers::openapi_json))
        .nest("/api/v1", api)
        // Shared state
        .with_state(state)
}
