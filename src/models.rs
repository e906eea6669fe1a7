use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    /// `connected`, `disconnected` or `not_configured`.
    pub database: String,
    /// `initialized`, `connected`, `closed` or `disconnected`.
    pub mcp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub services: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub mcp: String,
    pub uptime_seconds: u64,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeywordQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableQuery {
    pub table: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalysisTypeQuery {
    #[serde(rename = "type")]
    pub analysis_type: Option<String>,
}

// ---------------------------------------------------------------------------
// MCP-enhanced requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct McpChatRequest {
    pub prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct McpQueryRequest {
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// AI tool requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct AiChatRequest {
    pub prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Either a natural-language `prompt` or a literal `sql` statement.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SmartSqlRequest {
    pub prompt: Option<String>,
    pub sql: Option<String>,
    pub alias: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeDataRequest {
    /// Any JSON; forwarded to the tool as a serialized string.
    #[schema(value_type = Object)]
    pub data: Option<Value>,
    pub analysis_type: Option<String>,
    pub context: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub focus: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryAnalysisRequest {
    pub description: Option<String>,
    pub analysis_type: Option<String>,
    pub table_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InsightsRequest {
    pub prompt: Option<String>,
    pub context: Option<String>,
    pub insight_level: Option<String>,
    pub table_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// `prompt` wins over the older `description` field.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SmartQueryRequest {
    pub prompt: Option<String>,
    pub description: Option<String>,
    /// `full` or `fast`.
    pub analysis_mode: Option<String>,
    #[serde(default)]
    pub include_analysis: bool,
    pub table_name: Option<String>,
    pub alias: Option<String>,
    pub limit: Option<u32>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateSqlRequest {
    pub description: Option<String>,
    pub table_schema: Option<String>,
    pub table_name: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
}
