// mcp-bridge -- config
//! Environment-driven settings.
//!
//! `from_env` reads the process environment (after `dotenvy` has loaded any
//! `.env`); `from_lookup` takes an arbitrary lookup so parsing can be tested
//! without touching global state.

use std::time::Duration;

/// Ceiling for every timeout setting (one day).
const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an integer (got '{value}')")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be true/false (got '{value}')")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must not be zero")]
    Zero { key: &'static str },

    #[error("{key} must be at most {max} seconds")]
    TooLarge { key: &'static str, max: u64 },
}

/// Settings for the MCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSettings {
    pub server_url: String,
    /// Upper bound for every single call.
    pub call_timeout: Duration,
    pub handshake_timeout: Duration,
}

/// Defaults applied to AI tool calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub response_language: String,
    pub default_provider: String,
    pub default_model: String,
    pub include_language_instruction: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            response_language: "zh-CN".to_string(),
            default_provider: "ollama".to_string(),
            default_model: "llama2:7b".to_string(),
            include_language_instruction: false,
        }
    }
}

impl AiConfig {
    /// Instruction appended to prompts, or `None` when disabled.
    pub fn language_instruction(&self) -> Option<&'static str> {
        if !self.include_language_instruction {
            return None;
        }
        Some(match self.response_language.as_str() {
            "en-US" => "Please respond in English.",
            "auto" => "请根据用户的语言进行回答。Please respond in the user's language.",
            _ => "请用中文回答。",
        })
    }

    /// `prompt` with the language instruction appended, when enabled.
    pub fn enhance_prompt(&self, prompt: &str) -> String {
        match self.language_instruction() {
            Some(instruction) => format!("{prompt}\n\n{instruction}"),
            None => prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub user_table: String,
    pub mcp: McpSettings,
    pub ai: AiConfig,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let ai_defaults = AiConfig::default();

        let port = match get("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber { key: "PORT", value: v })?,
            None => 8080,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url: get("DATABASE_URL"),
            user_table: get("USER_TABLE").unwrap_or_else(|| "mcp_user".to_string()),
            mcp: McpSettings {
                server_url: get("MCP_SERVER_URL")
                    .unwrap_or_else(|| "ws://localhost:8081/mcp".to_string()),
                call_timeout: seconds(&get, "MCP_TIMEOUT_SECS", 30)?,
                handshake_timeout: seconds(&get, "MCP_HANDSHAKE_TIMEOUT_SECS", 10)?,
            },
            ai: AiConfig {
                response_language: get("AI_RESPONSE_LANGUAGE")
                    .unwrap_or(ai_defaults.response_language),
                default_provider: get("AI_DEFAULT_PROVIDER").unwrap_or(ai_defaults.default_provider),
                default_model: get("AI_DEFAULT_MODEL").unwrap_or(ai_defaults.default_model),
                include_language_instruction: match get("AI_INCLUDE_LANGUAGE_INSTRUCTION") {
                    Some(v) => parse_bool("AI_INCLUDE_LANGUAGE_INSTRUCTION", v)?,
                    None => ai_defaults.include_language_instruction,
                },
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn seconds<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs = match get(key) {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: v })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Zero { key });
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::TooLarge {
            key,
            max: MAX_TIMEOUT_SECS,
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}
