use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8003/api/v1";
const DEFAULT_BOT_WS_URL: &str = "ws://localhost:8003/ws/bot";
const DEFAULT_MCP_WS_URL: &str = "ws://localhost:8005/ws/mcp";

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub bot_ws_url: String,
    pub mcp_ws_url: String,
    pub data_dir: PathBuf,
    pub sentry_dsn: Option<String>,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("DBCV_API_URL").ok().as_deref(),
            std::env::var("DBCV_BOT_WS_URL").ok().as_deref(),
            std::env::var("DBCV_MCP_WS_URL").ok().as_deref(),
            std::env::var("DBCV_DATA_DIR").ok().as_deref(),
            std::env::var("SENTRY_DSN").ok().as_deref(),
            std::env::var("ENVIRONMENT").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(
        api_url: Option<&str>,
        bot_ws_url: Option<&str>,
        mcp_ws_url: Option<&str>,
        data_dir: Option<&str>,
        sentry_dsn: Option<&str>,
        environment: Option<&str>,
    ) -> Self {
        let api_url = non_empty(api_url)
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let bot_ws_url = non_empty(bot_ws_url)
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_BOT_WS_URL.to_string());

        let mcp_ws_url = non_empty(mcp_ws_url)
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_MCP_WS_URL.to_string());

        let data_dir = non_empty(data_dir).map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".dbcv")
        });

        let sentry_dsn = non_empty(sentry_dsn).map(String::from);

        let environment = non_empty(environment)
            .map(String::from)
            .unwrap_or_else(|| "local".to_string());

        Config {
            api_url,
            bot_ws_url,
            mcp_ws_url,
            data_dir,
            sentry_dsn,
            environment,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
