/// Server configuration loaded from environment variables.
///
/// All fields except the secrets have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Credits debited per research run (default: `1.0`).
    pub research_cost: f64,
    /// TTL on the research submission lock in seconds (default: `30`).
    pub research_lock_ttl_secs: u64,
    /// Keep progress and activity detail in the research state
    /// (default: `true`; `false` keeps only status and result).
    pub rich_research_state: bool,
    /// Hex-encoded 32-byte AES-256-GCM key for stored letter content.
    pub encryption_key: String,
    /// Base URL of the deep-research runner service.
    pub research_runner_url: String,
    /// API key for the research runner.
    pub research_runner_api_key: String,
    /// Base URL of the follow-up-question generator service.
    pub followup_generator_url: String,
    /// API key for the follow-up generator.
    pub followup_generator_api_key: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `RESEARCH_COST`              | `1.0`                   |
    /// | `RESEARCH_LOCK_TTL_SECS`     | `30`                    |
    /// | `RICH_RESEARCH_STATE`        | `true`                  |
    /// | `ENCRYPTION_KEY`             | (required)              |
    /// | `RESEARCH_RUNNER_URL`        | (required)              |
    /// | `RESEARCH_RUNNER_API_KEY`    | (required)              |
    /// | `FOLLOWUP_GENERATOR_URL`     | (required)              |
    /// | `FOLLOWUP_GENERATOR_API_KEY` | (required)              |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let research_cost: f64 = std::env::var("RESEARCH_COST")
            .unwrap_or_else(|_| "1.0".into())
            .parse()
            .expect("RESEARCH_COST must be a valid f64");

        let research_lock_ttl_secs: u64 = std::env::var("RESEARCH_LOCK_TTL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RESEARCH_LOCK_TTL_SECS must be a valid u64");

        let rich_research_state: bool = std::env::var("RICH_RESEARCH_STATE")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("RICH_RESEARCH_STATE must be true or false");

        let encryption_key =
            std::env::var("ENCRYPTION_KEY").expect("ENCRYPTION_KEY must be set");
        let research_runner_url =
            std::env::var("RESEARCH_RUNNER_URL").expect("RESEARCH_RUNNER_URL must be set");
        let research_runner_api_key = std::env::var("RESEARCH_RUNNER_API_KEY")
            .expect("RESEARCH_RUNNER_API_KEY must be set");
        let followup_generator_url = std::env::var("FOLLOWUP_GENERATOR_URL")
            .expect("FOLLOWUP_GENERATOR_URL must be set");
        let followup_generator_api_key = std::env::var("FOLLOWUP_GENERATOR_API_KEY")
            .expect("FOLLOWUP_GENERATOR_API_KEY must be set");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            research_cost,
            research_lock_ttl_secs,
            rich_research_state,
            encryption_key,
            research_runner_url,
            research_runner_api_key,
            followup_generator_url,
            followup_generator_api_key,
        }
    }
}
