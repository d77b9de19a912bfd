use std::path::PathBuf;

/// Gateway configuration loaded from environment variables.
pub struct Config {
    pub port: u16,
    pub proxy_port: u16,
    pub upstream_base_url: String,
    pub upstream_auth_token: String,
    pub allowed_origin: String,
    pub default_run_display: usize,
    pub upstream_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("PROXY_PORT").ok().as_deref(),
            std::env::var("UPSTREAM_BASE_URL").ok().as_deref(),
            std::env::var("UPSTREAM_AUTH_TOKEN").ok().as_deref(),
            std::env::var("ALLOWED_ORIGIN").ok().as_deref(),
            std::env::var("DEFAULT_RUN_DISPLAY").ok().as_deref(),
            std::env::var("UPSTREAM_TIMEOUT_SECS").ok().as_deref(),
            std::env::var("DATA_DIR").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env
    /// vars). Used directly in tests to avoid mutating process-global
    /// environment.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw_values(
        port: Option<&str>,
        proxy_port: Option<&str>,
        upstream_base_url: Option<&str>,
        upstream_auth_token: Option<&str>,
        allowed_origin: Option<&str>,
        default_run_display: Option<&str>,
        upstream_timeout_secs: Option<&str>,
        data_dir: Option<&str>,
    ) -> Self {
        let port = port.and_then(|v| v.parse().ok()).unwrap_or(8081);
        let proxy_port = proxy_port.and_then(|v| v.parse().ok()).unwrap_or(8080);

        let upstream_base_url = upstream_base_url
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:28080".to_string());

        let upstream_auth_token = upstream_auth_token
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_default();

        let allowed_origin = allowed_origin
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        let default_run_display = default_run_display
            .and_then(|v| v.parse().ok())
            .unwrap_or(25);

        let upstream_timeout_secs = upstream_timeout_secs
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let data_dir = data_dir.filter(|s| !s.is_empty()).map(PathBuf::from);

        Config {
            port,
            proxy_port,
            upstream_base_url,
            upstream_auth_token,
            allowed_origin,
            default_run_display,
            upstream_timeout_secs,
            data_dir,
        }
    }
}
