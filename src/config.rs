//! Dispatcher configuration, loaded from environment variables.
//!
//! Mirrors `chem-gl-chemflow`'s `config::CONFIG` / `chem-persistence::DbConfig`
//! pattern: a lazily-initialized `.env` load followed by a plain struct built
//! from `env::var` with sensible defaults for anything optional.

use std::env;

use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub limit_filter: String,
    pub intercept_filter: Option<String>,
    pub stickycookie_filter: Option<String>,
    pub stickyauth_filter: Option<String>,
    pub kill_nonreplay: bool,
    pub anticache: bool,
    pub anticomp: bool,
    pub refresh_server_playback: bool,
    pub server_playback_headers: Vec<String>,
    pub flow_log_path: Option<String>,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);

        Self {
            limit_filter: env::var("PROXYCORE_LIMIT_FILTER").unwrap_or_else(|_| "~all".to_string()),
            intercept_filter: env::var("PROXYCORE_INTERCEPT_FILTER").ok(),
            stickycookie_filter: env::var("PROXYCORE_STICKYCOOKIE_FILTER").ok(),
            stickyauth_filter: env::var("PROXYCORE_STICKYAUTH_FILTER").ok(),
            kill_nonreplay: env_bool("PROXYCORE_KILL_NONREPLAY", false),
            anticache: env_bool("PROXYCORE_ANTICACHE", false),
            anticomp: env_bool("PROXYCORE_ANTICOMP", false),
            refresh_server_playback: env_bool("PROXYCORE_REFRESH_SERVER_PLAYBACK", true),
            server_playback_headers: env::var("PROXYCORE_SERVER_PLAYBACK_HEADERS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            flow_log_path: env::var("PROXYCORE_FLOW_LOG_PATH").ok(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Forces the `.env` load from applications that construct `ProxyConfig`
/// lazily or not at all (e.g. pure library consumers).
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
