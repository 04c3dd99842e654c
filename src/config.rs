//! Environment-variable configuration.
//!
//! All runtime configuration comes from the process environment; there is no
//! config file. Missing variables resolve to empty strings and degrade
//! behavior at the tool level rather than aborting startup, so a server
//! launched without credentials can still answer `tools/list` and explain
//! what is missing when a tool is called.
//!
//! | Variable              | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `TRAKT_CLIENT_ID`     | API client id (required for any remote call)     |
//! | `TRAKT_CLIENT_SECRET` | API client secret (device-flow token polling)    |
//! | `TRAKT_ACCESS_TOKEN`  | OAuth access token (required for history tools)  |
//! | `TRAKT_REFRESH_TOKEN` | OAuth refresh token (stored, not yet used)       |
//! | `LOG_LEVEL`           | `debug`, `info`, `warn`, or `error` (default `info`) |
//!
//! `RUST_LOG` overrides `LOG_LEVEL` with a full tracing filter expression.

/// Trakt API credentials, read once at startup and immutable afterward.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    /// Accepted for future token refresh; no current operation reads it.
    pub refresh_token: String,
}

impl Config {
    /// Read credentials from `TRAKT_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            client_id: env_or_empty("TRAKT_CLIENT_ID"),
            client_secret: env_or_empty("TRAKT_CLIENT_SECRET"),
            access_token: env_or_empty("TRAKT_ACCESS_TOKEN"),
            refresh_token: env_or_empty("TRAKT_REFRESH_TOKEN"),
        }
    }
}

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// Resolve the tracing filter: `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
pub fn log_filter() -> String {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return filter;
    }
    level_for(std::env::var("LOG_LEVEL").ok().as_deref()).to_string()
}

/// Map a `LOG_LEVEL` value onto one of the four supported tiers.
/// Unrecognized values fall back to `info`.
fn level_for(level: Option<&str>) -> &'static str {
    match level {
        Some("debug") => "debug",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}
