//! Server configuration assembled from environment-style lookups.
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `CLIENT_SECRET` | root signing secret | required (unless `independent`) |
//! | `KANBANFLOW_SECRET_SCHEME` | `hmac`, `suffix` or `independent` | `hmac` |
//! | `ACCESS_SECRET` / `REFRESH_SECRET` | secrets for `independent` | - |
//! | `KANBANFLOW_BIND` | bind address | `0.0.0.0` |
//! | `KANBANFLOW_HTTP_PORT` | HTTP port | `3005` |
//! | `BASE_URL` | the one origin allowed on `/ws` | `http://localhost:3000` |
//! | `KANBANFLOW_ACCESS_TTL_SECS` | access token lifetime | `3600` |
//! | `KANBANFLOW_REFRESH_TTL_SECS` | refresh token lifetime (at most ten years) | `86400` |
//! | `RATE_LIMIT_RPS` | rate limiter burst | `10` |
//! | `KANBANFLOW_WS_QUEUE` | per-connection outbound queue | `32` |
//! | `KANBANFLOW_WS_WRITE_TIMEOUT_MS` | longest a single socket write may stall | `10000` |
//! | `KANBANFLOW_SECURE_COOKIES` | `Secure` flag on auth cookies | `true` |

use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::identity::{SecretScheme, TokenTtls, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Upper bound on either token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Bucket size; the most requests accepted in one burst.
    pub burst: u32,
    /// Tokens returned to the bucket per second.
    pub refill_per_sec: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self { Self { burst: 10, refill_per_sec: 1 } }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub http_port: u16,
    pub allowed_origin: String,
    pub secrets: SecretScheme,
    pub ttls: TokenTtls,
    pub rate_limit: RateLimitSettings,
    pub ws_queue_capacity: usize,
    /// How long one socket write may stall before the connection is closed.
    pub ws_write_timeout: StdDuration,
    pub secure_cookies: bool,
}

impl ServerConfig {
    /// Defaults around a root secret; mostly for tests and embedding.
    pub fn with_secret(root: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            http_port: 3005,
            allowed_origin: "http://localhost:3000".to_string(),
            secrets: SecretScheme::Hmac { root: root.into() },
            ttls: TokenTtls::default(),
            rate_limit: RateLimitSettings::default(),
            ws_queue_capacity: 32,
            ws_write_timeout: StdDuration::from_secs(10),
            secure_cookies: true,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let root = || get("CLIENT_SECRET").ok_or_else(|| ConfigError::Missing("CLIENT_SECRET".into()));

        let scheme_name = get("KANBANFLOW_SECRET_SCHEME").unwrap_or_else(|| "hmac".to_string());
        let secrets = match scheme_name.to_ascii_lowercase().as_str() {
            "hmac" => SecretScheme::Hmac { root: root()? },
            "suffix" | "suffixed" => SecretScheme::Suffixed { root: root()? },
            "independent" => SecretScheme::Independent {
                access: get("ACCESS_SECRET").ok_or_else(|| ConfigError::Missing("ACCESS_SECRET".into()))?,
                refresh: get("REFRESH_SECRET").ok_or_else(|| ConfigError::Missing("REFRESH_SECRET".into()))?,
            },
            other => return Err(ConfigError::Invalid(format!("unknown secret scheme {other:?}"))),
        };
        // fail early rather than on first login
        secrets.derive()?;

        let mut cfg = Self::with_secret(String::new());
        cfg.secrets = secrets;
        if let Some(v) = get("KANBANFLOW_BIND") { cfg.bind_addr = v; }
        if let Some(v) = parse::<u16>(&get, "KANBANFLOW_HTTP_PORT")? { cfg.http_port = v; }
        if let Some(v) = get("BASE_URL") { cfg.allowed_origin = v.trim_end_matches('/').to_string(); }
        let access = parse::<i64>(&get, "KANBANFLOW_ACCESS_TTL_SECS")?.unwrap_or(DEFAULT_ACCESS_TTL_SECS);
        let refresh = parse::<i64>(&get, "KANBANFLOW_REFRESH_TTL_SECS")?.unwrap_or(DEFAULT_REFRESH_TTL_SECS);
        if access <= 0 || refresh <= access || refresh > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "token lifetimes must satisfy 0 < access ({access}s) < refresh ({refresh}s) <= {MAX_TOKEN_TTL_SECS}s"
            )));
        }
        cfg.ttls = TokenTtls { access: Duration::seconds(access), refresh: Duration::seconds(refresh) };
        if let Some(v) = parse::<u32>(&get, "RATE_LIMIT_RPS")? { cfg.rate_limit.burst = v.max(1); }
        if let Some(v) = parse::<usize>(&get, "KANBANFLOW_WS_QUEUE")? { cfg.ws_queue_capacity = v.max(1); }
        if let Some(v) = parse::<u64>(&get, "KANBANFLOW_WS_WRITE_TIMEOUT_MS")? {
            if v == 0 {
                return Err(ConfigError::Invalid("KANBANFLOW_WS_WRITE_TIMEOUT_MS must be positive".into()));
            }
            cfg.ws_write_timeout = StdDuration::from_millis(v);
        }
        if let Some(v) = get("KANBANFLOW_SECURE_COOKIES") {
            cfg.secure_cookies = parse_bool(&v).ok_or_else(|| ConfigError::Invalid(format!("KANBANFLOW_SECURE_COOKIES={v}")))?;
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(v) => v.parse::<T>().map(Some).map_err(|_| ConfigError::Invalid(format!("{key}={v}"))),
        None => Ok(None),
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
