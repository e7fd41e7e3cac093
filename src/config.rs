// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded once from the environment at startup into
//! [`AppConfig`] and injected into the application state. Handlers never
//! read the environment directly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the registry database | `./data` |
//! | `SITE_URL` | Public front-end base URL (fallback callback origin) | `https://baserise.vercel.app` |
//! | `ALLOWED_ORIGINS` | Comma-separated origins honoured for callbacks | empty (any http/https origin) |
//! | `VERIFIED_PATH` | Front-end path shown after verification | `/verified` |
//! | `ERROR_PATH` | Front-end path shown when verification fails | `/error` |
//! | `AUTH_URL` | Auth provider base URL | Required |
//! | `AUTH_SERVICE_KEY` | Auth provider service key | Required |
//! | `AUTH_JWT_SECRET` | HS256 secret for local session verification | Optional |
//! | `RATE_LIMIT_MAX_REQUESTS` | Registrations allowed per IP per window | `3` |
//! | `RATE_LIMIT_WINDOW_SECS` | Sliding window length | `60` |
//! | `REDIS_URL` | Shared rate-limit counter store; in-process counters when unset | Optional |
//! | `DNS_TIMEOUT_MS` | Upper bound on the MX lookup | `3000` |
//! | `TRUST_FORWARDED_FOR` | Use `X-Forwarded-For` for the client IP | `false` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both set enables HTTPS | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SITE_URL_ENV: &str = "SITE_URL";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const VERIFIED_PATH_ENV: &str = "VERIFIED_PATH";
pub const ERROR_PATH_ENV: &str = "ERROR_PATH";
pub const AUTH_URL_ENV: &str = "AUTH_URL";
pub const AUTH_SERVICE_KEY_ENV: &str = "AUTH_SERVICE_KEY";
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const RATE_LIMIT_MAX_ENV: &str = "RATE_LIMIT_MAX_REQUESTS";
pub const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const DNS_TIMEOUT_ENV: &str = "DNS_TIMEOUT_MS";
pub const TRUST_FORWARDED_FOR_ENV: &str = "TRUST_FORWARDED_FOR";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_SITE_URL: &str = "https://baserise.vercel.app";
const DEFAULT_VERIFIED_PATH: &str = "/verified";
const DEFAULT_ERROR_PATH: &str = "/error";
const DEFAULT_RATE_LIMIT_MAX: u32 = 3;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_DNS_TIMEOUT_MS: u64 = 3000;

/// File name of the registry database inside `DATA_DIR`.
pub const REGISTRY_FILE: &str = "waitlist.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Sliding-window parameters for the registration endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

/// Connection settings for the external auth provider.
#[derive(Debug, Clone)]
pub struct AuthProviderConfig {
    pub base_url: Url,
    pub service_key: String,
    /// When set, bearer sessions are verified locally instead of remotely.
    pub jwt_secret: Option<String>,
}

/// Paths on the public site used for post-verification redirects.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: Url,
    pub allowed_origins: Vec<String>,
    pub verified_path: String,
    pub error_path: String,
}

impl SiteConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            allowed_origins: Vec::new(),
            verified_path: DEFAULT_VERIFIED_PATH.to_string(),
            error_path: DEFAULT_ERROR_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub site: SiteConfig,
    pub auth: AuthProviderConfig,
    pub rate_limit: RateLimitConfig,
    /// Shared counter store for the admission guard.
    pub redis_url: Option<String>,
    pub dns_timeout: Duration,
    pub trust_forwarded_for: bool,
    pub tls: Option<TlsConfig>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match var(PORT_ENV) {
            Some(raw) => parse_number::<u16>(PORT_ENV, &raw)?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e| ConfigError::Invalid {
                    name: HOST_ENV,
                    reason: format!("{e}"),
                })?;

        let data_dir = PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let site_url = var(SITE_URL_ENV).unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        let mut site = SiteConfig::new(parse_url(SITE_URL_ENV, &site_url)?);
        if let Some(raw) = var(ALLOWED_ORIGINS_ENV) {
            site.allowed_origins = raw
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(path) = var(VERIFIED_PATH_ENV) {
            site.verified_path = normalize_path(&path);
        }
        if let Some(path) = var(ERROR_PATH_ENV) {
            site.error_path = normalize_path(&path);
        }

        let auth_url = var(AUTH_URL_ENV).ok_or(ConfigError::Missing(AUTH_URL_ENV))?;
        let auth = AuthProviderConfig {
            base_url: parse_url(AUTH_URL_ENV, &auth_url)?,
            service_key: var(AUTH_SERVICE_KEY_ENV).ok_or(ConfigError::Missing(AUTH_SERVICE_KEY_ENV))?,
            jwt_secret: var(AUTH_JWT_SECRET_ENV),
        };

        let mut rate_limit = RateLimitConfig::default();
        if let Some(raw) = var(RATE_LIMIT_MAX_ENV) {
            rate_limit.max_requests = parse_number::<u32>(RATE_LIMIT_MAX_ENV, &raw)?;
        }
        if let Some(raw) = var(RATE_LIMIT_WINDOW_ENV) {
            rate_limit.window = Duration::from_secs(parse_number::<u64>(RATE_LIMIT_WINDOW_ENV, &raw)?);
        }
        if rate_limit.max_requests == 0 || rate_limit.window.is_zero() {
            return Err(ConfigError::Invalid {
                name: RATE_LIMIT_MAX_ENV,
                reason: "limit and window must be non-zero".to_string(),
            });
        }

        let redis_url = var(REDIS_URL_ENV);

        let dns_timeout = Duration::from_millis(match var(DNS_TIMEOUT_ENV) {
            Some(raw) => parse_number::<u64>(DNS_TIMEOUT_ENV, &raw)?,
            None => DEFAULT_DNS_TIMEOUT_MS,
        });

        let trust_forwarded_for = var(TRUST_FORWARDED_FOR_ENV)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: TLS_CERT_PATH_ENV,
                    reason: format!("{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together"),
                })
            }
        };

        let log_format = match var(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            site,
            auth,
            rate_limit,
            redis_url,
            dns_timeout,
            trust_forwarded_for,
            tls,
            log_format,
        })
    }

    /// Path of the registry database file.
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
