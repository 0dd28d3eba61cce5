//! Process Configuration
//!
//! Everything the binary reads from the environment, parsed once at startup.
//! Library crates only ever see the typed configs derived from it.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use auth::AuthConfig;
use tasks::ProcessorConfig;
use tasks::handlers::SmtpSettings;
use thiserror::Error;

/// Thirty days; keeps `now + ttl` far from the `DateTime` range limit
const MAX_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_VERIFY_EMAIL_URL: &str = "http://localhost:8080/v1/auth/verify-email";
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    /// `host:port` of the task broker
    pub redis_address: String,
    /// Length is checked when the token maker is built
    pub token_symmetric_key: Vec<u8>,
    pub access_token_ttl: chrono::Duration,
    pub password_pepper: Option<Vec<u8>>,
    pub verify_email_url: String,
    pub mailer_from: String,
    /// Relay settings; `None` falls back to the log mailer
    pub smtp: Option<SmtpSettings>,
    pub app_name: String,
    pub frontend_origins: Vec<String>,
    pub shutdown_grace: Duration,
    pub worker_critical_concurrency: usize,
    pub worker_default_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing { key });

        let frontend_origins = get("FRONTEND_ORIGINS")
            .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let access_token_ttl_secs: i64 = parse_or(&get, "ACCESS_TOKEN_TTL_SECS", 900)?;
        let access_token_ttl = chrono::Duration::try_seconds(access_token_ttl_secs)
            .filter(|_| (1..=MAX_ACCESS_TOKEN_TTL_SECS).contains(&access_token_ttl_secs))
            .ok_or_else(|| ConfigError::Invalid {
                key: "ACCESS_TOKEN_TTL_SECS",
                reason: format!("must be between 1 and {MAX_ACCESS_TOKEN_TTL_SECS} seconds"),
            })?;

        let worker_critical_concurrency: usize =
            parse_or(&get, "WORKER_CRITICAL_CONCURRENCY", 10)?;
        let worker_default_concurrency: usize = parse_or(&get, "WORKER_DEFAULT_CONCURRENCY", 5)?;
        if worker_default_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_DEFAULT_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if worker_critical_concurrency < worker_default_concurrency {
            return Err(ConfigError::Invalid {
                key: "WORKER_CRITICAL_CONCURRENCY",
                reason: format!(
                    "must be at least WORKER_DEFAULT_CONCURRENCY ({worker_default_concurrency})"
                ),
            });
        }

        let smtp = match get("SMTP_HOST") {
            None => None,
            Some(host) => {
                let username = get("SMTP_USERNAME");
                let password = get("SMTP_PASSWORD");
                if username.is_some() != password.is_some() {
                    return Err(ConfigError::Invalid {
                        key: "SMTP_USERNAME",
                        reason: "SMTP_USERNAME and SMTP_PASSWORD must be set together"
                            .to_string(),
                    });
                }
                Some(SmtpSettings {
                    host: host.trim().to_string(),
                    port: parse_or(&get, "SMTP_PORT", 587)?,
                    username,
                    password,
                    starttls: parse_or(&get, "SMTP_STARTTLS", true)?,
                })
            }
        };

        Ok(Self {
            http_addr: parse_or(&get, "HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            redis_address: required("REDIS_ADDRESS")?,
            token_symmetric_key: required("TOKEN_SYMMETRIC_KEY")?.into_bytes(),
            access_token_ttl,
            password_pepper: get("PASSWORD_PEPPER").map(String::into_bytes),
            verify_email_url: get("VERIFY_EMAIL_URL")
                .unwrap_or_else(|| DEFAULT_VERIFY_EMAIL_URL.to_string()),
            mailer_from: get("MAILER_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            smtp,
            app_name: get("APP_NAME").unwrap_or_else(|| "Veemon".to_string()),
            frontend_origins,
            shutdown_grace: Duration::from_secs(parse_or(&get, "SHUTDOWN_GRACE_SECS", 30)?),
            worker_critical_concurrency,
            worker_default_concurrency,
        })
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            access_token_ttl: self.access_token_ttl,
            password_pepper: self.password_pepper.clone(),
            ..AuthConfig::default()
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            critical_concurrency: self.worker_critical_concurrency,
            default_concurrency: self.worker_default_concurrency,
            ..ProcessorConfig::default()
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("http_addr", &self.http_addr)
            .field("database_max_connections", &self.database_max_connections)
            .field("redis_address", &self.redis_address)
            .field("token_symmetric_key", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("password_pepper", &self.password_pepper.as_ref().map(|_| "[REDACTED]"))
            .field("verify_email_url", &self.verify_email_url)
            .field("smtp", &self.smtp)
            .field("frontend_origins", &self.frontend_origins)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}
