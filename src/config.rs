//! Immutable mailer configuration (§3).
//!
//! `MailerConfig::from_env` loads the same fields from the process
//! environment via `dotenvy::dotenv().ok()` followed by
//! `std::env::var` wrapped in `anyhow::Context`, but it is a thin
//! convenience on top of [`MailerConfigBuilder`], never a second source
//! of truth for the defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// SMTP AUTH LOGIN credentials.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Json
    }
}

/// Configuration for the C8 structured logger.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub custom_fields: Vec<String>,
    pub destination: Option<String>,
}

/// Configuration for the C6 rate-limit controller.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_recipient: bool,
    pub burst_limit: u32,
    pub cooldown_period: Duration,
    pub ban_duration: Duration,
    pub max_consecutive_failures: u32,
    pub failure_cooldown: Duration,
    pub max_rapid_attempts: u32,
    pub rapid_period: Duration,
    /// Re-architecture guidance (§9, #3): cap the per-recipient map with
    /// LRU eviction by `last_attempt`. `None` preserves the original
    /// "never evicted" behavior.
    pub max_tracked_recipients: Option<usize>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_recipient: true,
            burst_limit: 5,
            cooldown_period: Duration::from_millis(1_000),
            ban_duration: Duration::from_millis(7_200_000),
            max_consecutive_failures: 3,
            failure_cooldown: Duration::from_millis(300_000),
            max_rapid_attempts: 10,
            rapid_period: Duration::from_millis(10_000),
            max_tracked_recipients: None,
        }
    }
}

/// Top-level immutable mailer configuration.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub auth: Option<AuthConfig>,
    pub from: String,
    /// Reserved, not consulted by the transaction engine (§3, §9 #6).
    pub retry_attempts: u32,
    pub timeout: Duration,
    pub keep_alive: bool,
    /// Reserved, not consulted — no pool exists (§5, §9 #6).
    pub pool_size: u32,
    pub rate_limiting: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("`from` address is required")]
    MissingFrom,
    #[error("`host` is required")]
    MissingHost,
}

/// Validation happens once, at `build()`, per §3/§6 ("throws on missing
/// `from`").
pub struct MailerConfigBuilder {
    host: String,
    port: u16,
    secure: Option<bool>,
    auth: Option<AuthConfig>,
    from: Option<String>,
    retry_attempts: u32,
    timeout: Duration,
    keep_alive: bool,
    pool_size: u32,
    rate_limiting: RateLimitConfig,
    logging: LoggingConfig,
}

impl MailerConfigBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: None,
            auth: None,
            from: None,
            retry_attempts: 3,
            timeout: Duration::from_millis(5_000),
            keep_alive: false,
            pool_size: 5,
            rate_limiting: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth = Some(AuthConfig {
            user: user.into(),
            pass: pass.into(),
        });
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn pool_size(mut self, n: u32) -> Self {
        self.pool_size = n;
        self
    }

    pub fn rate_limiting(mut self, rate_limiting: RateLimitConfig) -> Self {
        self.rate_limiting = rate_limiting;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn build(self) -> Result<MailerConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let from = self.from.ok_or(ConfigError::MissingFrom)?;

        let mut secure = self.secure.unwrap_or(false);
        if self.port == 465 && !secure {
            warn!("port 465 requested without `secure = true`; forcing implicit TLS");
            secure = true;
        }

        Ok(MailerConfig {
            host: self.host,
            port: self.port,
            secure,
            auth: self.auth,
            from,
            retry_attempts: self.retry_attempts,
            timeout: self.timeout,
            keep_alive: self.keep_alive,
            pool_size: self.pool_size,
            rate_limiting: self.rate_limiting,
            logging: self.logging,
        })
    }
}

impl MailerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let host = std::env::var("SMTP_HOST").context("SMTP_HOST must be set")?;
        let port: u16 = std::env::var("SMTP_PORT")
            .context("SMTP_PORT must be set")?
            .parse()
            .context("SMTP_PORT must be a valid port number")?;
        let from = std::env::var("SMTP_FROM").context("SMTP_FROM must be set")?;

        let mut builder = MailerConfigBuilder::new(host, port).from(from);

        if let (Ok(user), Ok(pass)) = (std::env::var("SMTP_USER"), std::env::var("SMTP_PASS")) {
            builder = builder.auth(user, pass);
        }

        if let Ok(secure) = std::env::var("SMTP_SECURE") {
            builder = builder.secure(secure.eq_ignore_ascii_case("true") || secure == "1");
        }

        if let Ok(timeout_ms) = std::env::var("SMTP_TIMEOUT_MS") {
            let ms: u64 = timeout_ms
                .parse()
                .context("SMTP_TIMEOUT_MS must be an integer")?;
            builder = builder.timeout(Duration::from_millis(ms));
        }

        if let Ok(keep_alive) = std::env::var("SMTP_KEEP_ALIVE") {
            builder = builder.keep_alive(keep_alive.eq_ignore_ascii_case("true") || keep_alive == "1");
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_from_is_rejected() {
        let result = MailerConfigBuilder::new("smtp.example.com", 587).build();
        assert!(matches!(result, Err(ConfigError::MissingFrom)));
    }

    #[test]
    fn port_465_forces_secure() {
        let config = MailerConfigBuilder::new("smtp.example.com", 465)
            .from("noreply@example.com")
            .build()
            .unwrap();
        assert!(config.secure);
    }

    #[test]
    fn secure_false_respected_on_other_ports() {
        let config = MailerConfigBuilder::new("smtp.example.com", 587)
            .from("noreply@example.com")
            .secure(false)
            .build()
            .unwrap();
        assert!(!config.secure);
    }
}
