//! Configuration types.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::model::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::error::ConfigError;

/// Server configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: IpAddr,
    pub port: u16,
    /// Path of the local libSQL database file.
    pub db_path: PathBuf,
    /// Generation settings for the outbound webhook.
    pub generation: GenerationConfig,
    /// Maximum public generation requests per source address per window.
    pub rate_limit_max: u32,
    /// bcrypt work factor for new password hashes.
    pub bcrypt_cost: u32,
    /// Expose internal error detail in 500 responses.
    pub debug: bool,
    /// Serve conversation routes to callers without a bearer token.
    pub allow_anonymous: bool,
}

/// Outbound generation webhook settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub webhook_url: Url,
    pub timeout: Duration,
}

impl GenerationConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(webhook_url: Url) -> Self {
        Self {
            webhook_url,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_RATE_LIMIT_MAX: u32 = 50;

    /// Build config from environment variables.
    ///
    /// `WEBHOOK_URL` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = std::env::var("WEBHOOK_URL")
            .map_err(|_| ConfigError::MissingEnvVar("WEBHOOK_URL".to_string()))?;
        let webhook_url = parse_webhook_url(&raw_url)?;

        let bind: IpAddr = std::env::var("CONTENT_DESK_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let port: u16 = std::env::var("CONTENT_DESK_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_PORT);

        let db_path = std::env::var("CONTENT_DESK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/content-desk.db"));

        let timeout_secs: u64 = std::env::var("CONTENT_DESK_GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(GenerationConfig::DEFAULT_TIMEOUT.as_secs());

        let rate_limit_max: u32 = std::env::var("CONTENT_DESK_RATE_LIMIT_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_RATE_LIMIT_MAX);

        let bcrypt_cost = parse_bcrypt_cost(std::env::var("CONTENT_DESK_BCRYPT_COST").ok().as_deref())?;

        Ok(Self {
            bind,
            port,
            db_path,
            generation: GenerationConfig {
                webhook_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            rate_limit_max,
            bcrypt_cost,
            debug: env_flag("CONTENT_DESK_DEBUG"),
            allow_anonymous: env_flag("CONTENT_DESK_ALLOW_ANONYMOUS"),
        })
    }

    /// Socket address for the HTTP listener.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Parse and check the generation webhook URL.
pub fn parse_webhook_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "WEBHOOK_URL".to_string(),
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: "WEBHOOK_URL".to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// bcrypt cost from its raw setting; unset means bcrypt's default.
fn parse_bcrypt_cost(raw: Option<&str>) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(bcrypt::DEFAULT_COST);
    };
    raw.trim()
        .parse()
        .ok()
        .filter(|cost| (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(cost))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "CONTENT_DESK_BCRYPT_COST".to_string(),
            message: format!("expected {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}, got '{raw}'"),
        })
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_cost_defaults_and_range() {
        assert_eq!(parse_bcrypt_cost(None).unwrap(), bcrypt::DEFAULT_COST);
        assert_eq!(parse_bcrypt_cost(Some(" 10 ")).unwrap(), 10);
        assert!(parse_bcrypt_cost(Some("3")).is_err());
        assert!(parse_bcrypt_cost(Some("cheap")).is_err());
    }

    #[test]
    fn webhook_url_accepts_http_and_https() {
        assert!(parse_webhook_url("https://hooks.example.com/generate").is_ok());
        assert!(parse_webhook_url(" http://127.0.0.1:9000/x ").is_ok());
    }

    #[test]
    fn webhook_url_rejects_other_schemes() {
        let err = parse_webhook_url("ftp://example.com/generate").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn webhook_url_rejects_garbage() {
        assert!(matches!(
            parse_webhook_url("not a url"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn generation_config_defaults_to_sixty_seconds() {
        let url = parse_webhook_url("https://hooks.example.com").unwrap();
        assert_eq!(GenerationConfig::new(url).timeout, Duration::from_secs(60));
    }
}
