use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::contacts::is_valid_email;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub automation: AutomationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let portal_base_url =
            env::var("APP_PORTAL_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let sender_email = env::var("APP_SENDER_EMAIL")
            .unwrap_or_else(|_| "notifications@recruiting.local".to_string());
        if !is_valid_email(&sender_email) {
            return Err(ConfigError::InvalidSenderEmail(sender_email));
        }
        let sender_name =
            env::var("APP_SENDER_NAME").unwrap_or_else(|_| "Recruiting Team".to_string());
        let account_link_hours = env::var("APP_ACCOUNT_LINK_HOURS")
            .unwrap_or_else(|_| "72".to_string())
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidAccountLinkHours)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            automation: AutomationSettings {
                portal_base_url: portal_base_url.trim_end_matches('/').to_string(),
                sender_email,
                sender_name,
                account_link_hours,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Defaults the automation engine falls back to when an automation does not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationSettings {
    pub portal_base_url: String,
    pub sender_email: String,
    pub sender_name: String,
    /// Lifetime of the account-setup link; system reminders count back from its expiry.
    pub account_link_hours: u32,
}

impl AutomationSettings {
    pub fn recruit_portal_link(&self, recruit_id: &str) -> String {
        format!("{}/recruiting/recruit/{}", self.portal_base_url, recruit_id)
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            portal_base_url: "http://localhost:3000".to_string(),
            sender_email: "notifications@recruiting.local".to_string(),
            sender_name: "Recruiting Team".to_string(),
            account_link_hours: 72,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidSenderEmail(String),
    InvalidAccountLinkHours,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidSenderEmail(value) => {
                write!(f, "APP_SENDER_EMAIL '{value}' is not a valid email address")
            }
            ConfigError::InvalidAccountLinkHours => {
                write!(f, "APP_ACCOUNT_LINK_HOURS must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidSenderEmail(_)
            | ConfigError::InvalidAccountLinkHours => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_PORTAL_URL",
            "APP_SENDER_EMAIL",
            "APP_SENDER_NAME",
            "APP_ACCOUNT_LINK_HOURS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.automation, AutomationSettings::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_malformed_sender_email() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_SENDER_EMAIL", "not-an-address");
        match AppConfig::load() {
            Err(ConfigError::InvalidSenderEmail(value)) => assert_eq!(value, "not-an-address"),
            other => panic!("expected sender email error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn portal_link_strips_trailing_slash() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_PORTAL_URL", "https://portal.example.com/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.automation.recruit_portal_link("r-1"),
            "https://portal.example.com/recruiting/recruit/r-1"
        );
        reset_env();
    }
}
