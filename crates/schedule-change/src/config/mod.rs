use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::schedule_change::{ChangePolicy, RankingConfig, MAX_THROUGHPUT_WINDOW_DAYS};

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
    pub policy: ChangePolicy,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            policy: load_policy()?,
        })
    }
}

fn load_policy() -> Result<ChangePolicy, ConfigError> {
    let defaults = ChangePolicy::default();
    let ranking = RankingConfig {
        gpa_weight: numeric("RANKING_GPA_WEIGHT", defaults.ranking.gpa_weight)?,
        semester_weight: numeric("RANKING_SEMESTER_WEIGHT", defaults.ranking.semester_weight)?,
        minimum_compliant_gpa: numeric(
            "RANKING_MIN_COMPLIANT_GPA",
            defaults.ranking.minimum_compliant_gpa,
        )?,
        throughput_window_days: numeric(
            "SCHEDULE_THROUGHPUT_WINDOW_DAYS",
            defaults.ranking.throughput_window_days,
        )?,
        ..defaults.ranking
    };

    if ranking.throughput_window_days > MAX_THROUGHPUT_WINDOW_DAYS {
        return Err(ConfigError::OutOfRange {
            key: "SCHEDULE_THROUGHPUT_WINDOW_DAYS",
            max: u64::from(MAX_THROUGHPUT_WINDOW_DAYS),
        });
    }

    let max_pending_per_student = numeric(
        "SCHEDULE_MAX_PENDING_PER_STUDENT",
        defaults.max_pending_per_student,
    )?;
    if max_pending_per_student == 0 {
        return Err(ConfigError::InvalidNumber {
            key: "SCHEDULE_MAX_PENDING_PER_STUDENT",
        });
    }

    Ok(ChangePolicy {
        max_pending_per_student,
        ranking,
    })
}

fn numeric<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    OutOfRange { key: &'static str, max: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{} must be a positive number", key)
            }
            ConfigError::OutOfRange { key, max } => {
                write!(f, "{} must not exceed {}", key, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
