use confluence_data::{VenueConfig, VenueName};
use std::{str::FromStr, time::Duration};
use tracing::warn;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SIGNAL_TIMEOUT_SECS: u64 = 30;

/// Log output format selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration read from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on one signal generation, venue fetches included
    pub signal_timeout: Duration,
    /// Venue used when a request omits `broker`
    pub default_venue: VenueName,
    pub binance: VenueConfig,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            signal_timeout: Duration::from_secs(DEFAULT_SIGNAL_TIMEOUT_SECS),
            default_venue: VenueName::Binance,
            binance: VenueConfig::new(VenueName::Binance),
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `lookup`, falling back to the default for unset or malformed values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let binance = VenueConfig::new(VenueName::Binance)
            .with_credentials(
                lookup("BINANCE_API_KEY").unwrap_or_default(),
                lookup("BINANCE_API_SECRET").unwrap_or_default(),
            )
            .with_testnet(parse_or(&lookup, "BINANCE_TESTNET", false));

        let log_format = match lookup("LOG_FORMAT") {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            signal_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SIGNAL_TIMEOUT_SECS",
                DEFAULT_SIGNAL_TIMEOUT_SECS,
            )),
            default_venue: parse_or(&lookup, "DEFAULT_VENUE", defaults.default_venue),
            binance,
            log_format,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Venue configuration for `name`. Only Binance carries credentials.
    pub fn venue_config(&self, name: VenueName) -> VenueConfig {
        match name {
            VenueName::Binance => self.binance.clone(),
            other => VenueConfig::new(other),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid configuration value, using default");
            default
        }),
        None => default,
    }
}
