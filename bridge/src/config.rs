//! Configuration loading: YAML file overlaid with recognized environment
//! variables, then validated into the shapes the rest of the crate consumes.

use std::time::Duration;

use bridge_model::Intents;
use bridge_router::Route;
use serde::Deserialize;
use url::Url;

use crate::error::BridgeError;

fn default_intents() -> u64 {
    513
}

fn default_http_timeout() -> f64 {
    30.0
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

/// `discord:` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(default = "default_intents")]
    pub intents: u64,
}

/// `http:` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout: f64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Bound on concurrently in-flight forwards. `None` means unbounded.
    #[serde(default)]
    pub max_concurrent_forwards: Option<usize>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            max_concurrent_forwards: None,
        }
    }
}

/// `logging:` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One entry under `routes:` in the configuration file.
#[derive(Debug, Clone, Deserialize)]
struct RouteConfig {
    pub event_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// The full configuration file shape, matching the documented YAML schema.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    discord: DiscordConfig,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    routes: Vec<RouteConfig>,
}

/// Environment-variable overlay, applied after the YAML file is parsed.
/// Field names match the documented variables exactly via `rename`.
#[derive(Debug, Deserialize, Default)]
struct EnvOverlay {
    #[serde(rename = "discord_token")]
    discord_token: Option<String>,
    #[serde(rename = "discord_intents")]
    discord_intents: Option<u64>,
    #[serde(rename = "http_timeout")]
    http_timeout: Option<f64>,
    #[serde(rename = "http_retry_attempts")]
    http_retry_attempts: Option<u32>,
    #[serde(rename = "http_retry_delay")]
    http_retry_delay: Option<f64>,
    #[serde(rename = "log_level")]
    log_level: Option<String>,
    #[serde(rename = "log_format")]
    log_format: Option<String>,
}

/// Validated configuration, ready to hand to the Supervisor.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub intents: Intents,
    pub http_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub max_concurrent_forwards: Option<usize>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub routes: Vec<Route>,
}

/// Accepted `logging.format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

impl Config {
    /// Load the YAML file at `path`, overlay recognized environment
    /// variables, then validate the merged result.
    pub fn load(path: &std::path::Path) -> Result<Self, BridgeError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("reading {}: {e}", path.display())))?;
        let raw: RawConfig = serde_yaml::from_str(&contents)
            .map_err(|e| BridgeError::Config(format!("parsing {}: {e}", path.display())))?;

        let overlay: EnvOverlay = envy::from_env()
            .map_err(|e| BridgeError::Config(format!("reading environment overrides: {e}")))?;

        Self::from_parts(raw, overlay)
    }

    fn from_parts(mut raw: RawConfig, overlay: EnvOverlay) -> Result<Self, BridgeError> {
        if let Some(token) = overlay.discord_token {
            raw.discord.token = token;
        }
        if let Some(intents) = overlay.discord_intents {
            raw.discord.intents = intents;
        }
        if let Some(timeout) = overlay.http_timeout {
            raw.http.timeout = timeout;
        }
        if let Some(retry_attempts) = overlay.http_retry_attempts {
            raw.http.retry_attempts = retry_attempts;
        }
        if let Some(retry_delay) = overlay.http_retry_delay {
            raw.http.retry_delay = retry_delay;
        }
        if let Some(level) = overlay.log_level {
            raw.logging.level = level;
        }
        if let Some(format) = overlay.log_format {
            raw.logging.format = format;
        }

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, BridgeError> {
        if raw.discord.token.trim().is_empty() {
            return Err(BridgeError::Config("discord.token must not be empty".into()));
        }

        let log_level = raw.logging.level.to_uppercase();
        if !matches!(log_level.as_str(), "DEBUG" | "INFO" | "WARNING" | "ERROR") {
            return Err(BridgeError::Config(format!(
                "logging.level must be one of DEBUG/INFO/WARNING/ERROR, got {log_level}"
            )));
        }

        let log_format = match raw.logging.format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "console" => LogFormat::Console,
            other => {
                return Err(BridgeError::Config(format!(
                    "logging.format must be json or console, got {other}"
                )))
            }
        };

        let mut routes = Vec::with_capacity(raw.routes.len());
        for route in raw.routes {
            for endpoint in &route.endpoints {
                Url::parse(endpoint).map_err(|e| {
                    BridgeError::Config(format!(
                        "route {} has invalid endpoint {endpoint}: {e}",
                        route.event_name
                    ))
                })?;
            }
            routes.push(Route {
                event_name: route.event_name,
                enabled: route.enabled,
                endpoints: route.endpoints,
            });
        }

        Ok(Config {
            token: raw.discord.token,
            intents: Intents::from_bits_truncate(raw.discord.intents),
            http_timeout: Duration::from_secs_f64(raw.http.timeout),
            retry_attempts: raw.http.retry_attempts,
            retry_delay: Duration::from_secs_f64(raw.http.retry_delay),
            max_concurrent_forwards: raw.http.max_concurrent_forwards,
            log_level,
            log_format,
            routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_token(token: &str) -> RawConfig {
        RawConfig {
            discord: DiscordConfig {
                token: token.to_string(),
                intents: default_intents(),
            },
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            routes: vec![],
        }
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let result = Config::from_parts(raw_with_token(""), EnvOverlay::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut raw = raw_with_token("Bot abc");
        raw.logging.level = "TRACE".into();
        let result = Config::from_parts(raw, EnvOverlay::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_endpoint_url() {
        let mut raw = raw_with_token("Bot abc");
        raw.routes.push(RouteConfig {
            event_name: "MESSAGE_CREATE".into(),
            enabled: true,
            endpoints: vec!["not a url".into()],
        });
        let result = Config::from_parts(raw, EnvOverlay::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overlay_overrides_token() {
        let raw = raw_with_token("Bot abc");
        let overlay = EnvOverlay {
            discord_token: Some("Bot overridden".into()),
            ..EnvOverlay::default()
        };
        let config = Config::from_parts(raw, overlay).unwrap();
        assert_eq!(config.token, "Bot overridden");
    }

    #[test]
    fn test_default_intents_is_513() {
        let config = Config::from_parts(raw_with_token("Bot abc"), EnvOverlay::default()).unwrap();
        assert_eq!(config.intents.bits(), 513);
    }

    #[test]
    fn test_accepts_json_and_console_formats() {
        let mut raw = raw_with_token("Bot abc");
        raw.logging.format = "json".into();
        assert_eq!(
            Config::from_parts(raw.clone(), EnvOverlay::default())
                .unwrap()
                .log_format,
            LogFormat::Json
        );
        raw.logging.format = "CONSOLE".into();
        assert_eq!(
            Config::from_parts(raw, EnvOverlay::default()).unwrap().log_format,
            LogFormat::Console
        );
    }
}
