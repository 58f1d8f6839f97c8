use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Everything the server needs to start, read once from the environment and
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and cache defaults.
    pub env: Env,
    // Address the listener binds to.
    pub bind_address: SocketAddr,
    // Secret used to validate incoming JWTs.
    pub jwt_secret: String,
    // Directories served under /static, first match wins.
    pub static_dirs: Vec<PathBuf>,
    // Forces `Cache-Control: no-store` on every response.
    pub disable_cache: bool,
    // max-age for cacheable responses when caching is on.
    pub cache_max_age: Duration,
}

/// Env
///
/// Local development or a production deployment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// ConfigError
///
/// A variable that is missing where it is mandatory, or set to something
/// unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for AppConfig {
    /// default
    ///
    /// A local configuration that needs no environment, for tests.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            static_dirs: vec![PathBuf::from("static")],
            disable_cache: true,
            cache_max_age: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration at startup and fails fast.
    ///
    /// # Panics
    /// Panics with the [`ConfigError`] message when [`AppConfig::try_load`]
    /// fails, so the server never starts with an incomplete configuration.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(err) => panic!("FATAL: {err}"),
        }
    }

    pub fn try_load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        // The production secret is mandatory; local runs fall back to a known one.
        let jwt_secret = match (env, env::var("JWT_SECRET")) {
            (_, Ok(secret)) if !secret.is_empty() => secret,
            (Env::Production, _) => return Err(ConfigError::Missing("JWT_SECRET")),
            (Env::Local, _) => LOCAL_JWT_SECRET.to_string(),
        };

        let bind_address = match env::var("BIND_ADDRESS") {
            Ok(value) => value.parse().map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDRESS",
                value: value.clone(),
                reason: err.to_string(),
            })?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let static_dirs = env::var("STATIC_DIRS")
            .map(|value| {
                value
                    .split(':')
                    .filter(|dir| !dir.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_else(|_| vec![PathBuf::from("static")]);

        let disable_cache = match env::var("DISABLE_CACHE") {
            Ok(value) => parse_bool("DISABLE_CACHE", &value)?,
            Err(_) => env == Env::Local,
        };

        let cache_max_age = match env::var("CACHE_MAX_AGE_SECS") {
            Ok(value) => value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|err| ConfigError::Invalid {
                    name: "CACHE_MAX_AGE_SECS",
                    value: value.clone(),
                    reason: err.to_string(),
                })?,
            Err(_) => Duration::from_secs(3600),
        };

        Ok(Self {
            env,
            bind_address,
            jwt_secret,
            static_dirs,
            disable_cache,
            cache_max_age,
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
