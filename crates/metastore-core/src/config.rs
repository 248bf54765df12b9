//! Runtime configuration (`spec.md` §6 configuration surface).
//!
//! Explicit, typed `std::env::var` reads with defaults, in the style of
//! the teacher's `dev-server` binary bootstrap — no config-file crate,
//! since the teacher itself reads flat environment variables directly.
//! Every accessor fails fast with a [`ConfigError`] describing exactly
//! which variable was malformed, rather than silently falling back.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            reason: "could not be parsed".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(ConfigError::Invalid {
                name,
                value: other.to_string(),
                reason: "expected a boolean-ish value".to_string(),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Pool sizing/timeout knobs for the Postgres connection pool (`spec.md`
/// §5 resource policy, §6 `DATABASE_URL, pool max/idle/acquire ms`).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max_connections: 10,
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Where a filestore pub/sub endpoint should be read from, including the
/// in-process fallback that requires an explicit opt-in.
#[derive(Debug, Clone, PartialEq)]
pub enum FilestoreTransport {
    Disabled,
    Redis(String),
    Inline,
}

/// A named search preset loaded from `APPHUB_METASTORE_SEARCH_PRESETS[_PATH]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPreset {
    pub name: String,
    pub filter: crate::filter::FilterNode,
    #[serde(default, rename = "requiredScopes")]
    pub required_scopes: Vec<String>,
}

/// Fully resolved runtime configuration (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub pg_schema: Option<String>,
    pub pool: PoolSettings,
    pub auth_disabled: bool,
    pub tokens_json: Option<String>,
    pub tokens_path: Option<String>,
    pub metrics_enabled: bool,
    pub search_presets_json: Option<String>,
    pub search_presets_path: Option<String>,
    pub filestore_sync_enabled: bool,
    pub filestore_transport: FilestoreTransport,
    pub filestore_allow_inline: bool,
    pub filestore_events_channel: String,
    pub filestore_namespace: String,
    pub filestore_stall_threshold: Duration,
}

impl Settings {
    /// Load settings from the process environment, failing fast on the
    /// first malformed variable (`spec.md` §10: "fail-fast validation").
    pub fn from_env() -> Result<Self, ConfigError> {
        let host: IpAddr = match std::env::var("HOST") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value: raw,
                reason: "not a valid IP address".to_string(),
            })?,
            Err(_) => "::".parse().expect("static default parses"),
        };
        let port = parse_var("PORT", 4100u16)?;

        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let pg_schema = std::env::var("APPHUB_METASTORE_PG_SCHEMA").ok();

        let pool = PoolSettings {
            max_connections: parse_var("DATABASE_POOL_MAX", PoolSettings::default().max_connections)?,
            idle_timeout: Duration::from_millis(parse_var(
                "DATABASE_POOL_IDLE_MS",
                PoolSettings::default().idle_timeout.as_millis() as u64,
            )?),
            acquire_timeout: Duration::from_millis(parse_var(
                "DATABASE_POOL_ACQUIRE_MS",
                PoolSettings::default().acquire_timeout.as_millis() as u64,
            )?),
        };

        let auth_disabled = bool_var("APPHUB_AUTH_DISABLED", false)?;
        let tokens_json = std::env::var("APPHUB_METASTORE_TOKENS").ok();
        let tokens_path = std::env::var("APPHUB_METASTORE_TOKENS_PATH").ok();

        let metrics_enabled = bool_var("APPHUB_METRICS_ENABLED", true)?;
        let search_presets_json = std::env::var("APPHUB_METASTORE_SEARCH_PRESETS").ok();
        let search_presets_path = std::env::var("APPHUB_METASTORE_SEARCH_PRESETS_PATH").ok();

        let filestore_sync_enabled = bool_var("METASTORE_FILESTORE_SYNC_ENABLED", false)?;
        let filestore_allow_inline = bool_var("APPHUB_ALLOW_INLINE_MODE", false)?;
        let redis_url = std::env::var("FILESTORE_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .ok();
        let filestore_transport = match redis_url.as_deref() {
            None => FilestoreTransport::Disabled,
            Some("inline") if filestore_allow_inline => FilestoreTransport::Inline,
            Some("inline") => {
                return Err(ConfigError::Invalid {
                    name: "FILESTORE_REDIS_URL",
                    value: "inline".to_string(),
                    reason: "inline transport requires APPHUB_ALLOW_INLINE_MODE=true".to_string(),
                })
            }
            Some(url) => FilestoreTransport::Redis(url.to_string()),
        };
        let filestore_events_channel = std::env::var("FILESTORE_EVENTS_CHANNEL")
            .unwrap_or_else(|_| "filestore.events".to_string());
        let filestore_namespace = std::env::var("METASTORE_FILESTORE_NAMESPACE")
            .unwrap_or_else(|_| "filestore".to_string());
        let filestore_stall_threshold = Duration::from_secs(parse_var(
            "METASTORE_FILESTORE_STALL_THRESHOLD_SECONDS",
            120u64,
        )?);

        Ok(Settings {
            host,
            port,
            database_url,
            pg_schema,
            pool,
            auth_disabled,
            tokens_json,
            tokens_path,
            metrics_enabled,
            search_presets_json,
            search_presets_path,
            filestore_sync_enabled,
            filestore_transport,
            filestore_allow_inline,
            filestore_events_channel,
            filestore_namespace,
            filestore_stall_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "HOST", "PORT", "DATABASE_URL", "APPHUB_METASTORE_PG_SCHEMA",
            "DATABASE_POOL_MAX", "DATABASE_POOL_IDLE_MS", "DATABASE_POOL_ACQUIRE_MS",
            "APPHUB_AUTH_DISABLED", "APPHUB_METASTORE_TOKENS", "APPHUB_METASTORE_TOKENS_PATH",
            "APPHUB_METRICS_ENABLED", "METASTORE_FILESTORE_SYNC_ENABLED",
            "APPHUB_ALLOW_INLINE_MODE", "FILESTORE_REDIS_URL", "REDIS_URL",
            "FILESTORE_EVENTS_CHANNEL", "METASTORE_FILESTORE_NAMESPACE",
            "METASTORE_FILESTORE_STALL_THRESHOLD_SECONDS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_database_url_fails_fast() {
        clear_env();
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/metastore");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.port, 4100);
        assert!(!settings.auth_disabled);
        assert_eq!(settings.filestore_transport, FilestoreTransport::Disabled);
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn inline_transport_requires_explicit_opt_in() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/metastore");
        std::env::set_var("FILESTORE_REDIS_URL", "inline");
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "FILESTORE_REDIS_URL", .. }));
        std::env::set_var("APPHUB_ALLOW_INLINE_MODE", "true");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.filestore_transport, FilestoreTransport::Inline);
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("FILESTORE_REDIS_URL");
        std::env::remove_var("APPHUB_ALLOW_INLINE_MODE");
    }
}
