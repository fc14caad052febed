// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-sourced runtime configuration.
//!
//! Loads the process environment into a typed
//! [`PipelineConfig`], producing advisory [`ConfigWarning`]s for
//! deprecated/missing-but-recommended settings rather than failing outright.
//! Only malformed values (a non-numeric `DATABASE_BACKUP_INTERVAL_HOURS`,
//! for instance) are hard [`ConfigError`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Errors that can occur while loading configuration from the environment.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong type.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        /// Name of the offending environment variable.
        var: String,
        /// The raw value that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Advisory-level configuration issues that do not prevent startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A deprecated environment variable was set.
    DeprecatedVar {
        /// Name of the deprecated variable.
        var: String,
        /// Suggested replacement, if any.
        suggestion: Option<String>,
    },
    /// A recommended variable is unset; a default was used.
    MissingRecommended {
        /// Name of the missing variable.
        var: String,
        /// Why it matters.
        hint: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeprecatedVar { var, suggestion } => {
                write!(f, "deprecated env var '{var}' is set")?;
                if let Some(s) = suggestion {
                    write!(f, " — use '{s}' instead")?;
                }
                Ok(())
            }
            Self::MissingRecommended { var, hint } => {
                write!(f, "recommended env var '{var}' is unset: {hint}")
            }
        }
    }
}

/// Backup-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BackupConfig {
    /// Whether the backup supervisor should run at all.
    pub enabled: bool,
    /// Hours between scheduled snapshots.
    pub interval_hours: u64,
    /// Days after which a snapshot is eligible for retention cleanup.
    pub retention_days: u64,
    /// Directory snapshots are written to.
    pub path: String,
    /// Size (bytes) above which a snapshot is gzip-compressed. Defaults to
    /// 5 MB.
    pub compression_threshold_bytes: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
            retention_days: 30,
            path: "./backups".to_string(),
            compression_threshold_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Feature flags.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FeatureFlags {
    /// Whether the tracer records step-by-step traces at all.
    pub parse_tracing: bool,
    /// Whether traces include verbose per-attempt detail.
    pub parse_trace_verbose: bool,
    /// Whether direct mobile-photo uploads are accepted.
    pub enable_mobile_photo_upload: bool,
    /// Max accepted mobile photo upload size, in megabytes.
    pub mobile_photo_max_size_mb: u64,
    /// Whether the v2 extraction pipeline path is enabled.
    pub pipeline_v2_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            parse_tracing: true,
            parse_trace_verbose: false,
            enable_mobile_photo_upload: true,
            mobile_photo_max_size_mb: 20,
            pipeline_v2_enabled: false,
        }
    }
}

/// Top-level runtime configuration for the invoice pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PipelineConfig {
    /// Path to the embedded SQL database file.
    pub db_path: String,
    /// Deployment environment name (`"development"`, `"production"`, …).
    pub node_env: String,
    /// Symmetric key material used to encrypt monitor auth secrets at rest.
    /// `None` when `EMAIL_ENCRYPTION_KEY` is unset (only tolerable outside
    /// production; callers should treat this as a hard requirement before
    /// persisting any monitor with password auth).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_encryption_key: Option<String>,
    /// Backup supervisor settings.
    pub backup: BackupConfig,
    /// Feature flags.
    pub features: FeatureFlags,
}

impl PipelineConfig {
    /// Load configuration from the process environment, returning the
    /// parsed config plus any advisory warnings.
    pub fn from_env() -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        Self::from_source(&EnvSource)
    }

    /// Load configuration from an arbitrary [`EnvLookup`] implementation.
    /// Exposed for tests so they don't have to mutate the real process
    /// environment (which is process-global and racy under parallel tests).
    pub fn from_source(env: &dyn EnvLookup) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();

        let db_path = env
            .get("DB_PATH")
            .or_else(|| env.get("DATABASE_PATH"))
            .unwrap_or_else(|| "./data/invoice-pipeline.db".to_string());

        let node_env = env.get("NODE_ENV").unwrap_or_else(|| "development".to_string());

        let email_encryption_key = env.get("EMAIL_ENCRYPTION_KEY");
        if email_encryption_key.is_none() {
            warnings.push(ConfigWarning::MissingRecommended {
                var: "EMAIL_ENCRYPTION_KEY".to_string(),
                hint: "monitor password auth material cannot be encrypted at rest without it"
                    .to_string(),
            });
        }

        let backup = BackupConfig {
            enabled: parse_bool(env, "DATABASE_BACKUP_ENABLED", true)?,
            interval_hours: parse_u64(env, "DATABASE_BACKUP_INTERVAL_HOURS", 24)?,
            retention_days: parse_u64(env, "DATABASE_BACKUP_RETENTION_DAYS", 30)?,
            path: env
                .get("DATABASE_BACKUP_PATH")
                .unwrap_or_else(|| "./backups".to_string()),
            compression_threshold_bytes: 5 * 1024 * 1024,
        };

        let features = FeatureFlags {
            parse_tracing: parse_bool(env, "PARSE_TRACING", true)?,
            parse_trace_verbose: parse_bool(env, "PARSE_TRACE_VERBOSE", false)?,
            enable_mobile_photo_upload: parse_bool(env, "ENABLE_MOBILE_PHOTO_UPLOAD", true)?,
            mobile_photo_max_size_mb: parse_u64(env, "MOBILE_PHOTO_MAX_SIZE_MB", 20)?,
            pipeline_v2_enabled: parse_bool(env, "PIPELINE_V2_ENABLED", false)?,
        };

        Ok((
            Self {
                db_path,
                node_env,
                email_encryption_key,
                backup,
                features,
            },
            warnings,
        ))
    }

    /// Render this config as a flat map suitable for structured log
    /// attachment (secrets are redacted).
    #[must_use]
    pub fn redacted_summary(&self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("db_path".to_string(), self.db_path.clone());
        m.insert("node_env".to_string(), self.node_env.clone());
        m.insert(
            "email_encryption_key".to_string(),
            if self.email_encryption_key.is_some() {
                "<set>".to_string()
            } else {
                "<unset>".to_string()
            },
        );
        m.insert("backup.enabled".to_string(), self.backup.enabled.to_string());
        m.insert(
            "backup.interval_hours".to_string(),
            self.backup.interval_hours.to_string(),
        );
        m.insert(
            "backup.retention_days".to_string(),
            self.backup.retention_days.to_string(),
        );
        m
    }
}

fn parse_bool(env: &dyn EnvLookup, var: &str, default: bool) -> Result<bool, ConfigError> {
    match env.get(var) {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: other.to_string(),
                reason: "expected a boolean-like value".to_string(),
            }),
        },
    }
}

fn parse_u64(env: &dyn EnvLookup, var: &str, default: u64) -> Result<u64, ConfigError> {
    match env.get(var) {
        None => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: v,
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}

/// Indirection over environment lookup so tests can supply a fake source
/// instead of mutating the real, process-global environment.
pub trait EnvLookup {
    /// Return the value of `var`, or `None` if unset.
    fn get(&self, var: &str) -> Option<String>;
}

struct EnvSource;

impl EnvLookup for EnvSource {
    fn get(&self, var: &str) -> Option<String> {
        env::var(var).ok()
    }
}

/// An in-memory [`EnvLookup`] for tests.
#[derive(Debug, Clone, Default)]
pub struct FakeEnv(pub BTreeMap<String, String>);

impl FakeEnv {
    /// Build a fake environment from key-value pairs.
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl EnvLookup for FakeEnv {
    fn get(&self, var: &str) -> Option<String> {
        self.0.get(var).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let env = FakeEnv::default();
        let (cfg, warnings) = PipelineConfig::from_source(&env).unwrap();
        assert_eq!(cfg.db_path, "./data/invoice-pipeline.db");
        assert_eq!(cfg.backup.interval_hours, 24);
        assert_eq!(cfg.backup.retention_days, 30);
        assert!(cfg.features.parse_tracing);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::MissingRecommended { var, .. } if var == "EMAIL_ENCRYPTION_KEY"
        )));
    }

    #[test]
    fn database_path_prefers_db_path_over_database_path() {
        let env = FakeEnv::new([("DB_PATH", "/a.db"), ("DATABASE_PATH", "/b.db")]);
        let (cfg, _) = PipelineConfig::from_source(&env).unwrap();
        assert_eq!(cfg.db_path, "/a.db");
    }

    #[test]
    fn database_path_falls_back_to_database_path() {
        let env = FakeEnv::new([("DATABASE_PATH", "/b.db")]);
        let (cfg, _) = PipelineConfig::from_source(&env).unwrap();
        assert_eq!(cfg.db_path, "/b.db");
    }

    #[test]
    fn invalid_bool_is_a_hard_error() {
        let env = FakeEnv::new([("DATABASE_BACKUP_ENABLED", "maybe")]);
        let err = PipelineConfig::from_source(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn redacted_summary_never_exposes_the_key_value() {
        let env = FakeEnv::new([("EMAIL_ENCRYPTION_KEY", "super-secret")]);
        let (cfg, _) = PipelineConfig::from_source(&env).unwrap();
        let summary = cfg.redacted_summary();
        assert_eq!(summary["email_encryption_key"], "<set>");
        assert!(!summary.values().any(|v| v.contains("super-secret")));
    }
}
