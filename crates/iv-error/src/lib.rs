//! Unified error taxonomy with stable error codes for the invoice pipeline.
//!
//! Every pipeline error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag matching the system boundary contract), a human-readable
//! message, an optional cause chain, and arbitrary key-value context. Use the
//! constructor [`IvError::new`] and the fluent `with_*` methods to build
//! errors that carry enough diagnostic context to reconstruct "why" a run or
//! a single message failed without re-running it.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to, used for metrics and log
/// aggregation. Distinct from [`ErrorCode`]: several codes can share a
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input validation failures.
    Input,
    /// Resource lookup failures (unknown monitor, unknown user).
    Lookup,
    /// Concurrency / locking conflicts.
    Concurrency,
    /// Authentication / credential failures.
    Auth,
    /// Network or mailbox reachability failures.
    Network,
    /// Failures during OCR/parsing/extraction that do not abort a run.
    Transient,
    /// Database integrity constraint violations.
    Integrity,
    /// Configuration or feature-flag failures.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Lookup => "lookup",
            Self::Concurrency => "concurrency",
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Transient => "transient",
            Self::Integrity => "integrity",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// The system-boundary subset (`NotFound`, `Inactive`, `Locked`,
/// `AuthFailed`, `Unreachable`, `InvalidInput`, `ProcessingError`,
/// `FeatureDisabled`, `FileTooLarge`, `UploadError`) matches the `code`
/// field every externally callable operation returns on failure. The
/// remaining variants are internal-only and never escape a component's
/// public boundary; they are folded into one of the above before being
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- external, stable surface --
    /// The requested monitor, run, or resource does not exist.
    NotFound,
    /// The monitor exists but is disabled.
    Inactive,
    /// Another run already holds the monitor lock.
    Locked,
    /// Password decryption or OAuth token refresh failed.
    AuthFailed,
    /// Mailbox connect/open exceeded its timeout.
    Unreachable,
    /// Caller-supplied input is malformed or missing a required field.
    InvalidInput,
    /// A per-message or per-document processing step failed.
    ProcessingError,
    /// The operation is gated behind a disabled feature flag.
    FeatureDisabled,
    /// Uploaded payload exceeds the configured size limit.
    FileTooLarge,
    /// The upload itself could not be read or staged.
    UploadError,

    // -- internal-only, folded before crossing a public boundary --
    /// A database constraint (e.g. non-null `user_id` trigger) was violated.
    IntegrityViolation,
    /// A configuration value failed validation.
    ConfigInvalid,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::Lookup,
            Self::Inactive => ErrorCategory::Lookup,
            Self::Locked => ErrorCategory::Concurrency,
            Self::AuthFailed => ErrorCategory::Auth,
            Self::Unreachable => ErrorCategory::Network,
            Self::InvalidInput => ErrorCategory::Input,
            Self::ProcessingError => ErrorCategory::Transient,
            Self::FeatureDisabled => ErrorCategory::Config,
            Self::FileTooLarge => ErrorCategory::Input,
            Self::UploadError => ErrorCategory::Input,
            Self::IntegrityViolation => ErrorCategory::Integrity,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g. `"NOT_FOUND"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Inactive => "INACTIVE",
            Self::Locked => "LOCKED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Unreachable => "UNREACHABLE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ProcessingError => "PROCESSING_ERROR",
            Self::FeatureDisabled => "FEATURE_DISABLED",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::UploadError => "UPLOAD_ERROR",
            Self::IntegrityViolation => "INTEGRITY_VIOLATION",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IvError
// ---------------------------------------------------------------------------

/// Unified pipeline error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context (e.g.
/// `monitor_id`, `run_uuid`, `stage`) so a single log line is enough to
/// reconstruct what failed and why.
///
/// # Examples
///
/// ```
/// use iv_error::{IvError, ErrorCode};
///
/// let err = IvError::new(ErrorCode::Unreachable, "IMAP connect timed out after 30s")
///     .with_context("monitor_id", "mon-1")
///     .with_context("timeout_ms", 30_000);
/// assert_eq!(err.code, ErrorCode::Unreachable);
/// ```
pub struct IvError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl IvError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for IvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("IvError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for IvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for IvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience alias used throughout the workspace.
pub type IvResult<T> = std::result::Result<T, IvError>;

// ---------------------------------------------------------------------------
// Serialization support — the shape returned at the system boundary.
// ---------------------------------------------------------------------------

/// Wire-shape of a failed system-boundary operation: `{ok: false, code,
/// message}` plus optional structured context for UI "skipped because..."
/// rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IvErrorDto {
    /// Always `false` for this shape; present so the DTO round-trips through
    /// the same envelope as a success payload would.
    pub ok: bool,
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&IvError> for IvErrorDto {
    fn from(err: &IvError) -> Self {
        Self {
            ok: false,
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::NotFound,
        ErrorCode::Inactive,
        ErrorCode::Locked,
        ErrorCode::AuthFailed,
        ErrorCode::Unreachable,
        ErrorCode::InvalidInput,
        ErrorCode::ProcessingError,
        ErrorCode::FeatureDisabled,
        ErrorCode::FileTooLarge,
        ErrorCode::UploadError,
        ErrorCode::IntegrityViolation,
        ErrorCode::ConfigInvalid,
        ErrorCode::Internal,
    ];

    #[test]
    fn every_code_has_a_category() {
        for code in ALL_CODES {
            let _ = code.category();
        }
    }

    #[test]
    fn as_str_round_trips_through_serde() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(*code, back);
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn display_includes_context_deterministically() {
        let err = IvError::new(ErrorCode::Locked, "monitor busy")
            .with_context("monitor_id", "mon-1")
            .with_context("owner", "run-2");
        let s = err.to_string();
        assert!(s.starts_with("[LOCKED] monitor busy"));
        assert!(s.contains("mon-1"));
        assert!(s.contains("run-2"));
    }

    #[test]
    fn dto_marks_ok_false_and_omits_empty_context() {
        let err = IvError::new(ErrorCode::NotFound, "no such monitor");
        let dto = IvErrorDto::from(&err);
        assert!(!dto.ok);
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("context"));
    }

    #[test]
    fn source_chain_is_reachable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = IvError::new(ErrorCode::Internal, "wrapped").with_source(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
