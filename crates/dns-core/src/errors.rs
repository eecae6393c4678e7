//! Structured error types shared across the sampler crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`DnsError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, indices, option names).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the sampler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum DnsError {
    /// Invalid options detected before a run is allowed to start.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Failures raised by a user supplied model.
    #[error("model error: {0}")]
    Model(ErrorInfo),
    /// Filesystem failures while persisting or restoring run output.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Encoding and decoding failures (checkpoints, manifests, samples).
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Operations requested in the wrong engine state.
    #[error("lifecycle error: {0}")]
    Lifecycle(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl DnsError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            DnsError::Config(info)
            | DnsError::Model(info)
            | DnsError::Io(info)
            | DnsError::Serde(info)
            | DnsError::Lifecycle(info) => info,
        }
    }

    /// Adds a context entry to whichever payload the error carries.
    pub fn with_context(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match self {
            DnsError::Config(info) => DnsError::Config(info.with_context(key, value)),
            DnsError::Model(info) => DnsError::Model(info.with_context(key, value)),
            DnsError::Io(info) => DnsError::Io(info.with_context(key, value)),
            DnsError::Serde(info) => DnsError::Serde(info.with_context(key, value)),
            DnsError::Lifecycle(info) => DnsError::Lifecycle(info.with_context(key, value)),
        }
    }

    /// Shorthand for a configuration error carrying the offending option name.
    pub fn config(code: &str, option: &str, message: impl Into<String>) -> Self {
        DnsError::Config(ErrorInfo::new(code, message).with_context("option", option))
    }

    /// Shorthand for a model error with a free-form message.
    pub fn model(code: &str, message: impl Into<String>) -> Self {
        DnsError::Model(ErrorInfo::new(code, message))
    }

    /// Wraps an I/O failure that happened while touching `path`.
    pub fn io(code: &str, path: &std::path::Path, err: impl Display) -> Self {
        DnsError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
