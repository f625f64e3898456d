//! Unified error types for the Stevedore workspace.
//!
//! Every stage of the manifest pipeline reports failures through
//! [`ComposeError`]. Callers that only care about the broad class of a
//! failure can match on [`ComposeError::kind`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A document or version string has an invalid shape.
    #[error("invalid format: {message}")]
    Format {
        /// Description of the malformed input.
        message: String,
    },

    /// The YAML parser rejected a document.
    #[error("failed to parse YAML document: {source}")]
    Yaml {
        /// Underlying parser error.
        #[from]
        source: serde_yaml::Error,
    },

    /// A variable reference could not be substituted.
    #[error("invalid interpolation format for {field}: {message}")]
    Interpolation {
        /// Field whose value contained the reference.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// An external file referenced by a manifest could not be resolved.
    #[error("cannot resolve reference in {}: {message}", file.display())]
    UnresolvableReference {
        /// Manifest file containing the reference.
        file: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The manifest declares a schema version this engine refuses to handle.
    #[error("compose file version {version} is not supported")]
    UnsupportedVersion {
        /// Version string as declared in the manifest.
        version: String,
    },

    /// A raw value could not be converted into its typed representation.
    #[error("cannot convert {field}: {message}")]
    Conversion {
        /// Service, volume, or network being converted.
        field: String,
        /// Description of the type mismatch.
        message: String,
    },

    /// A caller-supplied pre- or post-processing hook failed.
    #[error("processing hook failed: {message}")]
    Hook {
        /// Message reported by the hook.
        message: String,
    },

    /// A service definition failed structural validation.
    #[error("service \"{service}\" is invalid: {message}")]
    Validation {
        /// Name of the offending service.
        service: String,
        /// Description of the problem.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A project-level configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

/// Broad classification of a [`ComposeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed document or version string.
    Format,
    /// Malformed reference or undefined required variable.
    Interpolation,
    /// Missing resource lookup or failed lookup.
    UnresolvableReference,
    /// Schema version outside the supported range.
    UnsupportedVersion,
    /// Raw to typed conversion failure.
    Conversion,
    /// Structural validation failure.
    Validation,
    /// Anything else (I/O, hooks, project configuration).
    Other,
}

impl ComposeError {
    /// Returns the broad class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::Yaml { .. } => ErrorKind::Format,
            Self::Interpolation { .. } => ErrorKind::Interpolation,
            Self::UnresolvableReference { .. } => ErrorKind::UnresolvableReference,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Hook { .. } | Self::Io { .. } | Self::Config { .. } => ErrorKind::Other,
        }
    }

    /// Builds a [`ComposeError::Conversion`] from any displayable cause.
    pub fn conversion(field: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Conversion {
            field: field.into(),
            message: cause.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ComposeError>;
