//! Error types for the render pipeline.
//!
//! [`RenderError`] is the single error type returned by compiling, caching,
//! formatting and rendering. It abstracts over the underlying template
//! engine's errors so the public API does not leak minijinja types.
//!
//! Every error belongs to one [`ErrorKind`], which callers use to decide how a
//! failure is surfaced (for example, security failures never carry detail).

use std::fmt;
use std::path::PathBuf;

/// Failure classes shared by rendering and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required request field is missing or a setting names something unknown.
    Configuration,
    /// A handler or template source could not be located.
    NotFound,
    /// Replay-token mismatch or a disallowed request path.
    Security,
    /// The template engine or a serializer failed.
    Engine,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Security => write!(f, "security"),
            ErrorKind::Engine => write!(f, "engine"),
        }
    }
}

/// Error type for render operations.
#[derive(Debug)]
pub enum RenderError {
    /// A render request was constructed without a required field.
    MissingField(&'static str),

    /// The requested output format is not in the format table.
    UnknownFormat(String),

    /// Template source could not be located in any search path.
    TemplateNotFound {
        /// The identifier that was requested.
        id: String,
        /// Every directory that was searched, in order.
        searched: Vec<PathBuf>,
    },

    /// Template syntax error or evaluation failure reported by the engine.
    TemplateError(String),

    /// Data serialization error (JSON/YAML encoding).
    SerializationError(String),

    /// A helper failed while being invoked.
    HelperError {
        /// Helper name.
        name: String,
        /// Message reported by the helper.
        message: String,
    },

    /// I/O error (reading template source or writing output).
    IoError(std::io::Error),
}

impl RenderError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::MissingField(_) | RenderError::UnknownFormat(_) => {
                ErrorKind::Configuration
            }
            RenderError::TemplateNotFound { .. } => ErrorKind::NotFound,
            RenderError::TemplateError(_)
            | RenderError::SerializationError(_)
            | RenderError::HelperError { .. }
            | RenderError::IoError(_) => ErrorKind::Engine,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingField(field) => {
                write!(f, "no {} is given to the render function", field)
            }
            RenderError::UnknownFormat(name) => write!(f, "unknown output format: {}", name),
            RenderError::TemplateNotFound { id, searched } => {
                write!(f, "error loading template file: {}", id)?;
                if !searched.is_empty() {
                    let paths: Vec<String> =
                        searched.iter().map(|p| p.display().to_string()).collect();
                    write!(f, " (searched: {})", paths.join(", "))?;
                }
                Ok(())
            }
            RenderError::TemplateError(msg) => write!(f, "template error: {}", msg),
            RenderError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            RenderError::HelperError { name, message } => {
                write!(f, "helper '{}' failed: {}", name, message)
            }
            RenderError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::IoError(err)
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for RenderError {
    fn from(err: serde_yaml::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

// Template lookups go through the index, so a minijinja "not found" only
// happens for includes and is reported with the engine's message.
impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        use minijinja::ErrorKind as MjKind;

        match err.kind() {
            MjKind::BadSerialization => RenderError::SerializationError(err.to_string()),
            _ => RenderError::TemplateError(err.to_string()),
        }
    }
}
