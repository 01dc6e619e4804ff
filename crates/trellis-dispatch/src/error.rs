//! Dispatch error types.

use thiserror::Error;

use crate::render::RenderError;

/// Failure classes shared with the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required request field is missing or malformed.
    Configuration,
    /// A handler or template could not be located.
    NotFound,
    /// Replay-token mismatch or a disallowed request path.
    Security,
    /// A handler, remote function or the renderer failed.
    Engine,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Security => write!(f, "security"),
            ErrorKind::Engine => write!(f, "engine"),
        }
    }
}

/// Errors raised while resolving or invoking a handler.
///
/// The `Display` text of each variant is what a remote caller sees in the
/// `error` field of the response, so security failures stay generic.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request carried no payload.
    #[error("Something went wrong. There was no payload present at the request.")]
    MissingPayload,

    /// The payload carried no path.
    #[error("Remote call did not have a function path defined.")]
    MissingPath,

    /// The payload token is absent or differs from the cookie token.
    #[error("CSRF token mismatch.")]
    TokenMismatch,

    /// The path contains characters outside the allow-list.
    #[error("Remote call path contains illegal characters.")]
    IllegalPath,

    /// The path has too many segments or an empty half.
    #[error("Remote call did not have a proper function path defined (syntax: model/function).")]
    MalformedPath,

    /// No handler is registered under the resolved name.
    #[error("Model '{0}' does not exist.")]
    HandlerNotFound(String),

    /// No resolution candidate named a registered handler.
    #[error("No suitable model found. One of these is required: {}", .attempted.join(", "))]
    NoSuitableHandler {
        /// Every candidate name tried, in order.
        attempted: Vec<String>,
    },

    /// A handler method or remote function failed.
    #[error("{0}")]
    Invocation(anyhow::Error),

    /// Rendering the response partial failed.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DispatchError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::MissingPayload
            | DispatchError::MissingPath
            | DispatchError::MalformedPath => ErrorKind::Configuration,
            DispatchError::TokenMismatch | DispatchError::IllegalPath => ErrorKind::Security,
            DispatchError::HandlerNotFound(_) | DispatchError::NoSuitableHandler { .. } => {
                ErrorKind::NotFound
            }
            DispatchError::Invocation(_) | DispatchError::Render(_) => ErrorKind::Engine,
        }
    }
}
