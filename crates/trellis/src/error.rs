//! Application error type.

use thiserror::Error;
use trellis_dispatch::{DispatchError, ErrorKind as DispatchKind};
use trellis_render::{ErrorKind, RenderError};

/// Errors from the main request flow.
#[derive(Debug, Error)]
pub enum AppError {
    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Resolution or handler invocation failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl AppError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Render(e) => e.kind(),
            AppError::Dispatch(e) => match e.kind() {
                DispatchKind::Configuration => ErrorKind::Configuration,
                DispatchKind::NotFound => ErrorKind::NotFound,
                DispatchKind::Security => ErrorKind::Security,
                DispatchKind::Engine => ErrorKind::Engine,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passthrough() {
        let err: AppError = RenderError::UnknownFormat("xml".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err: AppError = DispatchError::NoSuitableHandler {
            attempted: vec!["Index".into()],
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "No suitable model found. One of these is required: Index"
        );
    }
}
