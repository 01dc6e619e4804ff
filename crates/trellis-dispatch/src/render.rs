//! Render function abstraction.
//!
//! The dispatcher renders response partials but does not know about
//! templates. It is handed a function that turns a partial name and a data
//! tree into a string; the `trellis` facade wires that function to the render
//! pipeline.

use std::sync::Arc;

use serde_json::Value;

/// The render function signature: `(partial, data) -> output`.
pub type RenderFn = Arc<dyn Fn(&str, &Value) -> Result<String, RenderError> + Send + Sync>;

/// Errors a render function can report.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Template rendering failed
    #[error("render error: {0}")]
    Render(String),

    /// Data serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(e: serde_json::Error) -> Self {
        RenderError::Serialization(e.to_string())
    }
}

/// Creates a render function that ignores the partial and emits compact JSON.
///
/// Useful when no template engine is wired in.
pub fn json_render() -> RenderFn {
    Arc::new(|_partial, data| serde_json::to_string(data).map_err(RenderError::from))
}

/// Creates a render function from a closure.
pub fn from_fn<F>(f: F) -> RenderFn
where
    F: Fn(&str, &Value) -> Result<String, RenderError> + Send + Sync + 'static,
{
    Arc::new(f)
}
