//! Render-time hooks.
//!
//! Hooks let the embedding application adjust data and output without
//! touching templates or formats. They run at fixed points of
//! [`RenderPipeline::render`](crate::RenderPipeline::render):
//!
//! ```text
//! request data / main data
//!   → DATA hooks           (every render)
//!   → MAIN DATA hooks      (only when the data came from the main handler)
//!   → format
//!   → OUTPUT hooks         (transform the produced string)
//!   → AFTER RENDER hooks   (observe the final data)
//!   → echo or return
//! ```
//!
//! Each chain runs in registration order, each hook receiving the previous
//! hook's result.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::pipeline::RenderRequest;

/// Transforms the data tree of any render.
pub type DataFn = Arc<dyn Fn(Value, &RenderRequest) -> Value + Send + Sync>;

/// Transforms the data tree of a main render.
pub type MainDataFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Transforms the produced output.
pub type OutputFn = Arc<dyn Fn(String, &RenderRequest) -> String + Send + Sync>;

/// Observes the final data tree after the output is produced.
pub type AfterRenderFn = Arc<dyn Fn(&Value, &RenderRequest) + Send + Sync>;

/// Hook chains applied by the render pipeline.
#[derive(Clone, Default)]
pub struct RenderHooks {
    data: Vec<DataFn>,
    main_data: Vec<MainDataFn>,
    output: Vec<OutputFn>,
    after_render: Vec<AfterRenderFn>,
}

impl RenderHooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
            && self.main_data.is_empty()
            && self.output.is_empty()
            && self.after_render.is_empty()
    }

    /// Adds a data hook.
    ///
    /// # Example
    ///
    /// ```rust
    /// use trellis_render::RenderHooks;
    ///
    /// let hooks = RenderHooks::new().data(|mut data, _req| {
    ///     data["generator"] = "trellis".into();
    ///     data
    /// });
    /// ```
    pub fn data<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &RenderRequest) -> Value + Send + Sync + 'static,
    {
        self.data.push(Arc::new(f));
        self
    }

    /// Adds a main-data hook.
    pub fn main_data<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.main_data.push(Arc::new(f));
        self
    }

    /// Adds an output hook.
    pub fn output<F>(mut self, f: F) -> Self
    where
        F: Fn(String, &RenderRequest) -> String + Send + Sync + 'static,
    {
        self.output.push(Arc::new(f));
        self
    }

    /// Adds an after-render hook.
    pub fn after_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &RenderRequest) + Send + Sync + 'static,
    {
        self.after_render.push(Arc::new(f));
        self
    }

    /// Appends every chain of `other` after this one's.
    pub fn extend(mut self, other: RenderHooks) -> Self {
        self.data.extend(other.data);
        self.main_data.extend(other.main_data);
        self.output.extend(other.output);
        self.after_render.extend(other.after_render);
        self
    }

    pub(crate) fn run_data(&self, data: Value, request: &RenderRequest) -> Value {
        self.data.iter().fold(data, |acc, hook| hook(acc, request))
    }

    pub(crate) fn run_main_data(&self, data: Value) -> Value {
        self.main_data.iter().fold(data, |acc, hook| hook(acc))
    }

    pub(crate) fn run_output(&self, output: String, request: &RenderRequest) -> String {
        self.output.iter().fold(output, |acc, hook| hook(acc, request))
    }

    pub(crate) fn run_after_render(&self, data: &Value, request: &RenderRequest) {
        for hook in &self.after_render {
            hook(data, request);
        }
    }
}

impl fmt::Debug for RenderHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHooks")
            .field("data_count", &self.data.len())
            .field("main_data_count", &self.main_data.len())
            .field("output_count", &self.output.len())
            .field("after_render_count", &self.after_render.len())
            .finish()
    }
}
