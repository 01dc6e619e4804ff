//! # Trellis Render - Cached Template Rendering
//!
//! `trellis-render` locates templates across ordered search paths, compiles
//! them, evaluates them against a JSON data tree and caches both stages.
//!
//! It is the rendering half of the `trellis` workspace. It knows nothing about
//! handlers or request routing: it takes a template identifier and data and
//! produces a string.
//!
//! ## Core Concepts
//!
//! - [`RenderPipeline`]: Locate, scan, compile, cache and render
//! - [`RenderRequest`]: One render call (template id, data, format, echo)
//! - [`TemplateIndex`]: Identifier → source file across search paths
//! - [`Scanner`]: Finds the helpers a template uses, through includes
//! - [`HelperRegistry`]: Named routines callable from templates, pre-warmed before renders
//! - [`FormatTable`]: Output formats by name (`html`, `json`, `yaml`, yours)
//! - [`CacheStore`]: Namespaced key/value cache with expiry
//! - [`Settings`]: Cache policy, default format, JSON switches
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_render::RenderPipeline;
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("card.jinja"), "<h2>{{ title }}</h2>").unwrap();
//!
//! let pipeline = RenderPipeline::builder()
//!     .template_path(dir.path())
//!     .build();
//!
//! let html = pipeline.render_to_string("card", json!({"title": "Hello"})).unwrap();
//! assert_eq!(html, "<h2>Hello</h2>");
//! ```
//!
//! ## Caching
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_render::{MemoryCache, RenderPipeline, Settings};
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("card.jinja"), "{{ n }}").unwrap();
//!
//! let cache = Arc::new(MemoryCache::new());
//! let settings = Settings {
//!     cache_partials: true,
//!     cache_rendered: true,
//!     ..Settings::default()
//! };
//! let pipeline = RenderPipeline::builder()
//!     .template_path(dir.path())
//!     .settings(Arc::new(settings))
//!     .cache(cache.clone())
//!     .build();
//!
//! pipeline.render_to_string("card", json!({"n": 1})).unwrap();
//! pipeline.render_to_string("card", json!({"n": 1})).unwrap();
//! assert_eq!(cache.len(), 2); // one compiled template, one rendered output
//! ```

pub mod cache;
mod error;
pub mod format;
mod hooks;
mod pipeline;
pub mod scanner;
mod settings;
pub mod template;

pub use cache::{CacheStore, MemoryCache, NoopCache, COMPILED_NAMESPACE, RENDERED_NAMESPACE};
pub use error::{ErrorKind, RenderError};
pub use format::{Format, FormatInput, FormatTable, HtmlFormat, JsonFormat, YamlFormat};
pub use hooks::{AfterRenderFn, DataFn, MainDataFn, OutputFn, RenderHooks};
pub use pipeline::{
    content_hash, RenderOutcome, RenderPipeline, RenderPipelineBuilder, RenderRequest,
    RenderRequestBuilder, RequestSignals,
};
pub use scanner::{ScanSyntax, Scanner};
pub use settings::{PartialSettings, Settings, DEFAULT_RENDERED_EXPIRE_TIME};
pub use template::{
    bare_identifier, Bodies, Chunk, CompiledTemplate, EvalContext, Helper, HelperRegistry,
    MiniJinjaEngine, Params, TemplateEngine, TemplateIndex,
};
