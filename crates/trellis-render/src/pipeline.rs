//! The render pipeline.
//!
//! [`RenderPipeline::render`] turns a [`RenderRequest`] into output:
//!
//! 1. pick the output format (request, then settings, then `"html"`; request
//!    signals can force `json`)
//! 2. locate the template source
//! 3. scan the template for helpers and pre-warm them
//! 4. settle the data tree and run data hooks
//! 5. hand everything to the format; `html` compiles and evaluates through
//!    the engine, consulting the compiled and rendered caches
//! 6. run output hooks and after-render hooks
//! 7. write to the sink, or return the string
//!
//! ## Caching
//!
//! Compiled templates are cached under their identifier, without expiry.
//! Rendered output is cached under [`content_hash`] of the compiled template
//! and the data tree, so any change to either produces a different key. Both
//! caches are off by default and can be toggled globally or per identifier
//! through [`Settings`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStore, MemoryCache, COMPILED_NAMESPACE, RENDERED_NAMESPACE};
use crate::error::RenderError;
use crate::format::{Format, FormatInput, FormatTable, TemplateRenderer};
use crate::hooks::RenderHooks;
use crate::scanner::{ScanSyntax, Scanner};
use crate::settings::Settings;
use crate::template::{
    CompiledTemplate, Helper, HelperRegistry, MiniJinjaEngine, TemplateEngine, TemplateIndex,
};

/// Format name used when a request asks for the deployment default.
const DEFAULT_FORMAT_SENTINEL: &str = "default";

/// One render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    template_id: String,
    data: Option<Value>,
    format: Option<String>,
    echo: bool,
    main: bool,
}

impl RenderRequest {
    /// Starts building a request.
    pub fn builder() -> RenderRequestBuilder {
        RenderRequestBuilder::default()
    }

    /// Identifier of the template to render.
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Explicit data, if the caller supplied any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Explicit format name, if any.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Whether the output goes to the sink (`true`) or is returned.
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Whether this is the main render of a request.
    pub fn is_main(&self) -> bool {
        self.main
    }
}

/// Builder for [`RenderRequest`].
#[derive(Debug, Default, Clone)]
pub struct RenderRequestBuilder {
    template_id: Option<String>,
    data: Option<Value>,
    format: Option<String>,
    echo: Option<bool>,
    main: bool,
}

impl RenderRequestBuilder {
    /// Sets the template identifier. Required.
    pub fn template(mut self, id: impl Into<String>) -> Self {
        self.template_id = Some(id.into());
        self
    }

    /// Supplies explicit data instead of the main handler's.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Names the output format.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Write to the sink (default) or return the output.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Marks the request as the main render.
    pub fn main(mut self, main: bool) -> Self {
        self.main = main;
        self
    }

    /// Finishes the request.
    ///
    /// # Errors
    ///
    /// [`RenderError::MissingField`] when no (or an empty) template id was set.
    pub fn build(self) -> Result<RenderRequest, RenderError> {
        let template_id = self
            .template_id
            .filter(|id| !id.is_empty())
            .ok_or(RenderError::MissingField("template_id"))?;

        Ok(RenderRequest {
            template_id,
            data: self.data,
            format: self.format,
            echo: self.echo.unwrap_or(true),
            main: self.main,
        })
    }
}

/// Request properties that can force JSON output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    /// The request carries an explicit `json` query flag.
    pub json_query: bool,
    /// Value of the `Accept` header, if any.
    pub accept: Option<String>,
}

impl RequestSignals {
    /// Returns `true` if these signals force JSON under `settings`.
    pub fn forces_json(&self, settings: &Settings) -> bool {
        (settings.json_url && self.json_query)
            || (settings.json_headers && self.accept.as_deref() == Some("application/json"))
    }
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Output went to the sink. `ok` is `false` when the output was empty.
    Written {
        /// Whether anything was written.
        ok: bool,
    },
    /// Output returned to the caller.
    Output(String),
}

impl RenderOutcome {
    /// The returned output, if the request did not echo.
    pub fn into_output(self) -> Option<String> {
        match self {
            RenderOutcome::Output(s) => Some(s),
            RenderOutcome::Written { .. } => None,
        }
    }
}

/// Hex SHA-256 of the serialized compiled template followed by the serialized
/// data tree. Keys the rendered-output cache.
pub fn content_hash(compiled: &CompiledTemplate, data: &Value) -> Result<String, RenderError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(compiled)?);
    hasher.update(serde_json::to_vec(data)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Locates, compiles, caches and renders templates.
///
/// Shared by reference between concurrent requests; the cache store is the
/// only mutable state.
pub struct RenderPipeline {
    settings: Arc<Settings>,
    index: Arc<TemplateIndex>,
    scanner: Scanner,
    engine: Box<dyn TemplateEngine>,
    helpers: HelperRegistry,
    formats: FormatTable,
    hooks: RenderHooks,
    cache: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("paths", &self.index.paths())
            .field("helpers", &self.helpers)
            .field("formats", &self.formats)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl RenderPipeline {
    /// Starts building a pipeline.
    pub fn builder() -> RenderPipelineBuilder {
        RenderPipelineBuilder::default()
    }

    /// Shared settings.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Template index over the configured search paths.
    pub fn index(&self) -> &Arc<TemplateIndex> {
        &self.index
    }

    /// Dependency scanner bound to the index.
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Registered helpers.
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// Registered formats.
    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// The cache store.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Drops every cached compiled template and rendered output.
    pub fn clear_cache(&self) {
        self.cache.clear(Some(COMPILED_NAMESPACE));
        self.cache.clear(Some(RENDERED_NAMESPACE));
    }

    /// Picks the output format for a request.
    pub fn select_format(&self, request: &RenderRequest, signals: &RequestSignals) -> String {
        if signals.forces_json(&self.settings) {
            return "json".to_string();
        }
        match request.format() {
            Some(name) if name != DEFAULT_FORMAT_SENTINEL => name.to_string(),
            _ => self.settings.default_format().to_string(),
        }
    }

    /// Renders a request.
    ///
    /// `main_data` is called only when the request carries no explicit data.
    /// With `echo` on, output goes to `out` and an empty result is reported as
    /// `Written { ok: false }` with a warning; with `echo` off the output is
    /// returned and `out` is untouched.
    ///
    /// # Errors
    ///
    /// - [`RenderError::UnknownFormat`] if the chosen format is not registered
    /// - [`RenderError::TemplateNotFound`] if the template cannot be located
    /// - engine, serialization and I/O errors from the format or the sink
    pub fn render<F>(
        &self,
        request: &RenderRequest,
        main_data: F,
        signals: &RequestSignals,
        out: &mut dyn Write,
    ) -> Result<RenderOutcome, RenderError>
    where
        F: FnOnce() -> Value,
    {
        let id = request.template_id();
        let format_name = self.select_format(request, signals);
        let format = self.formats.require(&format_name)?;

        let path = self.index.locate(id)?;

        let wanted = self.scanner.scan(id);
        let ran = self.helpers.prewarm(&wanted);
        tracing::debug!(template = %id, scanned = wanted.len(), prewarmed = ran.len(), "helpers pre-warmed");

        let data = match request.data() {
            Some(data) => self.hooks.run_data(data.clone(), request),
            None => {
                let data = self.hooks.run_data(main_data(), request);
                self.hooks.run_main_data(data)
            }
        };

        let output = self.run_format(&**format, id, &path, &data)?;
        let output = self.hooks.run_output(output, request);
        self.hooks.run_after_render(&data, request);

        if !request.echo() {
            return Ok(RenderOutcome::Output(output));
        }

        if output.is_empty() {
            tracing::warn!(template = %id, format = %format_name, "empty output");
            return Ok(RenderOutcome::Written { ok: false });
        }

        out.write_all(output.as_bytes())?;
        Ok(RenderOutcome::Written { ok: true })
    }

    /// Renders `id` with explicit data and the default format, returning the output.
    pub fn render_to_string(&self, id: &str, data: Value) -> Result<String, RenderError> {
        let request = RenderRequest::builder()
            .template(id)
            .data(data)
            .echo(false)
            .build()?;
        let outcome = self.render(
            &request,
            || Value::Null,
            &RequestSignals::default(),
            &mut std::io::sink(),
        )?;
        Ok(outcome.into_output().unwrap_or_default())
    }

    /// Compiles the template at `path`, through the compiled cache when enabled.
    pub fn compile(&self, id: &str, path: &Path) -> Result<CompiledTemplate, RenderError> {
        if !self.settings.compile_cache_enabled(id) {
            return self.engine.compile(id, path);
        }

        if let Some(bytes) = self.cache.get(id, COMPILED_NAMESPACE) {
            match serde_json::from_slice::<CompiledTemplate>(&bytes) {
                Ok(compiled) => {
                    tracing::debug!(template = %id, "compiled cache hit");
                    return Ok(compiled);
                }
                Err(err) => {
                    tracing::warn!(template = %id, error = %err, "discarding unreadable compiled cache entry");
                }
            }
        }

        let compiled = self.engine.compile(id, path)?;
        self.cache
            .set(id, serde_json::to_vec(&compiled)?, COMPILED_NAMESPACE, None);
        Ok(compiled)
    }

    /// Evaluates a compiled template, through the rendered cache when enabled.
    pub fn render_compiled(
        &self,
        compiled: &CompiledTemplate,
        data: &Value,
    ) -> Result<String, RenderError> {
        let id = compiled.id.as_str();
        if !self.settings.render_cache_enabled(id) {
            return self.engine.evaluate(compiled, data);
        }

        let key = content_hash(compiled, data)?;
        if let Some(bytes) = self.cache.get(&key, RENDERED_NAMESPACE) {
            if let Ok(rendered) = String::from_utf8(bytes) {
                tracing::debug!(template = %id, key = %key, "rendered cache hit");
                return Ok(rendered);
            }
        }

        let rendered = self.engine.evaluate(compiled, data)?;
        self.cache.set(
            &key,
            rendered.clone().into_bytes(),
            RENDERED_NAMESPACE,
            Some(self.settings.rendered_ttl(id)),
        );
        Ok(rendered)
    }

    fn run_format(
        &self,
        format: &dyn Format,
        id: &str,
        path: &Path,
        data: &Value,
    ) -> Result<String, RenderError> {
        let input = FormatInput::new(id, path, data, self);
        format.render(&input)
    }
}

impl TemplateRenderer for RenderPipeline {
    fn render_template(&self, id: &str, path: &Path, data: &Value) -> Result<String, RenderError> {
        let compiled = self.compile(id, path)?;
        self.render_compiled(&compiled, data)
    }
}

/// Builder for [`RenderPipeline`].
#[derive(Default)]
pub struct RenderPipelineBuilder {
    paths: Vec<PathBuf>,
    settings: Option<Arc<Settings>>,
    cache: Option<Arc<dyn CacheStore>>,
    engine: Option<Box<dyn TemplateEngine>>,
    helpers: HelperRegistry,
    formats: Option<FormatTable>,
    hooks: RenderHooks,
    syntax: Option<ScanSyntax>,
}

impl RenderPipelineBuilder {
    /// Appends a template search directory. Earlier directories win.
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Appends several template search directories.
    pub fn template_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Shares deployment settings. Defaults to [`Settings::default`].
    pub fn settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Uses `cache` for compiled and rendered output. Defaults to a fresh [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the default MiniJinja engine.
    pub fn engine<E: TemplateEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Registers a helper, callable from templates and pre-warmed before renders.
    pub fn helper<H: Helper + 'static>(mut self, name: impl Into<String>, helper: H) -> Self {
        self.helpers.insert(name, Arc::new(helper));
        self
    }

    /// Registers (or replaces) an output format.
    pub fn format<F: Format + 'static>(mut self, name: impl Into<String>, format: F) -> Self {
        self.formats
            .get_or_insert_with(FormatTable::default)
            .insert(name, Arc::new(format));
        self
    }

    /// Starts from `formats` instead of the built-in table.
    pub fn formats(mut self, formats: FormatTable) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Adds render hooks, after any already added.
    pub fn hooks(mut self, hooks: RenderHooks) -> Self {
        self.hooks = std::mem::take(&mut self.hooks).extend(hooks);
        self
    }

    /// Uses custom scanner patterns.
    pub fn scan_syntax(mut self, syntax: ScanSyntax) -> Self {
        self.syntax = Some(syntax);
        self
    }

    /// Builds the pipeline, indexing every search path once.
    pub fn build(self) -> RenderPipeline {
        let settings = self.settings.unwrap_or_default();
        let index = Arc::new(TemplateIndex::new(
            self.paths,
            settings.template_extension.clone(),
        ));
        let scanner = Scanner::with_syntax(Arc::clone(&index), self.syntax.unwrap_or_default());

        let mut engine = self
            .engine
            .unwrap_or_else(|| Box::new(MiniJinjaEngine::with_index(Arc::clone(&index))));
        for (name, helper) in self.helpers.iter() {
            engine.register_helper(name, Arc::clone(helper));
        }

        tracing::debug!(
            templates = index.len(),
            helpers = self.helpers.len(),
            "render pipeline ready"
        );

        RenderPipeline {
            settings,
            index,
            scanner,
            engine,
            helpers: self.helpers,
            formats: self.formats.unwrap_or_default(),
            hooks: self.hooks,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(MemoryCache::new())),
        }
    }
}
