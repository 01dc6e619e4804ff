//! The application: resolution, handlers and rendering wired together.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use trellis_dispatch::{
    camelcase_to_dashed, DispatchError, Dispatcher, Handler, HandlerLookup, HandlerRegistry,
    MethodHandler, MethodSelection, RemoteRequest, RemoteResponse, RenderFn, RequestContext,
    Resolver, ResolverHooks,
};
use trellis_render::{
    CacheStore, Format, Helper, RenderHooks, RenderOutcome, RenderPipeline, RenderRequest,
    RequestSignals, Settings,
};

use crate::error::AppError;
use crate::host::{merge_site, HostData};

/// A configured site.
///
/// Built once at startup and shared by reference between requests.
///
/// # Example
///
/// ```rust
/// use trellis::{App, ContentItem, MethodHandler, Predicate, RequestSignals, StaticContext};
/// use serde_json::json;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("single.jinja"), "{{ heading }} on {{ site.name }}").unwrap();
///
/// let app = App::builder()
///     .template_path(dir.path())
///     .handler_methods("Single", MethodHandler::new().method("heading", |_| Ok(json!("Hello"))))
///     .build();
///
/// let mut ctx = StaticContext::builder()
///     .predicate(Predicate::Single)
///     .item(ContentItem { id: 1, slug: "hello".into(), post_type: "post".into(), ..Default::default() })
///     .current(1)
///     .site_info("name", "Field Notes")
///     .build();
///
/// let mut out = Vec::new();
/// app.handle_request(&mut ctx, &RequestSignals::default(), &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "Hello on Field Notes");
/// ```
pub struct App {
    pipeline: Arc<RenderPipeline>,
    handlers: Arc<HandlerRegistry>,
    resolver: Arc<Resolver>,
    dispatcher: Dispatcher,
    host: HostData,
    disabled: AtomicBool,
}

impl App {
    /// Starts building an app.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn settings(&self) -> &Settings {
        self.pipeline.settings()
    }

    /// Turns [`App::handle_request`] into a no-op, for hosts that render the
    /// page some other way.
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Serves a page request.
    ///
    /// Runs the router hooks, resolves the handler, fetches all of its data
    /// and renders it, merged with the host data under `site`, to `out`.
    /// The template is the handler's own override, or its dashed name.
    ///
    /// Returns `Ok(None)` when the app is disabled.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoSuitableHandler`] if the resolved handler is not
    ///   registered, listing every name tried
    /// - [`DispatchError::Invocation`] if the handler fails
    /// - any render error
    pub fn handle_request(
        &self,
        ctx: &mut dyn RequestContext,
        signals: &RequestSignals,
        out: &mut dyn Write,
    ) -> Result<Option<RenderOutcome>, AppError> {
        self.resolver.hooks().run_router(ctx);

        let resolution = self.resolver.resolve(ctx, self.handlers.as_ref());
        let name = self.resolver.hooks().run_template(resolution.handler);

        if self.is_disabled() {
            tracing::debug!(handler = %name, "app disabled, skipping render");
            return Ok(None);
        }

        if !self.handlers.exists(&name) {
            return Err(DispatchError::NoSuitableHandler {
                attempted: resolution.attempted,
            }
            .into());
        }
        let mut handler = self
            .handlers
            .instantiate(&name, &Value::Null)
            .ok_or_else(|| DispatchError::HandlerNotFound(name.clone()))?;

        let data = handler
            .fetch(&MethodSelection::All)
            .map_err(DispatchError::Invocation)?;
        let partial = partial_for(handler.as_ref(), &name);
        tracing::debug!(handler = %name, partial = %partial, "rendering main handler");

        let request = RenderRequest::builder()
            .template(partial)
            .main(true)
            .echo(true)
            .build()?;
        let site = self.host.collect(ctx, false);
        let outcome = self
            .pipeline
            .render(&request, || merge_site(data, site), signals, out)?;
        Ok(Some(outcome))
    }

    /// Serves a remote call.
    ///
    /// Rendered partials receive the handler or function data as is; host
    /// data is never merged into it.
    pub fn handle_remote(
        &self,
        request: &RemoteRequest,
        ctx: &mut dyn RequestContext,
    ) -> RemoteResponse {
        let render = self.remote_render();
        self.dispatcher.dispatch(request, ctx, &render)
    }

    /// Collects the host data for `ctx`.
    ///
    /// With `remote` set, the keys in `Settings::remote_hidden_site_keys` are
    /// left out. Runs the `host_data` hooks.
    pub fn host_data(&self, ctx: &dyn RequestContext, remote: bool) -> Value {
        self.host.collect(ctx, remote)
    }

    /// Renders a template with explicit data, returning the output.
    pub fn render(&self, template: &str, data: Value) -> Result<String, AppError> {
        Ok(self.pipeline.render_to_string(template, data)?)
    }

    fn remote_render(&self) -> RenderFn {
        let pipeline = Arc::clone(&self.pipeline);
        Arc::new(move |partial: &str, data: &Value| {
            pipeline
                .render_to_string(partial, data.clone())
                .map_err(|e| trellis_dispatch::RenderError::Render(e.to_string()))
        })
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("pipeline", &self.pipeline)
            .field("handlers", &self.handlers)
            .field("host", &self.host)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

fn partial_for(handler: &dyn Handler, name: &str) -> String {
    handler
        .template()
        .unwrap_or_else(|| camelcase_to_dashed(name))
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    settings: Option<Arc<Settings>>,
    render: trellis_render::RenderPipelineBuilder,
    resolver_hooks: ResolverHooks,
    handlers: HandlerRegistry,
    dispatcher: trellis_dispatch::DispatcherBuilder,
    host: HostData,
}

impl AppBuilder {
    /// Adds a template search path. Earlier paths win.
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.render = self.render.template_path(path);
        self
    }

    /// Adds several template search paths.
    pub fn template_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.render = self.render.template_paths(paths);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Replaces the default in-memory cache store.
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.render = self.render.cache(cache);
        self
    }

    /// Registers a template helper.
    pub fn helper<H: Helper + 'static>(mut self, name: impl Into<String>, helper: H) -> Self {
        self.render = self.render.helper(name, helper);
        self
    }

    /// Registers an output format.
    pub fn format<F: Format + 'static>(mut self, name: impl Into<String>, format: F) -> Self {
        self.render = self.render.format(name, format);
        self
    }

    /// Adds render hooks.
    pub fn render_hooks(mut self, hooks: RenderHooks) -> Self {
        self.render = self.render.hooks(hooks);
        self
    }

    /// Sets the router, rules and template hooks.
    pub fn resolver_hooks(mut self, hooks: ResolverHooks) -> Self {
        self.resolver_hooks = hooks;
        self
    }

    /// Registers a handler factory.
    pub fn handler<F, H>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> H + Send + Sync + 'static,
        H: Handler + 'static,
    {
        self.handlers.register(name, factory);
        self
    }

    /// Registers a handler built from named methods.
    pub fn handler_methods(mut self, name: impl Into<String>, prototype: MethodHandler) -> Self {
        self.handlers.register_methods(name, prototype);
        self
    }

    /// Registers a function callable over the remote transport.
    pub fn remote_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.dispatcher = self.dispatcher.function(name, f);
        self
    }

    /// Adds a hook over the collected host data.
    pub fn host_data<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.host = self.host.hook(f);
        self
    }

    /// Remote-call endpoint, published to templates as `site.remote_url`.
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.host = self.host.remote_url(url);
        self
    }

    pub fn build(self) -> App {
        let settings = self.settings.unwrap_or_default();

        let pipeline = Arc::new(self.render.settings(Arc::clone(&settings)).build());

        let handlers = Arc::new(self.handlers);
        let resolver = Arc::new(
            Resolver::new()
                .with_hooks(self.resolver_hooks)
                .with_attachments(settings.resolve_attachments),
        );
        let dispatcher = self
            .dispatcher
            .handlers(Arc::clone(&handlers))
            .resolver(Arc::clone(&resolver))
            .debug(settings.debug)
            .build();
        let host = self
            .host
            .hidden_on_remote(settings.remote_hidden_site_keys.clone());

        App {
            pipeline,
            handlers,
            resolver,
            dispatcher,
            host,
            disabled: AtomicBool::new(false),
        }
    }
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("handlers", &self.handlers)
            .field("resolver_hooks", &self.resolver_hooks)
            .field("host", &self.host)
            .finish()
    }
}
