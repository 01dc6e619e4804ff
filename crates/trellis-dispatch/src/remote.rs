//! Remote invocation.
//!
//! Client-side code calls handler methods or registered functions through a
//! JSON payload:
//!
//! ```json
//! {"token": "...", "path": "Archive/posts,title", "args": {"page": 2},
//!  "partial": "archive-list", "render": "false", "tidy": "true"}
//! ```
//!
//! The payload token must equal the token cookie set for the session. The
//! `path` is either the name of a registered [`RemoteFunction`] or a
//! `Handler/method1,method2` pair. A single segment that names no function
//! calls the handler resolved for the current context.
//!
//! Every outcome, including rejections, is a [`RemoteResponse`]:
//! `{"success": ...}` (plus `{"debug": ...}` with debugging enabled) or
//! `{"error": "..."}`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::handler::{HandlerLookup, HandlerRegistry, MethodSelection};
use crate::render::RenderFn;
use crate::resolver::Resolver;
use crate::util::camelcase_to_dashed;

/// Allowed path characters: an identifier start, then identifier characters,
/// `/` and `,`. Non-ASCII letters are accepted.
static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_\x{7f}-\x{10FFFF}][A-Za-z0-9_,/\x{7f}-\x{10FFFF}]*$")
        .expect("valid path pattern")
});

/// A payload flag sent either as a JSON boolean or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    /// `true` or `"true"`.
    pub fn is_true(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s == "true",
        }
    }

    /// `false` or `"false"`.
    pub fn is_false(&self) -> bool {
        match self {
            Flag::Bool(b) => !*b,
            Flag::Text(s) => s == "false",
        }
    }
}

/// The JSON body of a remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Passed to the handler factory or remote function.
    #[serde(default)]
    pub args: Value,
    /// Partial to render the result with.
    #[serde(default)]
    pub partial: Option<String>,
    /// Render with the handler's own template.
    #[serde(default)]
    pub render: Option<Flag>,
    /// Unwrap the result of a single-method call.
    #[serde(default)]
    pub tidy: Option<Flag>,
}

impl RemotePayload {
    /// Parses a payload from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A remote call as received by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteRequest {
    pub payload: Option<RemotePayload>,
    /// The session token cookie.
    pub cookie_token: Option<String>,
}

impl RemoteRequest {
    pub fn new(payload: RemotePayload, cookie_token: impl Into<String>) -> Self {
        Self {
            payload: Some(payload),
            cookie_token: Some(cookie_token.into()),
        }
    }
}

/// What a remote path asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationTarget {
    /// A registered remote function.
    Function(String),
    /// A handler, or the resolved handler when `name` is `None`.
    Handler {
        name: Option<String>,
        methods: Vec<String>,
    },
}

impl InvocationTarget {
    /// Parses a validated path. `functions` is the registered function table.
    pub fn parse(path: &str, functions: &dyn HandlerLookup) -> Result<Self, DispatchError> {
        if functions.exists(path) {
            return Ok(InvocationTarget::Function(path.to_string()));
        }

        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [model, methods] => {
                if model.is_empty() || methods.is_empty() {
                    return Err(DispatchError::MalformedPath);
                }
                Ok(InvocationTarget::Handler {
                    name: Some(model.to_string()),
                    methods: methods.split(',').map(str::to_string).collect(),
                })
            }
            [_] => Ok(InvocationTarget::Handler {
                name: None,
                methods: Vec::new(),
            }),
            _ => Err(DispatchError::MalformedPath),
        }
    }
}

/// Response of a remote call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemoteResponse {
    Success {
        success: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug: Option<Value>,
    },
    Error {
        error: String,
    },
}

impl RemoteResponse {
    pub fn success(value: Value) -> Self {
        RemoteResponse::Success {
            success: value,
            debug: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RemoteResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteResponse::Success { .. })
    }

    /// Serializes the response body.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("Response serialization failed: {}", e) })
                .to_string()
        })
    }
}

/// A function callable by name over the remote transport.
pub type RemoteFunction = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;

/// Compares two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Both tokens present, non-empty and equal.
pub fn tokens_match(payload: Option<&str>, cookie: Option<&str>) -> bool {
    match (payload, cookie) {
        (Some(p), Some(c)) if !p.is_empty() && !c.is_empty() => {
            constant_time_eq(p.as_bytes(), c.as_bytes())
        }
        _ => false,
    }
}

#[derive(Clone, Default)]
struct FunctionTable(BTreeMap<String, RemoteFunction>);

impl HandlerLookup for FunctionTable {
    fn exists(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// Executes remote calls against the handler registry.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    resolver: Arc<Resolver>,
    functions: FunctionTable,
    debug: bool,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Whether a remote function is registered under `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.exists(name)
    }

    /// Handles a remote call. Failures are reported in the response.
    pub fn dispatch(
        &self,
        request: &RemoteRequest,
        ctx: &mut dyn RequestContext,
        render: &RenderFn,
    ) -> RemoteResponse {
        match self.try_dispatch(request, ctx, render) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "remote call rejected");
                RemoteResponse::error(err.to_string())
            }
        }
    }

    /// Handles a remote call, returning failures as errors.
    pub fn try_dispatch(
        &self,
        request: &RemoteRequest,
        ctx: &mut dyn RequestContext,
        render: &RenderFn,
    ) -> Result<RemoteResponse, DispatchError> {
        let payload = request
            .payload
            .as_ref()
            .ok_or(DispatchError::MissingPayload)?;

        if !tokens_match(payload.token.as_deref(), request.cookie_token.as_deref()) {
            return Err(DispatchError::TokenMismatch);
        }

        let path = payload
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(DispatchError::MissingPath)?;
        if !PATH_PATTERN.is_match(path) {
            return Err(DispatchError::IllegalPath);
        }

        match InvocationTarget::parse(path, &self.functions)? {
            InvocationTarget::Function(name) => self.call_function(&name, payload, render),
            InvocationTarget::Handler { name, methods } => {
                let name = match name {
                    Some(name) => name,
                    None => {
                        self.resolver.hooks().run_router(ctx);
                        self.resolver.resolve_name(ctx, self.handlers.as_ref())
                    }
                };
                self.call_handler(&name, methods, payload, render)
            }
        }
    }

    fn call_function(
        &self,
        name: &str,
        payload: &RemotePayload,
        render: &RenderFn,
    ) -> Result<RemoteResponse, DispatchError> {
        let Some(function) = self.functions.0.get(name) else {
            return Err(DispatchError::HandlerNotFound(name.to_string()));
        };
        tracing::debug!(function = name, "calling remote function");
        let data = function(&payload.args).map_err(DispatchError::Invocation)?;

        match payload.partial.as_deref().filter(|p| !p.is_empty()) {
            None => Ok(RemoteResponse::success(data)),
            Some(partial) => self.rendered(partial, data, render),
        }
    }

    fn call_handler(
        &self,
        name: &str,
        methods: Vec<String>,
        payload: &RemotePayload,
        render: &RenderFn,
    ) -> Result<RemoteResponse, DispatchError> {
        let mut partial = payload
            .render
            .as_ref()
            .filter(|r| r.is_true())
            .map(|_| camelcase_to_dashed(name));
        let tidy = payload.tidy.as_ref().is_some_and(|t| !t.is_false());
        if let Some(explicit) = payload.partial.as_deref().filter(|p| !p.is_empty()) {
            partial = Some(explicit.to_string());
        }

        let mut handler = self
            .handlers
            .instantiate(name, &payload.args)
            .ok_or_else(|| DispatchError::HandlerNotFound(name.to_string()))?;

        let selection = MethodSelection::from_methods(methods);
        tracing::debug!(handler = name, selection = ?selection, tidy, "invoking handler");
        let mut data = handler
            .fetch(&selection)
            .map_err(DispatchError::Invocation)?;

        if tidy {
            if let Some(method) = selection.single() {
                data = data.get(method).cloned().unwrap_or(Value::Null);
            }
        }

        match partial {
            None => Ok(RemoteResponse::success(data)),
            Some(partial) => {
                let partial = handler
                    .template()
                    .unwrap_or_else(|| camelcase_to_dashed(&partial));
                self.rendered(&partial, data, render)
            }
        }
    }

    fn rendered(
        &self,
        partial: &str,
        data: Value,
        render: &RenderFn,
    ) -> Result<RemoteResponse, DispatchError> {
        let html = render(partial, &data)?;
        Ok(RemoteResponse::Success {
            success: Value::String(html),
            debug: self.debug.then_some(data),
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers)
            .field("functions", &self.functions.0.keys().collect::<Vec<_>>())
            .field("debug", &self.debug)
            .finish()
    }
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: Option<Arc<HandlerRegistry>>,
    resolver: Option<Arc<Resolver>>,
    functions: FunctionTable,
    debug: bool,
}

impl DispatcherBuilder {
    /// Shares a handler registry.
    pub fn handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Shares the resolver used when a path names no handler.
    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Registers a remote function. It takes precedence over handler paths.
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.functions.0.insert(name.into(), Arc::new(f));
        self
    }

    /// Includes the raw data under `debug` in rendered responses.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers.unwrap_or_default(),
            resolver: self.resolver.unwrap_or_default(),
            functions: self.functions,
            debug: self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContentItem, Predicate, StaticContext};
    use crate::handler::MethodHandler;
    use crate::render::{from_fn, json_render};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_methods(
            "Archive",
            MethodHandler::new()
                .method("posts", |args| Ok(json!([args["page"].clone()])))
                .method("title", |_| Ok(json!("News"))),
        );
        registry.register_methods(
            "SingleNews",
            MethodHandler::new()
                .method("content", |_| Ok(json!("Hi")))
                .template("news-article"),
        );
        registry
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder().handlers(Arc::new(registry())).build()
    }

    fn ctx() -> StaticContext {
        StaticContext::builder().build()
    }

    fn call(path: &str) -> RemoteRequest {
        RemoteRequest::new(
            RemotePayload {
                token: Some("t0k".into()),
                path: Some(path.into()),
                args: json!({"page": 2}),
                ..Default::default()
            },
            "t0k",
        )
    }

    fn with(mut request: RemoteRequest, f: impl FnOnce(&mut RemotePayload)) -> RemoteRequest {
        if let Some(payload) = request.payload.as_mut() {
            f(payload);
        }
        request
    }

    fn error_of(response: RemoteResponse) -> String {
        match response {
            RemoteResponse::Error { error } => error,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(tokens_match(Some("x"), Some("x")));
        assert!(!tokens_match(Some(""), Some("")));
        assert!(!tokens_match(None, Some("x")));
    }

    #[test]
    fn test_path_pattern() {
        assert!(PATH_PATTERN.is_match("Archive/posts,title"));
        assert!(PATH_PATTERN.is_match("_private"));
        assert!(PATH_PATTERN.is_match("Käyttäjä/hae"));
        assert!(!PATH_PATTERN.is_match("1abc"));
        assert!(!PATH_PATTERN.is_match("a bc"));
        assert!(!PATH_PATTERN.is_match("a;rm"));
        assert!(!PATH_PATTERN.is_match("../etc"));
    }

    #[test]
    fn test_parse_target() {
        let functions = FunctionTable::default();
        assert_eq!(
            InvocationTarget::parse("Archive/posts,title", &functions).unwrap(),
            InvocationTarget::Handler {
                name: Some("Archive".into()),
                methods: vec!["posts".into(), "title".into()],
            }
        );
        assert_eq!(
            InvocationTarget::parse("whatever", &functions).unwrap(),
            InvocationTarget::Handler {
                name: None,
                methods: vec![]
            }
        );
        assert!(matches!(
            InvocationTarget::parse("a/b/c", &functions),
            Err(DispatchError::MalformedPath)
        ));
        assert!(matches!(
            InvocationTarget::parse("Archive/", &functions),
            Err(DispatchError::MalformedPath)
        ));
    }

    #[test]
    fn test_flags() {
        let payload: RemotePayload =
            serde_json::from_str(r#"{"render": "true", "tidy": false}"#).unwrap();
        assert!(payload.render.unwrap().is_true());
        assert!(payload.tidy.unwrap().is_false());
        assert!(!Flag::Text("yes".into()).is_false());
        assert!(!Flag::Text("yes".into()).is_true());
    }

    #[test]
    fn test_missing_payload_and_path() {
        let d = dispatcher();
        let render = json_render();

        let response = d.dispatch(&RemoteRequest::default(), &mut ctx(), &render);
        assert_eq!(
            error_of(response),
            "Something went wrong. There was no payload present at the request."
        );

        let request = with(call("x"), |p| p.path = None);
        let err = d.try_dispatch(&request, &mut ctx(), &render).unwrap_err();
        assert!(matches!(err, DispatchError::MissingPath));
    }

    #[test]
    fn test_illegal_paths_rejected() {
        let d = dispatcher();
        let render = json_render();
        for path in ["1abc", "a bc"] {
            let response = d.dispatch(&call(path), &mut ctx(), &render);
            assert_eq!(error_of(response), "Remote call path contains illegal characters.");
        }
    }

    #[test]
    fn test_token_mismatch_never_instantiates() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let mut registry = HandlerRegistry::new();
        registry.register("Archive", move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            MethodHandler::new().method("posts", |_| Ok(json!([])))
        });
        let d = Dispatcher::builder().handlers(Arc::new(registry)).build();
        let render = json_render();

        let mut request = call("Archive/posts");
        request.cookie_token = Some("other".into());
        assert_eq!(
            d.dispatch(&request, &mut ctx(), &render),
            RemoteResponse::error("CSRF token mismatch.")
        );

        request.cookie_token = None;
        assert!(!d.dispatch(&request, &mut ctx(), &render).is_success());
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_methods() {
        let d = dispatcher();
        let response = d.dispatch(&call("Archive/posts,title"), &mut ctx(), &json_render());
        assert_eq!(
            response,
            RemoteResponse::success(json!({"posts": [2], "title": "News"}))
        );
    }

    #[test]
    fn test_tidy_unwraps_single_method_only() {
        let d = dispatcher();
        let render = json_render();

        let one = with(call("Archive/posts"), |p| p.tidy = Some(Flag::Text("true".into())));
        assert_eq!(
            d.dispatch(&one, &mut ctx(), &render),
            RemoteResponse::success(json!([2]))
        );

        let two = with(call("Archive/posts,title"), |p| p.tidy = Some(Flag::Bool(true)));
        assert_eq!(
            d.dispatch(&two, &mut ctx(), &render),
            RemoteResponse::success(json!({"posts": [2], "title": "News"}))
        );

        let off = with(call("Archive/posts"), |p| p.tidy = Some(Flag::Text("false".into())));
        assert_eq!(
            d.dispatch(&off, &mut ctx(), &render),
            RemoteResponse::success(json!({"posts": [2]}))
        );
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let d = dispatcher();
        let response = d.dispatch(&call("Archive/drop"), &mut ctx(), &json_render());
        assert_eq!(error_of(response), "Method 'drop' is not allowed.");
    }

    #[test]
    fn test_missing_model() {
        let d = dispatcher();
        let response = d.dispatch(&call("Nope/x"), &mut ctx(), &json_render());
        assert_eq!(error_of(response), "Model 'Nope' does not exist.");
    }

    #[test]
    fn test_render_uses_dashed_name_or_override() {
        let d = dispatcher();
        let render = from_fn(|partial, _data| Ok(format!("<{}>", partial)));

        let request = with(call("Archive/title"), |p| p.render = Some(Flag::Bool(true)));
        assert_eq!(
            d.dispatch(&request, &mut ctx(), &render),
            RemoteResponse::success(json!("<archive>"))
        );

        let request = with(call("Archive/title"), |p| p.partial = Some("NewsList".into()));
        assert_eq!(
            d.dispatch(&request, &mut ctx(), &render),
            RemoteResponse::success(json!("<news-list>"))
        );

        let request = with(call("SingleNews/content"), |p| {
            p.render = Some(Flag::Text("true".into()))
        });
        assert_eq!(
            d.dispatch(&request, &mut ctx(), &render),
            RemoteResponse::success(json!("<news-article>"))
        );
    }

    #[test]
    fn test_debug_includes_data() {
        let d = Dispatcher::builder()
            .handlers(Arc::new(registry()))
            .debug(true)
            .build();
        let render = from_fn(|_, _| Ok("html".into()));
        let request = with(call("Archive/title"), |p| p.partial = Some("x".into()));

        let response = d.dispatch(&request, &mut ctx(), &render);
        assert_eq!(
            response.to_json(),
            r#"{"success":"html","debug":{"title":"News"}}"#
        );
    }

    #[test]
    fn test_function_wins_over_handler() {
        let d = Dispatcher::builder()
            .handlers(Arc::new(registry()))
            .function("Archive/posts", |_| Ok(json!("from function")))
            .function("echo", |args| Ok(args.clone()))
            .build();
        let render = json_render();

        assert_eq!(
            d.dispatch(&call("Archive/posts"), &mut ctx(), &render),
            RemoteResponse::success(json!("from function"))
        );
        assert_eq!(
            d.dispatch(&call("echo"), &mut ctx(), &render),
            RemoteResponse::success(json!({"page": 2}))
        );
    }

    #[test]
    fn test_function_partial_renders_as_given() {
        let d = Dispatcher::builder()
            .function("latest", |_| Ok(json!({"n": 1})))
            .build();
        let render = from_fn(|partial, data| Ok(format!("{}:{}", partial, data["n"])));
        let request = with(call("latest"), |p| p.partial = Some("LatestBox".into()));

        assert_eq!(
            d.dispatch(&request, &mut ctx(), &render),
            RemoteResponse::success(json!("LatestBox:1"))
        );
    }

    #[test]
    fn test_function_errors_are_reported() {
        let d = Dispatcher::builder()
            .function("fail", |_| anyhow::bail!("quota exceeded"))
            .build();
        let response = d.dispatch(&call("fail"), &mut ctx(), &json_render());
        assert_eq!(error_of(response), "quota exceeded");
    }

    #[test]
    fn test_falls_back_to_resolved_handler() {
        let d = Dispatcher::builder()
            .handlers(Arc::new(registry()))
            .build();
        let mut single = StaticContext::builder()
            .predicate(Predicate::Single)
            .item(ContentItem {
                id: 1,
                slug: "launch".into(),
                post_type: "news".into(),
                ..Default::default()
            })
            .current(1)
            .build();

        let response = d.dispatch(&call("current"), &mut single, &json_render());
        assert_eq!(response, RemoteResponse::success(json!({"content": "Hi"})));

        // Nothing resolves: the default handler is not registered.
        let response = d.dispatch(&call("current"), &mut ctx(), &json_render());
        assert_eq!(error_of(response), "Model 'Index' does not exist.");
    }

    #[test]
    fn test_response_json() {
        assert_eq!(
            RemoteResponse::error("nope").to_json(),
            r#"{"error":"nope"}"#
        );
        assert_eq!(
            RemoteResponse::success(json!([1])).to_json(),
            r#"{"success":[1]}"#
        );
    }
}
