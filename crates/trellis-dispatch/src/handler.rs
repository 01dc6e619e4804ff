//! Handlers and the handler registry.
//!
//! A handler ("model") produces the data tree a template renders. Handlers
//! are instantiated once per request from a factory registered by name and
//! discarded after the render. The registry doubles as the existence check
//! the resolver consults through [`HandlerLookup`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Result type of handler fetches.
pub type HandlerResult = anyhow::Result<Value>;

/// Which of a handler's methods a fetch should run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MethodSelection {
    /// Every method.
    #[default]
    All,
    /// Only the named methods, in order.
    Only(Vec<String>),
}

impl MethodSelection {
    /// Builds a selection from a method list; an empty list selects all.
    pub fn from_methods(methods: Vec<String>) -> Self {
        if methods.is_empty() {
            MethodSelection::All
        } else {
            MethodSelection::Only(methods)
        }
    }

    /// The method name when exactly one was requested.
    pub fn single(&self) -> Option<&str> {
        match self {
            MethodSelection::Only(methods) if methods.len() == 1 => Some(methods[0].as_str()),
            _ => None,
        }
    }

    /// Whether `method` is selected.
    pub fn includes(&self, method: &str) -> bool {
        match self {
            MethodSelection::All => true,
            MethodSelection::Only(methods) => methods.iter().any(|m| m == method),
        }
    }
}

/// A per-request data producer.
///
/// # Example
///
/// ```rust
/// use trellis_dispatch::{Handler, HandlerResult, MethodSelection};
/// use serde_json::json;
///
/// struct FrontPage;
///
/// impl Handler for FrontPage {
///     fn fetch(&mut self, _selection: &MethodSelection) -> HandlerResult {
///         Ok(json!({"hero": "Welcome"}))
///     }
/// }
/// ```
pub trait Handler {
    /// Produces the data tree, running the selected methods.
    fn fetch(&mut self, selection: &MethodSelection) -> HandlerResult;

    /// Template identifier to render instead of the one derived from the
    /// handler name.
    fn template(&self) -> Option<String> {
        None
    }
}

/// Answers whether a handler name is registered.
pub trait HandlerLookup {
    fn exists(&self, name: &str) -> bool;
}

impl HandlerLookup for BTreeSet<String> {
    fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// A named handler method: receives the instantiation arguments.
pub type MethodFn = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// A handler assembled from named methods.
///
/// `fetch` runs the selected methods in registration order and returns an
/// object mapping each method name to its result.
///
/// ```rust
/// use trellis_dispatch::{Handler, MethodHandler, MethodSelection};
/// use serde_json::json;
///
/// let mut handler = MethodHandler::new()
///     .method("title", |_args| Ok(json!("Archive")))
///     .method("posts", |args| Ok(json!([args["page"].clone()])))
///     .with_args(json!({"page": 2}));
///
/// let data = handler.fetch(&MethodSelection::All).unwrap();
/// assert_eq!(data, json!({"title": "Archive", "posts": [2]}));
/// ```
#[derive(Clone, Default)]
pub struct MethodHandler {
    methods: Vec<(String, MethodFn)>,
    template: Option<String>,
    args: Value,
}

impl MethodHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(f)));
        self
    }

    /// Overrides the template identifier.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sets the arguments every method receives.
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Method names, in registration order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandler")
            .field("methods", &self.method_names())
            .field("template", &self.template)
            .finish()
    }
}

impl Handler for MethodHandler {
    fn fetch(&mut self, selection: &MethodSelection) -> HandlerResult {
        if let MethodSelection::Only(wanted) = selection {
            if let Some(missing) = wanted
                .iter()
                .find(|w| !self.methods.iter().any(|(n, _)| n == *w))
            {
                anyhow::bail!("Method '{}' is not allowed.", missing);
            }
        }

        let mut data = Map::new();
        for (name, method) in &self.methods {
            if selection.includes(name) {
                data.insert(name.clone(), method(&self.args)?);
            }
        }
        Ok(Value::Object(data))
    }

    fn template(&self) -> Option<String> {
        self.template.clone()
    }
}

/// Builds a handler instance from request arguments.
pub type HandlerFactory = Arc<dyn Fn(&Value) -> Box<dyn Handler> + Send + Sync>;

/// Handler factories keyed by name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F, H>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> H + Send + Sync + 'static,
        H: Handler + 'static,
    {
        self.factories.insert(
            name.into(),
            Arc::new(move |args: &Value| Box::new(factory(args)) as Box<dyn Handler>),
        );
    }

    /// Registers a [`MethodHandler`] prototype; each instance gets the request args.
    pub fn register_methods(&mut self, name: impl Into<String>, prototype: MethodHandler) {
        self.register(name, move |args: &Value| {
            prototype.clone().with_args(args.clone())
        });
    }

    /// Creates a fresh handler, or `None` if `name` is not registered.
    pub fn instantiate(&self, name: &str, args: &Value) -> Option<Box<dyn Handler>> {
        self.factories.get(name).map(|factory| factory(args))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl HandlerLookup for HandlerRegistry {
    fn exists(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
