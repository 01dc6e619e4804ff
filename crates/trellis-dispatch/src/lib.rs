//! # Trellis Dispatch - Handler Resolution and Remote Calls
//!
//! `trellis-dispatch` decides which handler serves a request and runs
//! handlers on behalf of remote callers. It is independent of any template
//! engine: where output must be rendered, a [`RenderFn`] is passed in.
//!
//! ## Core Concepts
//!
//! - [`RequestContext`]: What the host knows about the request ([`Predicate`]s, queried entities)
//! - [`Handler`]: Produces a data tree; instantiated per request from a [`HandlerRegistry`]
//! - [`Resolver`]: Ordered [`ResolutionRule`]s of [`Candidate`] names → handler name
//! - [`ResolverHooks`]: Router, rules and template hooks around resolution
//! - [`Dispatcher`]: Token-checked remote invocation of handlers and functions
//!
//! ## Resolving a handler
//!
//! ```rust
//! use trellis_dispatch::{ContentItem, HandlerRegistry, MethodHandler, Predicate, Resolver, StaticContext};
//! use serde_json::json;
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_methods("SinglePost", MethodHandler::new().method("title", |_| Ok(json!("Hi"))));
//!
//! let ctx = StaticContext::builder()
//!     .predicate(Predicate::Single)
//!     .item(ContentItem { id: 1, slug: "hi".into(), post_type: "post".into(), ..Default::default() })
//!     .current(1)
//!     .build();
//!
//! let resolution = Resolver::new().resolve(&ctx, &handlers);
//! assert_eq!(resolution.handler, "SinglePost");
//! ```
//!
//! ## Remote calls
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_dispatch::{json_render, Dispatcher, HandlerRegistry, MethodHandler, RemotePayload, RemoteRequest, StaticContext};
//! use serde_json::json;
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_methods("Archive", MethodHandler::new().method("count", |_| Ok(json!(3))));
//! let dispatcher = Dispatcher::builder().handlers(Arc::new(handlers)).build();
//!
//! let payload = RemotePayload::from_json(r#"{"token":"abc","path":"Archive/count","tidy":"true"}"#).unwrap();
//! let response = dispatcher.dispatch(
//!     &RemoteRequest::new(payload, "abc"),
//!     &mut StaticContext::default(),
//!     &json_render(),
//! );
//! assert_eq!(response.to_json(), r#"{"success":3}"#);
//! ```

mod context;
mod error;
mod handler;
mod hooks;
mod remote;
mod render;
mod resolver;
mod util;

pub use context::{
    Author, ContentItem, Predicate, RequestContext, StaticContext, StaticContextBuilder, Term,
    User,
};
pub use error::{DispatchError, ErrorKind};
pub use handler::{
    Handler, HandlerFactory, HandlerLookup, HandlerRegistry, HandlerResult, MethodFn,
    MethodHandler, MethodSelection,
};
pub use hooks::{ResolverHooks, RouterFn, RulesFn, TemplateFn};
pub use remote::{
    constant_time_eq, tokens_match, Dispatcher, DispatcherBuilder, Flag, InvocationTarget,
    RemoteFunction, RemotePayload, RemoteRequest, RemoteResponse,
};
pub use render::{from_fn, json_render, RenderError, RenderFn};
pub use resolver::{
    page_template_name, Candidate, CandidateValue, ComputeFn, PredicateFn, Resolution,
    ResolutionRule, Resolver, RulePredicate, DEFAULT_HANDLER,
};
pub use util::{camelcase_to_dashed, dashed_to_camelcase};
