//! # Trellis - Context-Driven Handlers and Cached Rendering
//!
//! `trellis` resolves a request context to a handler, lets the handler
//! produce a data tree, and renders that tree through a template with layered
//! caching. Client-side code can call handlers back over a token-checked
//! remote interface.
//!
//! The work is split across two crates, re-exported here:
//!
//! - [`trellis_render`]: template index, dependency scanner, helpers, formats,
//!   render hooks, caches and the render pipeline
//! - [`trellis_dispatch`]: request context, handlers, the resolver and the
//!   remote dispatcher
//!
//! [`App`] wires them together:
//!
//! ```text
//! request context
//!   → router hooks → resolver (rules hooks) → template hooks
//!   → handler fetch → host data merged under `site`
//!   → render pipeline (format, scan + pre-warm, compile cache, render cache)
//!   → output hooks → sink
//! ```
//!
//! See [`App`] for a complete example.

mod app;
mod error;
pub mod host;

pub use app::{App, AppBuilder};
pub use error::AppError;
pub use host::{HostData, SITE_KEY};

pub use trellis_dispatch::{
    camelcase_to_dashed, dashed_to_camelcase, Author, Candidate, ContentItem, DispatchError,
    Dispatcher, Flag, Handler, HandlerLookup, HandlerRegistry, HandlerResult, MethodHandler,
    MethodSelection, Predicate, RemotePayload, RemoteRequest, RemoteResponse, RequestContext,
    Resolution, ResolutionRule, Resolver, ResolverHooks, StaticContext, Term, User,
};
pub use trellis_render::{
    CacheStore, ErrorKind, Format, FormatInput, Helper, HelperRegistry, MemoryCache, NoopCache,
    RenderError, RenderHooks, RenderOutcome, RenderPipeline, RenderRequest, RequestSignals,
    Settings,
};

pub use trellis_dispatch;
pub use trellis_render;
