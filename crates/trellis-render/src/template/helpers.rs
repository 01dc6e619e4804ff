//! Template helpers.
//!
//! A helper is a named routine callable from templates. Besides producing
//! output, helpers often have side effects such as declaring the external
//! resources a page needs. The pipeline pre-warms those side effects before
//! the real render by invoking every helper a template uses once, with a
//! dummy [`EvalContext`] and a throwaway [`Chunk`].
//!
//! Helpers should check [`EvalContext::is_dummy`] and skip work that only
//! matters for real output.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RenderError;

/// Output buffer a helper writes into.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Chunk {
    buf: String,
}

impl Chunk {
    /// Creates an empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text to the chunk.
    pub fn write(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(text);
        self
    }

    /// The text written so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Consumes the chunk, returning its text.
    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Evaluation context handed to a helper.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Data visible at the call site, `Null` when unavailable.
    pub data: Value,
    dummy: bool,
}

impl EvalContext {
    /// Context for a real template evaluation.
    pub fn new(data: Value) -> Self {
        Self { data, dummy: false }
    }

    /// Context for a pre-warm run.
    pub fn dummy() -> Self {
        Self {
            data: Value::Null,
            dummy: true,
        }
    }

    /// Returns `true` during pre-warm runs.
    pub fn is_dummy(&self) -> bool {
        self.dummy
    }
}

/// Optional block body passed to a helper.
#[derive(Debug, Clone, Default)]
pub struct Bodies {
    /// Body text, already rendered by the engine.
    pub block: Option<String>,
}

/// Arguments of a helper call.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl Params {
    /// Wraps positional arguments.
    pub fn new(args: Vec<Value>) -> Self {
        Self { args }
    }

    /// Returns the positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Looks up a keyword argument, passed by the engine as a trailing map.
    pub fn named(&self, key: &str) -> Option<&Value> {
        self.args
            .last()
            .and_then(|v| v.as_object())
            .and_then(|map| map.get(key))
    }
}

/// A routine callable from templates.
pub trait Helper: Send + Sync {
    /// Runs the helper, writing any output into `chunk`.
    fn call(
        &self,
        chunk: &mut Chunk,
        ctx: &EvalContext,
        bodies: &Bodies,
        params: &Params,
    ) -> Result<(), RenderError>;
}

impl<F> Helper for F
where
    F: Fn(&mut Chunk, &EvalContext, &Bodies, &Params) -> Result<(), RenderError> + Send + Sync,
{
    fn call(
        &self,
        chunk: &mut Chunk,
        ctx: &EvalContext,
        bodies: &Bodies,
        params: &Params,
    ) -> Result<(), RenderError> {
        self(chunk, ctx, bodies, params)
    }
}

/// Helpers keyed by name.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<String, Arc<dyn Helper>>,
}

impl fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HelperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a helper.
    pub fn insert(&mut self, name: impl Into<String>, helper: Arc<dyn Helper>) {
        self.helpers.insert(name.into(), helper);
    }

    /// Returns the helper registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Helper>> {
        self.helpers.get(name)
    }

    /// Returns `true` if a helper is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    /// Iterates helpers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Helper>)> {
        self.helpers.iter()
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Returns `true` if no helper is registered.
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    /// Invokes every registered helper named in `wanted` once, with a dummy
    /// context. Output is discarded and failures are logged, never raised.
    ///
    /// Returns the names that were invoked, in name order.
    pub fn prewarm(&self, wanted: &BTreeSet<String>) -> Vec<String> {
        let ctx = EvalContext::dummy();
        let bodies = Bodies::default();
        let params = Params::default();
        let mut ran = Vec::new();

        for (name, helper) in &self.helpers {
            if !wanted.contains(name) {
                continue;
            }
            let mut chunk = Chunk::new();
            if let Err(err) = helper.call(&mut chunk, &ctx, &bodies, &params) {
                tracing::warn!(helper = %name, error = %err, "helper pre-warm failed");
            }
            ran.push(name.clone());
        }

        ran
    }
}
