//! Template engine abstraction.
//!
//! This module defines the [`TemplateEngine`] trait, the seam between the
//! render pipeline and a concrete templating backend. The pipeline only needs
//! three things from an engine: turn a source file into a
//! [`CompiledTemplate`], evaluate a compiled template against a data tree, and
//! accept named [`Helper`]s callable from templates.
//!
//! The default implementation is [`MiniJinjaEngine`]. Includes are resolved
//! through the same [`TemplateIndex`] the pipeline uses, so
//! `{% include "shared/header" %}` finds `header.jinja` in any search path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use minijinja::value::{Rest, Value as MjValue, ValueKind};
use minijinja::{AutoEscape, Environment, State};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::helpers::{Bodies, Chunk, EvalContext, Helper, Params};
use super::index::{bare_identifier, TemplateIndex};
use crate::error::RenderError;

/// The compiled form of a template.
///
/// Compiled templates are cached by identifier and hashed together with the
/// render data to key rendered output, so they must serialize stably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    /// The identifier the template was requested by.
    pub id: String,
    /// The file the source was read from.
    pub path: PathBuf,
    /// Validated template source.
    pub source: String,
}

/// A template engine that compiles and evaluates templates.
pub trait TemplateEngine: Send + Sync {
    /// Reads and compiles the template at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateError`] with the engine's message when
    /// the source does not parse.
    fn compile(&self, id: &str, path: &Path) -> Result<CompiledTemplate, RenderError>;

    /// Evaluates a compiled template against `data`.
    fn evaluate(&self, compiled: &CompiledTemplate, data: &Value) -> Result<String, RenderError>;

    /// Makes `helper` callable from templates as `name(...)`.
    fn register_helper(&mut self, name: &str, helper: Arc<dyn Helper>);
}

/// MiniJinja-based template engine.
///
/// HTML auto-escaping is on for every template; helper output is inserted as
/// safe markup. Parsed templates stay in the environment under their
/// identifier, so evaluating a compiled template does not parse it again.
///
/// Helpers receive the variables visible at the call site as
/// [`EvalContext::data`], and the rendered body of a `{% call %}` block as
/// [`Bodies::block`].
///
/// # Example
///
/// ```rust
/// use trellis_render::template::{MiniJinjaEngine, TemplateEngine};
/// use serde_json::json;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("greeting.jinja");
/// std::fs::write(&path, "Hello, {{ name }}!").unwrap();
///
/// let engine = MiniJinjaEngine::new();
/// let compiled = engine.compile("greeting", &path).unwrap();
/// let output = engine.evaluate(&compiled, &json!({"name": "World"})).unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
pub struct MiniJinjaEngine {
    inner: RwLock<Loaded>,
}

/// The environment and the source each of its named templates was parsed from.
struct Loaded {
    env: Environment<'static>,
    sources: HashMap<String, String>,
}

impl Loaded {
    fn add(&mut self, id: &str, source: &str) -> Result<(), RenderError> {
        self.env
            .add_template_owned(id.to_string(), source.to_string())?;
        self.sources.insert(id.to_string(), source.to_string());
        Ok(())
    }

    fn holds(&self, compiled: &CompiledTemplate) -> bool {
        self.sources
            .get(&compiled.id)
            .is_some_and(|source| *source == compiled.source)
    }

    fn render(&self, id: &str, data: &Value) -> Result<String, RenderError> {
        Ok(self.env.get_template(id)?.render(data)?)
    }
}

impl MiniJinjaEngine {
    /// Creates an engine without include support.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self {
            inner: RwLock::new(Loaded {
                env,
                sources: HashMap::new(),
            }),
        }
    }

    /// Creates an engine that resolves includes through `index`.
    pub fn with_index(index: Arc<TemplateIndex>) -> Self {
        let mut engine = Self::new();
        engine.environment_mut().set_loader(move |name| {
            let id = bare_identifier(name, index.extension());
            match index.find(id) {
                Some(path) => std::fs::read_to_string(&path).map(Some).map_err(|e| {
                    minijinja::Error::new(
                        minijinja::ErrorKind::InvalidOperation,
                        format!("could not read {}: {}", path.display(), e),
                    )
                }),
                None => Ok(None),
            }
        });
        engine
    }

    /// Returns a mutable reference to the underlying MiniJinja environment.
    ///
    /// Use this to register filters, tests or globals.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .env
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn compile(&self, id: &str, path: &Path) -> Result<CompiledTemplate, RenderError> {
        let source = std::fs::read_to_string(path)?;
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(id, &source)?;

        Ok(CompiledTemplate {
            id: id.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }

    fn evaluate(&self, compiled: &CompiledTemplate, data: &Value) -> Result<String, RenderError> {
        {
            let loaded = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if loaded.holds(compiled) {
                return loaded.render(&compiled.id, data);
            }
        }

        // A cached artifact whose source the environment no longer holds.
        let mut loaded = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !loaded.holds(compiled) {
            loaded.add(&compiled.id, &compiled.source)?;
        }
        loaded.render(&compiled.id, data)
    }

    fn register_helper(&mut self, name: &str, helper: Arc<dyn Helper>) {
        let helper_name = name.to_string();
        self.environment_mut().add_function(
            name.to_string(),
            move |state: &State, args: Rest<MjValue>| -> Result<MjValue, minijinja::Error> {
                let (params, bodies) = helper_arguments(state, &args)?;

                let mut chunk = Chunk::new();
                helper
                    .call(
                        &mut chunk,
                        &EvalContext::new(call_site_data(state)),
                        &bodies,
                        &params,
                    )
                    .map_err(|e| {
                        minijinja::Error::new(
                            minijinja::ErrorKind::InvalidOperation,
                            format!("helper '{}' failed: {}", helper_name, e),
                        )
                    })?;

                Ok(MjValue::from_safe_string(chunk.into_string()))
            },
        );
    }
}

fn to_json(value: &MjValue) -> Result<Value, minijinja::Error> {
    serde_json::to_value(value)
        .map_err(|e| minijinja::Error::new(minijinja::ErrorKind::BadSerialization, e.to_string()))
}

/// Splits a call into positional arguments, trailing keyword arguments and
/// the body of an enclosing `{% call %}` block.
fn helper_arguments(state: &State, args: &[MjValue]) -> Result<(Params, Bodies), minijinja::Error> {
    let mut positional = Vec::with_capacity(args.len());
    let mut named = Map::new();
    let mut bodies = Bodies::default();

    for arg in args {
        if !arg.is_kwargs() {
            positional.push(to_json(arg)?);
            continue;
        }
        for key in arg.try_iter()? {
            let value = arg.get_item(&key)?;
            match key.as_str() {
                Some("caller") => bodies.block = Some(value.call(state, &[])?.to_string()),
                Some(key) => {
                    named.insert(key.to_string(), to_json(&value)?);
                }
                None => {}
            }
        }
    }
    if !named.is_empty() {
        positional.push(Value::Object(named));
    }

    Ok((Params::new(positional), bodies))
}

/// Variables visible where the helper is called. Functions, macros and
/// values that do not serialize are left out.
fn call_site_data(state: &State) -> Value {
    let mut data = Map::new();
    for name in state.known_variables() {
        let Some(value) = state.lookup(&name) else {
            continue;
        };
        if matches!(value.kind(), ValueKind::Undefined | ValueKind::Plain) {
            continue;
        }
        if let Ok(json) = serde_json::to_value(&value) {
            data.insert(name.to_string(), json);
        }
    }
    Value::Object(data)
}
