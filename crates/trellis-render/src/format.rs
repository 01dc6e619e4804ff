//! Output formats.
//!
//! A format turns the final data tree (and, for markup formats, the located
//! template) into a string. The pipeline picks one by name from a
//! [`FormatTable`]:
//!
//! | Name | Output |
//! |------|--------|
//! | `html` | Template evaluated through the engine, with compiled/rendered caching |
//! | `json` | The data tree as compact JSON |
//! | `yaml` | The data tree as YAML |
//!
//! The table is open: register additional formats on the pipeline builder,
//! or replace a built-in by registering under the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RenderError;

/// Access to template evaluation for formats that need it.
///
/// Implemented by the render pipeline, which applies its caches.
pub trait TemplateRenderer {
    /// Compiles (or fetches) the template at `path` and evaluates it.
    fn render_template(&self, id: &str, path: &Path, data: &Value) -> Result<String, RenderError>;
}

/// Everything a format gets to see.
pub struct FormatInput<'a> {
    /// Identifier the template was requested by.
    pub template_id: &'a str,
    /// Located template source file.
    pub path: &'a Path,
    /// Final data tree, after data hooks.
    pub data: &'a Value,
    templates: &'a dyn TemplateRenderer,
}

impl<'a> FormatInput<'a> {
    /// Bundles the inputs of one format call.
    pub fn new(
        template_id: &'a str,
        path: &'a Path,
        data: &'a Value,
        templates: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            template_id,
            path,
            data,
            templates,
        }
    }

    /// Evaluates the located template against the data tree.
    pub fn render_template(&self) -> Result<String, RenderError> {
        self.templates
            .render_template(self.template_id, self.path, self.data)
    }
}

/// An output format.
pub trait Format: Send + Sync {
    /// Produces the output string.
    fn render(&self, input: &FormatInput<'_>) -> Result<String, RenderError>;
}

impl<F> Format for F
where
    F: Fn(&FormatInput<'_>) -> Result<String, RenderError> + Send + Sync,
{
    fn render(&self, input: &FormatInput<'_>) -> Result<String, RenderError> {
        self(input)
    }
}

/// Template evaluation through the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlFormat;

impl Format for HtmlFormat {
    fn render(&self, input: &FormatInput<'_>) -> Result<String, RenderError> {
        input.render_template()
    }
}

/// Compact JSON serialization of the data tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn render(&self, input: &FormatInput<'_>) -> Result<String, RenderError> {
        Ok(serde_json::to_string(input.data)?)
    }
}

/// YAML serialization of the data tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFormat;

impl Format for YamlFormat {
    fn render(&self, input: &FormatInput<'_>) -> Result<String, RenderError> {
        Ok(serde_yaml::to_string(input.data)?)
    }
}

/// Formats keyed by name.
#[derive(Clone)]
pub struct FormatTable {
    formats: BTreeMap<String, Arc<dyn Format>>,
}

impl FormatTable {
    /// Creates a table with no formats at all.
    pub fn empty() -> Self {
        Self {
            formats: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) a format.
    pub fn insert(&mut self, name: impl Into<String>, format: Arc<dyn Format>) {
        self.formats.insert(name.into(), format);
    }

    /// Returns the format registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Format>> {
        self.formats.get(name)
    }

    /// Looks up `name`, failing with [`RenderError::UnknownFormat`].
    pub fn require(&self, name: &str) -> Result<&Arc<dyn Format>, RenderError> {
        self.get(name)
            .ok_or_else(|| RenderError::UnknownFormat(name.to_string()))
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("html", Arc::new(HtmlFormat));
        table.insert("json", Arc::new(JsonFormat));
        table.insert("yaml", Arc::new(YamlFormat));
        table
    }
}

impl fmt::Debug for FormatTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatTable")
            .field("formats", &self.names())
            .finish()
    }
}
