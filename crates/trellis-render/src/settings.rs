//! Deployment settings.
//!
//! [`Settings`] is built once at startup and shared by reference with every
//! component. It can be constructed in code or loaded from YAML:
//!
//! ```yaml
//! default_format: html
//! cache_partials: true
//! cache_rendered: true
//! rendered_expire_time: 3600
//! partials:
//!   sidebar:
//!     cache_rendered: false
//!   footer:
//!     expire_time: 86400
//! ```
//!
//! Missing keys fall back to [`Settings::default`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Seven days, the default lifetime of a rendered-output cache entry.
pub const DEFAULT_RENDERED_EXPIRE_TIME: u64 = 7 * 60 * 60 * 24;

/// Per-identifier overrides of the global cache policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialSettings {
    /// Overrides [`Settings::cache_partials`] for this identifier.
    pub cache_compiled: Option<bool>,
    /// Overrides [`Settings::cache_rendered`] for this identifier.
    pub cache_rendered: Option<bool>,
    /// Overrides [`Settings::rendered_expire_time`] (seconds) for this identifier.
    pub expire_time: Option<u64>,
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default output format when a request does not name one.
    pub default_format: Option<String>,
    /// Switch to JSON when the request carries an explicit `json` query flag.
    pub json_url: bool,
    /// Switch to JSON when the request accepts exactly `application/json`.
    pub json_headers: bool,
    /// Cache compiled templates.
    pub cache_partials: bool,
    /// Cache rendered output.
    pub cache_rendered: bool,
    /// Lifetime of a rendered-output cache entry, in seconds.
    pub rendered_expire_time: u64,
    /// Per-identifier cache overrides.
    pub partials: HashMap<String, PartialSettings>,
    /// Template file extension, without the leading dot.
    pub template_extension: String,
    /// Debug capability: remote responses echo the raw data.
    pub debug: bool,
    /// Site-info keys removed from host data on remote invocations.
    pub remote_hidden_site_keys: Vec<String>,
    /// Evaluate the attachment resolution rule.
    pub resolve_attachments: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: None,
            json_url: false,
            json_headers: false,
            cache_partials: false,
            cache_rendered: false,
            rendered_expire_time: DEFAULT_RENDERED_EXPIRE_TIME,
            partials: HashMap::new(),
            template_extension: "jinja".to_string(),
            debug: false,
            remote_hidden_site_keys: ["wpurl", "admin_email", "version", "user"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resolve_attachments: false,
        }
    }
}

impl Settings {
    /// Parses settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, RenderError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads settings from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Whether compiled templates for `id` should be cached.
    pub fn compile_cache_enabled(&self, id: &str) -> bool {
        self.cache_partials
            && self
                .partials
                .get(id)
                .and_then(|p| p.cache_compiled)
                .unwrap_or(true)
    }

    /// Whether rendered output for `id` should be cached.
    pub fn render_cache_enabled(&self, id: &str) -> bool {
        self.cache_rendered
            && self
                .partials
                .get(id)
                .and_then(|p| p.cache_rendered)
                .unwrap_or(true)
    }

    /// Lifetime of rendered output for `id`.
    pub fn rendered_ttl(&self, id: &str) -> Duration {
        let secs = self
            .partials
            .get(id)
            .and_then(|p| p.expire_time)
            .unwrap_or(self.rendered_expire_time);
        Duration::from_secs(secs)
    }

    /// The configured default format, or `"html"`.
    pub fn default_format(&self) -> &str {
        self.default_format.as_deref().unwrap_or("html")
    }
}
