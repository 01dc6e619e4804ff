//! Template dependency scanner.
//!
//! Finds the helpers a template will call, following includes transitively,
//! without rendering anything. The pipeline uses the result to pre-warm helper
//! side effects before the real render.
//!
//! Scanning is lexical. A [`ScanSyntax`] holds two patterns: one whose first
//! capture group is a helper name, one whose first capture group is an
//! included template reference. The defaults match the MiniJinja dialect:
//!
//! ```text
//! {{ scripts("app") }}          helper "scripts"
//! {% call card(post) %}         helper "card"
//! {% include "shared/header" %} include "header"
//! ```
//!
//! Includes are deduplicated by source text, not by name, so a cycle
//! (`a` includes `b` includes `a`) or a diamond terminates. A template that
//! cannot be located or read contributes nothing: scanning is an
//! optimization, never a correctness requirement.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::template::index::{bare_identifier, TemplateIndex};

static DEFAULT_HELPER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[{%]-?\s*(?:call\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("default helper pattern is valid")
});

static DEFAULT_INCLUDE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%-?\s*(?:include|extends|import|from)\s+["']([-A-Za-z0-9_/.]+)["']"#)
        .expect("default include pattern is valid")
});

/// The lexical patterns used to find helper calls and includes.
#[derive(Debug, Clone)]
pub struct ScanSyntax {
    helper: Regex,
    include: Regex,
}

impl ScanSyntax {
    /// Builds a syntax from two patterns, each with one capture group.
    pub fn new(helper: Regex, include: Regex) -> Self {
        Self { helper, include }
    }

    /// Helper names called in `source`, in order of appearance.
    pub fn helpers<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.helper
            .captures_iter(source)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
    }

    /// Template references included by `source`, in order of appearance.
    pub fn includes<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.include
            .captures_iter(source)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
    }
}

impl Default for ScanSyntax {
    fn default() -> Self {
        Self {
            helper: DEFAULT_HELPER_PATTERN.clone(),
            include: DEFAULT_INCLUDE_PATTERN.clone(),
        }
    }
}

/// Recursive helper discovery over a [`TemplateIndex`].
#[derive(Debug, Clone)]
pub struct Scanner {
    index: Arc<TemplateIndex>,
    syntax: ScanSyntax,
}

impl Scanner {
    /// Creates a scanner with the default syntax.
    pub fn new(index: Arc<TemplateIndex>) -> Self {
        Self::with_syntax(index, ScanSyntax::default())
    }

    /// Creates a scanner with custom patterns.
    pub fn with_syntax(index: Arc<TemplateIndex>, syntax: ScanSyntax) -> Self {
        Self { index, syntax }
    }

    /// Returns every helper name `id` uses, directly or through includes.
    pub fn scan(&self, id: &str) -> BTreeSet<String> {
        let mut visited = HashSet::new();
        self.scan_with(id, &mut visited)
    }

    /// Like [`scan`](Self::scan), sharing `visited` source texts with the caller.
    ///
    /// A template whose exact source is already in `visited` contributes
    /// nothing.
    pub fn scan_with(&self, id: &str, visited: &mut HashSet<String>) -> BTreeSet<String> {
        let mut helpers = BTreeSet::new();

        let source = match self.index.read_source(id) {
            Ok((_, source)) => source,
            Err(err) => {
                tracing::debug!(template = %id, error = %err, "scan target unavailable");
                return helpers;
            }
        };

        if !visited.insert(source.clone()) {
            tracing::debug!(template = %id, "already scanned, skipping");
            return helpers;
        }

        helpers.extend(self.syntax.helpers(&source).map(str::to_string));

        let includes: Vec<String> = self
            .syntax
            .includes(&source)
            .map(|r| bare_identifier(r, self.index.extension()).to_string())
            .collect();

        for include in includes {
            helpers.extend(self.scan_with(&include, visited));
        }

        helpers
    }
}
