//! Template source lookup across ordered search paths.
//!
//! Templates are located by bare identifier: `"header"` resolves to the first
//! `header.<ext>` found under the configured directories. Directories are
//! searched in registration order (theme overrides first, core defaults
//! last), and each directory is walked recursively in file-name order so the
//! winner is deterministic.
//!
//! The directory walk happens once, when the index is built. Lookups are
//! plain map reads afterwards; call [`TemplateIndex::rebuild`] after
//! templates are added or removed on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! let index = TemplateIndex::new(vec!["./theme/partials".into(), "./core/partials".into()], "jinja");
//! let path = index.locate("header")?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use walkdir::WalkDir;

use crate::error::RenderError;

/// Strips any path prefix and the template extension from a reference.
///
/// `"shared/header"`, `"header.jinja"` and `"header"` all become `"header"`.
pub fn bare_identifier<'a>(reference: &'a str, extension: &str) -> &'a str {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    let suffix_len = extension.len() + 1;
    if name.len() > suffix_len
        && name.ends_with(extension)
        && name.as_bytes()[name.len() - suffix_len] == b'.'
    {
        &name[..name.len() - suffix_len]
    } else {
        name
    }
}

/// Pre-indexed table of template files keyed by bare identifier.
#[derive(Debug)]
pub struct TemplateIndex {
    paths: Vec<PathBuf>,
    extension: String,
    table: RwLock<HashMap<String, PathBuf>>,
}

impl TemplateIndex {
    /// Builds an index over `paths` for files ending in `.<extension>`.
    ///
    /// Directories that do not exist are skipped; they still appear in the
    /// searched-path list of not-found errors.
    pub fn new(paths: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let table = build_table(&paths, &extension);
        Self {
            paths,
            extension,
            table: RwLock::new(table),
        }
    }

    /// The configured search paths, in priority order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The template file extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Re-walks every search path.
    pub fn rebuild(&self) {
        let table = build_table(&self.paths, &self.extension);
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        *guard = table;
    }

    /// Returns the indexed file for a bare identifier, if any.
    pub fn find(&self, id: &str) -> Option<PathBuf> {
        let guard = self.table.read().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned()
    }

    /// Locates the source file for a template identifier.
    ///
    /// An identifier that is itself an existing file path is passed through
    /// unchanged. Otherwise the bare identifier is looked up in the index.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateNotFound`] listing every searched
    /// directory when nothing matches.
    pub fn locate(&self, id: &str) -> Result<PathBuf, RenderError> {
        let direct = Path::new(id);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        self.find(bare_identifier(id, &self.extension))
            .ok_or_else(|| RenderError::TemplateNotFound {
                id: id.to_string(),
                searched: self.paths.clone(),
            })
    }

    /// Reads the source text of a template identifier.
    pub fn read_source(&self, id: &str) -> Result<(PathBuf, String), RenderError> {
        let path = self.locate(id)?;
        let source = std::fs::read_to_string(&path)?;
        Ok((path, source))
    }

    /// Number of indexed identifiers.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Returns `true` if no template was found in any search path.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_table(paths: &[PathBuf], extension: &str) -> HashMap<String, PathBuf> {
    let mut table = HashMap::new();

    for root in paths {
        if !root.is_dir() {
            tracing::debug!(path = %root.display(), "template path is not a directory, skipping");
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file());

        for entry in walker {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // First match wins: earlier directories shadow later ones.
            table
                .entry(stem.to_string())
                .or_insert_with(|| path.to_path_buf());
        }
    }

    tracing::debug!(templates = table.len(), "template index built");
    table
}
