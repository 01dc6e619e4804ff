//! Template lookup, helpers and the engine seam.
//!
//! - [`index`]: identifier → source file across ordered search paths
//! - [`helpers`]: named routines callable from templates, with pre-warming
//! - [`engine`]: the [`TemplateEngine`] trait and its MiniJinja implementation

pub mod engine;
pub mod helpers;
pub mod index;

pub use engine::{CompiledTemplate, MiniJinjaEngine, TemplateEngine};
pub use helpers::{Bodies, Chunk, EvalContext, Helper, HelperRegistry, Params};
pub use index::{bare_identifier, TemplateIndex};
