//! Resolution hooks.
//!
//! Hooks let the embedding application steer handler resolution without
//! replacing the resolver:
//!
//! ```text
//! request context
//!   → ROUTER hooks     (may re-point the current content item)
//!   → rule list built from the context
//!   → RULES hooks      (insert, replace or reorder rules)
//!   → rules evaluated
//!   → TEMPLATE hooks   (rename the resolved handler)
//! ```
//!
//! Rules hooks run on every resolution, immediately before evaluation; the
//! rule list is never cached across requests.

use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::resolver::ResolutionRule;

/// Maps the current content item id to the one that should be current.
pub type RouterFn = Arc<dyn Fn(Option<u64>) -> Option<u64> + Send + Sync>;

/// Transforms the rule list before evaluation.
pub type RulesFn =
    Arc<dyn Fn(Vec<ResolutionRule>, &dyn RequestContext) -> Vec<ResolutionRule> + Send + Sync>;

/// Transforms the resolved handler name.
pub type TemplateFn = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Hook chains applied around resolution.
#[derive(Clone, Default)]
pub struct ResolverHooks {
    router: Vec<RouterFn>,
    rules: Vec<RulesFn>,
    template: Vec<TemplateFn>,
}

impl ResolverHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.router.is_empty() && self.rules.is_empty() && self.template.is_empty()
    }

    /// Adds a router hook.
    ///
    /// Returning `Some(id)` makes `id` the current content item.
    pub fn router<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<u64>) -> Option<u64> + Send + Sync + 'static,
    {
        self.router.push(Arc::new(f));
        self
    }

    /// Adds a rules hook.
    ///
    /// # Example
    ///
    /// ```rust
    /// use trellis_dispatch::{Candidate, Predicate, ResolutionRule, ResolverHooks};
    ///
    /// // Landing pages get their own handler ahead of everything else.
    /// let hooks = ResolverHooks::new().rules(|mut rules, _ctx| {
    ///     rules.insert(0, ResolutionRule::new(Predicate::Page, vec![Candidate::name("Landing")]));
    ///     rules
    /// });
    /// ```
    pub fn rules<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<ResolutionRule>, &dyn RequestContext) -> Vec<ResolutionRule>
            + Send
            + Sync
            + 'static,
    {
        self.rules.push(Arc::new(f));
        self
    }

    /// Adds a template hook.
    pub fn template<F>(mut self, f: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.template.push(Arc::new(f));
        self
    }

    /// Runs router hooks and re-points `ctx` when they ask for an item.
    ///
    /// Returns the id that was requested, if any.
    pub fn run_router(&self, ctx: &mut dyn RequestContext) -> Option<u64> {
        if self.router.is_empty() {
            return None;
        }
        let current = ctx.current_item().map(|item| item.id);
        let wanted = self.router.iter().fold(current, |acc, hook| hook(acc));

        if let Some(id) = wanted {
            if !ctx.set_current_item(id) {
                tracing::warn!(id, "router requested an unknown content item");
            }
        }
        wanted
    }

    pub(crate) fn run_rules(
        &self,
        rules: Vec<ResolutionRule>,
        ctx: &dyn RequestContext,
    ) -> Vec<ResolutionRule> {
        self.rules.iter().fold(rules, |acc, hook| hook(acc, ctx))
    }

    /// Runs template hooks over a resolved handler name.
    pub fn run_template(&self, name: String) -> String {
        self.template.iter().fold(name, |acc, hook| hook(acc))
    }
}

impl fmt::Debug for ResolverHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverHooks")
            .field("router_count", &self.router.len())
            .field("rules_count", &self.rules.len())
            .field("template_count", &self.template.len())
            .finish()
    }
}
