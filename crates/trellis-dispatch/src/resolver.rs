//! Handler resolution.
//!
//! The [`Resolver`] maps a [`RequestContext`] to the name of the handler that
//! should serve it. It builds an ordered list of [`ResolutionRule`]s, one per
//! kind of request, each holding an ordered list of [`Candidate`] names:
//!
//! | Rule | Candidates |
//! |------|-----------|
//! | front page | `FrontPage` |
//! | home | `Home` |
//! | page | `Page{Template}`, `Page{Slug}`, `Page{Id}`, `Page` |
//! | category | `Category{Slug}`, `Category{TermId}`, `Category`, `Archive` |
//! | tag | `Tag{Slug}`, `Tag`, `Archive` |
//! | taxonomy | `Taxonomy{Tax}{Slug}`, `Taxonomy{Tax}`, `Taxonomy`, `Archive` |
//! | author | `Author{Nicename}`, `Author{Id}`, `Author`, `Archive` |
//! | search | `Search` |
//! | not found | `Error404` |
//! | attachment | by mime type, `Attachment`, `SingleAttachment`, `Single` |
//! | single | `Single{PostType}`, `Single{Template}`, `Single` |
//! | archive | `Archive{PostType}` or `Archive` |
//! | date | `Date` or `Archive` |
//!
//! Rules whose predicate holds are walked in order, candidates in order, and
//! the first candidate naming a registered handler wins. When nothing
//! matches the handler is [`DEFAULT_HANDLER`]. Resolution never fails.
//!
//! The attachment rule is only built when enabled with
//! [`Resolver::with_attachments`].

use std::fmt;
use std::sync::Arc;

use crate::context::{ContentItem, Predicate, RequestContext};
use crate::handler::HandlerLookup;
use crate::hooks::ResolverHooks;
use crate::util::dashed_to_camelcase;

/// Handler used when no candidate matches.
pub const DEFAULT_HANDLER: &str = "Index";

/// Boolean query over the request context.
pub type PredicateFn = Arc<dyn Fn(&dyn RequestContext) -> bool + Send + Sync>;

/// Computes a candidate name, or `None` for no match.
pub type ComputeFn = Arc<dyn Fn(&dyn HandlerLookup) -> Option<String> + Send + Sync>;

/// When a rule applies.
#[derive(Clone)]
pub enum RulePredicate {
    /// A context predicate.
    Named(Predicate),
    /// Any boolean function of the context.
    Custom(PredicateFn),
}

impl RulePredicate {
    pub fn holds(&self, ctx: &dyn RequestContext) -> bool {
        match self {
            RulePredicate::Named(p) => ctx.is(*p),
            RulePredicate::Custom(f) => f(ctx),
        }
    }
}

impl fmt::Debug for RulePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePredicate::Named(p) => write!(f, "Named({})", p),
            RulePredicate::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// The value of a keyed or guarded candidate.
#[derive(Clone)]
pub enum CandidateValue {
    Name(String),
    Compute(ComputeFn),
}

/// One entry of a rule's fallback list.
#[derive(Clone)]
pub enum Candidate {
    /// A literal handler name.
    Name(String),
    /// Evaluated only when a handler named `key` exists.
    Keyed { key: String, value: CandidateValue },
    /// Evaluated only when `guard` holds for the context.
    Guarded {
        guard: PredicateFn,
        value: CandidateValue,
    },
    /// A computed name.
    Compute(ComputeFn),
}

impl Candidate {
    /// A literal candidate.
    pub fn name(name: impl Into<String>) -> Self {
        Candidate::Name(name.into())
    }

    /// A computed candidate.
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&dyn HandlerLookup) -> Option<String> + Send + Sync + 'static,
    {
        Candidate::Compute(Arc::new(f))
    }

    /// A candidate gated on another handler's existence.
    pub fn keyed(key: impl Into<String>, name: impl Into<String>) -> Self {
        Candidate::Keyed {
            key: key.into(),
            value: CandidateValue::Name(name.into()),
        }
    }

    /// A candidate gated on a context check.
    pub fn guarded<G>(guard: G, name: impl Into<String>) -> Self
    where
        G: Fn(&dyn RequestContext) -> bool + Send + Sync + 'static,
    {
        Candidate::Guarded {
            guard: Arc::new(guard),
            value: CandidateValue::Name(name.into()),
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn value(v: &CandidateValue) -> String {
            match v {
                CandidateValue::Name(n) => n.clone(),
                CandidateValue::Compute(_) => "<computed>".to_string(),
            }
        }
        match self {
            Candidate::Name(n) => write!(f, "{}", n),
            Candidate::Keyed { key, value: v } => write!(f, "{} => {}", key, value(v)),
            Candidate::Guarded { value: v, .. } => write!(f, "<guard> => {}", value(v)),
            Candidate::Compute(_) => write!(f, "<computed>"),
        }
    }
}

/// A predicate and its ordered candidates.
#[derive(Clone, Debug)]
pub struct ResolutionRule {
    /// Rule name, for hooks that replace or reorder rules.
    pub name: String,
    pub predicate: RulePredicate,
    pub candidates: Vec<Candidate>,
}

impl ResolutionRule {
    /// A rule keyed by a context predicate, named after it.
    pub fn new(predicate: Predicate, candidates: Vec<Candidate>) -> Self {
        Self {
            name: predicate.as_str().to_string(),
            predicate: RulePredicate::Named(predicate),
            candidates,
        }
    }

    /// A rule with an arbitrary predicate function.
    pub fn custom<F>(name: impl Into<String>, predicate: F, candidates: Vec<Candidate>) -> Self
    where
        F: Fn(&dyn RequestContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: RulePredicate::Custom(Arc::new(predicate)),
            candidates,
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The winning handler name.
    pub handler: String,
    /// Every candidate name tried, in order. Ends with the default when used.
    pub attempted: Vec<String>,
    /// Whether the default handler was used.
    pub defaulted: bool,
}

/// Derives the `{Template}` part of page and single candidates.
///
/// `templates/page-landing.php` → `landing`; `default` → `page`; no meta → `default`.
pub fn page_template_name(meta: Option<&str>) -> String {
    let Some(meta) = meta.filter(|m| !m.is_empty()) else {
        return "default".to_string();
    };

    let file = meta.rsplit('/').next().unwrap_or(meta);
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    let name = stem.replace("page-", "").replace("single-", "");

    if name == "default" {
        "page".to_string()
    } else {
        name
    }
}

/// Maps request contexts to handler names.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    hooks: ResolverHooks,
    attachments: bool,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs resolution hooks.
    pub fn with_hooks(mut self, hooks: ResolverHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Enables the attachment rule.
    pub fn with_attachments(mut self, enabled: bool) -> Self {
        self.attachments = enabled;
        self
    }

    pub fn hooks(&self) -> &ResolverHooks {
        &self.hooks
    }

    /// Resolves the handler for `ctx`.
    pub fn resolve(&self, ctx: &dyn RequestContext, handlers: &dyn HandlerLookup) -> Resolution {
        let rules = self.hooks.run_rules(self.rules_for(ctx), ctx);
        let mut attempted = Vec::new();

        for rule in &rules {
            if !rule.predicate.holds(ctx) {
                continue;
            }
            for candidate in &rule.candidates {
                if let Some(handler) = evaluate(candidate, ctx, handlers, &mut attempted) {
                    tracing::debug!(rule = %rule.name, handler = %handler, "handler resolved");
                    return Resolution {
                        handler,
                        attempted,
                        defaulted: false,
                    };
                }
            }
        }

        tracing::debug!(attempted = ?attempted, "no candidate matched, using default handler");
        attempted.push(DEFAULT_HANDLER.to_string());
        Resolution {
            handler: DEFAULT_HANDLER.to_string(),
            attempted,
            defaulted: true,
        }
    }

    /// Resolves and passes the name through the template hooks.
    pub fn resolve_name(&self, ctx: &dyn RequestContext, handlers: &dyn HandlerLookup) -> String {
        self.hooks.run_template(self.resolve(ctx, handlers).handler)
    }

    /// Builds the rule list for `ctx`, before hooks.
    pub fn rules_for(&self, ctx: &dyn RequestContext) -> Vec<ResolutionRule> {
        let item = ctx.current_item();
        let template = dashed_to_camelcase(&page_template_name(
            item.and_then(|i| i.page_template.as_deref()),
        ));
        let mut rules = Vec::new();

        if ctx.is(Predicate::FrontPage) {
            rules.push(ResolutionRule::new(
                Predicate::FrontPage,
                vec![Candidate::name("FrontPage")],
            ));
        }

        if ctx.is(Predicate::Home) {
            rules.push(ResolutionRule::new(Predicate::Home, vec![Candidate::name("Home")]));
        }

        if ctx.is(Predicate::Page) {
            let mut candidates = vec![Candidate::name(format!("Page{}", template))];
            if let Some(item) = item {
                candidates.push(Candidate::name(format!(
                    "Page{}",
                    dashed_to_camelcase(&item.slug)
                )));
                candidates.push(Candidate::name(format!("Page{}", item.id)));
            }
            candidates.push(Candidate::name("Page"));
            rules.push(ResolutionRule::new(Predicate::Page, candidates));
        }

        if ctx.is(Predicate::Category) {
            let mut candidates = Vec::new();
            if let Some(term) = ctx.queried_term() {
                candidates.push(Candidate::name(format!(
                    "Category{}",
                    dashed_to_camelcase(&term.slug)
                )));
                candidates.push(Candidate::name(format!("Category{}", term.id)));
            }
            candidates.push(Candidate::name("Category"));
            candidates.push(Candidate::name("Archive"));
            rules.push(ResolutionRule::new(Predicate::Category, candidates));
        }

        if ctx.is(Predicate::Tag) {
            let mut candidates = Vec::new();
            if let Some(term) = ctx.queried_term() {
                candidates.push(Candidate::name(format!(
                    "Tag{}",
                    dashed_to_camelcase(&term.slug)
                )));
            }
            candidates.push(Candidate::name("Tag"));
            candidates.push(Candidate::name("Archive"));
            rules.push(ResolutionRule::new(Predicate::Tag, candidates));
        }

        if ctx.is(Predicate::Taxonomy) {
            let mut candidates = Vec::new();
            if let Some(term) = ctx.queried_term() {
                let tax = dashed_to_camelcase(&term.taxonomy);
                candidates.push(Candidate::name(format!(
                    "Taxonomy{}{}",
                    tax,
                    dashed_to_camelcase(&term.slug)
                )));
                candidates.push(Candidate::name(format!("Taxonomy{}", tax)));
            }
            candidates.push(Candidate::name("Taxonomy"));
            candidates.push(Candidate::name("Archive"));
            rules.push(ResolutionRule::new(Predicate::Taxonomy, candidates));
        }

        if ctx.is(Predicate::Author) {
            let mut candidates = Vec::new();
            if let Some(author) = ctx.queried_author() {
                candidates.push(Candidate::name(format!(
                    "Author{}",
                    dashed_to_camelcase(&author.nicename)
                )));
                candidates.push(Candidate::name(format!("Author{}", author.id)));
            }
            candidates.push(Candidate::name("Author"));
            candidates.push(Candidate::name("Archive"));
            rules.push(ResolutionRule::new(Predicate::Author, candidates));
        }

        rules.push(ResolutionRule::new(
            Predicate::Search,
            vec![Candidate::name("Search")],
        ));
        rules.push(ResolutionRule::new(
            Predicate::NotFound,
            vec![Candidate::name("Error404")],
        ));

        if self.attachments && ctx.is(Predicate::Attachment) {
            rules.push(attachment_rule(item));
        }

        if ctx.is(Predicate::Single) {
            let mut candidates = Vec::new();
            if let Some(item) = item {
                candidates.push(Candidate::name(format!(
                    "Single{}",
                    dashed_to_camelcase(&item.post_type)
                )));
            }
            candidates.push(Candidate::name(format!("Single{}", template)));
            candidates.push(Candidate::name("Single"));
            rules.push(ResolutionRule::new(Predicate::Single, candidates));
        }

        if ctx.is(Predicate::Archive) {
            let archived = ctx
                .post_types()
                .into_iter()
                .find(|t| ctx.is_post_type_archive(t));
            rules.push(ResolutionRule::new(
                Predicate::Archive,
                vec![Candidate::compute(move |handlers| {
                    let post_type = archived.as_deref()?;
                    let specific = format!("Archive{}", dashed_to_camelcase(post_type));
                    if handlers.exists(&specific) {
                        Some(specific)
                    } else if handlers.exists("Archive") {
                        Some("Archive".to_string())
                    } else {
                        None
                    }
                })],
            ));
        }

        if ctx.is(Predicate::Date) {
            rules.push(ResolutionRule::new(
                Predicate::Date,
                vec![Candidate::compute(|handlers| {
                    ["Date", "Archive"]
                        .into_iter()
                        .find(|name| handlers.exists(name))
                        .map(str::to_string)
                })],
            ));
        }

        rules
    }
}

fn attachment_rule(item: Option<&ContentItem>) -> ResolutionRule {
    let mime = item.and_then(|i| i.mime_type.clone()).unwrap_or_default();

    let by_prefix = |prefix: &'static str, name: &'static str| {
        let mime = mime.clone();
        Candidate::compute(move |handlers| {
            (mime.starts_with(prefix) && handlers.exists(name)).then(|| name.to_string())
        })
    };

    let text_mime = mime.clone();
    let text = Candidate::compute(move |handlers| {
        if text_mime != "text/plain" {
            return None;
        }
        ["Text", "Plain", "TextPlain"]
            .into_iter()
            .find(|name| handlers.exists(name))
            .map(str::to_string)
    });

    ResolutionRule::new(
        Predicate::Attachment,
        vec![
            by_prefix("image", "Image"),
            by_prefix("video", "Video"),
            by_prefix("application", "Application"),
            text,
            Candidate::name("Attachment"),
            Candidate::name("SingleAttachment"),
            Candidate::name("Single"),
        ],
    )
}

fn evaluate_value(
    value: &CandidateValue,
    handlers: &dyn HandlerLookup,
    attempted: &mut Vec<String>,
) -> Option<String> {
    let name = match value {
        CandidateValue::Name(name) => name.clone(),
        CandidateValue::Compute(f) => f(handlers)?,
    };
    let found = handlers.exists(&name);
    attempted.push(name.clone());
    found.then_some(name)
}

fn evaluate(
    candidate: &Candidate,
    ctx: &dyn RequestContext,
    handlers: &dyn HandlerLookup,
    attempted: &mut Vec<String>,
) -> Option<String> {
    match candidate {
        Candidate::Name(name) => {
            evaluate_value(&CandidateValue::Name(name.clone()), handlers, attempted)
        }
        Candidate::Compute(f) => {
            evaluate_value(&CandidateValue::Compute(Arc::clone(f)), handlers, attempted)
        }
        Candidate::Keyed { key, value } => {
            if handlers.exists(key) {
                evaluate_value(value, handlers, attempted)
            } else {
                None
            }
        }
        Candidate::Guarded { guard, value } => {
            if guard(ctx) {
                evaluate_value(value, handlers, attempted)
            } else {
                None
            }
        }
    }
}
