//! Request context.
//!
//! The host runtime describes the current request through [`RequestContext`]:
//! which kind of page was asked for ([`Predicate`]), the queried entities, and
//! site metadata used to build the host data tree. Dispatch only reads the
//! context, except for [`RequestContext::set_current_item`], which the router
//! hook uses to re-point the current content item.
//!
//! [`StaticContext`] is an in-memory implementation for tests, the CLI and
//! hosts that compute everything up front.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of request a context can answer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    FrontPage,
    Home,
    Page,
    Category,
    Tag,
    Taxonomy,
    Author,
    Search,
    NotFound,
    Attachment,
    Single,
    Archive,
    Date,
}

impl Predicate {
    /// Every predicate, in resolution order.
    pub const ALL: [Predicate; 13] = [
        Predicate::FrontPage,
        Predicate::Home,
        Predicate::Page,
        Predicate::Category,
        Predicate::Tag,
        Predicate::Taxonomy,
        Predicate::Author,
        Predicate::Search,
        Predicate::NotFound,
        Predicate::Attachment,
        Predicate::Single,
        Predicate::Archive,
        Predicate::Date,
    ];

    /// Stable name, also used as the rule name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::FrontPage => "front_page",
            Predicate::Home => "home",
            Predicate::Page => "page",
            Predicate::Category => "category",
            Predicate::Tag => "tag",
            Predicate::Taxonomy => "taxonomy",
            Predicate::Author => "author",
            Predicate::Search => "search",
            Predicate::NotFound => "not_found",
            Predicate::Attachment => "attachment",
            Predicate::Single => "single",
            Predicate::Archive => "archive",
            Predicate::Date => "date",
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content item (post, page, attachment).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    pub slug: String,
    pub post_type: String,
    /// Page-template meta, e.g. `templates/page-landing.php`.
    #[serde(default)]
    pub page_template: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A taxonomy term (category, tag, custom taxonomy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub slug: String,
    pub taxonomy: String,
}

/// The author of an author archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub nicename: String,
}

/// The logged-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    /// Raw user record, as the host stores it.
    pub fields: serde_json::Map<String, Value>,
    pub roles: Vec<String>,
}

/// What the host runtime knows about the current request.
pub trait RequestContext {
    /// Whether the request is of the given kind.
    fn is(&self, predicate: Predicate) -> bool;

    /// The current content item, if any.
    fn current_item(&self) -> Option<&ContentItem>;

    /// The queried taxonomy term of a category, tag or taxonomy archive.
    fn queried_term(&self) -> Option<&Term>;

    /// The queried author of an author archive.
    fn queried_author(&self) -> Option<&Author>;

    /// Every registered post type, in host order.
    fn post_types(&self) -> Vec<String>;

    /// Whether the request is the archive of `post_type`.
    fn is_post_type_archive(&self, post_type: &str) -> bool;

    /// Re-points the current content item. Returns `false` if `id` is unknown.
    fn set_current_item(&mut self, id: u64) -> bool;

    /// A site-info value (`name`, `url`, `charset`, ...).
    fn site_info(&self, _key: &str) -> Option<Value> {
        None
    }

    /// The logged-in user, if any.
    fn current_user(&self) -> Option<User> {
        None
    }

    /// Document title.
    fn title(&self) -> String {
        String::new()
    }

    /// Canonical permalink of the current item.
    fn permalink(&self) -> Option<String> {
        None
    }

    /// Body classifier classes.
    fn body_classes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory [`RequestContext`].
///
/// # Example
///
/// ```rust
/// use trellis_dispatch::{ContentItem, Predicate, RequestContext, StaticContext};
///
/// let ctx = StaticContext::builder()
///     .predicate(Predicate::Single)
///     .item(ContentItem { id: 7, slug: "hello".into(), post_type: "post".into(), ..Default::default() })
///     .current(7)
///     .build();
///
/// assert!(ctx.is(Predicate::Single));
/// assert_eq!(ctx.current_item().unwrap().slug, "hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    predicates: HashSet<Predicate>,
    items: Vec<ContentItem>,
    current: Option<usize>,
    term: Option<Term>,
    author: Option<Author>,
    post_types: Vec<String>,
    archive_post_type: Option<String>,
    site: BTreeMap<String, Value>,
    user: Option<User>,
    title: String,
    permalink: Option<String>,
    body_classes: Vec<String>,
}

impl StaticContext {
    /// Starts building a context.
    pub fn builder() -> StaticContextBuilder {
        StaticContextBuilder::default()
    }
}

impl RequestContext for StaticContext {
    fn is(&self, predicate: Predicate) -> bool {
        self.predicates.contains(&predicate)
    }

    fn current_item(&self) -> Option<&ContentItem> {
        self.current.and_then(|i| self.items.get(i))
    }

    fn queried_term(&self) -> Option<&Term> {
        self.term.as_ref()
    }

    fn queried_author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    fn post_types(&self) -> Vec<String> {
        self.post_types.clone()
    }

    fn is_post_type_archive(&self, post_type: &str) -> bool {
        self.archive_post_type.as_deref() == Some(post_type)
    }

    fn set_current_item(&mut self, id: u64) -> bool {
        match self.items.iter().position(|item| item.id == id) {
            Some(pos) => {
                self.current = Some(pos);
                true
            }
            None => false,
        }
    }

    fn site_info(&self, key: &str) -> Option<Value> {
        self.site.get(key).cloned()
    }

    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn permalink(&self) -> Option<String> {
        self.permalink.clone()
    }

    fn body_classes(&self) -> Vec<String> {
        self.body_classes.clone()
    }
}

/// Builder for [`StaticContext`].
#[derive(Debug, Clone, Default)]
pub struct StaticContextBuilder {
    inner: StaticContext,
    current_id: Option<u64>,
}

impl StaticContextBuilder {
    /// Marks the request as being of the given kind.
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.inner.predicates.insert(predicate);
        self
    }

    /// Adds a known content item.
    pub fn item(mut self, item: ContentItem) -> Self {
        self.inner.items.push(item);
        self
    }

    /// Selects the current content item by id.
    pub fn current(mut self, id: u64) -> Self {
        self.current_id = Some(id);
        self
    }

    pub fn term(mut self, term: Term) -> Self {
        self.inner.term = Some(term);
        self
    }

    pub fn author(mut self, author: Author) -> Self {
        self.inner.author = Some(author);
        self
    }

    /// Registers a post type.
    pub fn post_type(mut self, post_type: impl Into<String>) -> Self {
        self.inner.post_types.push(post_type.into());
        self
    }

    /// Makes the request the archive of `post_type`.
    pub fn post_type_archive(mut self, post_type: impl Into<String>) -> Self {
        self.inner.archive_post_type = Some(post_type.into());
        self
    }

    pub fn site_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.site.insert(key.into(), value.into());
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.inner.user = Some(user);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.inner.title = title.into();
        self
    }

    pub fn permalink(mut self, permalink: impl Into<String>) -> Self {
        self.inner.permalink = Some(permalink.into());
        self
    }

    pub fn body_class(mut self, class: impl Into<String>) -> Self {
        self.inner.body_classes.push(class.into());
        self
    }

    /// Finishes the context. An unknown current id leaves no current item.
    pub fn build(self) -> StaticContext {
        let mut ctx = self.inner;
        if let Some(id) = self.current_id {
            ctx.set_current_item(id);
        }
        ctx
    }
}
