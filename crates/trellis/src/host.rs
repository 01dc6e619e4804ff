//! Host data.
//!
//! Every main render receives a tree describing the site and the visitor,
//! merged into the handler's data under [`SITE_KEY`]. Remote renders get the
//! handler data alone; hosts that publish site data on remote endpoints
//! collect it with `remote` set, which drops the keys listed in
//! `Settings::remote_hidden_site_keys`.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use trellis_dispatch::RequestContext;

/// Key the host data is stored under in the render data.
pub const SITE_KEY: &str = "site";

/// Site-info keys copied from the context.
pub const SITE_INFO_KEYS: &[&str] = &[
    "name",
    "description",
    "wpurl",
    "url",
    "admin_email",
    "charset",
    "version",
    "html_type",
    "is_rtl",
    "language",
    "stylesheet_url",
    "stylesheet_directory",
    "template_url",
    "template_directory",
    "pingback_url",
    "atom_url",
    "rdf_url",
    "rss_url",
    "rss2_url",
    "comments_atom_url",
    "comments_rss2_url",
];

const SECRET_USER_FIELDS: &[&str] = &["user_pass"];

/// Transforms the collected host data.
pub type HostDataFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Collects host data from a request context.
#[derive(Clone, Default)]
pub struct HostData {
    hidden_on_remote: Vec<String>,
    remote_url: Option<String>,
    hooks: Vec<HostDataFn>,
}

impl HostData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys dropped when collecting for a remote call.
    pub fn hidden_on_remote(mut self, keys: Vec<String>) -> Self {
        self.hidden_on_remote = keys;
        self
    }

    /// Endpoint client code posts remote calls to, exposed as `remote_url`.
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Adds a hook run over the collected tree.
    pub fn hook<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(f));
        self
    }

    /// Builds the host data tree for `ctx`.
    pub fn collect(&self, ctx: &dyn RequestContext, remote: bool) -> Value {
        let hidden = |key: &str| remote && self.hidden_on_remote.iter().any(|h| h == key);
        let mut data = Map::new();

        for key in SITE_INFO_KEYS.iter().copied().filter(|k| !hidden(*k)) {
            data.insert(
                key.to_string(),
                ctx.site_info(key).unwrap_or(Value::String(String::new())),
            );
        }

        match ctx.current_user() {
            Some(user) => {
                data.insert("loggedin".into(), Value::Bool(true));
                if !hidden("user") {
                    let mut fields = user.fields;
                    for secret in SECRET_USER_FIELDS {
                        fields.remove(*secret);
                    }
                    fields.insert("ID".into(), Value::from(user.id));
                    fields.insert(
                        "roles".into(),
                        Value::Array(user.roles.into_iter().map(Value::String).collect()),
                    );
                    data.insert("user".into(), Value::Object(fields));
                }
            }
            None => {
                data.insert("loggedin".into(), Value::Bool(false));
            }
        }

        data.insert("title".into(), Value::String(ctx.title()));
        if let Some(url) = &self.remote_url {
            data.insert("remote_url".into(), Value::String(url.clone()));
        }
        data.insert(
            "permalink".into(),
            ctx.permalink().map(Value::String).unwrap_or(Value::Null),
        );
        data.insert(
            "body_class".into(),
            Value::Array(ctx.body_classes().into_iter().map(Value::String).collect()),
        );

        self.hooks
            .iter()
            .fold(Value::Object(data), |acc, hook| hook(acc))
    }
}

impl fmt::Debug for HostData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostData")
            .field("hidden_on_remote", &self.hidden_on_remote)
            .field("remote_url", &self.remote_url)
            .field("hook_count", &self.hooks.len())
            .finish()
    }
}

/// Puts `site` under [`SITE_KEY`] of the handler data.
///
/// Object data gains the key, unless the handler already set it. Any other
/// value is moved under `data`.
pub fn merge_site(data: Value, site: Value) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    };
    map.entry(SITE_KEY).or_insert(site);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_dispatch::{StaticContext, User};

    fn visitor() -> User {
        let mut fields = Map::new();
        fields.insert("user_login".into(), json!("ada"));
        fields.insert("user_pass".into(), json!("$P$hash"));
        User {
            id: 3,
            fields,
            roles: vec!["editor".into()],
        }
    }

    fn hidden() -> Vec<String> {
        ["wpurl", "admin_email", "version", "user"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_collects_site_info_and_page_state() {
        let ctx = StaticContext::builder()
            .site_info("name", "Field Notes")
            .site_info("version", "6.4")
            .title("Home | Field Notes")
            .permalink("https://example.org/")
            .body_class("home")
            .build();

        let data = HostData::new().remote_url("/remote").collect(&ctx, false);

        assert_eq!(data["name"], "Field Notes");
        assert_eq!(data["version"], "6.4");
        assert_eq!(data["description"], "");
        assert_eq!(data["loggedin"], false);
        assert_eq!(data["title"], "Home | Field Notes");
        assert_eq!(data["remote_url"], "/remote");
        assert_eq!(data["permalink"], "https://example.org/");
        assert_eq!(data["body_class"], json!(["home"]));
        assert!(data.get("user").is_none());
    }

    #[test]
    fn test_user_password_is_stripped() {
        let ctx = StaticContext::builder().user(visitor()).build();
        let data = HostData::new().collect(&ctx, false);

        assert_eq!(data["loggedin"], true);
        assert_eq!(data["user"]["user_login"], "ada");
        assert_eq!(data["user"]["roles"], json!(["editor"]));
        assert!(data["user"].get("user_pass").is_none());
    }

    #[test]
    fn test_remote_hides_keys() {
        let ctx = StaticContext::builder()
            .site_info("version", "6.4")
            .user(visitor())
            .build();
        let host = HostData::new().hidden_on_remote(hidden());

        let local = host.collect(&ctx, false);
        assert!(local.get("version").is_some());
        assert!(local.get("user").is_some());

        let remote = host.collect(&ctx, true);
        assert!(remote.get("version").is_none());
        assert!(remote.get("wpurl").is_none());
        assert!(remote.get("user").is_none());
        assert_eq!(remote["loggedin"], true);
        assert!(remote.get("name").is_some());
    }

    #[test]
    fn test_hooks_transform_tree() {
        let ctx = StaticContext::default();
        let data = HostData::new()
            .hook(|mut v| {
                v["theme"] = json!("dark");
                v
            })
            .collect(&ctx, false);
        assert_eq!(data["theme"], "dark");
    }

    #[test]
    fn test_merge_site() {
        assert_eq!(
            merge_site(json!({"a": 1}), json!({"name": "x"})),
            json!({"a": 1, "site": {"name": "x"}})
        );
        assert_eq!(
            merge_site(json!({"site": "mine"}), json!({"name": "x"})),
            json!({"site": "mine"})
        );
        assert_eq!(
            merge_site(json!([1, 2]), json!({})),
            json!({"data": [1, 2], "site": {}})
        );
        assert_eq!(merge_site(Value::Null, json!(1)), json!({"site": 1}));
    }
}
