//! A small site served end to end through `App`.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use trellis::trellis_render::{Bodies, Chunk, EvalContext, Params};
use trellis::{
    App, ContentItem, MemoryCache, MethodHandler, Predicate, RemotePayload, RemoteRequest,
    RemoteResponse, RenderError, RenderHooks, RenderOutcome, RequestSignals, ResolverHooks,
    Settings, StaticContext, Term, User,
};

fn theme() -> TempDir {
    let dir = TempDir::new().unwrap();
    let write = |name: &str, body: &str| fs::write(dir.path().join(name), body).unwrap();

    write("layout.jinja", "<title>{{ site.title }}</title>{% block main %}{% endblock %}");
    write(
        "single-post.jinja",
        "{% extends \"layout\" %}{% block main %}<h1>{{ post.title }}</h1>{{ byline() }}{% endblock %}",
    );
    write(
        "category.jinja",
        "{% for p in posts.items %}{% include \"card\" %}{% endfor %}",
    );
    write("card.jinja", "<article>{{ p }}</article>");
    write(
        "greeting.jinja",
        "{{ hello }}|{{ site }}",
    );
    dir
}

fn post_context() -> StaticContext {
    StaticContext::builder()
        .predicate(Predicate::Single)
        .item(ContentItem {
            id: 1,
            slug: "hello".into(),
            post_type: "post".into(),
            ..Default::default()
        })
        .current(1)
        .title("Hello | Notes")
        .build()
}

fn serve(app: &App, ctx: &mut StaticContext) -> String {
    let mut out = Vec::new();
    let outcome = app
        .handle_request(ctx, &RequestSignals::default(), &mut out)
        .unwrap();
    assert_eq!(outcome, Some(RenderOutcome::Written { ok: true }));
    String::from_utf8(out).unwrap()
}

#[test]
fn single_post_renders_through_layout_with_helper() {
    let dir = theme();
    let prewarmed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&prewarmed);

    let app = App::builder()
        .template_path(dir.path())
        .helper(
            "byline",
            move |chunk: &mut Chunk,
                  ctx: &EvalContext,
                  _bodies: &Bodies,
                  _params: &Params|
                  -> Result<(), RenderError> {
                if ctx.is_dummy() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                chunk.write("<p>by staff</p>");
                Ok(())
            },
        )
        .handler_methods(
            "SinglePost",
            MethodHandler::new().method("post", |_| Ok(json!({"title": "Hello"}))),
        )
        .build();

    let out = serve(&app, &mut post_context());
    assert_eq!(
        out,
        "<title>Hello | Notes</title><h1>Hello</h1><p>by staff</p>"
    );
    assert_eq!(prewarmed.load(Ordering::SeqCst), 1);
}

#[test]
fn category_archive_uses_includes() {
    let dir = theme();
    let app = App::builder()
        .template_path(dir.path())
        .handler_methods(
            "Category",
            MethodHandler::new().method("posts", |_| Ok(json!({"items": ["a", "b"]}))),
        )
        .build();
    let mut ctx = StaticContext::builder()
        .predicate(Predicate::Category)
        .predicate(Predicate::Archive)
        .term(Term {
            id: 2,
            slug: "news".into(),
            taxonomy: "category".into(),
        })
        .build();

    assert_eq!(
        serve(&app, &mut ctx),
        "<article>a</article><article>b</article>"
    );
}

#[test]
fn cached_and_uncached_sites_render_identically() {
    let dir = theme();
    let cache = Arc::new(MemoryCache::new());
    let build = |settings: Settings| {
        App::builder()
            .template_path(dir.path())
            .settings(settings)
            .cache(cache.clone())
            .helper(
                "byline",
                |chunk: &mut Chunk,
                 _: &EvalContext,
                 _: &Bodies,
                 _: &Params|
                 -> Result<(), RenderError> {
                    chunk.write("-");
                    Ok(())
                },
            )
            .handler_methods(
                "SinglePost",
                MethodHandler::new().method("post", |_| Ok(json!({"title": "Same"}))),
            )
            .build()
    };

    let plain = build(Settings::default());
    let cached = build(Settings {
        cache_partials: true,
        cache_rendered: true,
        ..Settings::default()
    });

    let expected = serve(&plain, &mut post_context());
    assert!(cache.is_empty());

    let miss = serve(&cached, &mut post_context());
    let hit = serve(&cached, &mut post_context());
    assert_eq!(miss, expected);
    assert_eq!(hit, expected);
    let (hits, _) = cache.stats();
    assert!(hits >= 2);
}

#[test]
fn hooks_shape_the_page() {
    let dir = theme();
    let seen = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&seen);

    let app = App::builder()
        .template_path(dir.path())
        .handler_methods(
            "Category",
            MethodHandler::new().method("posts", |_| Ok(json!({"items": ["x"]}))),
        )
        .resolver_hooks(ResolverHooks::new().router(|_| Some(7)))
        .render_hooks(
            RenderHooks::new()
                .main_data(|mut data| {
                    data["posts"]["items"] = json!(["override"]);
                    data
                })
                .output(|out, _| out.to_uppercase())
                .after_render(move |_, _| {
                    observer.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .host_data(|mut site| {
            site["title"] = json!("Filtered");
            site
        })
        .build();

    let mut ctx = StaticContext::builder()
        .predicate(Predicate::Category)
        .item(ContentItem {
            id: 7,
            slug: "routed".into(),
            post_type: "page".into(),
            ..Default::default()
        })
        .build();

    assert_eq!(serve(&app, &mut ctx), "<ARTICLE>OVERRIDE</ARTICLE>");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(ctx_current(&ctx), Some(7));
}

fn ctx_current(ctx: &StaticContext) -> Option<u64> {
    use trellis::RequestContext;
    ctx.current_item().map(|item| item.id)
}

#[test]
fn remote_calls_check_token_and_render_handler_data() {
    let dir = theme();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let app = App::builder()
        .template_path(dir.path())
        .handler("Greeter", move |_args: &serde_json::Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            MethodHandler::new().method("hello", |_| Ok(json!("hi")))
        })
        .build();

    let mut fields = serde_json::Map::new();
    fields.insert("user_login".into(), json!("ada"));
    let mut ctx = StaticContext::builder()
        .user(User {
            id: 1,
            fields,
            roles: vec![],
        })
        .build();

    let payload = RemotePayload {
        token: Some("good".into()),
        path: Some("Greeter/hello".into()),
        partial: Some("greeting".into()),
        ..Default::default()
    };

    let rejected = app.handle_remote(&RemoteRequest::new(payload.clone(), "bad"), &mut ctx);
    assert_eq!(rejected, RemoteResponse::error("CSRF token mismatch."));
    assert_eq!(built.load(Ordering::SeqCst), 0);

    // Handler data reaches the partial without host data.
    let accepted = app.handle_remote(&RemoteRequest::new(payload, "good"), &mut ctx);
    assert_eq!(accepted, RemoteResponse::success(json!("hi|")));
    assert_eq!(built.load(Ordering::SeqCst), 1);

    assert_eq!(app.host_data(&ctx, false)["user"]["user_login"], "ada");
    assert!(app.host_data(&ctx, true).get("user").is_none());
}
