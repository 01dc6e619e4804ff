use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use trellis_render::{
    CacheStore, CompiledTemplate, MemoryCache, MiniJinjaEngine, PartialSettings, RenderError,
    RenderPipeline, Settings, TemplateEngine, COMPILED_NAMESPACE, RENDERED_NAMESPACE,
};

/// Wraps the MiniJinja engine and counts calls.
struct CountingEngine {
    inner: MiniJinjaEngine,
    compiles: Arc<AtomicUsize>,
    evaluations: Arc<AtomicUsize>,
}

impl TemplateEngine for CountingEngine {
    fn compile(&self, id: &str, path: &Path) -> Result<CompiledTemplate, RenderError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(id, path)
    }

    fn evaluate(&self, compiled: &CompiledTemplate, data: &Value) -> Result<String, RenderError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.inner.evaluate(compiled, data)
    }

    fn register_helper(&mut self, name: &str, helper: Arc<dyn trellis_render::Helper>) {
        self.inner.register_helper(name, helper);
    }
}

struct Fixture {
    _dir: TempDir,
    pipeline: RenderPipeline,
    cache: Arc<MemoryCache>,
    compiles: Arc<AtomicUsize>,
    evaluations: Arc<AtomicUsize>,
}

fn fixture(settings: Settings) -> Fixture {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("list.jinja"),
        "{% for p in posts %}<li>{{ p }}</li>{% endfor %}",
    )
    .unwrap();
    fs::write(dir.path().join("sidebar.jinja"), "<aside>{{ n }}</aside>").unwrap();

    let compiles = Arc::new(AtomicUsize::new(0));
    let evaluations = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(MemoryCache::new());

    let pipeline = RenderPipeline::builder()
        .template_path(dir.path())
        .settings(Arc::new(settings))
        .cache(cache.clone())
        .engine(CountingEngine {
            inner: MiniJinjaEngine::new(),
            compiles: compiles.clone(),
            evaluations: evaluations.clone(),
        })
        .build();

    Fixture {
        _dir: dir,
        pipeline,
        cache,
        compiles,
        evaluations,
    }
}

fn caching_on() -> Settings {
    Settings {
        cache_partials: true,
        cache_rendered: true,
        ..Settings::default()
    }
}

#[test]
fn test_cache_hit_is_byte_identical_and_skips_engine() {
    let f = fixture(caching_on());
    let data = json!({"posts": ["a", "b"]});

    let first = f.pipeline.render_to_string("list", data.clone()).unwrap();
    let second = f.pipeline.render_to_string("list", data).unwrap();

    assert_eq!(first, "<li>a</li><li>b</li>");
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(f.compiles.load(Ordering::SeqCst), 1);
    assert_eq!(f.evaluations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_changed_data_misses_rendered_cache() {
    let f = fixture(caching_on());

    f.pipeline
        .render_to_string("list", json!({"posts": ["a"]}))
        .unwrap();
    let out = f
        .pipeline
        .render_to_string("list", json!({"posts": ["z"]}))
        .unwrap();

    assert_eq!(out, "<li>z</li>");
    // Compiled artifact reused, evaluation repeated.
    assert_eq!(f.compiles.load(Ordering::SeqCst), 1);
    assert_eq!(f.evaluations.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cached_and_uncached_output_match() {
    let on = fixture(caching_on());
    let off = fixture(Settings::default());
    let data = json!({"posts": ["<x>", "y"]});

    for _ in 0..3 {
        let cached = on.pipeline.render_to_string("list", data.clone()).unwrap();
        let fresh = off.pipeline.render_to_string("list", data.clone()).unwrap();
        assert_eq!(cached, fresh);
    }

    assert!(off.cache.is_empty());
    assert_eq!(off.compiles.load(Ordering::SeqCst), 3);
    assert_eq!(off.evaluations.load(Ordering::SeqCst), 3);
}

#[test]
fn test_per_identifier_override_disables_rendered_cache() {
    let mut settings = caching_on();
    settings.partials.insert(
        "sidebar".into(),
        PartialSettings {
            cache_rendered: Some(false),
            ..PartialSettings::default()
        },
    );
    let f = fixture(settings);

    f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap();
    f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap();
    f.pipeline
        .render_to_string("list", json!({"posts": []}))
        .unwrap();

    assert_eq!(f.evaluations.load(Ordering::SeqCst), 3);
    assert!(f.cache.get("sidebar", COMPILED_NAMESPACE).is_some());
}

#[test]
fn test_zero_expiry_never_serves_stale_output() {
    let mut settings = caching_on();
    settings.partials.insert(
        "sidebar".into(),
        PartialSettings {
            expire_time: Some(0),
            ..PartialSettings::default()
        },
    );
    let f = fixture(settings);

    f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap();
    f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap();

    assert_eq!(f.evaluations.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unbounded_expiry_still_caches() {
    let f = fixture(Settings {
        rendered_expire_time: u64::MAX,
        ..caching_on()
    });

    let first = f.pipeline.render_to_string("sidebar", json!({"a": 1})).unwrap();
    let second = f.pipeline.render_to_string("sidebar", json!({"a": 1})).unwrap();

    assert_eq!(first, second);
    assert_eq!(f.evaluations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_compiled_cache_survives_source_change_until_cleared() {
    let f = fixture(Settings {
        cache_partials: true,
        ..Settings::default()
    });
    let path = f.pipeline.index().locate("sidebar").unwrap();

    assert_eq!(
        f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap(),
        "<aside>1</aside>"
    );

    fs::write(&path, "<div>{{ n }}</div>").unwrap();
    assert_eq!(
        f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap(),
        "<aside>1</aside>"
    );

    f.pipeline.clear_cache();
    assert!(f.cache.get("sidebar", COMPILED_NAMESPACE).is_none());
    assert_eq!(
        f.pipeline.render_to_string("sidebar", json!({"n": 1})).unwrap(),
        "<div>1</div>"
    );
}

#[test]
fn test_rendered_entries_live_in_their_namespace() {
    let f = fixture(caching_on());
    f.pipeline.render_to_string("sidebar", json!({"n": 7})).unwrap();

    f.cache.clear(Some(RENDERED_NAMESPACE));
    f.pipeline.render_to_string("sidebar", json!({"n": 7})).unwrap();

    assert_eq!(f.compiles.load(Ordering::SeqCst), 1);
    assert_eq!(f.evaluations.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_renders_share_cache() {
    let f = fixture(caching_on());
    let pipeline = Arc::new(f.pipeline);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                pipeline
                    .render_to_string("sidebar", json!({"n": i % 2}))
                    .unwrap()
            })
        })
        .collect();

    let outputs: Vec<String> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    for (i, out) in outputs.iter().enumerate() {
        assert_eq!(out, &format!("<aside>{}</aside>", i % 2));
    }
}
