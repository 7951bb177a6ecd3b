use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use cftop::VERSION;
use cftop::diagnostics::{DiagnosticLog, LogLevel, Viewport, ViewportAction, ViewportMode};
use cftop::metadata::fetch::FetchError;
use cftop::metadata::{
    ApiTransport, App, MetadataCache, MetadataKind, MetadataStore, PagedFetcher, ReloadOutcome,
    Route, RetryPolicy,
};

fn fetcher_over<F>(transport: F) -> PagedFetcher
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync + 'static,
{
    let transport: Arc<dyn ApiTransport> = Arc::new(transport);
    PagedFetcher::new(transport).with_retry(RetryPolicy::immediate(2))
}

fn route_page(guids: &[&str], next_url: &str) -> Vec<u8> {
    let resources: Vec<serde_json::Value> = guids
        .iter()
        .map(|guid| {
            serde_json::json!({
                "metadata": {"guid": guid},
                "entity": {"guid": "OTHER", "host": format!("host-{guid}"), "space_guid": "s1"}
            })
        })
        .collect();
    serde_json::json!({
        "total_results": 3,
        "total_pages": 2,
        "next_url": next_url,
        "resources": resources,
    })
    .to_string()
    .into_bytes()
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn two_page_reload_then_lookups() {
    let log = Arc::new(DiagnosticLog::new());
    let cache: MetadataCache<Route> = MetadataCache::new(
        fetcher_over(|path: &str| match path {
            "/v2/routes" => Ok(route_page(&["r1", "r2"], "/v2/routes?page=2")),
            "/v2/routes?page=2" => Ok(route_page(&["r3"], "")),
            _ => Err(FetchError::HttpStatus(404)),
        }),
        log.clone(),
    );

    assert_eq!(cache.reload(), ReloadOutcome::Replaced { records: 3 });

    let guids: Vec<String> = cache
        .all()
        .records()
        .iter()
        .map(|route| route.guid.clone())
        .collect();
    assert_eq!(guids, vec!["r1", "r2", "r3"]);
    for guid in ["r1", "r2", "r3"] {
        let route = cache.find_by_id(guid);
        assert_eq!(route.guid, guid);
        assert_eq!(route.host, format!("host-{guid}"));
    }
    assert_eq!(cache.find_by_id("missing"), Route::default());
    assert!(log.is_empty());
}

#[test]
fn failed_second_page_retains_previous_snapshot() {
    let broken = Arc::new(AtomicBool::new(false));
    let second_page_broken = broken.clone();
    let log = Arc::new(DiagnosticLog::new());
    let cache: MetadataCache<Route> = MetadataCache::new(
        fetcher_over(move |path: &str| match path {
            "/v2/routes" => Ok(route_page(&["r1", "r2"], "/v2/routes?page=2")),
            _ if second_page_broken.load(Ordering::SeqCst) => Ok(b"<html>gateway</html>".to_vec()),
            _ => Ok(route_page(&["r3"], "")),
        }),
        log.clone(),
    );
    cache.reload();
    let before: Vec<Route> = cache.all().records().to_vec();

    broken.store(true, Ordering::SeqCst);
    assert_eq!(cache.reload(), ReloadOutcome::Retained);

    assert_eq!(cache.all().records(), before.as_slice());
    assert_eq!(log.max_level(), Some(LogLevel::Warn));
}

#[test]
fn readers_never_observe_a_mixed_snapshot() {
    // Every page of reload N carries guids tagged with N, so a snapshot
    // mixing two reloads would show more than one tag.
    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = reloads.clone();
    let cache: Arc<MetadataCache<App>> = Arc::new(MetadataCache::new(
        fetcher_over(move |path: &str| {
            let generation = if path == "/v2/apps" {
                counter.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                counter.load(Ordering::SeqCst)
            };
            let resources: Vec<serde_json::Value> = (0..5)
                .map(|index| {
                    serde_json::json!({
                        "metadata": {"guid": format!("{generation}-{path}-{index}")},
                        "entity": {"name": generation.to_string()}
                    })
                })
                .collect();
            let next_url = if path == "/v2/apps" { "/v2/apps?page=2" } else { "" };
            Ok(serde_json::json!({"next_url": next_url, "resources": resources})
                .to_string()
                .into_bytes())
        }),
        Arc::new(DiagnosticLog::new()),
    ));
    cache.reload();

    let writer = {
        let cache = cache.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                cache.reload();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = cache.all();
                    assert_eq!(snapshot.len(), 10);
                    let first = &snapshot.records()[0].name;
                    assert!(snapshot.records().iter().all(|app| &app.name == first));
                }
            })
        })
        .collect();

    writer.join().expect("writer should not panic");
    for reader in readers {
        reader.join().expect("reader should not panic");
    }
}

#[test]
fn metadata_guid_wins_over_entity_guid() {
    let cache: MetadataCache<Route> = MetadataCache::new(
        fetcher_over(|_: &str| {
            Ok(br#"{"resources":[{"metadata":{"guid":"G"},"entity":{"guid":"OTHER"}}]}"#.to_vec())
        }),
        Arc::new(DiagnosticLog::new()),
    );
    cache.reload();

    assert_eq!(cache.find_by_id("G").guid, "G");
    assert_eq!(cache.find_by_id("OTHER"), Route::default());
}

#[test]
fn reload_failure_auto_opens_viewport_when_enabled() {
    let log = Arc::new(DiagnosticLog::new());
    log.set_auto_open_on_error(true);
    let store = MetadataStore::new(
        fetcher_over(|_: &str| Err(FetchError::HttpStatus(503))),
        log.clone(),
    );
    let mut viewport = Viewport::new(log.clone());

    assert_eq!(store.reload(MetadataKind::App), ReloadOutcome::Retained);
    // Reload failures are warnings; only errors open the viewport.
    assert!(!viewport.poll_auto_open());

    viewport.apply(ViewportAction::EmitTestMessage(LogLevel::Error));
    assert!(viewport.poll_auto_open());
    assert_eq!(viewport.mode(), ViewportMode::Tailing);

    let rendered = viewport.render();
    assert!(
        rendered
            .iter()
            .any(|row| row.text.ends_with("*** app metadata error: unexpected http status 503"))
    );
    viewport.apply(ViewportAction::Close);
    assert!(viewport.export().contains("New Messages Below"));
}
