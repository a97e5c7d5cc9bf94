//! Live reloading end to end: file edits re-resolve modules, removals drop
//! their watches, and edits to imported files reload too.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use yamlet::{LiveLoader, LiveOptions, Loader, Schema, TagKind, WatchEvent};

use crate::common::Sandbox;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live options tuned for tests: fast polling, fast debounce, and updates
/// funneled into a channel the test can await.
fn live_options(sandbox: &Sandbox) -> (LiveOptions, mpsc::UnboundedReceiver<(PathBuf, WatchEvent)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let opts = LiveOptions {
        base_dir: Some(sandbox.path().to_path_buf()),
        debounce_interval: Some(Duration::from_millis(20)),
        poll_interval: Some(Duration::from_millis(10)),
        on_update: Some(Arc::new(move |path, event| {
            let _ = tx.send((path.to_path_buf(), event));
        })),
        ..LiveOptions::default()
    };
    (opts, rx)
}

/// Schema with a tag that counts its constructions, so tests can observe
/// that a reload actually re-resolved a module.
fn counting_schema() -> (Arc<Schema>, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut schema = Schema::new();
    let tag_counter = counter.clone();
    schema.register("stamp", TagKind::Scalar, move |data, _| {
        tag_counter.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    });
    (Arc::new(schema), counter)
}

#[tokio::test]
async fn changed_files_are_reloaded() {
    let sandbox = Sandbox::new();
    let app = sandbox.write("app.yaml", "value: !stamp first\n");
    let canonical = tokio::fs::canonicalize(&app).await.unwrap();

    let (mut opts, mut updates) = live_options(&sandbox);
    let (schema, counter) = counting_schema();
    opts.schema = Some(schema);

    let live = LiveLoader::new(Loader::new(), opts).unwrap();
    let value = live.add_module(&app, BTreeMap::new()).await.unwrap();
    assert_eq!(value["value"], "first");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    sandbox.write("app.yaml", "value: !stamp second edition\n");
    let (path, event) = timeout(EVENT_TIMEOUT, updates.recv())
        .await
        .expect("change not reported")
        .unwrap();
    assert_eq!(path, canonical);
    assert_eq!(event, WatchEvent::Changed);
    // The update callback fires after the reload, so the tag has run again.
    assert!(counter.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn removed_files_drop_their_watch() {
    let sandbox = Sandbox::new();
    let app = sandbox.write("app.yaml", "x: 1\n");

    let (opts, mut updates) = live_options(&sandbox);
    let live = LiveLoader::new(Loader::new(), opts).unwrap();
    live.add_module(&app, BTreeMap::new()).await.unwrap();
    assert_eq!(live.watched_paths().len(), 1);

    tokio::fs::remove_file(&app).await.unwrap();
    let (_, event) = timeout(EVENT_TIMEOUT, updates.recv())
        .await
        .expect("removal not reported")
        .unwrap();
    assert_eq!(event, WatchEvent::Removed);
    assert!(live.watched_paths().is_empty());
}

#[tokio::test]
async fn edits_to_imported_files_trigger_a_reload() {
    let sandbox = Sandbox::new();
    sandbox.write("db.yaml", "host: !stamp localhost\n");
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT db ./db.yaml\n---\ndatabase: $imp.db.host\n",
    );
    let db_canonical = tokio::fs::canonicalize(sandbox.path().join("db.yaml"))
        .await
        .unwrap();

    let (mut opts, mut updates) = live_options(&sandbox);
    let (schema, counter) = counting_schema();
    opts.schema = Some(schema);

    let live = LiveLoader::new(Loader::new(), opts).unwrap();
    let value = live.add_module(&app, BTreeMap::new()).await.unwrap();
    assert_eq!(value["database"], "localhost");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    // Both the module and its import are watched.
    assert_eq!(live.watched_paths().len(), 2);

    sandbox.write("db.yaml", "host: !stamp db.internal\n");
    let (path, event) = timeout(EVENT_TIMEOUT, updates.recv())
        .await
        .expect("import change not reported")
        .unwrap();
    assert_eq!(path, db_canonical);
    assert_eq!(event, WatchEvent::Changed);
    assert!(counter.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn bursts_of_edits_coalesce_into_few_reloads() {
    let sandbox = Sandbox::new();
    let app = sandbox.write("app.yaml", "x: !stamp 0\n");

    let (mut opts, mut updates) = live_options(&sandbox);
    let (schema, counter) = counting_schema();
    opts.schema = Some(schema);

    let live = LiveLoader::new(Loader::new(), opts).unwrap();
    live.add_module(&app, BTreeMap::new()).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Each rewrite changes the file length so every poll tick can see it.
    for i in 0..5 {
        sandbox.write("app.yaml", &format!("x: !stamp {}\n", "9".repeat(i + 2)));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Wait for the burst to settle, then drain the updates that arrived.
    timeout(EVENT_TIMEOUT, updates.recv())
        .await
        .expect("no reload after burst")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    while updates.try_recv().is_ok() {}

    // Five edits in quick succession produce fewer reloads than edits.
    let reloads = counter.load(Ordering::SeqCst) - 1;
    assert!(reloads >= 1);
    assert!(reloads < 5, "expected debounced reloads, got {reloads}");
}
