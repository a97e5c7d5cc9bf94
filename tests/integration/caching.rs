//! Idempotence and cache coherence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use yamlet::{Schema, TagKind, Value};

use crate::common::loader_in_sandbox;

/// Schema with a tag that counts its constructions.
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
async fn repeated_loads_return_structurally_equal_results() {
    let (loader, sandbox) = loader_in_sandbox();
    let app = sandbox.write(
        "app.yaml",
        "%PARAM env dev\n---\nname: svc-${param.env}\nlist:\n  - a\n  - $this.name\n",
    );

    let first = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();
    let second = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn repeated_imports_in_one_load_construct_tags_once() {
    let (loader, sandbox) = loader_in_sandbox();
    let (schema, counter) = counting_schema();

    sandbox.write("shared.yaml", "value: !stamp 7\n");
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT shared ./shared.yaml\n---\nfirst: $imp.shared.value\nsecond: $imp.shared.value\n",
    );

    let value = loader
        .load_file_async(&app, sandbox.options().schema(schema))
        .await
        .unwrap();
    assert_eq!(value["first"], value["second"]);
    // The second reference is served from the load cache.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_parameters_never_share_a_cached_resolution() {
    let (loader, sandbox) = loader_in_sandbox();
    let (schema, counter) = counting_schema();

    sandbox.write(
        "shared.yaml",
        "%PARAM tier base\n---\nvalue: !stamp ${param.tier}\n",
    );
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT shared ./shared.yaml\n---\na: $imp.shared.value tier=one\nb: $imp.shared.value tier=two\n",
    );

    let value = loader
        .load_file_async(&app, sandbox.options().schema(schema))
        .await
        .unwrap();
    assert_eq!(value["a"], "one");
    assert_eq!(value["b"], "two");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn changed_content_is_never_served_stale() {
    let (loader, sandbox) = loader_in_sandbox();
    let app = sandbox.write("app.yaml", "version: 1\n");

    let first = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();
    assert_eq!(first["version"], 1);

    sandbox.write("app.yaml", "version: 2\n");
    let second = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();
    assert_eq!(second["version"], 2);
}

#[tokio::test]
async fn blocking_and_async_modes_agree() {
    let (loader, sandbox) = loader_in_sandbox();
    let app = sandbox.write(
        "app.yaml",
        "%PARAM user guest\n---\ngreeting: Hello, ${param.user}!\n",
    );

    let from_async = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();

    let blocking_loader = yamlet::Loader::new();
    let opts = sandbox.options();
    let app_clone = app.clone();
    let from_blocking = tokio::task::spawn_blocking(move || {
        blocking_loader.load_file(app_clone, opts)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(from_async, from_blocking);
    assert_eq!(from_async["greeting"], Value::String("Hello, guest!".into()));
}
