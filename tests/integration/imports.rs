//! `$imp` resolution: parameter merging, traversal into imported output,
//! sandboxing and cycle detection.

use anyhow::Result;
use yamlet::{Error, Value};

use crate::common::loader_in_sandbox;

#[tokio::test]
async fn imports_resolve_with_directive_defaults() -> Result<()> {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write(
        "db.yaml",
        "%PARAM tier replica\n---\nconnection: postgres://${param.tier}\n",
    );
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT db ./db.yaml tier=primary\n---\ndatabase: $imp.db.connection\n",
    );

    let value = loader.load_file_async(&app, sandbox.options()).await?;
    assert_eq!(value["database"], "postgres://primary");
    Ok(())
}

#[tokio::test]
async fn payload_parameters_override_directive_defaults() -> Result<()> {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write("db.yaml", "%PARAM tier replica\n---\ntier: $param.tier\n");
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT db ./db.yaml tier=primary\n---\nused: $imp.db.tier tier=standby\n",
    );

    let value = loader.load_file_async(&app, sandbox.options()).await?;
    assert_eq!(value["used"], "standby");
    Ok(())
}

#[tokio::test]
async fn whole_node_imports_keep_structure() -> Result<()> {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write(
        "infra.yaml",
        "servers:\n  - alpha\n  - beta\nlimits:\n  cpu: 2\n  mem: 4\n",
    );
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT infra ./infra.yaml\n---\nservers: [ $imp.infra.servers ]\nlimits: { $imp.infra.limits: }\n",
    );

    let value = loader.load_file_async(&app, sandbox.options()).await?;
    assert_eq!(
        value["servers"],
        Value::Sequence(vec!["alpha".into(), "beta".into()])
    );
    assert_eq!(value["limits"]["cpu"], 2);
    Ok(())
}

#[tokio::test]
async fn transitive_imports_resolve_relative_to_each_module() -> Result<()> {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write("nested/leaf.yaml", "answer: 42\n");
    sandbox.write(
        "nested/mid.yaml",
        "%IMPORT leaf ./leaf.yaml\n---\nfrom_leaf: $imp.leaf.answer\n",
    );
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT mid ./nested/mid.yaml\n---\nresult: $imp.mid.from_leaf\n",
    );

    let value = loader.load_file_async(&app, sandbox.options()).await?;
    assert_eq!(value["result"], "42");
    Ok(())
}

#[tokio::test]
async fn undeclared_import_alias_errors() {
    let (loader, sandbox) = loader_in_sandbox();
    let app = sandbox.write("app.yaml", "x: $imp.db.host\n");

    let err = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap_err();
    let Error::InFile { source, .. } = err else {
        panic!("expected wrapped error, got {err:?}");
    };
    assert!(matches!(
        *source,
        Error::UndeclaredAlias { kind: "import", .. }
    ));
}

#[tokio::test]
async fn non_yaml_targets_are_refused_by_the_directive() {
    let (loader, sandbox) = loader_in_sandbox();
    let app = sandbox.write("app.yaml", "%IMPORT x ./data.json\n---\na: 1\n");

    let err = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap_err();
    let Error::InFile { source, .. } = err else {
        panic!("expected wrapped error, got {err:?}");
    };
    assert!(matches!(*source, Error::InvalidYamlPath { .. }));
}

#[tokio::test]
async fn imports_cannot_escape_the_sandbox() {
    let (loader, sandbox) = loader_in_sandbox();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.yaml"), "top: secret\n").unwrap();

    let target = outside.path().join("secret.yaml");
    let app = sandbox.write(
        "app.yaml",
        &format!("%IMPORT out {}\n---\nx: $imp.out.top\n", target.display()),
    );

    let err = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap_err();
    let Error::InFile { source, .. } = err else {
        panic!("expected wrapped error, got {err:?}");
    };
    assert!(matches!(*source, Error::SandboxEscape { .. }));
}

#[tokio::test]
async fn direct_cycle_is_detected() {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write(
        "a.yaml",
        "%IMPORT b ./b.yaml\n---\nfrom_b: $imp.b.value\nvalue: a\n",
    );
    sandbox.write(
        "b.yaml",
        "%IMPORT a ./a.yaml\n---\nfrom_a: $imp.a.value\nvalue: b\n",
    );

    let err = loader
        .load_file_async(sandbox.path().join("a.yaml"), sandbox.options())
        .await
        .unwrap_err();
    assert!(find_circular(&err).is_some(), "expected cycle error, got {err:?}");
}

#[tokio::test]
async fn transitive_cycle_lists_the_full_path() {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write("a.yaml", "%IMPORT b ./b.yaml\n---\nx: $imp.b.x\n");
    sandbox.write("b.yaml", "%IMPORT c ./c.yaml\n---\nx: $imp.c.x\n");
    sandbox.write("c.yaml", "%IMPORT a ./a.yaml\n---\nx: $imp.a.x\n");

    let err = loader
        .load_file_async(sandbox.path().join("a.yaml"), sandbox.options())
        .await
        .unwrap_err();
    let cycle = find_circular(&err).expect("expected cycle error");
    assert!(cycle.contains("a.yaml"));
    assert!(cycle.contains("b.yaml"));
    assert!(cycle.contains("c.yaml"));
}

#[tokio::test]
async fn self_import_is_a_cycle() {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write("a.yaml", "%IMPORT me ./a.yaml\n---\nx: $imp.me.x\n");

    let err = loader
        .load_file_async(sandbox.path().join("a.yaml"), sandbox.options())
        .await
        .unwrap_err();
    assert!(find_circular(&err).is_some(), "expected cycle error, got {err:?}");
}

#[tokio::test]
async fn private_paths_of_imported_modules_stay_private() {
    let (loader, sandbox) = loader_in_sandbox();
    sandbox.write(
        "db.yaml",
        "%PRIVATE credentials\n---\ncredentials:\n  password: hunter2\nhost: localhost\n",
    );
    let app = sandbox.write(
        "app.yaml",
        "%IMPORT db ./db.yaml\n---\ndatabase: { $imp.db: }\n",
    );

    let value = loader
        .load_file_async(&app, sandbox.options())
        .await
        .unwrap();
    assert_eq!(value["database"]["host"], "localhost");
    let Value::Mapping(db) = &value["database"] else {
        panic!("expected mapping");
    };
    assert!(!db.contains_key(Value::String("credentials".into())));
}

/// Walk the `InFile` wrapping to the circular-import message, if present.
fn find_circular(err: &Error) -> Option<String> {
    match err {
        Error::CircularImport { cycle } => Some(cycle.clone()),
        Error::InFile { source, .. } => find_circular(source),
        _ => None,
    }
}
