//! Shared helpers for the integration suite.

use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;
use yamlet::{LoadOptions, Loader};

static INIT: Once = Once::new();

/// Initialize tracing output for the suite; safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A sandbox directory populated with YAML fixture files.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            dir: tempfile::tempdir().expect("create sandbox"),
        }
    }

    /// Write a fixture file, creating parent directories as needed.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dirs");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Options rooted at this sandbox.
    pub fn options(&self) -> LoadOptions {
        LoadOptions::new().base_dir(self.path())
    }
}

/// A loader plus sandbox, the usual fixture for file-based tests.
pub fn loader_in_sandbox() -> (Loader, Sandbox) {
    (Loader::new(), Sandbox::new())
}
