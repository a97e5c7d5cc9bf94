//! Public load entry points.
//!
//! A [`Loader`] owns the cache shared by every load made through it. Entry
//! points come in pairs: `load_str` / `load_file` block the caller, while
//! `load_str_async` / `load_file_async` suspend at file reads and nested
//! imports. Both drive the same internal pipeline:
//!
//! 1. extract directives from the text
//! 2. capture and bind custom tags
//! 3. parse the body and build the blueprint (cached per path + content)
//! 4. resolve with the supplied parameters (memoized per parameter set)
//!
//! Each top-level call opens a load session that scopes cycle detection and
//! cache retention; the session is torn down whether the load succeeds or
//! fails. Errors from a load with a known filename are wrapped so the
//! message names the originating file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::blueprint;
use crate::cache::{CacheService, ModuleArtifacts};
use crate::core::{Error, Result, SessionId};
use crate::directives;
use crate::resolver::{self, ResolveContext};
use crate::tags::{self, Schema};
use crate::utils::{check_sandboxed_yaml, hash_params, hash_text, resolve_path};
use crate::Value;

/// Options for one load call.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Origin filename for string loads; enables caching and `$imp` for the
    /// loaded text. Ignored by the file entry points, which use their path
    /// argument.
    pub filename: Option<PathBuf>,
    /// Sandbox root; file access never escapes it. Defaults to the current
    /// working directory.
    pub base_dir: Option<PathBuf>,
    /// Custom tag schema shared by this load and everything it imports.
    pub schema: Option<Arc<Schema>>,
    /// Parameter values for the document's `%PARAM` declarations.
    pub params: BTreeMap<String, String>,
}

impl LoadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Immutable per-load environment carried into nested imports.
#[derive(Debug)]
pub(crate) struct LoadEnv {
    pub base_dir: PathBuf,
    pub schema: Option<Arc<Schema>>,
}

/// The loading facade. Cheap to clone; clones share the same cache.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    cache: Arc<CacheService>,
}

impl Loader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Load and resolve a YAML string.
    pub async fn load_str_async(&self, text: &str, opts: LoadOptions) -> Result<Value> {
        let env = self.build_env(&opts)?;
        let module_path = opts
            .filename
            .as_ref()
            .map(|f| resolve_path(f, &env.base_dir));

        let session = self.cache.begin_session();
        let result = self
            .internal_load_text(text.to_string(), module_path, opts.params, session, env)
            .await;
        self.cache.end_session(session);

        match (&opts.filename, result) {
            (Some(filename), Err(err)) => Err(err.in_file(filename.display().to_string())),
            (_, result) => result,
        }
    }

    /// Blocking counterpart of [`Loader::load_str_async`].
    ///
    /// Builds a throwaway single-threaded runtime, so it must not be called
    /// from inside an async context.
    pub fn load_str(&self, text: &str, opts: LoadOptions) -> Result<Value> {
        block_on(self.load_str_async(text, opts))
    }

    /// Read, load and resolve a YAML file.
    pub async fn load_file_async(&self, path: impl AsRef<Path>, opts: LoadOptions) -> Result<Value> {
        let path = path.as_ref();
        let env = self.build_env(&opts)?;

        let session = self.cache.begin_session();
        let result = self.root_file_load(path, opts.params, &env, session).await;
        self.cache.end_session(session);

        result.map_err(|err| err.in_file(path.display().to_string()))
    }

    /// Blocking counterpart of [`Loader::load_file_async`]. Must not be
    /// called from inside an async context.
    pub fn load_file(&self, path: impl AsRef<Path>, opts: LoadOptions) -> Result<Value> {
        block_on(self.load_file_async(path, opts))
    }

    /// Vet, read and load a root file path within an existing session; also
    /// the re-entry point for live reloads.
    pub(crate) async fn root_file_load(
        &self,
        path: &Path,
        params: BTreeMap<String, String>,
        env: &Arc<LoadEnv>,
        session: SessionId,
    ) -> Result<Value> {
        let resolved = resolve_path(path, &env.base_dir);
        let canonical = tokio::fs::canonicalize(&resolved).await?;
        check_sandboxed_yaml(&canonical, &env.base_dir)?;

        let text = tokio::fs::read_to_string(&canonical).await?;
        self.internal_load_text(text, Some(canonical), params, session, env.clone())
            .await
    }

    /// Load an already-vetted file path within an existing session; the
    /// re-entry point for imports.
    pub(crate) async fn internal_load_file(
        &self,
        path: PathBuf,
        params: BTreeMap<String, String>,
        session: SessionId,
        env: Arc<LoadEnv>,
    ) -> Result<Value> {
        let text = tokio::fs::read_to_string(&path).await?;
        self.internal_load_text(text, Some(path), params, session, env)
            .await
    }

    /// The shared pipeline behind every entry point.
    ///
    /// Boxed because imports re-enter it through the resolver.
    pub(crate) fn internal_load_text<'a>(
        &'a self,
        text: String,
        module_path: Option<PathBuf>,
        params: BTreeMap<String, String>,
        session: SessionId,
        env: Arc<LoadEnv>,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let content_hash = hash_text(&text);

            let cached = module_path
                .as_deref()
                .and_then(|path| self.cache.lookup_module(session, path, &content_hash));
            let artifacts = match cached {
                Some(artifacts) => artifacts,
                None => {
                    let artifacts = build_module(&text, env.schema.as_deref())?;
                    if let Some(path) = &module_path {
                        self.cache
                            .insert_module(session, path, content_hash, artifacts.clone());
                    }
                    artifacts
                }
            };

            let params_hash = hash_params(&params);
            if let Some(path) = &module_path {
                if let Some(value) = self.cache.lookup_resolved(path, &params_hash) {
                    return Ok(value);
                }
            }

            debug!(
                path = module_path.as_ref().map(|p| p.display().to_string()),
                "resolving module"
            );
            let mut ctx = ResolveContext::new(
                session,
                module_path.clone(),
                artifacts.table.clone(),
                artifacts.blueprint.clone(),
                artifacts.leaf_count,
                params,
                env,
            );
            let value = resolver::resolve(self, &mut ctx).await?;

            if let Some(path) = &module_path {
                self.cache
                    .insert_resolved(path, params_hash, value.clone());
            }
            Ok(value)
        })
    }

    fn build_env(&self, opts: &LoadOptions) -> Result<Arc<LoadEnv>> {
        let base_dir = match &opts.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Arc::new(LoadEnv {
            base_dir,
            schema: opts.schema.clone(),
        }))
    }
}

/// Parse one document's text into its cacheable artifacts.
fn build_module(text: &str, schema: Option<&Schema>) -> Result<ModuleArtifacts> {
    let (body, table) = directives::extract(text)?;

    let captured = tags::capture_tags(&body);
    let bindings = tags::bind_tags(&captured, schema);

    // An empty body is a null document, not a parse error.
    let parsed: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(&body)?
    };

    let info = blueprint::build(parsed, &bindings)?;
    Ok(ModuleArtifacts {
        table: Arc::new(table),
        blueprint: Arc::new(info.root),
        leaf_count: info.leaf_count,
    })
}

fn block_on<F: std::future::Future<Output = Result<Value>>>(future: F) -> Result<Value> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Io)?;
    runtime.block_on(future)
}
