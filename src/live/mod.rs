//! Live reloading.
//!
//! A [`LiveLoader`] keeps a set of modules loaded and warm: it owns one
//! long-lived load session (so cached modules survive between reloads),
//! watches every file a load touches (imports included), and re-runs loads
//! when files change. Reactions are funneled through a per-path
//! [`Debouncer`], so rapid bursts of file-system notifications collapse
//! into the minimum reload work, and the update callback fires once per
//! settled batch.
//!
//! Error handling is configurable per [`LiveOptions`]: `warn_on_error` logs
//! failed reloads instead of only surfacing them through the callback-less
//! reload path, and `reset_on_error` drops a module whose reload failed so
//! a later change starts from a clean slate.

mod debouncer;
mod watcher;

pub use watcher::WatchEvent;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::{Result, SessionId};
use crate::loader::{LoadEnv, Loader};
use crate::tags::Schema;
use crate::utils::resolve_path;
use crate::Value;
use debouncer::Debouncer;
use watcher::Watcher;

/// Callback invoked once per settled reload batch.
pub type UpdateFn = Arc<dyn Fn(&Path, WatchEvent) + Send + Sync>;

/// Configuration for a [`LiveLoader`].
#[derive(Clone, Default)]
pub struct LiveOptions {
    /// Sandbox root shared by every watched module. Defaults to the current
    /// working directory.
    pub base_dir: Option<PathBuf>,
    /// Custom tag schema shared by every watched module.
    pub schema: Option<Arc<Schema>>,
    /// Quiet interval between debounced reload batches. Defaults to 200ms.
    pub debounce_interval: Option<Duration>,
    /// File polling interval. Defaults to 100ms.
    pub poll_interval: Option<Duration>,
    /// Log a warning when a reload fails.
    pub warn_on_error: bool,
    /// Drop a module whose reload failed instead of keeping the stale one.
    pub reset_on_error: bool,
    /// Called after each settled reload batch with the path and event.
    pub on_update: Option<UpdateFn>,
}

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const DEFAULT_POLL: Duration = Duration::from_millis(100);

struct LiveInner {
    loader: Loader,
    session: SessionId,
    opts: LiveOptions,
    env: Arc<LoadEnv>,
    /// Original parameters per explicitly added module; reloads reuse them.
    module_params: Mutex<HashMap<PathBuf, BTreeMap<String, String>>>,
    debouncers: Mutex<HashMap<PathBuf, Arc<Debouncer>>>,
    watcher: Mutex<Watcher>,
}

/// Supervisor that keeps modules loaded, watched and re-resolved on change.
///
/// Must be created and used inside a tokio runtime; dropping it stops all
/// watch tasks and releases the session's cache entries.
pub struct LiveLoader {
    inner: Arc<LiveInner>,
    events_task: JoinHandle<()>,
}

impl LiveLoader {
    /// Create a supervisor with its own load session.
    pub fn new(loader: Loader, opts: LiveOptions) -> Result<Self> {
        let base_dir = match &opts.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let env = Arc::new(LoadEnv {
            base_dir,
            schema: opts.schema.clone(),
        });

        let session = loader.cache().begin_session();
        let (watcher, events) = Watcher::new(opts.poll_interval.unwrap_or(DEFAULT_POLL));

        let inner = Arc::new(LiveInner {
            loader,
            session,
            opts,
            env,
            module_params: Mutex::new(HashMap::new()),
            debouncers: Mutex::new(HashMap::new()),
            watcher: Mutex::new(watcher),
        });
        let events_task = tokio::spawn(event_loop(Arc::clone(&inner), events));

        Ok(Self { inner, events_task })
    }

    /// Load a module, remember its parameters, and watch every file the load
    /// touched.
    pub async fn add_module(
        &self,
        path: impl AsRef<Path>,
        params: BTreeMap<String, String>,
    ) -> Result<Value> {
        let path = path.as_ref();
        let result = self
            .inner
            .loader
            .root_file_load(path, params.clone(), &self.inner.env, self.inner.session)
            .await;
        let value = result.map_err(|err| err.in_file(path.display().to_string()))?;

        let resolved = resolve_path(path, &self.inner.env.base_dir);
        let canonical = tokio::fs::canonicalize(&resolved).await?;
        lock(&self.inner.module_params).insert(canonical, params);
        self.inner.watch_touched_paths();

        Ok(value)
    }

    /// Stop watching a module and release its cache entry.
    pub fn remove_module(&self, path: impl AsRef<Path>) {
        self.inner.remove_module(path.as_ref());
    }

    /// Stop watching everything the session currently retains.
    pub fn remove_all_modules(&self) {
        for path in self.inner.loader.cache().session_paths(self.inner.session) {
            self.inner.remove_module(&path);
        }
    }

    /// Paths currently being watched.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        lock(&self.inner.watcher).watched_paths()
    }
}

impl Drop for LiveLoader {
    fn drop(&mut self) {
        self.events_task.abort();
        self.inner
            .loader
            .cache()
            .end_session(self.inner.session);
    }
}

impl LiveInner {
    /// Watch every path the session has touched so far.
    fn watch_touched_paths(&self) {
        let mut watcher = lock(&self.watcher);
        for path in self.loader.cache().session_paths(self.session) {
            watcher.watch(path);
        }
    }

    fn remove_module(&self, path: &Path) {
        lock(&self.watcher).unwatch(path);
        lock(&self.debouncers).remove(path);
        lock(&self.module_params).remove(path);
        self.loader.cache().release(self.session, path);
    }

    fn debouncer_for(&self, path: &Path) -> Arc<Debouncer> {
        let interval = self.opts.debounce_interval.unwrap_or(DEFAULT_DEBOUNCE);
        lock(&self.debouncers)
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Debouncer::new(interval)))
            .clone()
    }
}

async fn event_loop(inner: Arc<LiveInner>, mut events: UnboundedReceiver<(PathBuf, WatchEvent)>) {
    while let Some((path, event)) = events.recv().await {
        let debouncer = inner.debouncer_for(&path);
        let inner = Arc::clone(&inner);

        // Each path debounces independently; a long reload on one path must
        // not delay batches on another.
        tokio::spawn(async move {
            let job_inner = Arc::clone(&inner);
            let job_path = path.clone();
            let result = debouncer
                .debounce(move || Box::pin(handle_event(job_inner, job_path, event)))
                .await;

            if let Err(err) = result {
                if inner.opts.reset_on_error {
                    inner.remove_module(&path);
                }
                if inner.opts.warn_on_error {
                    warn!(path = %path.display(), error = %err, "live reload failed");
                }
            }
        });
    }
}

async fn handle_event(inner: Arc<LiveInner>, path: PathBuf, event: WatchEvent) -> Result<()> {
    match event {
        WatchEvent::Changed => {
            let params = lock(&inner.module_params)
                .get(&path)
                .cloned()
                .unwrap_or_default();
            // The content hash check makes the stale module entry miss, so
            // this re-parses and re-resolves, replacing the cached module.
            inner
                .loader
                .root_file_load(&path, params, &inner.env, inner.session)
                .await?;
            inner.watch_touched_paths();
        }
        WatchEvent::Removed => {
            inner.remove_module(&path);
        }
    }

    if let Some(on_update) = &inner.opts.on_update {
        on_update(&path, event);
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
