//! Two-tier cache with session-scoped retention.
//!
//! The **module cache** maps canonical module paths to their parsed artifacts
//! (directive table and blueprint), verified against a SHA-256 of the source
//! text so stale entries miss instead of serving outdated trees. The **load
//! cache** sits inside each module entry and memoizes fully resolved output
//! per parameter-set hash, since the same module resolved with the same
//! parameters is identical.
//!
//! Retention is reference counted by load session: every session that touches
//! a path holds it live, and a module is evicted only when its last session
//! ends. Sessions also own their import cycle graph, so concurrent loads
//! never see each other's edges.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::blueprint::Blueprint;
use crate::core::{Result, SessionId};
use crate::directives::DirectiveTable;
use crate::resolver::cycle::CycleGraph;
use crate::Value;

/// Parsed artifacts of one module, shared across sessions and resolve passes.
#[derive(Debug, Clone)]
pub(crate) struct ModuleArtifacts {
    pub table: Arc<DirectiveTable>,
    pub blueprint: Arc<Blueprint>,
    pub leaf_count: u32,
}

#[derive(Debug)]
struct ModuleEntry {
    content_hash: String,
    artifacts: ModuleArtifacts,
    /// Load cache: parameter-set hash to fully resolved output.
    resolved: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct CacheState {
    modules: HashMap<PathBuf, ModuleEntry>,
    session_paths: HashMap<SessionId, HashSet<PathBuf>>,
    path_sessions: HashMap<PathBuf, HashSet<SessionId>>,
    graphs: HashMap<SessionId, CycleGraph>,
}

/// Shared cache handle. One per [`Loader`](crate::Loader); never global.
#[derive(Debug, Default)]
pub(crate) struct CacheService {
    state: Mutex<CacheState>,
}

impl CacheService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a load session: its cycle graph starts empty and it retains no
    /// paths yet.
    pub(crate) fn begin_session(&self) -> SessionId {
        let session = SessionId::new();
        let mut state = self.state();
        state.session_paths.insert(session, HashSet::new());
        state.graphs.insert(session, CycleGraph::new());
        debug!(%session, "load session opened");
        session
    }

    /// Close a load session, dropping its cycle graph and evicting any module
    /// no longer retained by another session.
    pub(crate) fn end_session(&self, session: SessionId) {
        let mut state = self.state();
        state.graphs.remove(&session);
        let Some(paths) = state.session_paths.remove(&session) else {
            return;
        };
        for path in paths {
            let empty = match state.path_sessions.get_mut(&path) {
                Some(holders) => {
                    holders.remove(&session);
                    holders.is_empty()
                }
                None => false,
            };
            if empty {
                state.path_sessions.remove(&path);
                state.modules.remove(&path);
                debug!(path = %path.display(), "module evicted");
            }
        }
        debug!(%session, "load session closed");
    }

    /// Look up a module by path, verifying the entry against the current
    /// source hash. The session is registered as a holder of the path either
    /// way, so a subsequent insert is already retained.
    pub(crate) fn lookup_module(
        &self,
        session: SessionId,
        path: &Path,
        content_hash: &str,
    ) -> Option<ModuleArtifacts> {
        let mut state = self.state();
        state.touch(session, path);
        match state.modules.get(path) {
            Some(entry) if entry.content_hash == content_hash => {
                debug!(path = %path.display(), "module cache hit");
                Some(entry.artifacts.clone())
            }
            Some(_) => {
                debug!(path = %path.display(), "module cache stale");
                None
            }
            None => None,
        }
    }

    /// Store a freshly parsed module. Replaces any stale entry, resetting its
    /// load cache.
    pub(crate) fn insert_module(
        &self,
        session: SessionId,
        path: &Path,
        content_hash: String,
        artifacts: ModuleArtifacts,
    ) {
        let mut state = self.state();
        state.touch(session, path);
        state.modules.insert(
            path.to_path_buf(),
            ModuleEntry {
                content_hash,
                artifacts,
                resolved: HashMap::new(),
            },
        );
    }

    /// Fetch a memoized resolution for a (path, parameter-hash) pair.
    pub(crate) fn lookup_resolved(&self, path: &Path, params_hash: &str) -> Option<Value> {
        let state = self.state();
        let value = state.modules.get(path)?.resolved.get(params_hash).cloned();
        if value.is_some() {
            debug!(path = %path.display(), "load cache hit");
        }
        value
    }

    /// Memoize a resolution. A no-op if the module entry has been evicted in
    /// the meantime.
    pub(crate) fn insert_resolved(&self, path: &Path, params_hash: String, value: Value) {
        let mut state = self.state();
        if let Some(entry) = state.modules.get_mut(path) {
            entry.resolved.insert(params_hash, value);
        }
    }

    /// Paths the session currently retains.
    pub(crate) fn session_paths(&self, session: SessionId) -> Vec<PathBuf> {
        let state = self.state();
        state
            .session_paths
            .get(&session)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop one path from a session's retained set, evicting its module
    /// entry when no other session holds it.
    pub(crate) fn release(&self, session: SessionId, path: &Path) {
        let mut state = self.state();
        if let Some(paths) = state.session_paths.get_mut(&session) {
            paths.remove(path);
        }
        let empty = match state.path_sessions.get_mut(path) {
            Some(holders) => {
                holders.remove(&session);
                holders.is_empty()
            }
            None => false,
        };
        if empty {
            state.path_sessions.remove(path);
            state.modules.remove(path);
            debug!(path = %path.display(), "module evicted");
        }
    }

    /// Record an import edge in the session's cycle graph, failing if it
    /// would close a cycle.
    pub(crate) fn add_import_edge(
        &self,
        session: SessionId,
        from: &Path,
        to: &Path,
    ) -> Result<()> {
        let mut state = self.state();
        state.graphs.entry(session).or_default().add_import(from, to)
    }

    #[cfg(test)]
    fn module_count(&self) -> usize {
        self.state().modules.len()
    }
}

impl CacheState {
    fn touch(&mut self, session: SessionId, path: &Path) {
        self.session_paths
            .entry(session)
            .or_default()
            .insert(path.to_path_buf());
        self.path_sessions
            .entry(path.to_path_buf())
            .or_default()
            .insert(session);
    }
}
