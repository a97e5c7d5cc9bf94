//! Resolution engine.
//!
//! Resolution turns a blueprint into a concrete value tree. One
//! [`ResolveContext`] exists per resolve pass and owns everything mutable:
//! supplied parameter values, the stack of local-variable scopes, and the
//! per-leaf state machine (`Unvisited -> Resolving -> Resolved`). The
//! blueprint itself is shared and never mutated, so concurrent passes over
//! the same module cannot see each other.
//!
//! The walk is depth-first in document order. That order defines which
//! siblings a `$this` back-reference may target: an anchored lookup (one
//! coming from a `$this`/`$imp` path traversal) demands the target leaf be
//! `Resolved` already and otherwise fails with "accessed before
//! initialization" rather than attempting a dependency solve. An anchored
//! access that succeeds re-realizes the leaf's raw value under the local
//! scopes in effect at the access site, which is what lets a `$this`
//! payload parameterize an already-visited template; only tag outputs are
//! memoized, so a tag callback never runs twice.
//!
//! Strings resolve in two steps: a value that is wholly an interpolation
//! expression evaluates it and stringifies the result, and any other string
//! is scanned left-to-right for embedded `${...}` segments with brace-depth
//! tracking (`$${` escapes to a literal `${`).

pub(crate) mod cycle;
mod import;
mod interp;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::blueprint::{is_interp_expr, Blueprint, LeafValue, NodeId};
use crate::core::{Error, Result, SessionId};
use crate::directives::DirectiveTable;
use crate::loader::{LoadEnv, Loader};
use crate::Value;

/// Per-leaf resolution state within one pass.
///
/// `Resolved` marks ordering only: the leaf's raw value is re-realized on
/// every later access, so a `$this` payload scope in effect at access time
/// applies to it. Tag leaves instead memoize their output as `Constructed`,
/// which keeps the user callback to a single invocation.
#[derive(Debug, Default)]
pub(crate) enum NodeState {
    #[default]
    Unvisited,
    Resolving,
    Resolved,
    Constructed(Value),
}

/// Everything one resolve pass mutates, plus the immutable inputs it reads.
pub(crate) struct ResolveContext {
    pub session: SessionId,
    /// Canonical path of the module being resolved; absent for string loads.
    pub module_path: Option<PathBuf>,
    pub table: Arc<DirectiveTable>,
    pub blueprint: Arc<Blueprint>,
    /// Caller-supplied parameter values.
    pub params: BTreeMap<String, String>,
    /// Local-variable scope stack; `$this` payloads push, traversal exit pops.
    pub locals: Vec<BTreeMap<String, String>>,
    pub env: Arc<LoadEnv>,
    states: Vec<NodeState>,
}

impl ResolveContext {
    pub(crate) fn new(
        session: SessionId,
        module_path: Option<PathBuf>,
        table: Arc<DirectiveTable>,
        blueprint: Arc<Blueprint>,
        leaf_count: u32,
        params: BTreeMap<String, String>,
        env: Arc<LoadEnv>,
    ) -> Self {
        let mut states = Vec::with_capacity(leaf_count as usize);
        states.resize_with(leaf_count as usize, NodeState::default);
        Self {
            session,
            module_path,
            table,
            blueprint,
            params,
            locals: Vec::new(),
            env,
            states,
        }
    }

    fn state(&self, id: NodeId) -> &NodeState {
        &self.states[id.0 as usize]
    }

    fn set_state(&mut self, id: NodeId, state: NodeState) {
        self.states[id.0 as usize] = state;
    }
}

/// Run one full resolve pass: realize the tree, then strip private paths.
pub(crate) async fn resolve(loader: &Loader, ctx: &mut ResolveContext) -> Result<Value> {
    let root = Arc::clone(&ctx.blueprint);
    let mut value = resolve_node(loader, ctx, &root, false, None).await?;
    filter_private(&mut value, &ctx.table.private_paths);
    Ok(value)
}

/// Resolve one blueprint node.
///
/// `anchored` marks back-reference lookups: composite nodes recurse with the
/// flag, and an anchored leaf must already be `Resolved`. `path` is the
/// dotted path of the traversal that led here, carried for error messages.
///
/// Boxed because it recurses through itself, through the interpolation
/// evaluator, and through nested imports.
pub(crate) fn resolve_node<'a>(
    loader: &'a Loader,
    ctx: &'a mut ResolveContext,
    node: &'a Blueprint,
    anchored: bool,
    path: Option<&'a [String]>,
) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        match node {
            Blueprint::Map(entries) => {
                let mut map = serde_yaml::Mapping::with_capacity(entries.len());
                for (key, child) in entries {
                    let value = resolve_node(loader, ctx, child, anchored, path).await?;
                    map.insert(Value::String(key.clone()), value);
                }
                Ok(Value::Mapping(map))
            }
            Blueprint::Seq(items) => {
                let mut seq = Vec::with_capacity(items.len());
                for item in items {
                    seq.push(resolve_node(loader, ctx, item, anchored, path).await?);
                }
                Ok(Value::Sequence(seq))
            }
            Blueprint::Leaf(leaf) => {
                match ctx.state(leaf.id) {
                    NodeState::Constructed(value) => return Ok(value.clone()),
                    // A leaf caught mid-realization counts as uninitialized,
                    // so a self-referencing expression errors instead of
                    // recursing forever.
                    NodeState::Unvisited | NodeState::Resolving if anchored => {
                        return Err(Error::AccessBeforeInit {
                            path: path
                                .map(|p| p.join("."))
                                .unwrap_or_else(|| "node".to_string()),
                        });
                    }
                    _ => {}
                }

                let first = !matches!(ctx.state(leaf.id), NodeState::Resolved);
                if first {
                    ctx.set_state(leaf.id, NodeState::Resolving);
                }
                let value = realize_leaf(loader, ctx, &leaf.value).await?;
                if matches!(leaf.value, LeafValue::Tag(_)) {
                    ctx.set_state(leaf.id, NodeState::Constructed(value.clone()));
                } else if first {
                    ctx.set_state(leaf.id, NodeState::Resolved);
                }
                Ok(value)
            }
        }
    })
}

/// Compute a leaf's value for the first time.
async fn realize_leaf(
    loader: &Loader,
    ctx: &mut ResolveContext,
    leaf: &LeafValue,
) -> Result<Value> {
    match leaf {
        LeafValue::Scalar(Value::String(text)) => {
            Ok(Value::String(resolve_text(loader, ctx, text).await?))
        }
        LeafValue::Scalar(other) => Ok(other.clone()),
        LeafValue::MappingInterp(expr) => {
            let value = interp::evaluate(loader, ctx, expr).await?;
            if !value.is_mapping() {
                return Err(Error::ShapeMismatch {
                    expr: expr.clone(),
                    wrapper: "{}",
                    expected: "mapping",
                });
            }
            Ok(value)
        }
        LeafValue::SequenceInterp(expr) => {
            let value = interp::evaluate(loader, ctx, expr).await?;
            if !value.is_sequence() {
                return Err(Error::ShapeMismatch {
                    expr: expr.clone(),
                    wrapper: "[]",
                    expected: "sequence",
                });
            }
            Ok(value)
        }
        LeafValue::Tag(pending) => {
            let data = resolve_node(loader, ctx, &pending.data, false, None).await?;
            let params = match &pending.params {
                Some(text) => Some(resolve_text(loader, ctx, text).await?),
                None => None,
            };
            let schema = ctx.env.schema.clone();
            let construct = schema
                .as_ref()
                .and_then(|s| s.construct(pending.construct))
                .ok_or_else(|| Error::Tag {
                    message: format!(
                        "construction for tag '{}' is not registered in the schema",
                        pending.tag
                    ),
                })?;
            construct(data, params.as_deref())
        }
    }
}

/// Resolve a string value: a whole-expression string evaluates and
/// stringifies its target (warning when the target is a composite); anything
/// else goes through the embedded-segment scanner.
async fn resolve_text(loader: &Loader, ctx: &mut ResolveContext, text: &str) -> Result<String> {
    if is_interp_expr(text) {
        let value = interp::evaluate(loader, ctx, text).await?;
        if matches!(value, Value::Mapping(_) | Value::Sequence(_)) {
            warn!(
                expr = text,
                "interpolation without [] or {{}} wrapping resolved to a composite; \
                 wrap the expression to keep its structure"
            );
        }
        return Ok(stringify(&value));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' {
            // Escape: `$${` emits a literal `${`.
            if i + 2 < chars.len() && chars[i + 1] == '$' && chars[i + 2] == '{' {
                out.push_str("${");
                i += 3;
                continue;
            }
            if i + 1 < chars.len() && chars[i + 1] == '{' {
                let Some(end) = find_closing(&chars, '{', '}', i + 2) else {
                    return Err(Error::UnterminatedInterpolation {
                        text: text.to_string(),
                    });
                };
                let expr: String = chars[i..=end].iter().collect();
                let value = interp::evaluate(loader, ctx, &expr).await?;
                out.push_str(&stringify(&value));
                i = end + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    Ok(out)
}

/// Index of the closing character at the depth of the opener, honoring `\`
/// escapes. `start` points just past the opener.
fn find_closing(chars: &[char], open: char, close: char, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;

    while i < chars.len() {
        let escaped = i > 0 && chars[i - 1] == '\\';
        if chars[i] == close && !escaped {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
        if chars[i] == open && !escaped {
            depth += 1;
        }
        i += 1;
    }
    None
}

/// Render a resolved value as the string substituted into text.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Delete every registered private path from the resolved tree.
///
/// A path whose intermediate segments do not lead to a container only warns;
/// deleting an already-absent final key is a silent no-op.
fn filter_private(value: &mut Value, private_paths: &[String]) {
    for private in private_paths {
        let segments: Vec<&str> = private.split('.').collect();
        let mut node = &mut *value;

        for (i, segment) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            match node {
                Value::Mapping(map) => {
                    let key = Value::String((*segment).to_string());
                    if last {
                        map.remove(&key);
                        break;
                    }
                    match map.get_mut(&key) {
                        Some(child) => node = child,
                        None => {
                            warn!(path = private, "private path is not valid");
                            break;
                        }
                    }
                }
                Value::Sequence(seq) => {
                    let Ok(idx) = segment.parse::<usize>() else {
                        warn!(path = private, "private path is not valid");
                        break;
                    };
                    if last {
                        if idx < seq.len() {
                            seq.remove(idx);
                        }
                        break;
                    }
                    match seq.get_mut(idx) {
                        Some(child) => node = child,
                        None => {
                            warn!(path = private, "private path is not valid");
                            break;
                        }
                    }
                }
                _ => {
                    warn!(path = private, "private path is not valid");
                    break;
                }
            }
        }
    }
}
