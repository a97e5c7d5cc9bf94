//! Interpolation expression evaluation.
//!
//! Grammar: `$<base>[.<path...>] [key=value ...]`, optionally written as
//! `${...}`. The four bases:
//!
//! - `this` — traverse the current blueprint by path; payload tokens push a
//!   local-variable scope for the duration of the traversal
//! - `imp` — load an imported module (payload overrides the directive's
//!   default parameters) and traverse into its resolved output
//! - `param` — a declared `%PARAM` value: supplied, else default, else null
//! - `local` — a declared `%LOCAL` value: innermost pushed scope, else
//!   default, else null

use std::collections::BTreeMap;

use crate::blueprint::Blueprint;
use crate::core::{Error, Result};
use crate::loader::Loader;
use crate::resolver::{import, resolve_node, ResolveContext};
use crate::Value;

/// An expression split into its parts: base, dotted path, payload tokens.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SplitExpr {
    pub base: String,
    pub path: Vec<String>,
    pub payload: Vec<String>,
}

/// Split an expression, stripping the `$` / `${...}` wrapping first.
pub(crate) fn split_expr(expr: &str) -> Result<SplitExpr> {
    let mut text = expr.trim();
    if let Some(stripped) = text.strip_prefix("${") {
        text = stripped.strip_suffix('}').unwrap_or(stripped);
    }
    text = text.strip_prefix('$').unwrap_or(text).trim();

    let mut tokens = text.split(' ').filter(|t| !t.is_empty());
    let Some(head) = tokens.next() else {
        return Err(Error::EmptyExpression);
    };
    let payload: Vec<String> = tokens.map(str::to_string).collect();

    let mut parts = head.split('.').filter(|p| !p.is_empty()).map(str::to_string);
    let Some(base) = parts.next() else {
        return Err(Error::EmptyExpression);
    };

    Ok(SplitExpr {
        base,
        path: parts.collect(),
        payload,
    })
}

/// Evaluate one expression to its raw value.
pub(crate) async fn evaluate(
    loader: &Loader,
    ctx: &mut ResolveContext,
    expr: &str,
) -> Result<Value> {
    let split = split_expr(expr)?;
    match split.base.as_str() {
        "this" => handle_this(loader, ctx, &split).await,
        "imp" => handle_imp(loader, ctx, &split).await,
        "param" => handle_param(ctx, &split),
        "local" => handle_local(ctx, &split),
        _ => Err(Error::UnknownBase {
            expr: expr.to_string(),
        }),
    }
}

async fn handle_this(loader: &Loader, ctx: &mut ResolveContext, split: &SplitExpr) -> Result<Value> {
    let scope = parse_payload(&split.payload)?;
    ctx.locals.push(scope);

    let root = ctx.blueprint.clone();
    let result = traverse_blueprint(loader, ctx, &root, &split.path).await;

    ctx.locals.pop();
    result
}

async fn handle_imp(loader: &Loader, ctx: &mut ResolveContext, split: &SplitExpr) -> Result<Value> {
    let Some(module_path) = ctx.module_path.clone() else {
        return Err(Error::FilenameRequired);
    };

    let alias = split.path.first().cloned().unwrap_or_default();
    let Some(spec) = ctx.table.imports.get(&alias).cloned() else {
        return Err(Error::UndeclaredAlias {
            kind: "import",
            alias,
        });
    };

    // Directive defaults first, so payload values win.
    let mut params = spec.params;
    params.extend(parse_payload(&split.payload)?);

    let loaded = import::import_module(loader, ctx, &module_path, &spec.path, params).await?;
    traverse_value(&loaded, &split.path[1..])
}

fn handle_param(ctx: &ResolveContext, split: &SplitExpr) -> Result<Value> {
    let alias = split.path.first().cloned().unwrap_or_default();
    let Some(default) = ctx.table.params.get(&alias) else {
        return Err(Error::UndeclaredAlias {
            kind: "param",
            alias,
        });
    };

    if let Some(supplied) = ctx.params.get(&alias) {
        return Ok(Value::String(supplied.clone()));
    }
    Ok(default.clone().map_or(Value::Null, Value::String))
}

fn handle_local(ctx: &ResolveContext, split: &SplitExpr) -> Result<Value> {
    let alias = split.path.first().cloned().unwrap_or_default();
    let Some(default) = ctx.table.locals.get(&alias) else {
        return Err(Error::UndeclaredAlias {
            kind: "local",
            alias,
        });
    };

    // Most recently pushed scope wins.
    if let Some(value) = ctx.locals.iter().rev().find_map(|scope| scope.get(&alias)) {
        return Ok(Value::String(value.clone()));
    }
    Ok(default.clone().map_or(Value::Null, Value::String))
}

/// Walk the blueprint by dotted path, then resolve the final node anchored.
///
/// Mapping segments match keys; sequence segments match numeric indices
/// first, then fall back to resolving the sequence (anchored) and matching
/// the segment against its string entries, which lets a path address a
/// sequence member by its rendered value.
async fn traverse_blueprint(
    loader: &Loader,
    ctx: &mut ResolveContext,
    root: &Blueprint,
    path: &[String],
) -> Result<Value> {
    let mut node = root;

    for segment in path {
        node = match node {
            Blueprint::Map(entries) => match entries.iter().find(|(key, _)| key == segment) {
                Some((_, child)) => child,
                None => return Err(invalid_path(path)),
            },
            Blueprint::Seq(items) => {
                if let Ok(idx) = segment.parse::<usize>() {
                    match items.get(idx) {
                        Some(child) => child,
                        None => return Err(invalid_path(path)),
                    }
                } else {
                    let resolved = resolve_node(loader, ctx, node, true, Some(path)).await?;
                    let Value::Sequence(values) = resolved else {
                        return Err(invalid_path(path));
                    };
                    let target = Value::String(segment.clone());
                    match values.iter().position(|v| *v == target) {
                        Some(idx) => &items[idx],
                        None => return Err(invalid_path(path)),
                    }
                }
            }
            Blueprint::Leaf(_) => return Err(invalid_path(path)),
        };
    }

    resolve_node(loader, ctx, node, true, Some(path)).await
}

/// Walk an already-resolved value by dotted path.
fn traverse_value(value: &Value, path: &[String]) -> Result<Value> {
    let mut node = value;

    for segment in path {
        node = match node {
            Value::Mapping(map) => match map.get(Value::String(segment.clone())) {
                Some(child) => child,
                None => return Err(invalid_path(path)),
            },
            Value::Sequence(seq) => {
                if let Ok(idx) = segment.parse::<usize>() {
                    match seq.get(idx) {
                        Some(child) => child,
                        None => return Err(invalid_path(path)),
                    }
                } else {
                    let target = Value::String(segment.clone());
                    match seq.iter().position(|v| *v == target) {
                        Some(idx) => &seq[idx],
                        None => return Err(invalid_path(path)),
                    }
                }
            }
            _ => return Err(invalid_path(path)),
        };
    }

    Ok(node.clone())
}

fn invalid_path(path: &[String]) -> Error {
    Error::InvalidPath {
        path: path.join("."),
    }
}

/// Parse `key=value` payload tokens into a scope.
fn parse_payload(tokens: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for token in tokens {
        let mut split = token.splitn(3, '=');
        match (split.next(), split.next(), split.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                out.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(Error::PayloadSyntax {
                    token: token.clone(),
                });
            }
        }
    }
    Ok(out)
}
