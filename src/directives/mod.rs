//! Directive extraction.
//!
//! A yamlet document may open with a directive block terminated by a line
//! that is exactly `---`. The block declares the document's parameters,
//! locals, imports and private paths:
//!
//! ```yaml
//! %PARAM user guest
//! %LOCAL greeting hello
//! %IMPORT db ./db.yaml env=prod
//! %PRIVATE secrets.token
//! ---
//! name: ${param.user}
//! ```
//!
//! [`extract`] splits the block from the YAML body, parses recognized
//! directive lines into a [`DirectiveTable`], strips those lines, and hands
//! back the body ready for the YAML parser. Lines in the block that do not
//! start with a recognized keyword are left in place; they belong to the
//! underlying YAML dialect, not to the wrapper.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::{Error, Result};

/// Matches the directive terminator: a line consisting solely of `---`.
static DIR_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n---[ \t]*\r?\n").expect("directive end regex"));

/// Grammar for relative/absolute YAML file paths accepted by `%IMPORT`.
static YAML_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[/\\]|[A-Za-z]:[/\\]|\.{1,2}[/\\])?(?:[^/\\\s]+[/\\])*[^/\\\s]+\.ya?ml$")
        .expect("yaml path regex")
});

/// Target of an `%IMPORT` directive: a path plus default parameter values
/// that payload-supplied values can override at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSpec {
    /// The import target path as written (quotes stripped).
    pub path: String,
    /// Default `key=value` parameters declared on the directive line.
    pub params: BTreeMap<String, String>,
}

/// Parsed directive block of one document. Built once per document text and
/// immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct DirectiveTable {
    /// `%PARAM` alias → optional default value.
    pub params: HashMap<String, Option<String>>,
    /// `%LOCAL` alias → optional default value.
    pub locals: HashMap<String, Option<String>>,
    /// `%IMPORT` alias → target spec.
    pub imports: HashMap<String, ImportSpec>,
    /// `%PRIVATE` dotted paths, in declaration order.
    pub private_paths: Vec<String>,
}

impl DirectiveTable {
    /// Whether the block declared anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.locals.is_empty()
            && self.imports.is_empty()
            && self.private_paths.is_empty()
    }
}

/// Split a document into its YAML body and directive table.
///
/// With no terminator line the text is returned unchanged alongside an empty
/// table. More than one terminator is a syntax error. Otherwise recognized
/// directive lines are parsed and removed, and the remaining block content is
/// substituted back in place of the original block.
pub fn extract(text: &str) -> Result<(String, DirectiveTable)> {
    let parts: Vec<&str> = DIR_END.split(text).collect();

    match parts.len() {
        1 => return Ok((text.to_string(), DirectiveTable::default())),
        2 => {}
        _ => return Err(Error::DuplicateDirectiveEnd),
    }

    let block = parts[0];
    let mut table = DirectiveTable::default();
    let mut kept_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split(' ').filter(|t| !t.is_empty());
        let keyword = tokens.next().unwrap_or_default();
        let rest: Vec<&str> = tokens.collect();

        match keyword {
            "%PARAM" => parse_aliased(&mut table.params, &rest, "PARAM")?,
            "%LOCAL" => parse_aliased(&mut table.locals, &rest, "LOCAL")?,
            "%IMPORT" => parse_import(&mut table.imports, &rest)?,
            "%PRIVATE" => table.private_paths.extend(rest.iter().map(|p| (*p).to_string())),
            // Not wrapper syntax; keep it for the parser.
            _ => kept_lines.push(line),
        }
    }

    let filtered_block = kept_lines.join("\n");
    let body = text.replacen(block, &filtered_block, 1);
    Ok((body, table))
}

/// Parse a `%PARAM <alias> [default]` or `%LOCAL <alias> [default]` line.
fn parse_aliased(
    map: &mut HashMap<String, Option<String>>,
    tokens: &[&str],
    directive: &'static str,
) -> Result<()> {
    let Some(alias) = tokens.first() else {
        return Err(Error::DirectiveMissingAlias { directive });
    };
    let default = tokens.get(1).map(|d| (*d).to_string());
    map.insert((*alias).to_string(), default);
    Ok(())
}

/// Parse an `%IMPORT <alias> <path> [key=value ...]` line.
fn parse_import(map: &mut HashMap<String, ImportSpec>, tokens: &[&str]) -> Result<()> {
    if tokens.len() < 2 {
        return Err(Error::ImportDirectiveArity);
    }

    let alias = tokens[0].to_string();
    let path = tokens[1].replace('"', "");

    if !YAML_PATH.is_match(&path) {
        return Err(Error::InvalidYamlPath { path });
    }

    let mut params = BTreeMap::new();
    for token in &tokens[2..] {
        let mut split = token.splitn(3, '=');
        match (split.next(), split.next(), split.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                params.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(Error::ImportParamSyntax {
                    token: (*token).to_string(),
                });
            }
        }
    }

    map.insert(alias, ImportSpec { path, params });
    Ok(())
}
