//! Custom tag capture, validation and binding.
//!
//! Tags use the syntax `!name` or `!ns!name`, optionally followed by a
//! parameter string in single quotes inside parentheses: `!switch('prod')`.
//!
//! The binder works on document text before parsing: [`capture_tags`] scans
//! the body for candidate tags with a single regex pass, and [`bind_tags`]
//! turns each candidate into a [`TagBinding`]. A valid tag registered in the
//! [`Schema`] binds to a deferred construction (the callback id and parameter
//! string are captured; nothing runs until resolution). An invalid or
//! unknown candidate binds to a pre-computed failure for all three node
//! kinds, which only fires if the parsed tree actually contains the tag —
//! a text-only scan cannot tell a real tag from a look-alike inside a
//! comment or quoted string, so the error must wait for the parser's
//! verdict.
//!
//! Construction callbacks are registered once in the schema and addressed by
//! opaque [`ConstructId`], so blueprints capture plain data rather than live
//! closures across suspension points.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::core::{Error, Result};
use crate::Value;

/// Captures candidate tags in the document body.
static CAPTURE_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(![^\s{}\[\]]+)").expect("tag capture regex"));

/// Full tag grammar: `!name`, `!ns!name`, optional `('params')` suffix.
static TAG_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^!(?:[A-Za-z0-9/\\_\-#*.@$]*!)?([A-Za-z0-9/\\_\-#*.@$]+)(?:\('([A-Za-z0-9/\\_\-#*.@$]+)'\))?$",
    )
    .expect("tag grammar regex")
});

const ALLOWED_TAG_CHARS: &str = r##"A-Z a-z 0-9 "\" "/" "(" ")" "'" "." "_" "-" "#" "$" and "@""##;

/// Node kinds a tag construction can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Scalar nodes (`!tag value`).
    Scalar,
    /// Mapping nodes (`!tag {..}`).
    Mapping,
    /// Sequence nodes (`!tag [..]`).
    Sequence,
}

impl TagKind {
    /// Kind of a parsed value, used to pick the binding a tagged node
    /// dispatches through.
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Mapping(_) => Self::Mapping,
            Value::Sequence(_) => Self::Sequence,
            _ => Self::Scalar,
        }
    }
}

/// A tag construction callback: receives the resolved data and the resolved
/// parameter string, returns the value that replaces the tagged node.
pub type TagConstructFn = Arc<dyn Fn(Value, Option<&str>) -> Result<Value> + Send + Sync>;

/// Opaque id of a registered construction callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructId(usize);

/// Registry mapping tag names to per-kind construction callbacks.
///
/// Cheap to clone behind an [`Arc`]; pass the same schema to every load that
/// should understand the same tags.
#[derive(Default)]
pub struct Schema {
    constructs: Vec<TagConstructFn>,
    types: HashMap<String, HashMap<TagKind, ConstructId>>,
}

impl Schema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a construction callback for `name` and `kind`. Re-registering
    /// the same (name, kind) pair replaces the previous callback.
    pub fn register<F>(&mut self, name: impl Into<String>, kind: TagKind, construct: F)
    where
        F: Fn(Value, Option<&str>) -> Result<Value> + Send + Sync + 'static,
    {
        let id = ConstructId(self.constructs.len());
        self.constructs.push(Arc::new(construct));
        self.types.entry(name.into()).or_default().insert(kind, id);
    }

    /// Kinds registered for a tag name, if any.
    fn kinds_of(&self, name: &str) -> Option<&HashMap<TagKind, ConstructId>> {
        self.types.get(name)
    }

    /// Look up a callback by id. Ids are only minted by [`Schema::register`],
    /// so a miss is a caller mixing bindings across schemas.
    pub(crate) fn construct(&self, id: ConstructId) -> Option<&TagConstructFn> {
        self.constructs.get(id.0)
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("tags", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a tagged node does when the parser actually produces it.
#[derive(Debug, Clone)]
pub enum TagBinding {
    /// Defer to a registered construction with a captured parameter string.
    Construct {
        /// Callback id in the schema.
        id: ConstructId,
        /// Parameter string from the `('...')` suffix, unresolved.
        params: Option<String>,
    },
    /// Raise a pre-computed diagnostic.
    Fail(String),
}

/// Binding table for one document text: full tag string (without the leading
/// `!`) → per-kind binding.
#[derive(Debug, Default)]
pub struct TagBindings {
    map: HashMap<String, HashMap<TagKind, TagBinding>>,
}

impl TagBindings {
    /// Binding for a parsed tag of the given kind. The tag string may carry
    /// its leading `!`; it is normalized away before lookup.
    #[must_use]
    pub fn lookup(&self, tag: &str, kind: TagKind) -> Option<&TagBinding> {
        self.map.get(tag.trim_start_matches('!'))?.get(&kind)
    }

    /// Whether the document text contained any candidate tags at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Scan the body for candidate tag strings. Duplicates are removed while
/// preserving first-seen order.
#[must_use]
pub fn capture_tags(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in CAPTURE_TAGS.captures_iter(body) {
        let tag = caps[1].trim().to_string();
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

/// Build the binding table for the captured tags against a schema.
///
/// With no schema every candidate binds to an unknown-tag failure; documents
/// without custom tags are unaffected since their table stays empty.
#[must_use]
pub fn bind_tags(tags: &[String], schema: Option<&Schema>) -> TagBindings {
    let mut bindings = TagBindings::default();

    for tag in tags {
        let key = tag.trim_start_matches('!').to_string();
        if bindings.map.contains_key(&key) {
            continue;
        }

        let Some(caps) = TAG_GRAMMAR.captures(tag) else {
            bindings.map.insert(key, fail_all_kinds(syntax_error_message(tag)));
            continue;
        };

        let name = &caps[1];
        let params = caps.get(2).map(|m| m.as_str().to_string());

        let Some(kinds) = schema.and_then(|s| s.kinds_of(name)) else {
            bindings.map.insert(key, fail_all_kinds(format!("unknown tag: {name}")));
            continue;
        };

        let mut per_kind = HashMap::new();
        for (kind, id) in kinds {
            per_kind.insert(
                *kind,
                TagBinding::Construct {
                    id: *id,
                    params: params.clone(),
                },
            );
        }
        bindings.map.insert(key, per_kind);
    }

    bindings
}

/// One failure binding per node kind, so the diagnostic fires no matter what
/// shape the parser hands the tag.
fn fail_all_kinds(message: String) -> HashMap<TagKind, TagBinding> {
    let mut per_kind = HashMap::new();
    per_kind.insert(TagKind::Scalar, TagBinding::Fail(message.clone()));
    per_kind.insert(TagKind::Mapping, TagBinding::Fail(message.clone()));
    per_kind.insert(TagKind::Sequence, TagBinding::Fail(message));
    per_kind
}

/// Pick the most specific diagnostic for a tag that failed the grammar.
///
/// Priority: disallowed character, too many `!` markers, malformed or
/// misplaced parentheses, parentheses not closing the tag, missing single
/// quotes inside the parentheses, then a generic fallback.
fn syntax_error_message(tag: &str) -> String {
    if let Some(ch) = tag
        .chars()
        .skip(1)
        .find(|c| !c.is_ascii_alphanumeric() && !r"/\_-#*.@$!()'".contains(*c))
    {
        return format!(
            "tag {tag} contains a disallowed character: '{ch}'; allowed characters are {ALLOWED_TAG_CHARS}"
        );
    }

    let bangs = tag.matches('!').count();
    if bangs > 2 {
        return format!("only two '!' marks are allowed in a tag; tag defined: {tag}");
    }

    let parens = tag.matches(['(', ')']).count();
    if parens == 1 || parens > 2 {
        return format!(
            "only one pair of parentheses is allowed, at the end of the tag, to define a parameter string; tag defined: {tag}"
        );
    }
    if parens == 2 && !tag.ends_with(')') {
        return format!("parentheses must close at the end of the tag; tag defined: {tag}");
    }

    if let Some(open) = tag.find('(') {
        let inner = &tag[open + 1..tag.len() - 1];
        if !(inner.len() >= 2 && inner.starts_with('\'') && inner.ends_with('\'')) {
            return format!("missing single quotes ('') in the tag's parameter string: {tag}");
        }
    }

    format!(
        "invalid tag: {tag}; a tag must start with '!' and contain only {ALLOWED_TAG_CHARS} characters, with an optional single-quoted parameter string in parentheses"
    )
}
