//! Deferred tree ("blueprint") construction.
//!
//! A blueprint mirrors the parsed document's structure but replaces every
//! leaf scalar, every whole-node interpolation, and every tagged node with a
//! deferred [`Leaf`]. Composite structure is preserved as-is. Blueprints are
//! immutable and shared across resolve passes and parameter variations;
//! per-pass resolved-ness is tracked in the resolve context, indexed by the
//! [`NodeId`] each leaf is assigned at build time.
//!
//! Whole-node interpolations are structurally ambiguous nodes the parser
//! cannot classify on its own:
//!
//! ```yaml
//! servers: [ $imp.infra.servers ]   # sequence-shaped: must resolve to a sequence
//! defaults: { $this.base: }         # mapping-shaped: must resolve to a mapping
//! ```
//!
//! Both become a single deferred leaf rather than being descended into.

use serde_yaml::value::TaggedValue;

use crate::core::{Error, Result};
use crate::tags::{ConstructId, TagBinding, TagBindings, TagKind};
use crate::Value;

/// Index of a deferred leaf within its blueprint, assigned depth-first at
/// build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub u32);

/// A captured tag construction: callback id, raw (still-deferred) data and
/// the unresolved parameter string. Invoked exactly once, bottom-up, during
/// resolution.
#[derive(Debug)]
pub(crate) struct PendingTag {
    /// Construction callback id in the schema.
    pub construct: ConstructId,
    /// Tag name, for error messages.
    pub tag: String,
    /// Parameter string from the tag suffix; may itself interpolate.
    pub params: Option<String>,
    /// The tagged node's content, as a deferred sub-tree.
    pub data: Box<Blueprint>,
}

/// Payload of a deferred leaf.
#[derive(Debug)]
pub(crate) enum LeafValue {
    /// A plain scalar; strings may still carry embedded `${...}` segments or
    /// be a whole-expression scalar interpolation.
    Scalar(Value),
    /// `{ $expr: }` — must resolve to a mapping.
    MappingInterp(String),
    /// `[ $expr ]` — must resolve to a sequence.
    SequenceInterp(String),
    /// A deferred tag construction.
    Tag(PendingTag),
}

/// A deferred node plus its per-blueprint id.
#[derive(Debug)]
pub(crate) struct Leaf {
    pub id: NodeId,
    pub value: LeafValue,
}

/// The deferred document tree.
#[derive(Debug)]
pub(crate) enum Blueprint {
    /// Ordered mapping, key order preserved from the document.
    Map(Vec<(String, Blueprint)>),
    /// Sequence.
    Seq(Vec<Blueprint>),
    /// Deferred node.
    Leaf(Leaf),
}

/// A built blueprint plus the number of leaves it contains, which sizes the
/// resolve context's per-pass state.
#[derive(Debug)]
pub(crate) struct BlueprintInfo {
    pub root: Blueprint,
    pub leaf_count: u32,
}

/// Whether a string is syntactically an interpolation expression: starts
/// with `$`, not escaped (`$$`) and not the inline form (`${`), which only
/// appears embedded in strings.
#[must_use]
pub(crate) fn is_interp_expr(s: &str) -> bool {
    let t = s.trim();
    let mut chars = t.chars();
    chars.next() == Some('$') && !matches!(chars.next(), Some('$') | Some('{'))
}

/// Render a mapping key as the string it is addressed by in dotted paths.
#[must_use]
pub(crate) fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Convert a parsed node tree into a blueprint, dispatching tagged nodes
/// through the document's binding table.
pub(crate) fn build(value: Value, bindings: &TagBindings) -> Result<BlueprintInfo> {
    let mut builder = Builder {
        bindings,
        next_id: 0,
    };
    let root = builder.node(value)?;
    Ok(BlueprintInfo {
        root,
        leaf_count: builder.next_id,
    })
}

struct Builder<'a> {
    bindings: &'a TagBindings,
    next_id: u32,
}

impl Builder<'_> {
    fn node(&mut self, value: Value) -> Result<Blueprint> {
        match value {
            Value::Sequence(seq) => {
                if let [Value::String(expr)] = seq.as_slice() {
                    if is_interp_expr(expr) {
                        let expr = expr.trim().to_string();
                        return Ok(self.leaf(LeafValue::SequenceInterp(expr)));
                    }
                }
                let mut out = Vec::with_capacity(seq.len());
                for item in seq {
                    out.push(self.node(item)?);
                }
                Ok(Blueprint::Seq(out))
            }
            Value::Mapping(map) => {
                if map.len() == 1 {
                    if let Some((Value::String(expr), val)) = map.iter().next() {
                        if is_interp_expr(expr) && val.is_null() {
                            let expr = expr.trim().to_string();
                            return Ok(self.leaf(LeafValue::MappingInterp(expr)));
                        }
                    }
                }
                let mut out = Vec::with_capacity(map.len());
                for (key, val) in map {
                    out.push((key_string(&key), self.node(val)?));
                }
                Ok(Blueprint::Map(out))
            }
            Value::Tagged(tagged) => self.tagged(*tagged),
            scalar => Ok(self.leaf(LeafValue::Scalar(scalar))),
        }
    }

    fn tagged(&mut self, tagged: TaggedValue) -> Result<Blueprint> {
        let tag_string = tagged.tag.to_string();
        let name = tag_string.trim_start_matches('!').to_string();
        let kind = TagKind::of_value(&tagged.value);

        match self.bindings.lookup(&name, kind) {
            Some(TagBinding::Construct { id, params }) => {
                let pending = PendingTag {
                    construct: *id,
                    tag: name,
                    params: params.clone(),
                    data: Box::new(self.node(tagged.value)?),
                };
                Ok(self.leaf(LeafValue::Tag(pending)))
            }
            Some(TagBinding::Fail(message)) => Err(Error::Tag {
                message: message.clone(),
            }),
            // Parser produced a tag the text scan never bound; a real tag
            // with no schema entry.
            None => Err(Error::Tag {
                message: format!("unknown tag: {name}"),
            }),
        }
    }

    fn leaf(&mut self, value: LeafValue) -> Blueprint {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Blueprint::Leaf(Leaf { id, value })
    }
}
