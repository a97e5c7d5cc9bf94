//! Error handling for yamlet.
//!
//! The error system is built around a single strongly-typed [`Error`] enum so
//! callers can match on precise failure modes, while every variant carries a
//! message written for the person editing the YAML document, not just for the
//! developer embedding the loader.
//!
//! # Error Categories
//!
//! - **Directive syntax**: malformed `%PARAM` / `%LOCAL` / `%IMPORT` lines,
//!   duplicate `---` terminators. Fatal, raised before parsing starts.
//! - **Tags**: invalid tag grammar or a tag missing from the schema. These are
//!   pre-computed by the tag binder but only raised if the parsed document
//!   actually contains the tag, so tag-like text inside comments or quoted
//!   strings never fails a load.
//! - **Interpolation**: unknown expression base, undeclared alias, invalid
//!   path, or a back-reference to a node that has not been resolved yet.
//!   Fatal at the point of evaluation.
//! - **Imports**: sandbox escapes, non-YAML targets, and circular imports.
//!   Raised before the nested load starts.
//! - **I/O and parsing**: [`std::io::Error`] and [`serde_yaml::Error`]
//!   propagate unchanged via `#[from]` conversions.
//!
//! Public entry points wrap errors that bubble out of a file-backed load in
//! [`Error::InFile`], appending the originating filename to the message.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all yamlet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// More than one `---` directive terminator line was found.
    #[error("directive block can only be terminated once")]
    DuplicateDirectiveEnd,

    /// A `%PARAM` or `%LOCAL` line without an alias token.
    #[error("%{directive} directive must include at least an alias")]
    DirectiveMissingAlias {
        /// The directive keyword without the leading `%`.
        directive: &'static str,
    },

    /// A `%IMPORT` line with fewer than two tokens.
    #[error("%IMPORT directive must have the structure: <alias> <path> [key=value ...]")]
    ImportDirectiveArity,

    /// The path token of a `%IMPORT` line does not look like a YAML file path.
    #[error("not a valid YAML file path: {path}")]
    InvalidYamlPath {
        /// The offending path token.
        path: String,
    },

    /// A `key=value` token in a `%IMPORT` line with zero or multiple `=`.
    #[error("parameters in an %IMPORT directive must have the structure: key=value, got: {token}")]
    ImportParamSyntax {
        /// The offending token.
        token: String,
    },

    /// A tag failed the binder's grammar check or was missing from the
    /// schema, and the parsed document actually contained it.
    #[error("{message}")]
    Tag {
        /// Pre-computed diagnostic from the tag binder.
        message: String,
    },

    /// An interpolation expression with no content after `$` / `${`.
    #[error("empty interpolation expression")]
    EmptyExpression,

    /// An expression base other than `this`, `imp`, `param` or `local`.
    #[error(
        "invalid base in interpolation: {expr}; defined bases are 'this', 'imp', 'param' and 'local'"
    )]
    UnknownBase {
        /// The full expression text.
        expr: String,
    },

    /// An alias used in a `$param`, `$local` or `$imp` expression that was
    /// never declared in the directive block.
    #[error("alias used in {kind} interpolation '{alias}' is not declared in directives")]
    UndeclaredAlias {
        /// Which table the lookup went through (`param`, `local`, `import`).
        kind: &'static str,
        /// The missing alias.
        alias: String,
    },

    /// A dotted path that does not lead anywhere in the target tree.
    #[error("invalid path in interpolation: {path}")]
    InvalidPath {
        /// The dotted path as written.
        path: String,
    },

    /// A back-reference (`$this` / `$imp` path lookup) reached a node that
    /// appears later in document order and has not been resolved yet.
    #[error("tried to access {path} before initialization")]
    AccessBeforeInit {
        /// The dotted path of the access.
        path: String,
    },

    /// A `${` with no matching `}` in a string value.
    #[error("string interpolation used without closing '}}' in: {text}")]
    UnterminatedInterpolation {
        /// The string that contains the unterminated segment.
        text: String,
    },

    /// A whole-node interpolation wrapped in `{}` or `[]` resolved to a value
    /// of the wrong shape.
    #[error("interpolation {expr} is wrapped inside {wrapper} but its value is not a {expected}")]
    ShapeMismatch {
        /// The expression text.
        expr: String,
        /// `{}` or `[]`.
        wrapper: &'static str,
        /// `mapping` or `sequence`.
        expected: &'static str,
    },

    /// A payload token after an expression with zero or multiple `=`.
    #[error("payload after an interpolation must have the structure: key=value, got: {token}")]
    PayloadSyntax {
        /// The offending token.
        token: String,
    },

    /// `$imp` was used in a document loaded without a filename.
    #[error("a filename must be set in the load options to use imports")]
    FilenameRequired,

    /// An import target resolved outside the sandbox root.
    #[error("path used: {path} is out of scope of base path: {base}")]
    SandboxEscape {
        /// The resolved target path.
        path: PathBuf,
        /// The configured sandbox root.
        base: PathBuf,
    },

    /// An import target without a `.yaml` / `.yml` extension.
    #[error("only YAML files can be loaded; target file: {path}")]
    NotYaml {
        /// The resolved target path.
        path: PathBuf,
    },

    /// Adding an import edge would close a cycle.
    #[error("circular dependency detected: {cycle}")]
    CircularImport {
        /// The full cycle, rendered as `a -> b -> a`.
        cycle: String,
    },

    /// A debounced reload failed; every caller queued in that batch gets
    /// this, carrying the message of the error that failed the run.
    #[error("reload failed: {message}")]
    ReloadFailed {
        /// Message of the error that failed the batch.
        message: String,
    },

    /// I/O errors from the file system collaborator, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML text parse errors from the parser collaborator.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapper added at the public entry points to name the file a bubbled
    /// error originated from.
    #[error("{source} (in {filename})")]
    InFile {
        /// The originating file.
        filename: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the originating filename, used by the public
    /// entry points just before returning to the caller.
    #[must_use]
    pub fn in_file(self, filename: impl Into<String>) -> Self {
        Self::InFile {
            filename: filename.into(),
            source: Box::new(self),
        }
    }
}
