//! yamlet — a configuration-templating layer over YAML.
//!
//! yamlet loads YAML documents extended with a small wrapper dialect:
//! directives declare parameters, locals, imports and private paths; custom
//! tags dispatch to user construction callbacks; and an interpolation
//! language (`$this`, `$imp`, `$param`, `$local`, inline `${...}`) lets one
//! document parametrically reference values in itself or in other files.
//! Loading resolves everything into a plain [`Value`] tree.
//!
//! ```yaml
//! %PARAM env dev
//! %IMPORT db ./db.yaml tier=primary
//! ---
//! database: { $imp.db.connection: }
//! banner: running in ${param.env}
//! ```
//!
//! # Quick start
//!
//! ```
//! use yamlet::{LoadOptions, Loader};
//!
//! let text = "%PARAM user guest\n---\ngreeting: Hello, ${param.user}!\n";
//! let loader = Loader::new();
//!
//! let value = loader.load_str(text, LoadOptions::new().param("user", "Ana"))?;
//! assert_eq!(value["greeting"], "Hello, Ana!");
//! # Ok::<(), yamlet::Error>(())
//! ```
//!
//! # Architecture
//!
//! A load runs a fixed pipeline: the [`directives`] extractor splits the
//! directive block from the YAML body; the [`tags`] binder scans the body
//! and binds custom tags against the caller's [`Schema`]; the body is parsed
//! and rebuilt as an immutable blueprint of deferred nodes; and the resolver
//! realizes the blueprint depth-first in document order, evaluating
//! interpolations, invoking tag constructions exactly once, loading imports
//! (sandboxed and cycle-checked), and finally stripping `%PRIVATE` paths.
//!
//! Parsed modules are cached per (path, content hash) and resolved outputs
//! per parameter set, with retention scoped to load sessions: a one-shot
//! load releases its entries on return, while a [`LiveLoader`] keeps its
//! session open so watched modules stay warm between reloads.
//!
//! Every entry point comes in blocking and async forms that produce
//! identical results; the async forms suspend at file reads and nested
//! imports.

mod blueprint;
mod cache;
pub mod core;
pub mod directives;
pub mod live;
pub mod loader;
mod resolver;
pub mod tags;
pub mod utils;

pub use crate::core::{Error, Result};
pub use crate::live::{LiveLoader, LiveOptions, UpdateFn, WatchEvent};
pub use crate::loader::{LoadOptions, Loader};
pub use crate::tags::{Schema, TagKind};

/// The resolved value tree produced by every load.
pub type Value = serde_yaml::Value;
