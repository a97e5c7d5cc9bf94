//! Cross-cutting helpers: path validation and content hashing.
//!
//! - [`paths`] - sandbox containment checks, YAML extension checks, and
//!   lexical path normalization used by imports and the file entry points
//! - [`hash`] - SHA-256 content hashes and the stable parameter-set hash the
//!   load cache is keyed by

pub mod hash;
pub mod paths;

pub use hash::{hash_params, hash_text};
pub use paths::{
    check_sandboxed_yaml, is_inside_sandbox, is_yaml_file, module_dir, normalize_path,
    resolve_path,
};
