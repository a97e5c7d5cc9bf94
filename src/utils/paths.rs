//! Path handling for file loads and imports.
//!
//! All file access in yamlet is sandboxed: a resolved path must stay inside
//! the configured base directory. Containment is checked on canonicalized
//! paths so symlink tricks cannot escape the sandbox.

use std::path::{Component, Path, PathBuf};

use crate::core::{Error, Result};

/// Normalize a path lexically, resolving `.` and `..` components without
/// touching the file system.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep leading `..` on relative paths, collapse otherwise.
                match components.last() {
                    Some(Component::Normal(_)) => {
                        components.pop();
                    }
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                    _ => components.push(component),
                }
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Resolve `path` against `base` (when relative) and normalize the result.
#[must_use]
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Whether a path carries a `.yaml` or `.yml` extension.
#[must_use]
pub fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Whether `path` lives inside `base`.
///
/// Both sides are canonicalized, so the check follows symlinks and the
/// target file must already exist. Returns `false` (rather than erroring)
/// when canonicalization fails for the path itself; canonicalization errors
/// for the base propagate, a missing sandbox root is a caller bug.
pub fn is_inside_sandbox(path: &Path, base: &Path) -> Result<bool> {
    let real_base = base.canonicalize()?;
    let Ok(real_path) = path.canonicalize() else {
        return Ok(false);
    };
    Ok(real_path.starts_with(&real_base))
}

/// Validate that a resolved path is a YAML file inside the sandbox, the
/// shared gate for both root file loads and imports.
pub fn check_sandboxed_yaml(path: &Path, base: &Path) -> Result<()> {
    if !is_yaml_file(path) {
        return Err(Error::NotYaml {
            path: path.to_path_buf(),
        });
    }
    if !is_inside_sandbox(path, base)? {
        return Err(Error::SandboxEscape {
            path: path.to_path_buf(),
            base: base.to_path_buf(),
        });
    }
    Ok(())
}

/// Strip the file name from a module path, yielding the directory imports
/// are resolved relative to. A path without a YAML file name is returned
/// unchanged (it is already a directory).
#[must_use]
pub fn module_dir(path: &Path) -> PathBuf {
    if is_yaml_file(path) {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        path.to_path_buf()
    }
}
