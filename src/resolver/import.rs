//! Import handling for `$imp` expressions.
//!
//! An import resolves its target relative to the importing module's
//! directory, gates it through the sandbox and extension checks, registers
//! the import edge in the session's cycle graph, and only then reads and
//! loads the target under the same session. Everything that can fail fails
//! before the nested load starts, so a refused import leaves no partial
//! state behind.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::core::{Error, Result};
use crate::loader::Loader;
use crate::resolver::ResolveContext;
use crate::utils::{is_inside_sandbox, is_yaml_file, module_dir, resolve_path};
use crate::Value;

/// Load the module `target` (as written in the `%IMPORT` directive) imported
/// from `from`, with the merged parameter values.
pub(crate) async fn import_module(
    loader: &Loader,
    ctx: &mut ResolveContext,
    from: &Path,
    target: &str,
    params: BTreeMap<String, String>,
) -> Result<Value> {
    let from_dir = module_dir(from);
    let resolved = resolve_path(Path::new(target), &from_dir);

    if !is_yaml_file(&resolved) {
        return Err(Error::NotYaml { path: resolved });
    }

    // Canonicalizing also surfaces a missing target as a plain I/O error.
    let canonical = tokio::fs::canonicalize(&resolved).await?;
    if !is_inside_sandbox(&canonical, &ctx.env.base_dir)? {
        return Err(Error::SandboxEscape {
            path: canonical,
            base: ctx.env.base_dir.clone(),
        });
    }

    loader.cache().add_import_edge(ctx.session, from, &canonical)?;

    debug!(
        from = %from.display(),
        target = %canonical.display(),
        "importing module"
    );
    loader
        .internal_load_file(canonical, params, ctx.session, ctx.env.clone())
        .await
}
