//! Rendering routing entries through the proxy configuration template.
//!
//! [`render`] is a pure function of the template source and the entries;
//! only [`write_atomic`] touches the filesystem.  The template sees a
//! single variable, `entries`, a list of objects with `name`, `port`,
//! `protocol` and `backends` fields.

use std::io::Write;
use std::path::{Path, PathBuf};

use minijinja::{context, Environment, UndefinedBehavior};
use tempfile::NamedTempFile;

use crate::error::SynthError;
use crate::types::RoutingEntry;

/// Read the template source from disk.
pub fn load_template(path: &Path) -> Result<String, SynthError> {
    std::fs::read_to_string(path).map_err(|source| SynthError::TemplateLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Render `entries` through `template`.
pub fn render(template: &str, entries: &[RoutingEntry]) -> Result<String, SynthError> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.add_template("proxy", template)?;
    let output = env.get_template("proxy")?.render(context! { entries => entries })?;
    Ok(output)
}

/// Replace `target` with `contents` so readers see either the old or the
/// new file, never a partial one.
pub fn write_atomic(target: &Path, contents: &str) -> Result<(), SynthError> {
    let write_err = |source| SynthError::ConfigWrite {
        path: target.to_path_buf(),
        source,
    };

    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    // Same directory as the target so the rename never crosses filesystems.
    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}
