//! Project directories turned into in-memory indexes

use anyhow::{Context, Result, bail};
use autosuggest_engine::NamedIndex;
use autosuggest_index::MemoryIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Index every directory in `roots`, named after its last path component
pub fn load_projects(roots: &[PathBuf]) -> Result<Vec<NamedIndex>> {
    let mut indexes = Vec::with_capacity(roots.len());
    for root in roots {
        let name = project_name(root)?;
        let mut builder = MemoryIndex::builder().commit_generation(generation(root));
        let files = builder
            .add_directory(root)
            .with_context(|| format!("Failed to index '{}'", root.display()))?;

        tracing::info!(project = %name, files, "Loaded project");
        indexes.push(NamedIndex::new(name, Arc::new(builder.build())));
    }
    Ok(indexes)
}

fn project_name(root: &Path) -> Result<String> {
    let canonical = root
        .canonicalize()
        .with_context(|| format!("Cannot resolve '{}'", root.display()))?;
    match canonical.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("Cannot name a project after '{}'", root.display()),
    }
}

/// Newest modification time below `root`, in nanoseconds since the epoch
///
/// Directories count too, so deleting a file also moves the generation.
/// Edits within the same second still produce a new generation.
fn generation(root: &Path) -> i64 {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter_map(|m| m.modified().ok())
        .filter_map(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .max()
        .unwrap_or(0)
}
