//! Component-tree discovery.
//!
//! Walks the app directory for script modules and analyzes each one. Hidden
//! directories and `node_modules` are never entered, nor is the top-level
//! `api` directory, whose handlers are dispatched elsewhere.

use crate::cache::ClassificationCache;
use crate::classify::ModuleAnalysis;
use crate::error::ManifestError;
use rayon::prelude::*;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const SCRIPT_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js"];
const API_DIR: &str = "api";

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE FILES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Relative to the app directory, `/`-separated.
    pub path: String,
    pub absolute_path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    pub file: SourceFile,
    pub analysis: ModuleAnalysis,
}

pub fn is_script_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SCRIPT_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules" || (entry.depth() == 1 && name == API_DIR)
}

/// `/`-separated path of `path` relative to `root`, if it lies inside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Recursively find every script module under `dir`, sorted by path.
pub fn find_component_files(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    if !dir.exists() {
        return Err(ManifestError::MissingRoot(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(|source| ManifestError::Walk {
            root: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_script_file(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn read_source(app_dir: &Path, absolute_path: PathBuf) -> Result<SourceFile, ManifestError> {
    let text = fs::read_to_string(&absolute_path).map_err(|source| ManifestError::Read {
        path: absolute_path.clone(),
        source,
    })?;
    let path = relative_path(app_dir, &absolute_path)
        .unwrap_or_else(|| absolute_path.to_string_lossy().replace('\\', "/"));
    Ok(SourceFile {
        path,
        absolute_path,
        text,
    })
}

/// Reads and analyzes every module of the tree in parallel. Output is
/// ordered by relative path.
pub fn discover_modules(
    app_dir: &Path,
    cache: &ClassificationCache,
) -> Result<Vec<DiscoveredModule>, ManifestError> {
    let files = find_component_files(app_dir)?;
    tracing::debug!(dir = %app_dir.display(), count = files.len(), "discovered modules");

    let mut modules = files
        .into_par_iter()
        .map(|absolute_path| {
            let file = read_source(app_dir, absolute_path)?;
            let analysis = cache.analyze(&file.text);
            Ok(DiscoveredModule { file, analysis })
        })
        .collect::<Result<Vec<_>, ManifestError>>()?;

    modules.sort_by(|a, b| a.file.path.cmp(&b.file.path));
    Ok(modules)
}
