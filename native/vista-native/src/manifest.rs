//! Client and Server manifests.
//!
//! Both are regenerated wholesale from the component tree; nothing patches
//! an existing manifest in place. Route and role membership come from
//! directory and base-file names only, never from file content.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::cache::ClassificationCache;
use crate::classify::violation;
use crate::config::{chunk_url, VistaOptions};
use crate::diagnostics::{Diagnostic, Severity, CODE_ROUTE_CONFLICT, CODE_ROUTE_UNREACHABLE};
use crate::discovery::{discover_modules, DiscoveredModule};
use crate::error::ManifestError;
use crate::routes::{
    catch_all_is_last, parse_pattern, pattern_for_dir, sort_routes, NotFoundEntry, RouteEntry,
    RouteTable,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub const CLIENT_ID_PREFIX: &str = "client:";
pub const SERVER_ID_PREFIX: &str = "server:";

// ═══════════════════════════════════════════════════════════════════════════════
// ROLES AND NAMES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleRole {
    Page,
    Layout,
    Loading,
    Error,
    NotFound,
    Component,
}

fn split_dir_and_stem(rel_path: &str) -> (&str, &str) {
    let (dir, file) = match rel_path.rfind('/') {
        Some(i) => (&rel_path[..i], &rel_path[i + 1..]),
        None => ("", rel_path),
    };
    let stem = match file.rfind('.') {
        Some(i) if i > 0 => &file[..i],
        _ => file,
    };
    (dir, stem)
}

pub fn strip_extension(rel_path: &str) -> &str {
    let (dir, stem) = split_dir_and_stem(rel_path);
    if dir.is_empty() {
        stem
    } else {
        &rel_path[..dir.len() + 1 + stem.len()]
    }
}

/// Role from the base file name alone.
pub fn role_for(rel_path: &str) -> ModuleRole {
    match split_dir_and_stem(rel_path).1 {
        "page" | "index" => ModuleRole::Page,
        "layout" | "root" => ModuleRole::Layout,
        "loading" => ModuleRole::Loading,
        "error" => ModuleRole::Error,
        "not-found" => ModuleRole::NotFound,
        _ => ModuleRole::Component,
    }
}

/// `components/Button.tsx` → `components_button`. `None` when nothing
/// alphanumeric remains.
pub fn chunk_name(rel_path: &str) -> Option<String> {
    let name: String = strip_extension(rel_path)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.chars().any(|c| c.is_ascii_alphanumeric()) {
        Some(name)
    } else {
        None
    }
}

pub fn module_id(prefix: &str, rel_path: &str) -> String {
    format!("{}{}", prefix, strip_extension(rel_path))
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANIFEST TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleEntry {
    pub id: String,
    pub path: String,
    pub absolute_path: String,
    pub chunk_name: String,
    pub exports: Vec<String>,
    #[serde(rename = "async")]
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerModuleEntry {
    pub id: String,
    pub path: String,
    pub absolute_path: String,
    pub role: ModuleRole,
    pub has_static_meta: bool,
    pub has_dynamic_meta: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientManifest {
    pub build_id: String,
    pub client_modules: BTreeMap<String, ClientModuleEntry>,
    /// Relative and absolute paths → module id.
    pub path_to_id: BTreeMap<String, String>,
    /// Absolute path → chunk url.
    pub ssr_module_mapping: BTreeMap<String, String>,
}

impl ClientManifest {
    pub fn entry_for_path(&self, path: &str) -> Option<&ClientModuleEntry> {
        self.path_to_id
            .get(path)
            .and_then(|id| self.client_modules.get(id))
    }

    pub fn is_client_path(&self, path: &str) -> bool {
        self.path_to_id.contains_key(path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerManifest {
    pub build_id: String,
    pub server_modules: BTreeMap<String, ServerModuleEntry>,
    pub path_to_id: BTreeMap<String, String>,
    pub routes: Vec<RouteEntry>,
    pub not_found: Vec<NotFoundEntry>,
    pub violations: Vec<Diagnostic>,
}

impl ServerManifest {
    pub fn entry_for_path(&self, path: &str) -> Option<&ServerModuleEntry> {
        self.path_to_id
            .get(path)
            .and_then(|id| self.server_modules.get(id))
    }

    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(&self.routes, &self.not_found)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestPair {
    pub client: ClientManifest,
    pub server: ServerManifest,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD
// ═══════════════════════════════════════════════════════════════════════════════

fn build_id_for(modules: &[DiscoveredModule]) -> String {
    let mut hasher = Sha256::new();
    for module in modules {
        hasher.update(module.file.path.as_bytes());
        hasher.update([0]);
        hasher.update(ClassificationCache::compute_hash(&module.file.text).as_bytes());
        hasher.update([0]);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Chunk name per client module path. A name derived for more than one
/// module gets, on every one of them, a suffix hashed from the module's
/// path, so each client module keeps a chunk of its own.
fn client_chunk_names(modules: &[DiscoveredModule]) -> HashMap<String, String> {
    let mut by_name: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for module in modules.iter().filter(|m| m.analysis.classification.is_client) {
        let path = module.file.path.as_str();
        match chunk_name(path) {
            Some(name) => by_name.entry(name).or_default().push(path),
            None => {
                tracing::warn!(%path, "cannot derive a chunk name, skipping client module")
            }
        }
    }

    let mut names = HashMap::new();
    for (name, paths) in by_name {
        if let [only] = paths.as_slice() {
            names.insert(only.to_string(), name);
            continue;
        }
        for path in paths {
            let digest = format!("{:x}", Sha256::digest(path.as_bytes()));
            let unique = format!("{}_{}", name, &digest[..8]);
            tracing::warn!(%path, chunk = %unique, "chunk name shared with another client module, disambiguated");
            names.insert(path.to_string(), unique);
        }
    }
    names
}

/// Per directory, the first file in path order for each role.
fn files_by_dir(modules: &[DiscoveredModule]) -> HashMap<(String, ModuleRole), String> {
    let mut by_dir = HashMap::new();
    for module in modules {
        let path = &module.file.path;
        let (dir, _) = split_dir_and_stem(path);
        by_dir
            .entry((dir.to_string(), role_for(path)))
            .or_insert_with(|| path.clone());
    }
    by_dir
}

/// Ancestor directories of `dir`, root first, including `dir` itself.
fn ancestors_root_first(dir: &str) -> Vec<String> {
    let mut dirs = vec![String::new()];
    let mut current = String::new();
    for part in dir.split('/').filter(|p| !p.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        dirs.push(current.clone());
    }
    dirs
}

fn layouts_for(dir: &str, by_dir: &HashMap<(String, ModuleRole), String>) -> Vec<String> {
    ancestors_root_first(dir)
        .into_iter()
        .filter_map(|d| by_dir.get(&(d, ModuleRole::Layout)).cloned())
        .collect()
}

fn build_routes(
    modules: &[DiscoveredModule],
    diagnostics: &mut Vec<Diagnostic>,
) -> (Vec<RouteEntry>, Vec<NotFoundEntry>) {
    let by_dir = files_by_dir(modules);
    let mut routes: Vec<RouteEntry> = Vec::new();
    let mut not_found = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for module in modules {
        let path = &module.file.path;
        let (dir, _) = split_dir_and_stem(path);
        match role_for(path) {
            ModuleRole::Page => {
                let (pattern, kind) = pattern_for_dir(dir);
                if !catch_all_is_last(&parse_pattern(&pattern)) {
                    tracing::warn!(%pattern, page = %path, "catch-all is not the last segment");
                    diagnostics.push(Diagnostic::with_hints(
                        CODE_ROUTE_UNREACHABLE,
                        Severity::Error,
                        &format!("{} resolves to {}, where segments after the catch-all can never match", path, pattern),
                        path,
                        0,
                        vec!["Move the catch-all directory to the end of the path.".to_string()],
                    ));
                    continue;
                }
                if let Some(existing) = seen.get(&pattern) {
                    tracing::warn!(%pattern, first = %existing, duplicate = %path, "route conflict");
                    diagnostics.push(Diagnostic::new(
                        CODE_ROUTE_CONFLICT,
                        Severity::Warning,
                        &format!("{} resolves to {} which {} already serves", path, pattern, existing),
                        path,
                        0,
                    ));
                    continue;
                }
                seen.insert(pattern.clone(), path.clone());
                routes.push(RouteEntry {
                    pattern,
                    page_path: path.clone(),
                    layout_paths: layouts_for(dir, &by_dir),
                    loading_path: by_dir.get(&(dir.to_string(), ModuleRole::Loading)).cloned(),
                    error_path: by_dir.get(&(dir.to_string(), ModuleRole::Error)).cloned(),
                    kind,
                });
            }
            ModuleRole::NotFound => {
                if by_dir.get(&(dir.to_string(), ModuleRole::NotFound)) != Some(path) {
                    continue;
                }
                not_found.push(NotFoundEntry {
                    pattern: pattern_for_dir(dir).0,
                    path: path.clone(),
                    layout_paths: layouts_for(dir, &by_dir),
                });
            }
            _ => {}
        }
    }

    sort_routes(&mut routes);
    (routes, not_found)
}

/// Builds both manifests from already analyzed modules.
pub fn build_from_modules(modules: &[DiscoveredModule], options: &VistaOptions) -> ManifestPair {
    let build_id = options
        .build_id
        .clone()
        .unwrap_or_else(|| build_id_for(modules));

    let mut client = ClientManifest {
        build_id: build_id.clone(),
        ..Default::default()
    };
    let mut server = ServerManifest {
        build_id,
        ..Default::default()
    };

    let chunks = client_chunk_names(modules);

    for module in modules {
        let file = &module.file;
        let c = &module.analysis.classification;
        let absolute = file.absolute_path.to_string_lossy().to_string();

        if c.is_client {
            let Some(chunk) = chunks.get(&file.path).cloned() else {
                continue;
            };
            let id = module_id(CLIENT_ID_PREFIX, &file.path);
            client.path_to_id.insert(file.path.clone(), id.clone());
            client.path_to_id.insert(absolute.clone(), id.clone());
            client
                .ssr_module_mapping
                .insert(absolute.clone(), chunk_url(&options.asset_prefix, &chunk));
            client.client_modules.insert(
                id.clone(),
                ClientModuleEntry {
                    id,
                    path: file.path.clone(),
                    absolute_path: absolute,
                    chunk_name: chunk,
                    exports: module.analysis.exports.clone(),
                    is_async: module.analysis.is_async,
                },
            );
        } else {
            if let Some(d) = violation(&file.path, c, Severity::Error) {
                tracing::warn!(path = %file.path, "{}", d.message);
                server.violations.push(d);
            }
            let id = module_id(SERVER_ID_PREFIX, &file.path);
            server.path_to_id.insert(file.path.clone(), id.clone());
            server.path_to_id.insert(absolute.clone(), id.clone());
            server.server_modules.insert(
                id.clone(),
                ServerModuleEntry {
                    id,
                    path: file.path.clone(),
                    absolute_path: absolute,
                    role: role_for(&file.path),
                    has_static_meta: module.analysis.has_static_meta,
                    has_dynamic_meta: module.analysis.has_dynamic_meta,
                },
            );
        }
    }

    let (routes, not_found) = build_routes(modules, &mut server.violations);
    server.routes = routes;
    server.not_found = not_found;

    tracing::info!(
        client = client.client_modules.len(),
        server = server.server_modules.len(),
        routes = server.routes.len(),
        violations = server.violations.len(),
        "built manifests"
    );

    ManifestPair { client, server }
}

/// Walks the app directory and builds both manifests.
pub fn build(options: &VistaOptions, cache: &ClassificationCache) -> Result<ManifestPair, ManifestError> {
    let modules = discover_modules(&options.app_path(), cache)?;
    Ok(build_from_modules(&modules, options))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ManifestError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = serde_json::to_string_pretty(value).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ManifestError> {
    let data = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl ManifestPair {
    /// Overwrites both manifest files.
    pub fn write(&self, options: &VistaOptions) -> Result<(), ManifestError> {
        write_json(&options.client_manifest_path(), &self.client)?;
        write_json(&options.server_manifest_path(), &self.server)?;
        tracing::debug!(out = %options.out_path().display(), "wrote manifests");
        Ok(())
    }

    pub fn read(options: &VistaOptions) -> Result<Self, ManifestError> {
        Ok(Self {
            client: read_json(&options.client_manifest_path())?,
            server: read_json(&options.server_manifest_path())?,
        })
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn build_manifests_native(options_json: String) -> napi::Result<serde_json::Value> {
    let options: VistaOptions = serde_json::from_str(&options_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let cache = match &options.cache_dir {
        Some(dir) => ClassificationCache::on_disk(dir),
        None => ClassificationCache::new(),
    };
    let pair = build(&options, &cache).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(pair).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn write_manifests_native(options_json: String) -> napi::Result<u32> {
    let options: VistaOptions = serde_json::from_str(&options_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let pair = build(&options, &ClassificationCache::new())
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    pair.write(&options)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(pair.server.violations.len() as u32)
}
