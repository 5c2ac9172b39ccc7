//! # Dual Build Orchestration
//!
//! Plans the two independent bundler passes and runs them in order:
//!
//! - **server**: every route file, Node target, third-party packages left
//!   external.
//! - **browser**: only Client modules plus the runtime entry, with shared
//!   framework and vendor chunks split out.
//!
//! The bundler itself is an external collaborator reached through the
//! [`Bundler`] trait. This module only decides what it is asked to do.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::cache::ClassificationCache;
use crate::config::{Mode, VistaOptions};
use crate::diagnostics::Diagnostic;
use crate::error::{BuildError, ManifestError};
use crate::manifest::{self, role_for, ClientManifest, ManifestPair, ModuleRole};
use crate::proxy::{BrowserBoundary, IdentityTransform, ModuleTransform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const RUNTIME_CHUNK: &str = "runtime";
pub const CLIENT_ENTRY: &str = "main";
pub const CLIENT_ENTRY_FILE: &str = "rsc-client.js";
pub const HYDRATION_RUNTIME_IMPORT: &str = "vista/client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    Node,
    Web,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitGroup {
    pub name: String,
    /// Matched against the `node_modules` path of a module.
    pub test: String,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPass {
    pub name: String,
    pub target: BuildTarget,
    pub mode: Mode,
    pub entries: BTreeMap<String, PathBuf>,
    pub output_dir: PathBuf,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_type: Option<String>,
    /// Leave bare package specifiers out of the bundle.
    pub externalize_packages: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,
    pub split_groups: Vec<SplitGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_chunk: Option<String>,
    /// Identifier → JS expression text.
    pub defines: BTreeMap<String, String>,
}

impl BuildPass {
    /// Whether `request` stays an external import in this pass.
    pub fn is_external(&self, request: &str) -> bool {
        self.externalize_packages && is_bare_specifier(request)
    }
}

/// `react`, `@scope/pkg/sub`. Not `./x`, `/abs` or a platform absolute path.
pub fn is_bare_specifier(request: &str) -> bool {
    !request.is_empty()
        && !request.starts_with('.')
        && !request.starts_with('/')
        && !Path::new(request).is_absolute()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
    pub build_id: String,
    pub server: BuildPass,
    pub browser: BuildPass,
    /// Source of the generated browser entry, written next to the manifests.
    pub client_entry_source: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// `blog/[slug]/page.tsx` → `blog_[slug]_page`.
pub fn server_entry_name(rel_path: &str) -> String {
    let name = manifest::strip_extension(rel_path).replace('/', "_");
    if name.is_empty() {
        "root".to_string()
    } else {
        name
    }
}

fn defines(mode: Mode, build_id: &str, server: bool) -> BTreeMap<String, String> {
    let quote = |s: &str| serde_json::Value::String(s.to_string()).to_string();
    BTreeMap::from([
        ("process.env.NODE_ENV".to_string(), quote(mode.as_str())),
        ("__VISTA_BUILD_ID__".to_string(), quote(build_id)),
        ("__VISTA_SERVER__".to_string(), server.to_string()),
    ])
}

/// The browser entry: registers every chunk with its module id, then
/// starts the hydration runtime.
pub fn client_entry_source(client: &ClientManifest) -> String {
    let mut out = String::from("// Generated by vista. Do not edit.\n");
    out.push_str(&format!(
        "import {{ activate }} from '{}';\n\n",
        HYDRATION_RUNTIME_IMPORT
    ));
    out.push_str("export const clientModules = {\n");
    for entry in client.client_modules.values() {
        let id = serde_json::Value::String(entry.id.clone());
        let chunk = serde_json::Value::String(entry.chunk_name.clone());
        out.push_str(&format!("  {}: {},\n", id, chunk));
    }
    out.push_str("};\n\n");
    out.push_str(&format!(
        "activate({{ buildId: {}, modules: clientModules }});\n",
        serde_json::Value::String(client.build_id.clone())
    ));
    out
}

impl BuildPlan {
    pub fn new(options: &VistaOptions, manifests: &ManifestPair) -> Self {
        let build_id = manifests.server.build_id.clone();
        let mode = options.mode;

        let route_files = manifests
            .server
            .server_modules
            .values()
            .map(|m| (&m.path, &m.absolute_path))
            .chain(
                manifests
                    .client
                    .client_modules
                    .values()
                    .map(|m| (&m.path, &m.absolute_path)),
            )
            .filter(|(path, _)| role_for(path) != ModuleRole::Component);
        let server_entries = route_files
            .map(|(path, absolute)| (server_entry_name(path), PathBuf::from(absolute)))
            .collect();

        let server = BuildPass {
            name: "server".to_string(),
            target: BuildTarget::Node,
            mode,
            entries: server_entries,
            output_dir: options.server_output_path(),
            filename: "[name].js".to_string(),
            library_type: Some("commonjs2".to_string()),
            externalize_packages: true,
            public_path: None,
            split_groups: Vec::new(),
            runtime_chunk: None,
            defines: defines(mode, &build_id, true),
        };

        let mut browser_entries: BTreeMap<String, PathBuf> = manifests
            .client
            .client_modules
            .values()
            .map(|m| (m.chunk_name.clone(), PathBuf::from(&m.absolute_path)))
            .collect();
        browser_entries.insert(
            CLIENT_ENTRY.to_string(),
            options.out_path().join(CLIENT_ENTRY_FILE),
        );

        let browser = BuildPass {
            name: "browser".to_string(),
            target: BuildTarget::Web,
            mode,
            entries: browser_entries,
            output_dir: options.chunks_output_path(),
            filename: if mode.is_dev() {
                "[name].js".to_string()
            } else {
                "[name]-[contenthash:8].js".to_string()
            },
            library_type: None,
            externalize_packages: false,
            public_path: Some(options.asset_prefix.clone()),
            split_groups: vec![
                SplitGroup {
                    name: "framework".to_string(),
                    test: "[\\\\/]node_modules[\\\\/](react|react-dom|scheduler)[\\\\/]".to_string(),
                    priority: 40,
                },
                SplitGroup {
                    name: "vendor".to_string(),
                    test: "[\\\\/]node_modules[\\\\/]".to_string(),
                    priority: 30,
                },
            ],
            runtime_chunk: Some(RUNTIME_CHUNK.to_string()),
            defines: defines(mode, &build_id, false),
        };

        Self {
            build_id,
            server,
            browser,
            client_entry_source: client_entry_source(&manifests.client),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs one pass. Every module the bundler compiles goes through
/// `transform` first.
pub trait Bundler {
    fn run(&self, pass: &BuildPass, transform: &dyn ModuleTransform) -> Result<(), String>;
}

/// Production refuses to build with violations; development only warns.
pub fn check_violations(mode: Mode, violations: &[Diagnostic]) -> Result<(), BuildError> {
    let errors: Vec<Diagnostic> = violations.iter().filter(|d| d.is_error()).cloned().collect();
    if errors.is_empty() {
        return Ok(());
    }
    if mode.is_dev() {
        for d in &errors {
            tracing::warn!(file = %d.file, code = %d.code, "{}", d.message);
        }
        return Ok(());
    }
    Err(BuildError::Violations(errors))
}

fn write_client_entry(options: &VistaOptions, source: &str) -> Result<(), ManifestError> {
    let path = options.out_path().join(CLIENT_ENTRY_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ManifestError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, source).map_err(|source| ManifestError::Write { path, source })
}

fn run_pass(
    bundler: &dyn Bundler,
    pass: &BuildPass,
    transform: &dyn ModuleTransform,
) -> Result<(), BuildError> {
    tracing::info!(pass = %pass.name, entries = pass.entries.len(), "starting build pass");
    bundler.run(pass, transform).map_err(|message| BuildError::Bundler {
        pass: pass.name.clone(),
        message,
    })
}

/// Manifests, violation gate, manifest files, then the server pass and the
/// browser pass. Server modules stubbed out of the browser pass fail a
/// production build once that pass is done.
pub fn orchestrate(
    options: &VistaOptions,
    bundler: &dyn Bundler,
    cache: Arc<ClassificationCache>,
) -> Result<ManifestPair, BuildError> {
    let manifests = manifest::build(options, &cache)?;
    check_violations(options.mode, &manifests.server.violations)?;
    manifests.write(options)?;

    let plan = BuildPlan::new(options, &manifests);
    write_client_entry(options, &plan.client_entry_source)?;

    run_pass(bundler, &plan.server, &IdentityTransform)?;
    let boundary = BrowserBoundary::new(options.app_path(), options.mode, cache);
    run_pass(bundler, &plan.browser, &boundary)?;
    check_violations(options.mode, &boundary.diagnostics())?;

    tracing::info!(build_id = %plan.build_id, "build complete");
    Ok(manifests)
}

#[cfg(feature = "napi")]
#[napi]
pub fn build_plan_native(options_json: String) -> napi::Result<serde_json::Value> {
    let options: VistaOptions = serde_json::from_str(&options_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let manifests = manifest::build(&options, &ClassificationCache::new())
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(BuildPlan::new(&options, &manifests))
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}
