//! Wrong-side module substitution.
//!
//! Browser build: a Server module reached from the browser graph is
//! replaced by a stub whose exports fail loudly only when called.
//!
//! Server load: a Client module is never instantiated on the server. It is
//! replaced by a [`ClientProxy`] that registers a client reference with the
//! current [`RenderScope`](crate::render::RenderScope) and renders a
//! placeholder.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::cache::ClassificationCache;
use crate::classify::ModuleAnalysis;
use crate::component::{Module, ModuleLoader};
use crate::config::{chunk_url, Mode};
use crate::diagnostics::{Diagnostic, Severity, CODE_SERVER_IN_BROWSER_GRAPH};
use crate::discovery::{is_script_file, relative_path};
use crate::element::Element;
use crate::error::LoadError;
use crate::manifest::{module_id, ClientManifest, ClientModuleEntry, SERVER_ID_PREFIX};
use crate::props::Props;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const ATTR_COMPONENT: &str = "data-vista-cc";
pub const ATTR_MOUNT: &str = "data-vista-mount";
pub const MOUNT_ID_PREFIX: &str = "__vista_cc_";

lazy_static! {
    static ref JS_IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// BROWSER BUILD
// ═══════════════════════════════════════════════════════════════════════════════

/// Stand-in module for a Server module in the browser bundle. Every named
/// export resolves to the same failing function.
pub fn browser_stub(rel_path: &str, exports: &[String], mode: Mode) -> String {
    let file = serde_json::to_string(rel_path).unwrap_or_else(|_| "\"\"".to_string());
    let id = serde_json::to_string(&module_id(SERVER_ID_PREFIX, rel_path))
        .unwrap_or_else(|_| "\"\"".to_string());

    let message = if mode.is_dev() {
        "  const message = JSON.stringify(file) + \" is a Server Component and cannot run in the browser. \" +\n    \"Add 'client load' at the top of the file to make it a Client Component.\";\n"
    } else {
        "  const message = \"Server Component \" + file + \" called in the browser.\";\n"
    };

    let mut out = String::new();
    out.push_str(&format!("// Server component stand-in for {}.\n", file));
    out.push_str(&format!("const file = {};\n", file));
    out.push_str("function ServerComponentStub() {\n");
    out.push_str(message);
    out.push_str("  throw new Error(\"[Vista] \" + message);\n");
    out.push_str("}\n");
    out.push_str("ServerComponentStub.$$typeof = Symbol.for(\"vista.server.reference\");\n");
    out.push_str(&format!("ServerComponentStub.$$id = {};\n", id));

    for name in exports {
        if name == "default" {
            continue;
        }
        if !JS_IDENT_RE.is_match(name) {
            tracing::debug!(%rel_path, export = %name, "export name is not an identifier, not re-exported");
            continue;
        }
        out.push_str(&format!("export const {} = ServerComponentStub;\n", name));
    }
    out.push_str("export default ServerComponentStub;\n");
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Unchanged,
    Replaced { code: String, diagnostic: Diagnostic },
}

/// Per-module hook the bundler calls while building a pass.
pub trait ModuleTransform: Send + Sync {
    fn transform(&self, path: &Path, source: &str) -> TransformOutcome;
}

/// Leaves every module as is. Used by the server pass.
pub struct IdentityTransform;

impl ModuleTransform for IdentityTransform {
    fn transform(&self, _path: &Path, _source: &str) -> TransformOutcome {
        TransformOutcome::Unchanged
    }
}

/// Keeps Server modules of the component tree out of the browser bundle.
/// Every replacement is recorded; in production they are errors.
pub struct BrowserBoundary {
    app_dir: PathBuf,
    mode: Mode,
    cache: Arc<ClassificationCache>,
    replaced: Mutex<Vec<Diagnostic>>,
}

impl BrowserBoundary {
    pub fn new(app_dir: impl Into<PathBuf>, mode: Mode, cache: Arc<ClassificationCache>) -> Self {
        Self {
            app_dir: app_dir.into(),
            mode,
            cache,
            replaced: Mutex::new(Vec::new()),
        }
    }

    /// Diagnostics for every module replaced so far, in replacement order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.replaced
            .lock()
            .map(|replaced| replaced.clone())
            .unwrap_or_default()
    }

    fn replace(&self, rel_path: &str, analysis: &ModuleAnalysis) -> TransformOutcome {
        let code = browser_stub(rel_path, &analysis.exports, self.mode);
        let severity = if self.mode.is_dev() {
            Severity::Warning
        } else {
            Severity::Error
        };
        let diagnostic = Diagnostic::with_hints(
            CODE_SERVER_IN_BROWSER_GRAPH,
            severity,
            &format!("Server component {} was imported by browser code and replaced with a stub", rel_path),
            rel_path,
            0,
            vec![
                "Pass server-rendered output as children instead of importing it.".to_string(),
                "Add 'client load' if the component needs to run in the browser.".to_string(),
            ],
        );
        tracing::warn!(path = %rel_path, "server component in browser graph, stubbed");
        if let Ok(mut replaced) = self.replaced.lock() {
            replaced.push(diagnostic.clone());
        }
        TransformOutcome::Replaced { code, diagnostic }
    }
}

impl ModuleTransform for BrowserBoundary {
    fn transform(&self, path: &Path, source: &str) -> TransformOutcome {
        if !is_script_file(path) {
            return TransformOutcome::Unchanged;
        }
        let Some(rel_path) = relative_path(&self.app_dir, path) else {
            return TransformOutcome::Unchanged;
        };
        let analysis = self.cache.analyze(source);
        if analysis.classification.is_client {
            return TransformOutcome::Unchanged;
        }
        self.replace(&rel_path, &analysis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct BrowserTransformOutput {
    pub replaced: bool,
    pub code: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

#[cfg(feature = "napi")]
#[napi]
pub fn transform_browser_module_native(
    app_dir: String,
    path: String,
    source: String,
    production: bool,
) -> BrowserTransformOutput {
    let mode = if production {
        Mode::Production
    } else {
        Mode::Development
    };
    let boundary = BrowserBoundary::new(app_dir, mode, Arc::new(ClassificationCache::new()));
    match boundary.transform(Path::new(&path), &source) {
        TransformOutcome::Unchanged => BrowserTransformOutput {
            replaced: false,
            code: None,
            diagnostic: None,
        },
        TransformOutcome::Replaced { code, diagnostic } => BrowserTransformOutput {
            replaced: true,
            code: Some(code),
            diagnostic: Some(diagnostic),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER LOAD
// ═══════════════════════════════════════════════════════════════════════════════

/// One island found during a render. Lives only as long as one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReference {
    pub id: String,
    pub mount_id: String,
    pub props: Map<String, Value>,
    pub chunk_url: String,
    pub export_name: String,
}

/// Stand-in for a Client module on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientProxy {
    pub id: String,
    pub path: String,
    pub chunk_url: String,
}

impl ClientProxy {
    pub fn from_entry(entry: &ClientModuleEntry, asset_prefix: &str) -> Self {
        Self {
            id: entry.id.clone(),
            path: entry.path.clone(),
            chunk_url: chunk_url(asset_prefix, &entry.chunk_name),
        }
    }

    pub fn reference(&self, mount_id: &str, export_name: &str, props: &Props) -> ClientReference {
        ClientReference {
            id: self.id.clone(),
            mount_id: mount_id.to_string(),
            props: props.to_wire(),
            chunk_url: self.chunk_url.clone(),
            export_name: export_name.to_string(),
        }
    }
}

/// The element a Client island renders as on the server. Children, when
/// given, are server-rendered inside so the browser can hydrate over them.
pub fn placeholder(component_id: &str, mount_id: &str, children: Option<Element>) -> Element {
    let el = Element::tag("div")
        .attr("id", mount_id)
        .attr(ATTR_COMPONENT, component_id)
        .attr(ATTR_MOUNT, mount_id)
        .attr("style", "display:contents");
    match children {
        Some(children) => el.child(children),
        None => el,
    }
}

#[derive(Debug, Clone)]
pub enum LoadedModule {
    Server(Module),
    Client(ClientProxy),
}

/// Wraps a loader for the duration of one render. Classification decides,
/// per module, whether the real module is instantiated or a proxy is
/// handed out instead.
pub struct InterceptingLoader<'a> {
    inner: &'a dyn ModuleLoader,
    client: &'a ClientManifest,
    cache: &'a ClassificationCache,
    app_dir: &'a Path,
    asset_prefix: &'a str,
}

impl<'a> InterceptingLoader<'a> {
    pub fn new(
        inner: &'a dyn ModuleLoader,
        client: &'a ClientManifest,
        cache: &'a ClassificationCache,
        app_dir: &'a Path,
        asset_prefix: &'a str,
    ) -> Self {
        Self {
            inner,
            client,
            cache,
            app_dir,
            asset_prefix,
        }
    }

    pub fn client_manifest(&self) -> &ClientManifest {
        self.client
    }

    /// Manifest entry by absolute path first, then by path relative to the
    /// app directory.
    pub fn client_entry(&self, path: &str) -> Option<&'a ClientModuleEntry> {
        let as_path = Path::new(path);
        let (absolute, relative) = if as_path.is_absolute() {
            (as_path.to_path_buf(), relative_path(self.app_dir, as_path))
        } else {
            (self.app_dir.join(as_path), Some(path.to_string()))
        };
        self.client
            .entry_for_path(&absolute.to_string_lossy())
            .or_else(|| relative.and_then(|rel| self.client.entry_for_path(&rel)))
    }

    pub fn proxy_for(&self, path: &str) -> Option<ClientProxy> {
        self.client_entry(path)
            .map(|entry| ClientProxy::from_entry(entry, self.asset_prefix))
    }

    pub fn load(&self, path: &str) -> Result<LoadedModule, LoadError> {
        let source = self.inner.source(path)?;
        let analysis = self.cache.analyze(&source);

        if analysis.classification.is_client {
            if let Some(proxy) = self.proxy_for(path) {
                tracing::debug!(%path, id = %proxy.id, "client module replaced by proxy");
                return Ok(LoadedModule::Client(proxy));
            }
            tracing::warn!(%path, "client module missing from client manifest, loading it unsubstituted");
        }

        Ok(LoadedModule::Server(self.inner.instantiate(path, &source)?))
    }
}
