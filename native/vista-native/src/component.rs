//! Components, modules and the loader seam the render pipeline pulls them
//! through.

use crate::element::Element;
use crate::error::{LoadError, RenderError};
use crate::props::Props;
use crate::render::RenderScope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A renderable component. Server components run during document
/// generation; every nested import goes through `scope`.
pub trait Component: Send + Sync {
    fn render(&self, props: Props, scope: &mut RenderScope<'_>) -> Result<Element, RenderError>;
}

struct FnComponent<F>(F);

impl<F> Component for FnComponent<F>
where
    F: Fn(Props, &mut RenderScope<'_>) -> Result<Element, RenderError> + Send + Sync,
{
    fn render(&self, props: Props, scope: &mut RenderScope<'_>) -> Result<Element, RenderError> {
        (self.0)(props, scope)
    }
}

pub fn from_fn<F>(f: F) -> Arc<dyn Component>
where
    F: Fn(Props, &mut RenderScope<'_>) -> Result<Element, RenderError> + Send + Sync + 'static,
{
    Arc::new(FnComponent(f))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTE DATA AND METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// What a render knows about the request. Embedded in the payload as `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    pub params: BTreeMap<String, String>,
    pub search_params: BTreeMap<String, String>,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Extra `<meta name=… content=…>` pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, String>,
}

impl Metadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Keys present in `over` win.
    pub fn merge(&mut self, over: Metadata) {
        if over.title.is_some() {
            self.title = over.title;
        }
        if over.description.is_some() {
            self.description = over.description;
        }
        self.other.extend(over.other);
    }
}

pub type GenerateMetadata = Arc<dyn Fn(&RouteData) -> Result<Metadata, RenderError> + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// MODULES
// ═══════════════════════════════════════════════════════════════════════════════

/// An instantiated component module.
#[derive(Clone, Default)]
pub struct Module {
    pub default: Option<Arc<dyn Component>>,
    pub named: BTreeMap<String, Arc<dyn Component>>,
    pub metadata: Option<Metadata>,
    pub generate_metadata: Option<GenerateMetadata>,
}

impl Module {
    pub fn with_default(component: Arc<dyn Component>) -> Self {
        Self {
            default: Some(component),
            ..Default::default()
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, component: Arc<dyn Component>) -> Self {
        self.named.insert(name.into(), component);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_generate_metadata<F>(mut self, f: F) -> Self
    where
        F: Fn(&RouteData) -> Result<Metadata, RenderError> + Send + Sync + 'static,
    {
        self.generate_metadata = Some(Arc::new(f));
        self
    }

    pub fn export(&self, name: &str) -> Option<Arc<dyn Component>> {
        if name == "default" {
            self.default.clone()
        } else {
            self.named.get(name).cloned()
        }
    }

    /// Static metadata overlaid with dynamic metadata. A failing
    /// `generate_metadata` is logged and ignored.
    pub fn resolve_metadata(&self, path: &str, route: &RouteData) -> Metadata {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        if let Some(generate) = &self.generate_metadata {
            match generate(route) {
                Ok(dynamic) => metadata.merge(dynamic),
                Err(e) => tracing::warn!(%path, error = %e, "generateMetadata failed, ignoring"),
            }
        }
        metadata
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("default", &self.default.is_some())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .field("generate_metadata", &self.generate_metadata.is_some())
            .finish()
    }
}

/// The module-loading primitive. `source` yields module text for
/// classification; `instantiate` evaluates it. The render pipeline never
/// calls `instantiate` for a Client module.
pub trait ModuleLoader: Send + Sync {
    fn source(&self, path: &str) -> Result<String, LoadError>;
    fn instantiate(&self, path: &str, source: &str) -> Result<Module, LoadError>;
}

/// In-memory loader: pre-built modules keyed by path.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, (String, Module)>,
    instantiations: Mutex<HashMap<String, usize>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, source: impl Into<String>, module: Module) {
        self.modules.insert(path.into(), (source.into(), module));
    }

    pub fn with(mut self, path: impl Into<String>, source: impl Into<String>, module: Module) -> Self {
        self.register(path, source, module);
        self
    }

    /// How often `path` has been instantiated.
    pub fn instantiations(&self, path: &str) -> usize {
        self.instantiations
            .lock()
            .map(|counts| counts.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ModuleLoader for ModuleRegistry {
    fn source(&self, path: &str) -> Result<String, LoadError> {
        self.modules
            .get(path)
            .map(|(source, _)| source.clone())
            .ok_or_else(|| LoadError::NotFound(path.to_string()))
    }

    fn instantiate(&self, path: &str, _source: &str) -> Result<Module, LoadError> {
        let (_, module) = self
            .modules
            .get(path)
            .ok_or_else(|| LoadError::NotFound(path.to_string()))?;
        if let Ok(mut counts) = self.instantiations.lock() {
            *counts.entry(path.to_string()).or_insert(0) += 1;
        }
        Ok(module.clone())
    }
}
