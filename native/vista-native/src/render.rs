//! The render pipeline.
//!
//! One [`RenderScope`] per render carries the mount-id counter and the
//! collected client references, and is handed to every component call.
//! Nothing about a render lives in global state, so renders on different
//! threads never observe each other.

use crate::cache::ClassificationCache;
use crate::component::{Metadata, ModuleLoader, RouteData};
use crate::config::VistaOptions;
use crate::element::Element;
use crate::error::RenderError;
use crate::manifest::ClientManifest;
use crate::props::{PropValue, Props};
use crate::proxy::{
    placeholder, ClientProxy, ClientReference, InterceptingLoader, LoadedModule, MOUNT_ID_PREFIX,
};
use crate::routes::RouteEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RscPayload {
    pub html: String,
    pub client_references: Vec<ClientReference>,
    pub data: RouteData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub payload: RscPayload,
    pub metadata: Metadata,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct RenderScope<'a> {
    loader: &'a InterceptingLoader<'a>,
    route: &'a RouteData,
    next_mount: usize,
    /// Islands placed by the pipeline itself (Client pages and layouts).
    explicit: Vec<ClientReference>,
    /// Islands placed by proxies reached through `load`.
    intercepted: Vec<ClientReference>,
}

impl<'a> RenderScope<'a> {
    pub fn new(loader: &'a InterceptingLoader<'a>, route: &'a RouteData) -> Self {
        Self {
            loader,
            route,
            next_mount: 0,
            explicit: Vec::new(),
            intercepted: Vec::new(),
        }
    }

    pub fn route(&self) -> &RouteData {
        self.route
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.params.get(name).map(String::as_str)
    }

    pub fn load(&self, path: &str) -> Result<LoadedModule, RenderError> {
        Ok(self.loader.load(path)?)
    }

    fn next_mount_id(&mut self) -> String {
        let id = format!("{}{}", MOUNT_ID_PREFIX, self.next_mount);
        self.next_mount += 1;
        id
    }

    fn mount(&mut self, proxy: &ClientProxy, export: &str, props: Props, explicit: bool) -> Element {
        let mount_id = self.next_mount_id();
        let reference = proxy.reference(&mount_id, export, &props);
        if explicit {
            self.explicit.push(reference);
        } else {
            self.intercepted.push(reference);
        }
        placeholder(&proxy.id, &mount_id, props.children)
    }

    fn render_export(
        &mut self,
        module: &LoadedModule,
        path: &str,
        export: &str,
        props: Props,
        explicit: bool,
    ) -> Result<Element, RenderError> {
        match module {
            LoadedModule::Client(proxy) => Ok(self.mount(proxy, export, props, explicit)),
            LoadedModule::Server(module) => {
                let component = module.export(export).ok_or_else(|| {
                    RenderError::component(path, format!("no export named {}", export))
                })?;
                component.render(props, self)
            }
        }
    }

    /// Renders an export of an already loaded module. Client modules
    /// become a placeholder plus a client reference.
    pub fn render_module(
        &mut self,
        module: &LoadedModule,
        path: &str,
        export: &str,
        props: Props,
    ) -> Result<Element, RenderError> {
        self.render_export(module, path, export, props, false)
    }

    /// Loads `path` and renders its default export.
    pub fn render_path(&mut self, path: &str, props: Props) -> Result<Element, RenderError> {
        let module = self.load(path)?;
        self.render_module(&module, path, "default", props)
    }

    /// Explicit references first, then those collected at load time.
    pub fn into_references(self) -> Vec<ClientReference> {
        let mut references = self.explicit;
        references.extend(self.intercepted);
        references
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERER
// ═══════════════════════════════════════════════════════════════════════════════

fn string_map(map: &BTreeMap<String, String>) -> PropValue {
    PropValue::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), PropValue::String(v.clone())))
            .collect(),
    )
}

/// Client modules carry no server-side metadata.
fn merge_metadata(into: &mut Metadata, path: &str, module: &LoadedModule, data: &RouteData) {
    if let LoadedModule::Server(module) = module {
        into.merge(module.resolve_metadata(path, data));
    }
}

pub struct Renderer<'a> {
    loader: &'a dyn ModuleLoader,
    client: &'a ClientManifest,
    cache: &'a ClassificationCache,
    app_dir: PathBuf,
    asset_prefix: &'a str,
}

impl<'a> Renderer<'a> {
    pub fn new(
        loader: &'a dyn ModuleLoader,
        client: &'a ClientManifest,
        cache: &'a ClassificationCache,
        options: &'a VistaOptions,
    ) -> Self {
        Self {
            loader,
            client,
            cache,
            app_dir: options.app_path(),
            asset_prefix: &options.asset_prefix,
        }
    }

    /// Renders `page_path` wrapped in `layout_paths` (root first). Used for
    /// matched routes and for not-found pages alike.
    pub fn render_tree(
        &self,
        page_path: &str,
        layout_paths: &[String],
        data: RouteData,
    ) -> Result<RenderedPage, RenderError> {
        let loader = InterceptingLoader::new(
            self.loader,
            self.client,
            self.cache,
            &self.app_dir,
            self.asset_prefix,
        );
        let mut scope = RenderScope::new(&loader, &data);

        let page = scope.load(page_path)?;
        let layouts = layout_paths
            .iter()
            .map(|path| Ok((path.as_str(), scope.load(path)?)))
            .collect::<Result<Vec<_>, RenderError>>()?;

        let mut metadata = Metadata::default();
        for (path, module) in &layouts {
            merge_metadata(&mut metadata, path, module, &data);
        }
        merge_metadata(&mut metadata, page_path, &page, &data);

        let page_props = Props::new()
            .with("params", string_map(&data.params))
            .with("searchParams", string_map(&data.search_params));
        let mut element = scope.render_export(&page, page_path, "default", page_props, true)?;

        for (path, layout) in layouts.iter().rev() {
            let props = Props::new()
                .with("params", string_map(&data.params))
                .with("searchParams", string_map(&data.search_params))
                .with_children(element);
            element = scope.render_export(layout, path, "default", props, true)?;
        }

        let html = element.to_html();
        let client_references = scope.into_references();
        tracing::debug!(
            page = %page_path,
            references = client_references.len(),
            "rendered"
        );

        Ok(RenderedPage {
            payload: RscPayload {
                html,
                client_references,
                data,
            },
            metadata,
        })
    }

    pub fn render(
        &self,
        route: &RouteEntry,
        params: BTreeMap<String, String>,
        search_params: BTreeMap<String, String>,
    ) -> Result<RenderedPage, RenderError> {
        let data = RouteData {
            params,
            search_params,
            pattern: route.pattern.clone(),
        };
        self.render_tree(&route.page_path, &route.layout_paths, data)
    }
}
