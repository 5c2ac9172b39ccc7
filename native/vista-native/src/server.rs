//! Request handling: route match, render, document, and the mapping of
//! render outcomes onto response classes.

use crate::cache::ClassificationCache;
use crate::component::{ModuleLoader, RouteData};
use crate::config::VistaOptions;
use crate::diagnostics::{Diagnostic, Severity, CODE_ROUTE_MISS};
use crate::document::{
    compose_document, dev_error_overlay, dev_not_found, generic_not_found, generic_server_error,
    DocumentShell,
};
use crate::error::RenderError;
use crate::manifest::ManifestPair;
use crate::render::{RenderedPage, Renderer};
use crate::routes::{parse_query, RouteEntry, RouteTable};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), HTML_CONTENT_TYPE.to_string())],
            body,
        }
    }

    pub fn redirect(location: &str, permanent: bool) -> Self {
        Self {
            status: if permanent { 308 } else { 307 },
            headers: vec![("Location".to_string(), location.to_string())],
            body: String::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The diagnostic logged for a request no route matches.
pub fn route_miss(path: &str) -> Diagnostic {
    Diagnostic::with_hints(
        CODE_ROUTE_MISS,
        Severity::Warning,
        &RenderError::NoRoute(path.to_string()).to_string(),
        "",
        0,
        vec!["Add a page file for this path, or a not-found file in an ancestor directory.".to_string()],
    )
}

/// Serves rendered documents from a built pair of manifests. Holds no
/// per-request state; `handle` may run concurrently.
pub struct Server {
    options: VistaOptions,
    manifests: ManifestPair,
    table: RouteTable,
    loader: Arc<dyn ModuleLoader>,
    cache: Arc<ClassificationCache>,
    shell: DocumentShell,
}

impl Server {
    pub fn new(options: VistaOptions, manifests: ManifestPair, loader: Arc<dyn ModuleLoader>) -> Self {
        let table = manifests.server.route_table();
        let mut shell = DocumentShell::for_options(&options);
        if options.mode.is_dev() {
            shell = shell.with_overlay(manifests.server.violations.clone());
        }
        Self {
            options,
            manifests,
            table,
            loader,
            cache: Arc::new(ClassificationCache::new()),
            shell,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ClassificationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.shell = self.shell.with_scripts(scripts);
        self
    }

    pub fn manifests(&self) -> &ManifestPair {
        &self.manifests
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(
            self.loader.as_ref(),
            &self.manifests.client,
            &self.cache,
            &self.options,
        )
    }

    pub fn handle(&self, path: &str, query: &str) -> Response {
        let search_params = parse_query(query);
        let renderer = self.renderer();

        let Some(matched) = self.table.match_path(path) else {
            let miss = route_miss(path);
            tracing::warn!(%path, code = %miss.code, "no route matched");
            return self.not_found(&renderer, path, search_params, Some(miss));
        };

        match renderer.render(matched.route, matched.params.clone(), search_params.clone()) {
            Ok(page) => Response::html(200, compose_document(&page, &self.shell)),
            Err(RenderError::Redirect { location, permanent }) => {
                tracing::debug!(%path, %location, permanent, "redirect");
                Response::redirect(&location, permanent)
            }
            Err(RenderError::NotFound) => self.not_found(&renderer, path, search_params, None),
            Err(error) => self.failure(&renderer, path, matched.route, matched.params, search_params, error),
        }
    }

    fn fallback_not_found(&self, path: &str, miss: Option<Diagnostic>) -> Response {
        match miss {
            Some(miss) if self.options.mode.is_dev() => Response::html(404, dev_not_found(path, &[miss])),
            _ => Response::html(404, generic_not_found()),
        }
    }

    /// Nearest not-found component wrapped in its own layouts, else the
    /// generic page. `miss` is set when no route matched at all.
    fn not_found(
        &self,
        renderer: &Renderer<'_>,
        path: &str,
        search_params: BTreeMap<String, String>,
        miss: Option<Diagnostic>,
    ) -> Response {
        let Some(entry) = self.table.not_found_for(path) else {
            return self.fallback_not_found(path, miss);
        };
        let data = RouteData {
            params: BTreeMap::new(),
            search_params,
            pattern: entry.pattern.clone(),
        };
        match renderer.render_tree(&entry.path, &entry.layout_paths, data) {
            Ok(page) => Response::html(404, compose_document(&page, &self.shell)),
            Err(error) => {
                tracing::error!(%path, not_found = %entry.path, %error, "not-found page failed to render");
                self.fallback_not_found(path, miss)
            }
        }
    }

    fn failure(
        &self,
        renderer: &Renderer<'_>,
        path: &str,
        route: &RouteEntry,
        params: BTreeMap<String, String>,
        search_params: BTreeMap<String, String>,
        error: RenderError,
    ) -> Response {
        tracing::error!(%path, pattern = %route.pattern, %error, "render failed");

        if self.options.mode.is_dev() {
            let body = dev_error_overlay(path, &error, &self.manifests.server.violations);
            return Response::html(500, body);
        }

        match &route.error_path {
            Some(error_path) => match self.render_error_page(renderer, route, error_path, params, search_params) {
                Ok(page) => Response::html(500, compose_document(&page, &self.shell)),
                Err(nested) => {
                    tracing::error!(%path, error_page = %error_path, error = %nested, "error page failed to render");
                    Response::html(500, generic_server_error())
                }
            },
            None => Response::html(500, generic_server_error()),
        }
    }

    fn render_error_page(
        &self,
        renderer: &Renderer<'_>,
        route: &RouteEntry,
        error_path: &str,
        params: BTreeMap<String, String>,
        search_params: BTreeMap<String, String>,
    ) -> Result<RenderedPage, RenderError> {
        let data = RouteData {
            params,
            search_params,
            pattern: route.pattern.clone(),
        };
        renderer.render_tree(error_path, &route.layout_paths, data)
    }
}
