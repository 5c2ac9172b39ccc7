//! Render pipeline and request handling over an in-memory component tree.

#[cfg(test)]
mod tests {
    use crate::cache::ClassificationCache;
    use crate::classify::analyze;
    use crate::component::{from_fn, Metadata, Module, ModuleLoader, ModuleRegistry};
    use crate::config::{Mode, VistaOptions};
    use crate::discovery::{DiscoveredModule, SourceFile};
    use crate::element::Element;
    use crate::error::RenderError;
    use crate::manifest::{build_from_modules, ManifestPair};
    use crate::props::{PropValue, Props};
    use crate::proxy::{ATTR_MOUNT, MOUNT_ID_PREFIX};
    use crate::render::{RenderedPage, Renderer};
    use crate::server::Server;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const SERVER_SOURCE: &str = "export default function Server() { return null }";
    const CLIENT_SOURCE: &str =
        "'client load';\nimport { useState } from 'react';\nexport default function Island() { const [n] = useState(0); return n }";

    struct Fixture {
        options: VistaOptions,
        registry: ModuleRegistry,
        modules: Vec<DiscoveredModule>,
    }

    impl Fixture {
        fn new(mode: Mode) -> Self {
            Self {
                options: VistaOptions::new("/proj").with_mode(mode).with_build_id("test"),
                registry: ModuleRegistry::new(),
                modules: Vec::new(),
            }
        }

        fn add(mut self, path: &str, source: &str, module: Module) -> Self {
            self.modules.push(DiscoveredModule {
                file: SourceFile {
                    path: path.to_string(),
                    absolute_path: self.options.app_path().join(path),
                    text: source.to_string(),
                },
                analysis: analyze(source),
            });
            self.registry.register(path, source, module);
            self
        }

        fn server_module(self, path: &str, module: Module) -> Self {
            self.add(path, SERVER_SOURCE, module)
        }

        /// The real body fails loudly if it is ever instantiated and run.
        fn client_module(self, path: &str) -> Self {
            let body = Module::with_default(from_fn(|_, _| {
                Err(RenderError::component("island", "client body executed on the server"))
            }));
            self.add(path, CLIENT_SOURCE, body)
        }

        fn manifests(&self) -> ManifestPair {
            build_from_modules(&self.modules, &self.options)
        }

        fn render(&self, path: &str) -> Result<RenderedPage, RenderError> {
            let manifests = self.manifests();
            let cache = ClassificationCache::new();
            let table = manifests.server.route_table();
            let matched = table
                .match_path(path)
                .ok_or_else(|| RenderError::NoRoute(path.to_string()))?;
            Renderer::new(&self.registry, &manifests.client, &cache, &self.options).render(
                matched.route,
                matched.params,
                BTreeMap::new(),
            )
        }

        fn server(self) -> (Server, Arc<ModuleRegistry>) {
            let manifests = self.manifests();
            let registry = Arc::new(self.registry);
            let loader: Arc<dyn ModuleLoader> = registry.clone();
            (Server::new(self.options, manifests, loader), registry)
        }
    }

    fn shell_layout() -> Module {
        Module::with_default(from_fn(|props, _| {
            Ok(Element::tag("main").attr("class", "shell").child(props.children()))
        }))
    }

    fn text_page(text: &'static str) -> Module {
        Module::with_default(from_fn(move |_, _| Ok(Element::tag("p").child(text.into()))))
    }

    #[test]
    fn test_server_layout_around_client_page_yields_one_reference() {
        let fixture = Fixture::new(Mode::Development)
            .server_module("layout.tsx", shell_layout())
            .client_module("page.tsx");

        let page = fixture.render("/").unwrap();
        let refs = &page.payload.client_references;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "client:page");
        assert_eq!(refs[0].mount_id, format!("{}0", MOUNT_ID_PREFIX));
        assert_eq!(refs[0].chunk_url, "/_vista/static/chunks/page.js");
        assert_eq!(refs[0].export_name, "default");
        assert!(page
            .payload
            .html
            .contains(&format!("{}=\"{}\"", ATTR_MOUNT, refs[0].mount_id)));
        assert!(page.payload.html.starts_with("<main class=\"shell\"><div id=\"__vista_cc_0\""));
        assert_eq!(fixture.registry.instantiations("page.tsx"), 0);
        assert_eq!(page.payload.data.pattern, "/");
    }

    #[test]
    fn test_client_page_receives_route_params_as_props() {
        let fixture = Fixture::new(Mode::Development).client_module("blog/[slug]/page.tsx");
        let page = fixture.render("/blog/hello").unwrap();
        let props = &page.payload.client_references[0].props;
        assert_eq!(json!(props), json!({"params": {"slug": "hello"}, "searchParams": {}}));
        assert_eq!(page.payload.data.params["slug"], "hello");
        assert_eq!(page.payload.data.pattern, "/blog/:slug");
    }

    #[test]
    fn test_nested_client_component_props_are_filtered() {
        let page = Module::with_default(from_fn(|_, scope| {
            let props = Props::new()
                .with("start", 3)
                .with("label", "Count")
                .with("onChange", PropValue::Function("onChange".into()))
                .with_children(Element::text("fallback"));
            let counter = scope.render_path("components/Counter.tsx", props)?;
            Ok(Element::tag("section").child(counter))
        }));
        let fixture = Fixture::new(Mode::Development)
            .server_module("page.tsx", page)
            .client_module("components/Counter.tsx");

        let rendered = fixture.render("/").unwrap();
        let refs = &rendered.payload.client_references;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "client:components/Counter");
        assert_eq!(json!(refs[0].props), json!({"start": 3, "label": "Count"}));
        assert!(rendered.payload.html.contains(">fallback</div>"));
        assert_eq!(fixture.registry.instantiations("components/Counter.tsx"), 0);
    }

    #[test]
    fn test_client_layout_captures_rendered_subtree() {
        let page = Module::with_default(from_fn(|_, scope| {
            let island = scope.render_path("components/Like.tsx", Props::new())?;
            Ok(Element::tag("article").child(island))
        }));
        let fixture = Fixture::new(Mode::Development)
            .client_module("layout.tsx")
            .server_module("page.tsx", page)
            .client_module("components/Like.tsx");

        let rendered = fixture.render("/").unwrap();
        let refs = &rendered.payload.client_references;
        assert_eq!(refs.len(), 2);
        // Pipeline-placed islands come before those found while loading.
        assert_eq!(refs[0].id, "client:layout");
        assert_eq!(refs[0].mount_id, "__vista_cc_1");
        assert_eq!(refs[1].id, "client:components/Like");
        assert_eq!(refs[1].mount_id, "__vista_cc_0");
        assert!(rendered.payload.html.starts_with(
            "<div id=\"__vista_cc_1\" data-vista-cc=\"client:layout\" data-vista-mount=\"__vista_cc_1\" style=\"display:contents\"><article>"
        ));
        assert!(!refs[0].props.contains_key("children"));
    }

    #[test]
    fn test_mount_ids_restart_per_render() {
        let fixture = Fixture::new(Mode::Development).client_module("page.tsx");
        let first = fixture.render("/").unwrap();
        let second = fixture.render("/").unwrap();
        assert_eq!(
            first.payload.client_references[0].mount_id,
            second.payload.client_references[0].mount_id
        );
    }

    #[test]
    fn test_metadata_merges_layouts_then_page() {
        let layout = shell_layout().with_metadata(Metadata {
            title: Some("Site".into()),
            description: Some("All about it".into()),
            ..Default::default()
        });
        let page = text_page("post").with_generate_metadata(|route| {
            Ok(Metadata::titled(format!("Post {}", route.params["slug"])))
        });
        let fixture = Fixture::new(Mode::Development)
            .server_module("layout.tsx", layout)
            .server_module("blog/[slug]/page.tsx", page);

        let rendered = fixture.render("/blog/hello").unwrap();
        assert_eq!(rendered.metadata.title.as_deref(), Some("Post hello"));
        assert_eq!(rendered.metadata.description.as_deref(), Some("All about it"));
    }

    #[test]
    fn test_static_route_beats_dynamic_sibling() {
        let fixture = Fixture::new(Mode::Development)
            .server_module("blog/[slug]/page.tsx", text_page("dynamic"))
            .server_module("blog/recent/page.tsx", text_page("recent"));
        assert_eq!(fixture.render("/blog/recent").unwrap().payload.html, "<p>recent</p>");
        assert_eq!(fixture.render("/blog/other").unwrap().payload.html, "<p>dynamic</p>");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RESPONSES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_document_embeds_payload() {
        let (server, _) = Fixture::new(Mode::Development)
            .server_module("layout.tsx", shell_layout())
            .client_module("page.tsx")
            .server();
        let response = server.handle("/", "tab=1");
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<div id=\"root\"><main class=\"shell\">"));
        assert!(response
            .body
            .contains("window.__VISTA_RSC_DATA__ = {\"params\":{},\"searchParams\":{\"tab\":\"1\"},\"pattern\":\"/\"};"));
        assert!(response.body.contains("\"mountId\":\"__vista_cc_0\""));
    }

    #[test]
    fn test_redirect_signal_short_circuits() {
        let page = Module::with_default(from_fn(|_, _| Err(RenderError::redirect("/login"))));
        let (server, _) = Fixture::new(Mode::Production)
            .server_module("page.tsx", page)
            .server_module("error.tsx", text_page("oops"))
            .server();
        let response = server.handle("/", "");
        assert_eq!(response.status, 307);
        assert_eq!(response.header("Location"), Some("/login"));

        let permanent = Module::with_default(from_fn(|_, _| Err(RenderError::permanent_redirect("/new"))));
        let (server, _) = Fixture::new(Mode::Production)
            .server_module("page.tsx", permanent)
            .server();
        assert_eq!(server.handle("/", "").status, 308);
    }

    #[test]
    fn test_not_found_uses_nearest_component_with_layouts() {
        let post = Module::with_default(from_fn(|_, scope| {
            if scope.param("slug") == Some("missing") {
                return Err(RenderError::NotFound);
            }
            Ok(Element::text("post"))
        }));
        let (server, _) = Fixture::new(Mode::Production)
            .server_module("layout.tsx", shell_layout())
            .server_module("page.tsx", text_page("home"))
            .server_module("not-found.tsx", text_page("root missing"))
            .server_module("blog/not-found.tsx", text_page("no such post"))
            .server_module("blog/[slug]/page.tsx", post)
            .server();

        let unmatched = server.handle("/nowhere", "");
        assert_eq!(unmatched.status, 404);
        assert!(unmatched.body.contains("<main class=\"shell\"><p>root missing</p></main>"));

        let signalled = server.handle("/blog/missing", "");
        assert_eq!(signalled.status, 404);
        assert!(signalled.body.contains("<p>no such post</p>"));

        assert_eq!(server.handle("/blog/ok", "").status, 200);
    }

    #[test]
    fn test_generic_not_found_without_component() {
        let (server, _) = Fixture::new(Mode::Production)
            .server_module("page.tsx", text_page("home"))
            .server();
        let response = server.handle("/missing", "");
        assert_eq!(response.status, 404);
        assert!(response.body.contains("This page could not be found."));
        assert!(!response.body.contains("VISTA-ROUTE-001"));
    }

    #[test]
    fn test_route_miss_is_reported_in_development() {
        let (server, _) = Fixture::new(Mode::Development)
            .server_module("page.tsx", text_page("home"))
            .server();
        let response = server.handle("/missing", "");
        assert_eq!(response.status, 404);
        assert!(response.body.contains("This page could not be found."));
        assert!(response.body.contains("[VISTA-ROUTE-001] no route matches /missing"));

        let (with_component, _) = Fixture::new(Mode::Development)
            .server_module("page.tsx", text_page("home"))
            .server_module("not-found.tsx", text_page("root missing"))
            .server();
        let response = with_component.handle("/missing", "");
        assert_eq!(response.status, 404);
        assert!(response.body.contains("<p>root missing</p>"));
    }

    fn failing_page() -> Module {
        Module::with_default(from_fn(|_, _| Err(RenderError::component("page", "database offline"))))
    }

    #[test]
    fn test_failure_shows_overlay_in_development() {
        let (server, _) = Fixture::new(Mode::Development)
            .server_module("page.tsx", failing_page())
            .server_module("error.tsx", text_page("something broke"))
            .server();
        let response = server.handle("/", "");
        assert_eq!(response.status, 500);
        assert!(response.body.contains("database offline"));
        assert!(!response.body.contains("something broke"));
    }

    #[test]
    fn test_failure_renders_error_component_in_production() {
        let (server, _) = Fixture::new(Mode::Production)
            .server_module("layout.tsx", shell_layout())
            .server_module("page.tsx", failing_page())
            .server_module("error.tsx", text_page("something broke"))
            .server();
        let response = server.handle("/", "");
        assert_eq!(response.status, 500);
        assert!(response.body.contains("<main class=\"shell\"><p>something broke</p></main>"));
        assert!(!response.body.contains("database offline"));

        let (bare, _) = Fixture::new(Mode::Production)
            .server_module("page.tsx", failing_page())
            .server();
        let response = bare.handle("/", "");
        assert_eq!(response.status, 500);
        assert!(response.body.contains("An unexpected error occurred."));
    }

    #[test]
    fn test_development_documents_carry_violation_overlay() {
        let offending = "export default function Page() { return <button onClick={go}>x</button> }";
        let (server, _) = Fixture::new(Mode::Development)
            .add("page.tsx", offending, text_page("home"))
            .server();
        let response = server.handle("/", "");
        assert_eq!(response.status, 200);
        assert!(response.body.contains("__vista_overlay"));
        assert!(response.body.contains("VISTA-CLASSIFY-001"));
    }

    #[test]
    fn test_concurrent_renders_are_isolated() {
        let (server, registry) = Fixture::new(Mode::Production)
            .server_module("layout.tsx", shell_layout())
            .client_module("page.tsx")
            .server();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| server.handle("/", ""))).collect();
            for handle in handles {
                let response = handle.join().unwrap();
                assert_eq!(response.status, 200);
                assert!(response.body.contains("\"mountId\":\"__vista_cc_0\""));
                assert!(!response.body.contains("__vista_cc_1"));
            }
        });
        assert_eq!(registry.instantiations("page.tsx"), 0);
    }
}
