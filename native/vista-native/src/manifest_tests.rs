//! Manifest building and build orchestration against a real directory tree.

#[cfg(test)]
mod tests {
    use crate::bundle::{orchestrate, BuildPass, BuildPlan, BuildTarget, Bundler, CLIENT_ENTRY, CLIENT_ENTRY_FILE};
    use crate::cache::ClassificationCache;
    use crate::config::{Mode, VistaOptions};
    use crate::diagnostics::{CODE_SERVER_IN_BROWSER_GRAPH, CODE_SERVER_USES_CLIENT_API};
    use crate::error::BuildError;
    use crate::manifest::{build, ManifestPair, ModuleRole};
    use crate::proxy::{ModuleTransform, TransformOutcome};
    use crate::routes::RouteKind;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn project() -> (TempDir, VistaOptions) {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");
        write(&app, "layout.tsx", "export default function Root({ children }) { return <html><body>{children}</body></html> }");
        write(&app, "page.tsx", "export const metadata = { title: 'Home' };\nexport default function Home() { return <h1>Home</h1> }");
        write(&app, "not-found.tsx", "export default function Missing() { return <p>missing</p> }");
        write(&app, "blog/layout.tsx", "export default function Blog({ children }) { return <div>{children}</div> }");
        write(&app, "blog/[slug]/page.tsx", "export async function generateMetadata({ params }) { return { title: params.slug } }\nexport default function Post() { return null }");
        write(&app, "blog/recent/page.tsx", "export default function Recent() { return null }");
        write(&app, "docs/[...rest]/page.tsx", "export default function Docs() { return null }");
        write(&app, "(marketing)/about/page.tsx", "export default function About() { return null }");
        write(
            &app,
            "components/Counter.tsx",
            "'use strict-ish';\n",
        );
        write(
            &app,
            "components/Like.tsx",
            "// island\n'client load';\nimport { useState } from 'react';\nexport default function Like() { const [n] = useState(0); return n }\nexport const LIKE_LABEL = 'like';",
        );
        write(&app, "components/styles.css", ".a { color: red }");
        write(&app, "api/users/route.ts", "export async function GET() { return window.fetch('/x') }");
        write(&app, "node_modules/pkg/index.js", "export default function x() {}");
        write(&app, ".cache/page.tsx", "export default function Hidden() {}");

        let options = VistaOptions::new(dir.path()).with_mode(Mode::Production).with_build_id("b1");
        (dir, options)
    }

    #[test]
    fn test_manifests_from_directory_tree() {
        let (_dir, options) = project();
        let pair = build(&options, &ClassificationCache::new()).unwrap();

        let like = &pair.client.client_modules["client:components/Like"];
        assert_eq!(like.chunk_name, "components_like");
        assert_eq!(like.exports, vec!["default".to_string(), "LIKE_LABEL".to_string()]);
        assert!(!like.is_async);
        assert_eq!(pair.client.client_modules.len(), 1);
        assert_eq!(pair.client.build_id, "b1");

        let home = pair.server.entry_for_path("page.tsx").unwrap();
        assert_eq!(home.role, ModuleRole::Page);
        assert!(home.has_static_meta);
        let post = pair.server.entry_for_path("blog/[slug]/page.tsx").unwrap();
        assert!(post.has_dynamic_meta);
        assert_eq!(pair.server.entry_for_path("not-found.tsx").unwrap().role, ModuleRole::NotFound);
        assert!(pair.server.entry_for_path("api/users/route.ts").is_none());
        assert!(pair.server.entry_for_path(".cache/page.tsx").is_none());
        assert!(pair.server.entry_for_path("components/styles.css").is_none());
        assert!(pair.server.violations.is_empty());

        let patterns: Vec<&str> = pair.server.routes.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/blog/recent", "/about", "/", "/blog/:slug", "/docs/:rest*"]);
        let slug = pair.server.routes.iter().find(|r| r.pattern == "/blog/:slug").unwrap();
        assert_eq!(slug.kind, RouteKind::Dynamic);
        assert_eq!(slug.layout_paths, vec!["layout.tsx".to_string(), "blog/layout.tsx".to_string()]);
        assert_eq!(pair.server.not_found.len(), 1);
    }

    #[test]
    fn test_route_table_from_built_manifest() {
        let (_dir, options) = project();
        let pair = build(&options, &ClassificationCache::new()).unwrap();
        let table = pair.server.route_table();

        assert_eq!(table.match_path("/blog/recent").unwrap().route.pattern, "/blog/recent");
        let docs = table.match_path("/docs/a/b/c").unwrap();
        assert_eq!(docs.params["rest"], "a/b/c");
        assert!(table.match_path("/docs").is_none());
        assert_eq!(table.match_path("/about").unwrap().route.page_path, "(marketing)/about/page.tsx");
    }

    #[test]
    fn test_manifests_round_trip_through_files() {
        let (_dir, options) = project();
        let pair = build(&options, &ClassificationCache::new()).unwrap();
        pair.write(&options).unwrap();
        assert!(options.client_manifest_path().exists());
        assert!(options.server_manifest_path().exists());
        assert_eq!(ManifestPair::read(&options).unwrap(), pair);

        let raw = fs::read_to_string(options.client_manifest_path()).unwrap();
        assert!(raw.contains("\"clientModules\""));
        assert!(raw.contains("\"async\": false"));
    }

    #[test]
    fn test_classification_is_cached_across_builds() {
        let (dir, options) = project();
        let cache_dir = dir.path().join(".vista/cache");
        let cache = ClassificationCache::on_disk(&cache_dir);
        let first = build(&options, &cache).unwrap();
        let warm = ClassificationCache::on_disk(&cache_dir);
        let second = build(&options, &warm).unwrap();
        assert_eq!(first, second);
        assert!(!warm.is_empty());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ORCHESTRATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct RecordingBundler {
        passes: RefCell<Vec<BuildPass>>,
        /// (pass, entry, replaced) for every entry the bundler compiled.
        compiled: RefCell<Vec<(String, String, bool)>>,
    }

    impl Bundler for RecordingBundler {
        fn run(&self, pass: &BuildPass, transform: &dyn ModuleTransform) -> Result<(), String> {
            for (name, path) in &pass.entries {
                let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
                let replaced = matches!(
                    transform.transform(path, &source),
                    TransformOutcome::Replaced { .. }
                );
                self.compiled
                    .borrow_mut()
                    .push((pass.name.clone(), name.clone(), replaced));
            }
            self.passes.borrow_mut().push(pass.clone());
            Ok(())
        }
    }

    #[test]
    fn test_orchestrate_runs_server_then_browser() {
        let (_dir, options) = project();
        let bundler = RecordingBundler::default();
        let pair = orchestrate(&options, &bundler, Arc::new(ClassificationCache::new())).unwrap();

        let passes = bundler.passes.borrow();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].target, BuildTarget::Node);
        assert_eq!(passes[1].target, BuildTarget::Web);
        assert!(passes[0].entries.contains_key("blog_[slug]_page"));
        assert!(passes[0].entries.contains_key("layout"));
        assert!(!passes[0].entries.contains_key("components_Like"));
        assert!(passes[1].entries.contains_key("components_like"));
        assert!(passes[1].entries.contains_key(CLIENT_ENTRY));
        assert_eq!(passes[1].filename, "[name]-[contenthash:8].js");
        assert!(passes[0].is_external("react"));
        assert!(!passes[0].is_external("./local"));

        let compiled = bundler.compiled.borrow();
        assert!(compiled.iter().all(|(_, _, replaced)| !replaced));

        let entry = fs::read_to_string(options.out_path().join(CLIENT_ENTRY_FILE)).unwrap();
        assert!(entry.contains("\"client:components/Like\": \"components_like\""));
        assert!(options.server_manifest_path().exists());
        assert_eq!(pair.client.client_modules.len(), 1);
    }

    #[test]
    fn test_browser_pass_stubs_server_imports() {
        let (_dir, options) = project();
        let pair = build(&options, &ClassificationCache::new()).unwrap();
        let boundary = crate::proxy::BrowserBoundary::new(
            options.app_path(),
            options.mode,
            Arc::new(ClassificationCache::new()),
        );
        let page = options.app_path().join("page.tsx");
        let source = fs::read_to_string(&page).unwrap();
        match boundary.transform(&page, &source) {
            TransformOutcome::Replaced { code, diagnostic } => {
                assert!(code.contains("export default ServerComponentStub"));
                assert!(code.contains("export const metadata = ServerComponentStub"));
                assert_eq!(diagnostic.file, "page.tsx");
            }
            TransformOutcome::Unchanged => panic!("server page reached the browser bundle unchanged"),
        }
        let like = options.app_path().join("components/Like.tsx");
        let like_source = fs::read_to_string(&like).unwrap();
        assert_eq!(boundary.transform(&like, &like_source), TransformOutcome::Unchanged);

        let plan = BuildPlan::new(&options, &pair);
        assert_eq!(plan.browser.defines["__VISTA_SERVER__"], "false");
        assert_eq!(plan.server.defines["__VISTA_SERVER__"], "true");
        assert_eq!(plan.browser.runtime_chunk.as_deref(), Some("runtime"));
    }

    #[test]
    fn test_violations_fail_production_build_only() {
        let (dir, options) = project();
        write(
            &dir.path().join("app"),
            "widgets/Clock.tsx",
            "import { useEffect } from 'react';\nexport default function Clock() { useEffect(() => {}); return window.innerWidth }",
        );

        let bundler = RecordingBundler::default();
        match orchestrate(&options, &bundler, Arc::new(ClassificationCache::new())) {
            Err(BuildError::Violations(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].code, CODE_SERVER_USES_CLIENT_API);
                assert_eq!(violations[0].file, "widgets/Clock.tsx");
            }
            other => panic!("expected violations, got {:?}", other.map(|_| ())),
        }
        assert!(bundler.passes.borrow().is_empty());

        let dev = options.clone().with_mode(Mode::Development);
        let bundler = RecordingBundler::default();
        let pair = orchestrate(&dev, &bundler, Arc::new(ClassificationCache::new())).unwrap();
        assert_eq!(pair.server.violations.len(), 1);
        assert_eq!(bundler.passes.borrow().len(), 2);
    }

    /// A browser pass whose graph reaches `secret.tsx`, a Server module.
    struct ImportsServerModule {
        secret: std::path::PathBuf,
        stubbed: RefCell<bool>,
    }

    impl Bundler for ImportsServerModule {
        fn run(&self, pass: &BuildPass, transform: &dyn ModuleTransform) -> Result<(), String> {
            if pass.target == BuildTarget::Web {
                let source = fs::read_to_string(&self.secret).map_err(|e| e.to_string())?;
                let outcome = transform.transform(&self.secret, &source);
                *self.stubbed.borrow_mut() = matches!(outcome, TransformOutcome::Replaced { .. });
            }
            Ok(())
        }
    }

    #[test]
    fn test_misplaced_server_module_fails_production_build() {
        let (dir, options) = project();
        let app = dir.path().join("app");
        write(&app, "secret.tsx", "export default function Secret() { return process.env.KEY }");
        let bundler = ImportsServerModule {
            secret: app.join("secret.tsx"),
            stubbed: RefCell::new(false),
        };

        match orchestrate(&options, &bundler, Arc::new(ClassificationCache::new())) {
            Err(BuildError::Violations(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].code, CODE_SERVER_IN_BROWSER_GRAPH);
                assert_eq!(violations[0].file, "secret.tsx");
            }
            other => panic!("expected the browser pass to fail, got {:?}", other.map(|_| ())),
        }
        assert!(*bundler.stubbed.borrow());

        let dev = options.clone().with_mode(Mode::Development);
        assert!(orchestrate(&dev, &bundler, Arc::new(ClassificationCache::new())).is_ok());
        assert!(*bundler.stubbed.borrow());
    }

    #[test]
    fn test_browser_entries_keep_every_client_module() {
        let (dir, options) = project();
        let app = dir.path().join("app");
        let island = "'client load';\nexport default function Island() { return null }";
        write(&app, "widgets/a-b.tsx", island);
        write(&app, "widgets/a_b.tsx", island);

        let pair = build(&options, &ClassificationCache::new()).unwrap();
        let plan = BuildPlan::new(&options, &pair);
        let browser_files: std::collections::HashSet<_> = plan.browser.entries.values().collect();
        for entry in pair.client.client_modules.values() {
            assert_eq!(
                plan.browser.entries.get(&entry.chunk_name),
                Some(&std::path::PathBuf::from(&entry.absolute_path)),
                "{} lost its chunk",
                entry.path
            );
        }
        // Three islands plus the runtime entry.
        assert_eq!(plan.browser.entries.len(), 4);
        assert_eq!(browser_files.len(), 4);
    }

    #[test]
    fn test_bundler_failure_names_the_pass() {
        struct Failing;
        impl Bundler for Failing {
            fn run(&self, pass: &BuildPass, _: &dyn ModuleTransform) -> Result<(), String> {
                if pass.target == BuildTarget::Web {
                    Err("out of memory".to_string())
                } else {
                    Ok(())
                }
            }
        }
        let (_dir, options) = project();
        let err = orchestrate(&options, &Failing, Arc::new(ClassificationCache::new())).unwrap_err();
        assert_eq!(err.to_string(), "browser build failed: out of memory");
    }
}
