//! # Vista Component Boundary
//!
//! Decides which component modules run in the browser and which run only on
//! the server, and keeps each side's code out of the other's bundle.
//!
//! ## Pipeline
//!
//! 1. **Classify**: a module is Client iff its first significant line is the
//!    `'client load'` directive. Server modules using browser-only APIs are
//!    Classification Violations.
//! 2. **Manifests**: the component tree is walked once and split into a
//!    Client Manifest (module → chunk) and a Server Manifest (module → role,
//!    plus the route table).
//! 3. **Build**: a server pass bundles every route file; a browser pass
//!    bundles only Client modules, with Server modules stubbed out.
//! 4. **Render**: Server components run; every Client component reached
//!    becomes a placeholder plus a Client Reference.
//! 5. **Hydrate**: in the browser, each reference's chunk is fetched once and
//!    its placeholder activated under the chosen policy.
//!
//! ## Invariants
//!
//! - Classification depends only on module text, never on its path.
//! - Route and role membership depend only on directory and file names.
//! - A Client module's real body is never instantiated by a render.
//! - Render state is per render; concurrent renders never share counters.

pub mod bundle;
pub mod cache;
pub mod classify;
pub mod component;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod document;
pub mod element;
pub mod error;
pub mod hydration;
pub mod manifest;
pub mod props;
pub mod proxy;
pub mod render;
pub mod routes;
pub mod server;

#[cfg(test)]
mod manifest_tests;
#[cfg(test)]
mod render_tests;

pub use bundle::{orchestrate, BuildPass, BuildPlan, Bundler};
pub use cache::ClassificationCache;
pub use classify::{analyze, classify, ClassificationResult, ModuleAnalysis};
pub use component::{from_fn, Component, Metadata, Module, ModuleLoader, ModuleRegistry, RouteData};
pub use config::{Mode, VistaOptions};
pub use diagnostics::{Diagnostic, Severity};
pub use element::Element;
pub use error::{BuildError, HydrationError, LoadError, ManifestError, RenderError};
pub use hydration::{HydrationOptions, HydrationRuntime, Policy};
pub use manifest::{ClientManifest, ManifestPair, ServerManifest};
pub use props::{PropValue, Props};
pub use proxy::{BrowserBoundary, ClientReference, InterceptingLoader, ModuleTransform};
pub use render::{RenderScope, RenderedPage, Renderer, RscPayload};
pub use routes::{RouteEntry, RouteTable};
pub use server::{Response, Server};

#[cfg(feature = "napi")]
pub use bundle::build_plan_native;
#[cfg(feature = "napi")]
pub use classify::classify_native;
#[cfg(feature = "napi")]
pub use manifest::{build_manifests_native, write_manifests_native};
#[cfg(feature = "napi")]
pub use proxy::transform_browser_module_native;
#[cfg(feature = "napi")]
pub use routes::match_route_native;
