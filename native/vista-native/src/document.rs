//! # Document Composition
//!
//! Turns a [`RenderedPage`] into the HTML document sent to the browser.
//!
//! The body carries, in order:
//!
//! 1. the server-rendered markup inside `<div id="root">`
//! 2. one inline script assigning `window.__VISTA_RSC_DATA__` and
//!    `window.__VISTA_CLIENT_REFERENCES__`
//! 3. the runtime and entry script tags
//!
//! The hydration runtime reads the two page globals once at startup and
//! never asks the server for structured render data again.

use crate::bundle::{CLIENT_ENTRY, RUNTIME_CHUNK};
use crate::component::Metadata;
use crate::config::VistaOptions;
use crate::diagnostics::Diagnostic;
use crate::element::{escape_attr, escape_text};
use crate::error::RenderError;
use crate::render::RenderedPage;
use serde::Serialize;

pub const ROOT_ID: &str = "root";
pub const DATA_GLOBAL: &str = "__VISTA_RSC_DATA__";
pub const REFERENCES_GLOBAL: &str = "__VISTA_CLIENT_REFERENCES__";
pub const OVERLAY_ID: &str = "__vista_overlay";

/// Everything about a document that does not come from the render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentShell {
    pub lang: String,
    pub scripts: Vec<String>,
    /// Build diagnostics shown above the page in development.
    pub overlay: Vec<Diagnostic>,
}

impl DocumentShell {
    /// Unhashed runtime and entry chunks under the asset prefix. Production
    /// builds name their chunks by content hash, so hosts pass the emitted
    /// file names through [`DocumentShell::with_scripts`] instead.
    pub fn for_options(options: &VistaOptions) -> Self {
        Self {
            lang: "en".to_string(),
            scripts: vec![
                options.chunk_url(RUNTIME_CHUNK),
                options.chunk_url(CLIENT_ENTRY),
            ],
            overlay: Vec::new(),
        }
    }

    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_overlay(mut self, overlay: Vec<Diagnostic>) -> Self {
        self.overlay = overlay;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INLINE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON that is safe inside an inline `<script>`: no `</script>` breakout,
/// no HTML comment openers, no raw line separators.
pub fn script_safe_json<T: Serialize + ?Sized>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize inline data");
        "null".to_string()
    });
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

pub fn hydration_script(page: &RenderedPage) -> String {
    format!(
        "<script>window.{} = {}; window.{} = {};</script>",
        DATA_GLOBAL,
        script_safe_json(&page.payload.data),
        REFERENCES_GLOBAL,
        script_safe_json(&page.payload.client_references),
    )
}

fn head(metadata: &Metadata) -> String {
    let mut out = String::from(
        "<meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
    );
    if let Some(title) = &metadata.title {
        out.push_str(&format!("<title>{}</title>", escape_text(title)));
    }
    if let Some(description) = &metadata.description {
        out.push_str(&format!(
            "<meta name=\"description\" content=\"{}\">",
            escape_attr(description)
        ));
    }
    for (name, content) in &metadata.other {
        out.push_str(&format!(
            "<meta name=\"{}\" content=\"{}\">",
            escape_attr(name),
            escape_attr(content)
        ));
    }
    out
}

fn overlay_html(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }
    let items: String = diagnostics
        .iter()
        .map(|d| format!("<li><pre>{}</pre></li>", escape_text(&d.to_string())))
        .collect();
    format!(
        "<div id=\"{}\" role=\"alert\" style=\"position:fixed;inset:0 0 auto 0;z-index:2147483647;\
         background:#1e1e1e;color:#ff6b6b;font:13px monospace;padding:12px;max-height:50vh;overflow:auto\">\
         <strong>{} build issue(s)</strong><ul>{}</ul></div>",
        OVERLAY_ID,
        diagnostics.len(),
        items
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn compose_document(page: &RenderedPage, shell: &DocumentShell) -> String {
    let scripts: String = shell
        .scripts
        .iter()
        .map(|src| format!("<script src=\"{}\" defer></script>", escape_attr(src)))
        .collect();
    format!(
        "<!DOCTYPE html><html lang=\"{}\"><head>{}</head><body>{}<div id=\"{}\">{}</div>{}{}</body></html>",
        escape_attr(&shell.lang),
        head(&page.metadata),
        overlay_html(&shell.overlay),
        ROOT_ID,
        page.payload.html,
        hydration_script(page),
        scripts
    )
}

fn plain_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{}</title></head>\
         <body style=\"font-family:system-ui,sans-serif;padding:2rem\">{}</body></html>",
        escape_text(title),
        body
    )
}

pub fn generic_not_found() -> String {
    plain_page("404: Not Found", "<h1>404</h1><p>This page could not be found.</p>")
}

/// The generic 404 with the diagnostics that explain it.
pub fn dev_not_found(path: &str, diagnostics: &[Diagnostic]) -> String {
    let items: String = diagnostics
        .iter()
        .map(|d| format!("<li><pre>{}</pre></li>", escape_text(&d.to_string())))
        .collect();
    plain_page(
        "404: Not Found",
        &format!(
            "<h1>404</h1><p>This page could not be found.</p><div id=\"{}\" role=\"alert\"><p>{}</p><ul>{}</ul></div>",
            OVERLAY_ID,
            escape_text(path),
            items
        ),
    )
}

pub fn generic_server_error() -> String {
    plain_page(
        "500: Internal Server Error",
        "<h1>500</h1><p>An unexpected error occurred.</p>",
    )
}

/// The development error page: the failing request, the error and any
/// outstanding build diagnostics.
pub fn dev_error_overlay(path: &str, error: &RenderError, diagnostics: &[Diagnostic]) -> String {
    let mut body = format!(
        "<div id=\"{}\" role=\"alert\"><h1>Unhandled error while rendering {}</h1><pre style=\"color:#c0392b;white-space:pre-wrap\">{}</pre>",
        OVERLAY_ID,
        escape_text(path),
        escape_text(&error.to_string())
    );
    if !diagnostics.is_empty() {
        body.push_str("<h2>Build diagnostics</h2><ul>");
        for d in diagnostics {
            body.push_str(&format!("<li><pre>{}</pre></li>", escape_text(&d.to_string())));
        }
        body.push_str("</ul>");
    }
    body.push_str("</div>");
    plain_page("Server Error", &body)
}
