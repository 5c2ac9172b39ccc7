//! Island activation.
//!
//! State lives for the page's lifetime and is only touched from the page's
//! thread. Overlapping triggers for one mount id share a single in-flight
//! hydration, and overlapping requests for one chunk URL share a single
//! fetch.

use super::chunks::{ChunkLoader, ChunkModule};
use super::dom::Document;
use super::scheduler::Scheduler;
use super::{HydrationOptions, Policy, HYDRATED_ATTR};
use crate::diagnostics::{
    Diagnostic, Severity, CODE_HYDRATION_FAILED, CODE_HYDRATION_NODE_MISSING,
    CODE_HYDRATION_UNKNOWN_MODULE,
};
use crate::document::REFERENCES_GLOBAL;
use crate::element::escape_text;
use crate::error::HydrationError;
use crate::props::Props;
use crate::proxy::{ClientReference, ATTR_COMPONENT};
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

type ChunkResult = Result<Rc<dyn ChunkModule>, HydrationError>;
type HydrationResult = Result<(), HydrationError>;

#[derive(Default)]
struct State {
    hydrated: HashSet<String>,
    loaded_chunks: HashMap<String, Rc<dyn ChunkModule>>,
    pending_chunks: HashMap<String, Shared<LocalBoxFuture<'static, ChunkResult>>>,
    pending: HashMap<String, Shared<LocalBoxFuture<'static, HydrationResult>>>,
}

pub struct HydrationRuntime {
    document: Rc<dyn Document>,
    chunks: Rc<dyn ChunkLoader>,
    scheduler: Rc<dyn Scheduler>,
    options: HydrationOptions,
    state: RefCell<State>,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl HydrationRuntime {
    pub fn new(
        document: Rc<dyn Document>,
        chunks: Rc<dyn ChunkLoader>,
        scheduler: Rc<dyn Scheduler>,
        options: HydrationOptions,
    ) -> Rc<Self> {
        Rc::new(Self {
            document,
            chunks,
            scheduler,
            options,
            state: RefCell::new(State::default()),
            diagnostics: RefCell::new(Vec::new()),
        })
    }

    /// References embedded in the page. A page without islands has none.
    pub fn references(&self) -> Result<Vec<ClientReference>, HydrationError> {
        match self.document.page_global(REFERENCES_GLOBAL) {
            None => Ok(Vec::new()),
            Some(value) => {
                serde_json::from_value(value).map_err(|e| HydrationError::PageData(e.to_string()))
            }
        }
    }

    pub fn is_hydrated(&self, mount_id: &str) -> bool {
        self.state.borrow().hydrated.contains(mount_id)
    }

    pub fn is_pending(&self, mount_id: &str) -> bool {
        self.state.borrow().pending.contains_key(mount_id)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACTIVATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reads the page's references and schedules them under the configured
    /// policy. Returns how many references were found.
    pub fn activate(self: &Rc<Self>) -> Result<usize, HydrationError> {
        let references = self.references()?;
        let count = references.len();
        tracing::debug!(count, policy = ?self.options.policy, "activating islands");
        match self.options.policy {
            Policy::Eager => self.activate_eager(references),
            Policy::Viewport => self.activate_viewport(references),
            Policy::Idle => self.activate_idle(references),
        }
        Ok(count)
    }

    fn spawn_hydration(self: &Rc<Self>, reference: ClientReference) {
        let mount_id = reference.mount_id.clone();
        let task = self
            .hydrate(reference)
            .map(move |result| {
                if let Err(error) = result {
                    tracing::debug!(mount = %mount_id, %error, "island left unhydrated");
                }
            })
            .boxed_local();
        self.scheduler.spawn(task);
    }

    fn activate_eager(self: &Rc<Self>, references: Vec<ClientReference>) {
        for reference in references {
            self.spawn_hydration(reference);
        }
    }

    fn activate_viewport(self: &Rc<Self>, references: Vec<ClientReference>) {
        let (visible, deferred): (Vec<_>, Vec<_>) = references.into_iter().partition(|r| {
            self.document
                .is_in_viewport(&r.mount_id, self.options.viewport_margin)
        });
        for reference in visible {
            self.spawn_hydration(reference);
        }
        if deferred.is_empty() {
            return;
        }

        let ids: Vec<String> = deferred.iter().map(|r| r.mount_id.clone()).collect();
        let by_mount: HashMap<String, ClientReference> = deferred
            .iter()
            .map(|r| (r.mount_id.clone(), r.clone()))
            .collect();
        let weak: Weak<Self> = Rc::downgrade(self);
        let on_visible = Rc::new(move |mount_id: &str| {
            if let (Some(runtime), Some(reference)) = (weak.upgrade(), by_mount.get(mount_id)) {
                runtime.spawn_hydration(reference.clone());
            }
        });

        if self
            .scheduler
            .observe_intersection(ids, self.options.lead_margin, on_visible)
        {
            return;
        }

        tracing::debug!(
            delay_ms = self.options.fallback_delay_ms,
            "intersection observation unavailable, hydrating after delay"
        );
        let this = Rc::clone(self);
        let delay = self.scheduler.delay(self.options.fallback_delay_ms);
        self.scheduler.spawn(
            async move {
                delay.await;
                let all = deferred.into_iter().map(|r| this.hydrate(r));
                let failed = future::join_all(all)
                    .await
                    .into_iter()
                    .filter(Result::is_err)
                    .count();
                if failed > 0 {
                    tracing::debug!(failed, "deferred islands left unhydrated");
                }
            }
            .boxed_local(),
        );
    }

    fn activate_idle(self: &Rc<Self>, references: Vec<ClientReference>) {
        let this = Rc::clone(self);
        self.scheduler.spawn(
            async move {
                for reference in references {
                    this.scheduler.idle(this.options.idle_timeout_ms).await;
                    let mount_id = reference.mount_id.clone();
                    if let Err(error) = this.hydrate(reference).await {
                        tracing::debug!(mount = %mount_id, %error, "island left unhydrated, continuing");
                    }
                }
            }
            .boxed_local(),
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ONE ISLAND
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hydrates one island. Already hydrated islands resolve immediately;
    /// an island already in flight resolves with that same attempt.
    pub fn hydrate(self: &Rc<Self>, reference: ClientReference) -> LocalBoxFuture<'static, HydrationResult> {
        let mut state = self.state.borrow_mut();
        if state.hydrated.contains(&reference.mount_id) {
            return future::ready(Ok(())).boxed_local();
        }
        if let Some(pending) = state.pending.get(&reference.mount_id) {
            return pending.clone().boxed_local();
        }
        let mount_id = reference.mount_id.clone();
        let attempt = Self::run(Rc::clone(self), reference).boxed_local().shared();
        state.pending.insert(mount_id, attempt.clone());
        attempt.boxed_local()
    }

    async fn run(self: Rc<Self>, reference: ClientReference) -> HydrationResult {
        let result = self.perform(&reference).await;
        {
            let mut state = self.state.borrow_mut();
            state.pending.remove(&reference.mount_id);
            if result.is_ok() {
                state.hydrated.insert(reference.mount_id.clone());
            }
        }
        match &result {
            Ok(()) => tracing::debug!(mount = %reference.mount_id, id = %reference.id, "hydrated"),
            Err(error) => self.report(&reference, error),
        }
        result
    }

    async fn perform(self: &Rc<Self>, reference: &ClientReference) -> HydrationResult {
        let mount_id = reference.mount_id.as_str();
        if let Some(known) = &self.options.known_modules {
            if !known.contains(&reference.id) {
                return Err(HydrationError::UnknownModule {
                    id: reference.id.clone(),
                });
            }
        }
        if !self.document.has_element(mount_id) {
            return Err(HydrationError::NodeMissing(mount_id.to_string()));
        }

        let module = self.load_chunk(&reference.chunk_url).await?;
        let component = module
            .export(&reference.export_name)
            .or_else(|| module.export("default"))
            .ok_or_else(|| HydrationError::MissingExport {
                id: reference.id.clone(),
                export: reference.export_name.clone(),
            })?;

        let props = Props::from_wire(&reference.props);
        let has_content = self
            .document
            .inner_html(mount_id)
            .is_some_and(|html| !html.trim().is_empty());
        let outcome = if has_content {
            component.hydrate(self.document.as_ref(), mount_id, &props)
        } else {
            component.mount(self.document.as_ref(), mount_id, &props)
        };
        outcome.map_err(|message| HydrationError::Mount {
            id: reference.id.clone(),
            message,
        })?;

        self.document.remove_attribute(mount_id, ATTR_COMPONENT);
        self.document.set_attribute(mount_id, HYDRATED_ATTR, "true");
        Ok(())
    }

    /// Cached after success, shared while in flight, retried after failure.
    fn load_chunk(self: &Rc<Self>, url: &str) -> LocalBoxFuture<'static, ChunkResult> {
        let mut state = self.state.borrow_mut();
        if let Some(module) = state.loaded_chunks.get(url) {
            return future::ready(Ok(Rc::clone(module))).boxed_local();
        }
        if let Some(pending) = state.pending_chunks.get(url) {
            return pending.clone().boxed_local();
        }

        let this = Rc::clone(self);
        let url = url.to_string();
        let fetch = self.chunks.load(&url);
        let key = url.clone();
        let shared = async move {
            let result = fetch
                .await
                .map_err(|message| HydrationError::ChunkLoad {
                    url: url.clone(),
                    message,
                });
            let mut state = this.state.borrow_mut();
            state.pending_chunks.remove(&url);
            if let Ok(module) = &result {
                state.loaded_chunks.insert(url, Rc::clone(module));
            }
            result
        }
        .boxed_local()
        .shared();
        state.pending_chunks.insert(key, shared.clone());
        shared.boxed_local()
    }

    fn report(&self, reference: &ClientReference, error: &HydrationError) {
        let (code, severity) = match error {
            HydrationError::NodeMissing(_) => (CODE_HYDRATION_NODE_MISSING, Severity::Warning),
            HydrationError::UnknownModule { .. } => (CODE_HYDRATION_UNKNOWN_MODULE, Severity::Warning),
            _ => (CODE_HYDRATION_FAILED, Severity::Error),
        };
        let diagnostic = Diagnostic::new(code, severity, &error.to_string(), &reference.id, 0);

        match severity {
            Severity::Warning => {
                tracing::warn!(mount = %reference.mount_id, id = %reference.id, %error, "island skipped");
            }
            Severity::Error => {
                tracing::error!(mount = %reference.mount_id, id = %reference.id, %error, "hydration failed");
                if self.options.mode.is_dev() {
                    self.document
                        .set_inner_html(&reference.mount_id, &inline_diagnostic(&diagnostic));
                }
            }
        }
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}

fn inline_diagnostic(diagnostic: &Diagnostic) -> String {
    format!(
        "<div data-vista-error=\"{}\" style=\"border:2px solid #e74c3c;padding:8px;font:12px monospace;color:#c0392b\"><strong>{}</strong><pre>{}</pre></div>",
        diagnostic.code,
        escape_text(&diagnostic.file),
        escape_text(&diagnostic.message)
    )
}
