//! # Island Hydration
//!
//! Browser-side activation of the Client islands a render left behind. The
//! runtime reads `window.__VISTA_CLIENT_REFERENCES__` once, then for each
//! reference fetches its chunk, revives its props and hydrates or mounts
//! the placeholder node with the matching mount id.
//!
//! Everything host-specific sits behind a trait:
//!
//! - [`Document`]: the page's DOM
//! - [`ChunkLoader`]: fetching and evaluating a chunk URL
//! - [`Scheduler`]: tasks, timers, idle periods and intersection observation

pub mod chunks;
pub mod dom;
pub mod runtime;
pub mod scheduler;

pub use chunks::{ChunkLoader, ChunkModule, ChunkRegistry, ClientComponent, StaticChunk};
pub use dom::{Document, HtmlDocument};
pub use runtime::HydrationRuntime;
pub use scheduler::{LocalScheduler, Scheduler};

use crate::config::Mode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const HYDRATED_ATTR: &str = "data-hydrated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Everything at once.
    #[default]
    Eager,
    /// Visible islands now, the rest as they approach the viewport.
    Viewport,
    /// One island per idle period.
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HydrationOptions {
    pub policy: Policy,
    pub mode: Mode,
    /// Distance from the viewport that still counts as visible at startup.
    pub viewport_margin: f64,
    /// Distance at which deferred islands start hydrating.
    pub lead_margin: f64,
    /// Used when intersection observation is unavailable.
    pub fallback_delay_ms: u64,
    pub idle_timeout_ms: Option<u64>,
    /// Module ids of the active client manifest. Unchecked when `None`.
    pub known_modules: Option<HashSet<String>>,
}

impl Default for HydrationOptions {
    fn default() -> Self {
        Self {
            policy: Policy::Eager,
            mode: Mode::Production,
            viewport_margin: 100.0,
            lead_margin: 50.0,
            fallback_delay_ms: 1000,
            idle_timeout_ms: Some(2000),
            known_modules: None,
        }
    }
}

impl HydrationOptions {
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_known_modules(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.known_modules = Some(ids.into_iter().collect());
        self
    }
}
