//! Chunk loading for the hydration runtime.
//!
//! The runtime never imports chunks itself: a host supplies a
//! [`ChunkLoader`] that knows how to fetch and evaluate a chunk URL.

use super::dom::Document;
use crate::props::Props;
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A Client component as exported by a loaded chunk.
pub trait ClientComponent {
    /// Attaches to server-rendered markup already inside `target`.
    fn hydrate(&self, document: &dyn Document, target: &str, props: &Props) -> Result<(), String>;
    /// Renders into an empty `target`.
    fn mount(&self, document: &dyn Document, target: &str, props: &Props) -> Result<(), String>;
}

pub trait ChunkModule {
    fn export(&self, name: &str) -> Option<Rc<dyn ClientComponent>>;
}

pub trait ChunkLoader {
    fn load(&self, url: &str) -> LocalBoxFuture<'static, Result<Rc<dyn ChunkModule>, String>>;
}

/// Exports by name.
#[derive(Default, Clone)]
pub struct StaticChunk {
    exports: HashMap<String, Rc<dyn ClientComponent>>,
}

impl StaticChunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export(mut self, name: impl Into<String>, component: Rc<dyn ClientComponent>) -> Self {
        self.exports.insert(name.into(), component);
        self
    }
}

impl ChunkModule for StaticChunk {
    fn export(&self, name: &str) -> Option<Rc<dyn ClientComponent>> {
        self.exports.get(name).cloned()
    }
}

/// Serves pre-registered chunks and counts every fetch.
#[derive(Default)]
pub struct ChunkRegistry {
    chunks: HashMap<String, Rc<dyn ChunkModule>>,
    fetches: RefCell<HashMap<String, usize>>,
}

impl ChunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, chunk: Rc<dyn ChunkModule>) -> Self {
        self.chunks.insert(url.into(), chunk);
        self
    }

    pub fn fetches(&self, url: &str) -> usize {
        self.fetches.borrow().get(url).copied().unwrap_or(0)
    }
}

impl ChunkLoader for ChunkRegistry {
    fn load(&self, url: &str) -> LocalBoxFuture<'static, Result<Rc<dyn ChunkModule>, String>> {
        *self.fetches.borrow_mut().entry(url.to_string()).or_insert(0) += 1;
        let result = self
            .chunks
            .get(url)
            .cloned()
            .ok_or_else(|| format!("404 {}", url));
        future::ready(result).boxed_local()
    }
}
