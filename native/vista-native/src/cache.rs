use crate::classify::{analyze, ModuleAnalysis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub analysis: ModuleAnalysis,
}

/// Analysis results keyed by the content hash of the module text. Since
/// analysis is a function of text alone, the key needs no path.
#[derive(Default)]
pub struct ClassificationCache {
    memory: RwLock<HashMap<String, ModuleAnalysis>>,
    cache_dir: Option<PathBuf>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also persists entries as JSON files under `cache_dir`.
    pub fn on_disk(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            if let Err(e) = fs::create_dir_all(&cache_dir) {
                tracing::warn!(dir = %cache_dir.display(), error = %e, "cannot create cache dir");
            }
        }
        Self {
            memory: RwLock::default(),
            cache_dir: Some(cache_dir),
        }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, hash: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", hash)))
    }

    fn read_disk(&self, hash: &str) -> Option<ModuleAnalysis> {
        let path = self.entry_path(hash)?;
        let data = fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<CacheEntry>(&data) {
            Ok(entry) if entry.hash == hash => Some(entry.analysis),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt cache entry");
                fs::remove_file(&path).ok();
                None
            }
        }
    }

    fn write_disk(&self, hash: &str, analysis: &ModuleAnalysis) {
        let Some(path) = self.entry_path(hash) else {
            return;
        };
        let entry = CacheEntry {
            hash: hash.to_string(),
            analysis: analysis.clone(),
        };
        if let Ok(data) = serde_json::to_string(&entry) {
            fs::write(path, data).ok();
        }
    }

    pub fn get(&self, source: &str) -> Option<ModuleAnalysis> {
        let hash = Self::compute_hash(source);
        if let Ok(memory) = self.memory.read() {
            if let Some(hit) = memory.get(&hash) {
                return Some(hit.clone());
            }
        }
        let hit = self.read_disk(&hash)?;
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(hash, hit.clone());
        }
        Some(hit)
    }

    /// Returns the cached analysis of `source`, analyzing on a miss.
    pub fn analyze(&self, source: &str) -> ModuleAnalysis {
        if let Some(hit) = self.get(source) {
            return hit;
        }
        let hash = Self::compute_hash(source);
        let analysis = analyze(source);
        self.write_disk(&hash, &analysis);
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(hash, analysis.clone());
        }
        analysis
    }

    pub fn len(&self) -> usize {
        self.memory.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
