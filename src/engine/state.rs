// ── Mnemo Engine: Shared State ─────────────────────────────────────────────
// Canonical home for the per-process engine object. Holds the two pieces
// of global mutable state the system needs — the store handle (opened once
// per process) and the capture re-entrancy flag — and injects them into
// every component instead of hiding them behind module globals.

use crate::atoms::error::MemoryResult;
use crate::atoms::memory_types::{Slot, SlotWrite};
use crate::atoms::types::MemoryEngineConfig;
use crate::engine::embedding::EmbedGateway;
use crate::engine::extractor::LlmExtractor;
use crate::engine::scope::ScopeKey;
use crate::engine::store::slots::infer_category;
use crate::engine::store::MemoryStore;
use crate::engine::vector::VectorGateway;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MemoryEngine {
    pub store: MemoryStore,
    pub config: MemoryEngineConfig,
    pub vector: VectorGateway,
    pub embedder: EmbedGateway,
    pub extractor: LlmExtractor,
    /// Re-entrancy guard for auto-capture. One per process; a second
    /// capture attempted while a run is in flight is dropped, not queued.
    pub(crate) capturing: AtomicBool,
}

impl MemoryEngine {
    /// Open the local store and build the gateways. No network I/O here;
    /// call `start()` for the bootstrap probes.
    pub fn new(config: MemoryEngineConfig) -> MemoryResult<Self> {
        let store = MemoryStore::open(config.state_dir.as_deref())?;
        Ok(MemoryEngine {
            vector: VectorGateway::new(&config),
            embedder: EmbedGateway::new(&config),
            extractor: LlmExtractor::new(&config),
            store,
            config,
            capturing: AtomicBool::new(false),
        })
    }

    /// In-memory engine for tests.
    #[cfg(test)]
    pub fn for_tests(config: MemoryEngineConfig) -> Self {
        MemoryEngine {
            vector: VectorGateway::new(&config),
            embedder: EmbedGateway::new(&config),
            extractor: LlmExtractor::new(&config),
            store: MemoryStore::open_in_memory().expect("in-memory store"),
            config,
            capturing: AtomicBool::new(false),
        }
    }

    /// Bootstrap the external collaborators and log degraded modes. The
    /// engine stays usable when either probe fails: embeddings fall back
    /// to the deterministic hash, vector writes surface errors per call.
    pub async fn start(&self) {
        match self.store.stats() {
            Ok(stats) => info!(
                "[engine] Store ready: {} slots, {} entities, {} relationships",
                stats.slots, stats.entities, stats.relationships
            ),
            Err(e) => warn!("[engine] Store stats unavailable: {}", e),
        }

        if let Err(e) = self.vector.ensure_collection().await {
            warn!("[engine] Vector collection bootstrap failed (degraded mode): {}", e);
        }

        match self.embedder.test_connection().await {
            Ok(dims) => info!("[engine] Embedding service ready ({} dims)", dims),
            Err(e) => warn!(
                "[engine] Embedding service unreachable, hash fallback active: {}",
                e
            ),
        }
    }

    /// Slot upsert with the configured category whitelist and per-scope
    /// cap applied.
    pub fn set_slot_capped(&self, scope: &ScopeKey, mut write: SlotWrite) -> MemoryResult<Slot> {
        if write.category.is_none() {
            let head = write.key.split('.').next().unwrap_or("");
            write.category = Some(if self.config.slot_categories.iter().any(|c| c == head) {
                head.to_string()
            } else {
                infer_category(&write.key)
            });
        }
        let slot = self.store.set_slot(scope, write)?;
        self.store.prune_slots(scope, self.config.max_slots)?;
        Ok(slot)
    }

    /// Try to take the capture guard. Returns None while another capture
    /// run holds it.
    pub(crate) fn try_begin_capture(&self) -> Option<CaptureGuard<'_>> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(CaptureGuard { flag: &self.capturing })
    }
}

/// Clears the capture flag on every exit path, panics included.
pub(crate) struct CaptureGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capture_guard_is_exclusive_and_clears_on_drop() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let guard = engine.try_begin_capture();
        assert!(guard.is_some());
        assert!(engine.try_begin_capture().is_none());
        drop(guard);
        assert!(engine.try_begin_capture().is_some());
    }

    #[test]
    fn set_slot_capped_honours_config_whitelist() {
        let mut config = MemoryEngineConfig::default();
        config.slot_categories.push("hobby".into());
        let engine = MemoryEngine::for_tests(config);
        let scope = ScopeKey::new("default", "assistant");

        let slot = engine
            .set_slot_capped(&scope, SlotWrite::new("hobby.game", json!("chess")))
            .unwrap();
        assert_eq!(slot.category, "hobby");

        let slot = engine
            .set_slot_capped(&scope, SlotWrite::new("random.thing", json!(1)))
            .unwrap();
        assert_eq!(slot.category, "custom");
    }
}
