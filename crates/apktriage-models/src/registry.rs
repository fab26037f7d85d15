//! Lazy, load-once model registry

use crate::loader::ArtifactLoader;
use crate::predictor::{InputKind, Predictor};
use crate::slot::ModelSlot;
use apktriage_core::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

type SlotCell = Arc<OnceCell<Arc<dyn Predictor>>>;

/// Owns every slot's predictor. Each slot is loaded at most once; callers
/// racing on a cold slot wait for the same load. A failed load leaves the
/// slot empty so the next call retries.
pub struct ModelRegistry {
    loader: Arc<dyn ArtifactLoader>,
    slots: RwLock<HashMap<ModelSlot, SlotCell>>,
}

/// Load state of one slot, as reported by `GET /models`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub name: &'static str,
    pub input: InputKind,
    pub configured: bool,
    pub loaded: bool,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            loader,
            slots: RwLock::new(fresh_cells()),
        }
    }

    fn cell(&self, slot: ModelSlot) -> SlotCell {
        let slots = self.slots.read();
        match slots.get(&slot) {
            Some(cell) => Arc::clone(cell),
            None => Arc::new(OnceCell::new()),
        }
    }

    /// Load a slot by name, or return the already-loaded predictor
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Predictor>> {
        let slot = ModelSlot::from_name(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;
        self.load_slot(slot).await
    }

    pub async fn load_slot(&self, slot: ModelSlot) -> Result<Arc<dyn Predictor>> {
        let cell = self.cell(slot);
        let predictor = cell
            .get_or_try_init(|| async {
                let predictor = self.loader.load(slot).await?;
                info!(model = slot.name(), "Model loaded");
                Ok::<_, Error>(predictor)
            })
            .await?;
        Ok(Arc::clone(predictor))
    }

    /// Already-loaded predictor; never triggers a load
    pub fn get(&self, name: &str) -> Result<Arc<dyn Predictor>> {
        let slot = ModelSlot::from_name(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;
        self.cell(slot)
            .get()
            .cloned()
            .ok_or_else(|| Error::ModelNotFound(format!("{} is not loaded", name)))
    }

    pub fn is_loaded(&self, slot: ModelSlot) -> bool {
        self.cell(slot).initialized()
    }

    pub fn loaded_slots(&self) -> Vec<ModelSlot> {
        ModelSlot::ALL
            .into_iter()
            .filter(|slot| self.is_loaded(*slot))
            .collect()
    }

    /// Per-slot configuration and load state
    pub fn status(&self) -> Vec<SlotStatus> {
        let configured = self.loader.configured_slots();
        ModelSlot::ALL
            .into_iter()
            .map(|slot| SlotStatus {
                name: slot.name(),
                input: slot.input_kind(),
                configured: configured.contains(&slot),
                loaded: self.is_loaded(slot),
            })
            .collect()
    }

    /// Eagerly load every slot. Failures are logged, not returned; the
    /// ensemble reports them per request.
    pub async fn preload(&self) -> usize {
        let results =
            futures::future::join_all(ModelSlot::ALL.into_iter().map(|slot| async move {
                (slot, self.load_slot(slot).await)
            }))
            .await;

        let mut loaded = 0;
        for (slot, result) in results {
            match result {
                Ok(_) => loaded += 1,
                Err(e) => warn!(model = slot.name(), error = %e, "Failed to preload model"),
            }
        }

        info!(
            "Model registry preloaded {}/{} models",
            loaded,
            ModelSlot::ALL.len()
        );
        loaded
    }

    /// Drop every loaded predictor. In-flight requests keep theirs alive
    /// until they finish.
    pub fn unload_all(&self) {
        let previous = std::mem::replace(&mut *self.slots.write(), fresh_cells());
        let released = previous.values().filter(|cell| cell.initialized()).count();
        info!(released, "Unloaded models");
    }
}

fn fresh_cells() -> HashMap<ModelSlot, SlotCell> {
    ModelSlot::ALL
        .into_iter()
        .map(|slot| (slot, Arc::new(OnceCell::new())))
        .collect()
}
