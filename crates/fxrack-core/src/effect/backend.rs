//! Effect backends and the library that aggregates them.

use std::sync::Arc;

use crate::effect::manifest::{BackendKind, EffectManifest};
use crate::effect::processor::EffectProcessor;

/// A source of effects. The built-in backend and plugin hosts implement
/// the same surface, so the rest of the engine never cares where an
/// effect comes from.
pub trait EffectsBackend {
    fn kind(&self) -> BackendKind;

    /// Ids of every effect this backend provides, in registration order.
    fn effect_ids(&self) -> Vec<String>;

    fn manifest(&self, id: &str) -> Option<Arc<EffectManifest>>;

    /// Instantiate the DSP processor for an effect. `None` for unknown
    /// ids.
    fn create_processor(&self, id: &str) -> Option<Box<dyn EffectProcessor>>;
}

type ProcessorFactory = fn() -> Box<dyn EffectProcessor>;

struct RegisteredEffect {
    manifest: Arc<EffectManifest>,
    factory: ProcessorFactory,
}

/// Backend for effects compiled into this crate.
#[derive(Default)]
pub struct BuiltinBackend {
    effects: Vec<RegisteredEffect>,
}

impl BuiltinBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an effect. Registering an id twice keeps the first
    /// manifest and warns.
    pub fn register(&mut self, manifest: EffectManifest, factory: ProcessorFactory) {
        if self.effects.iter().any(|e| e.manifest.id() == manifest.id()) {
            log::warn!(
                "effect {:?} is already registered, ignoring duplicate",
                manifest.id()
            );
            return;
        }
        self.effects.push(RegisteredEffect {
            manifest: Arc::new(manifest),
            factory,
        });
    }
}

impl EffectsBackend for BuiltinBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Builtin
    }

    fn effect_ids(&self) -> Vec<String> {
        self.effects
            .iter()
            .map(|e| e.manifest.id().to_string())
            .collect()
    }

    fn manifest(&self, id: &str) -> Option<Arc<EffectManifest>> {
        let found = self
            .effects
            .iter()
            .find(|e| e.manifest.id() == id)
            .map(|e| Arc::clone(&e.manifest));
        if found.is_none() {
            log::warn!("no built-in effect with id {:?}", id);
        }
        found
    }

    fn create_processor(&self, id: &str) -> Option<Box<dyn EffectProcessor>> {
        self.effects
            .iter()
            .find(|e| e.manifest.id() == id)
            .map(|e| (e.factory)())
    }
}

/// All backends known to one effects manager.
///
/// Explicitly constructed and passed in, never a global: tests and
/// embedders can assemble their own libraries.
pub struct EffectLibrary {
    backends: Vec<Box<dyn EffectsBackend>>,
}

impl EffectLibrary {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Library with the built-in effects registered.
    pub fn with_builtins() -> Self {
        let mut backend = BuiltinBackend::new();
        crate::effect::builtin::register_builtin_effects(&mut backend);
        let mut library = Self::new();
        library.add_backend(Box::new(backend));
        library
    }

    pub fn add_backend(&mut self, backend: Box<dyn EffectsBackend>) {
        self.backends.push(backend);
    }

    /// Every visible effect id, sorted for stable presentation.
    pub fn effect_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .backends
            .iter()
            .flat_map(|b| b.effect_ids())
            .collect();
        ids.sort();
        ids
    }

    pub fn manifest(&self, id: &str) -> Option<Arc<EffectManifest>> {
        self.backends.iter().find_map(|b| {
            b.effect_ids()
                .iter()
                .any(|candidate| candidate == id)
                .then(|| b.manifest(id))
                .flatten()
        })
    }

    pub fn create_processor(&self, id: &str) -> Option<Box<dyn EffectProcessor>> {
        self.backends.iter().find_map(|b| b.create_processor(id))
    }

    /// The id after `current` in sorted order, wrapping around. With no
    /// current id, the first effect.
    pub fn next_effect_id(&self, current: Option<&str>) -> Option<String> {
        let ids = self.effect_ids();
        if ids.is_empty() {
            return None;
        }
        let index = match current.and_then(|c| ids.iter().position(|id| id == c)) {
            Some(position) => (position + 1) % ids.len(),
            None => 0,
        };
        Some(ids[index].clone())
    }

    /// The id before `current` in sorted order, wrapping around. With no
    /// current id, the last effect.
    pub fn prev_effect_id(&self, current: Option<&str>) -> Option<String> {
        let ids = self.effect_ids();
        if ids.is_empty() {
            return None;
        }
        let index = match current.and_then(|c| ids.iter().position(|id| id == c)) {
            Some(position) => (position + ids.len() - 1) % ids.len(),
            None => ids.len() - 1,
        };
        Some(ids[index].clone())
    }
}

impl Default for EffectLibrary {
    fn default() -> Self {
        Self::new()
    }
}
