//! Audio-side view of an effect's parameters.
//!
//! The control side owns the authoritative values and pushes changes
//! across the queue; the audio thread reads them here by index, never by
//! string id, so the hot path does no hashing or comparisons.

use std::sync::Arc;

use crate::effect::manifest::EffectManifest;

/// A full snapshot of one parameter, sent whenever the control side
/// changes any of its fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterUpdate {
    pub value: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub default_value: f64,
}

#[derive(Debug, Clone)]
pub struct EngineEffectParameter {
    id: String,
    value: f64,
    minimum: f64,
    maximum: f64,
    default_value: f64,
}

impl EngineEffectParameter {
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn apply(&mut self, update: &ParameterUpdate) {
        self.value = update.value;
        self.minimum = update.minimum;
        self.maximum = update.maximum;
        self.default_value = update.default_value;
    }
}

/// All parameters of one effect instance, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    parameters: Vec<EngineEffectParameter>,
}

impl ParameterSet {
    /// Build the set with every parameter at its manifest default.
    pub fn from_manifest(manifest: &Arc<EffectManifest>) -> Self {
        let parameters = manifest
            .parameters()
            .iter()
            .map(|p| EngineEffectParameter {
                id: p.id().to_string(),
                value: p.default_value(),
                minimum: p.minimum(),
                maximum: p.maximum(),
                default_value: p.default_value(),
            })
            .collect();
        Self { parameters }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.id() == id)
    }

    pub fn get(&self, index: usize) -> Option<&EngineEffectParameter> {
        self.parameters.get(index)
    }

    /// Current raw value at `index`. Out-of-range reads return 0.0; the
    /// index came from `load_parameters`, so that can only happen through
    /// a stale message.
    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        self.parameters.get(index).map_or(0.0, |p| p.value)
    }

    /// Toggle parameters read as booleans (any positive value is on).
    #[inline]
    pub fn toggle(&self, index: usize) -> bool {
        self.value(index) > 0.0
    }

    /// Apply an update to one parameter. Returns false if the index does
    /// not address a parameter of this effect.
    pub fn apply(&mut self, index: usize, update: &ParameterUpdate) -> bool {
        match self.parameters.get_mut(index) {
            Some(parameter) => {
                parameter.apply(update);
                true
            }
            None => false,
        }
    }
}
