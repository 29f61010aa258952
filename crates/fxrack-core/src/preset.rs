//! Serializable chain presets.
//!
//! A preset captures what makes a chain sound the way it does: which
//! effects are loaded, their parameter values, meta positions and link
//! configuration. Live mixing state (chain enable, dry/wet mix, super
//! knob position) is deliberately not part of a preset; loading one must
//! not yank faders the performer is holding.

use serde::{Deserialize, Serialize};

use crate::effect::manifest::LinkType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterPreset {
    pub id: String,
    pub value: f64,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(default)]
    pub link_inverted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectPreset {
    /// Manifest id of the effect to load.
    pub id: String,
    pub meta: f64,
    pub parameters: Vec<ParameterPreset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChainPreset {
    pub name: String,
    /// One entry per effect slot; `None` keeps the slot empty.
    pub effects: Vec<Option<EffectPreset>>,
}
