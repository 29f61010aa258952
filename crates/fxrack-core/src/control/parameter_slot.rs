//! Control-side parameter slots.
//!
//! A knob slot owns the authoritative value of one continuous parameter:
//! its meta-knob link configuration, soft takeover state, and the
//! clamping rules. Every change produces a [`ParameterUpdate`] snapshot
//! for the audio thread; the slot never reads values back from it.

use std::sync::Arc;

use crate::control::soft_takeover::{SoftTakeover, DEFAULT_TAKEOVER_THRESHOLD};
use crate::effect::manifest::{LinkType, ParameterManifest};
use crate::engine::parameter::ParameterUpdate;

pub struct KnobParameterSlot {
    parameter: Arc<ParameterManifest>,
    /// Index in the effect's manifest order; engine messages address the
    /// parameter by this.
    index: usize,
    value: f64,
    link_type: LinkType,
    link_inverted: bool,
    soft_takeover: SoftTakeover,
}

impl KnobParameterSlot {
    pub fn new(index: usize, parameter: Arc<ParameterManifest>) -> Self {
        Self {
            index,
            value: parameter.default_value(),
            link_type: parameter.default_link_type(),
            link_inverted: parameter.default_link_inverted(),
            soft_takeover: SoftTakeover::new(),
            parameter,
        }
    }

    pub fn manifest(&self) -> &Arc<ParameterManifest> {
        &self.parameter
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn normalized_value(&self) -> f64 {
        self.parameter.normalized_from_raw(self.value)
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn link_inverted(&self) -> bool {
        self.link_inverted
    }

    /// Set the raw value, clamping to the manifest range.
    pub fn set_value(&mut self, value: f64) -> ParameterUpdate {
        let clamped = value.clamp(self.parameter.minimum(), self.parameter.maximum());
        if clamped != value {
            log::warn!(
                "value {} for parameter {:?} out of range [{}, {}], clamping",
                value,
                self.parameter.id(),
                self.parameter.minimum(),
                self.parameter.maximum()
            );
        }
        self.value = clamped;
        self.update()
    }

    /// Set from a normalized knob position in [0, 1].
    pub fn set_normalized(&mut self, position: f64) -> ParameterUpdate {
        self.value = self.parameter.raw_from_normalized(position);
        self.update()
    }

    /// Change how this knob follows the meta knob.
    ///
    /// Split link types do not combine with a bipolar neutral point (the
    /// parameter already splits its own range), so such requests fall
    /// back to an unlinked knob. Left/right half-knobs move twice as
    /// fast, so their takeover threshold doubles.
    pub fn set_link_type(&mut self, link_type: LinkType) {
        let mut link_type = link_type;
        self.soft_takeover.set_threshold(DEFAULT_TAKEOVER_THRESHOLD);
        if matches!(
            link_type,
            LinkType::LinkedLeft | LinkType::LinkedRight | LinkType::LinkedLeftRight
        ) {
            let neutral = self.parameter.neutral_point_on_scale();
            if neutral > 0.0 && neutral < 1.0 {
                log::warn!(
                    "split link not available for bipolar parameter {:?}",
                    self.parameter.id()
                );
                link_type = LinkType::None;
            }
        }
        if matches!(link_type, LinkType::LinkedLeft | LinkType::LinkedRight) {
            self.soft_takeover
                .set_threshold(2.0 * DEFAULT_TAKEOVER_THRESHOLD);
        }
        self.link_type = link_type;
    }

    pub fn set_link_inverted(&mut self, inverted: bool) {
        self.link_inverted = inverted;
    }

    /// The meta knob moved to `meta` (normalized). Returns the resulting
    /// update, or `None` when the knob is unlinked or soft takeover
    /// ignores the move. `force` bypasses takeover and arms it instead.
    pub fn on_meta_parameter_changed(&mut self, meta: f64, force: bool) -> Option<ParameterUpdate> {
        let mut parameter = meta;
        match self.link_type {
            LinkType::None => return None,
            LinkType::Linked => {
                if !(0.0..=1.0).contains(&parameter) {
                    return None;
                }
                let mut neutral = self.parameter.neutral_point_on_scale();
                if self.link_inverted {
                    neutral = 1.0 - neutral;
                }
                if neutral > 0.0 && neutral < 1.0 {
                    // Bipolar: the lower half of the meta knob covers
                    // [0, neutral], the upper half [neutral, 1].
                    if parameter <= 0.5 {
                        parameter = 2.0 * parameter * neutral;
                    } else {
                        parameter = (parameter - 0.5) * 2.0 * (1.0 - neutral) + neutral;
                    }
                }
            }
            LinkType::LinkedLeft => {
                if (0.5..=1.0).contains(&parameter) {
                    parameter = 1.0;
                } else if (0.0..0.5).contains(&parameter) {
                    parameter *= 2.0;
                } else {
                    return None;
                }
            }
            LinkType::LinkedRight => {
                if (0.5..=1.0).contains(&parameter) {
                    parameter = (parameter - 0.5) * 2.0;
                } else if (0.0..0.5).contains(&parameter) {
                    parameter = 0.0;
                } else {
                    return None;
                }
            }
            LinkType::LinkedLeftRight => {
                if (0.5..=1.0).contains(&parameter) {
                    parameter = (parameter - 0.5) * 2.0;
                } else if (0.0..0.5).contains(&parameter) {
                    parameter = 1.0 - parameter * 2.0;
                } else {
                    return None;
                }
            }
        }
        if self.link_inverted {
            parameter = 1.0 - parameter;
        }

        if force {
            self.soft_takeover.ignore_next();
        } else if self.soft_takeover.ignore(self.normalized_value(), parameter) {
            return None;
        }
        Some(self.set_normalized(parameter))
    }

    fn update(&self) -> ParameterUpdate {
        ParameterUpdate {
            value: self.value,
            minimum: self.parameter.minimum(),
            maximum: self.parameter.maximum(),
            default_value: self.parameter.default_value(),
        }
    }
}

/// Control-side slot for a stepped toggle parameter. Buttons never link
/// to the meta knob and need no takeover.
pub struct ButtonParameterSlot {
    parameter: Arc<ParameterManifest>,
    index: usize,
    value: f64,
}

impl ButtonParameterSlot {
    pub fn new(index: usize, parameter: Arc<ParameterManifest>) -> Self {
        Self {
            index,
            value: parameter.default_value(),
            parameter,
        }
    }

    pub fn manifest(&self) -> &Arc<ParameterManifest> {
        &self.parameter
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_on(&self) -> bool {
        self.value > 0.0
    }

    pub fn set_value(&mut self, value: f64) -> ParameterUpdate {
        let clamped = value.clamp(self.parameter.minimum(), self.parameter.maximum());
        if clamped != value {
            log::warn!(
                "value {} for button {:?} out of range [{}, {}], clamping",
                value,
                self.parameter.id(),
                self.parameter.minimum(),
                self.parameter.maximum()
            );
        }
        self.value = clamped;
        ParameterUpdate {
            value: self.value,
            minimum: self.parameter.minimum(),
            maximum: self.parameter.maximum(),
            default_value: self.parameter.default_value(),
        }
    }
}
