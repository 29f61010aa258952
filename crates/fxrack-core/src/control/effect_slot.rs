//! Control-side effect slot.
//!
//! Owns the authoritative state of one loaded effect (parameter slots,
//! enable toggle, meta knob) and mirrors every change to the audio
//! thread through the context's messenger. The engine-side twin is built
//! here, complete with states for already routed channels, and shipped
//! across in a single add request.

use std::rc::Rc;
use std::sync::Arc;

use crate::channel::{ChannelHandle, MAX_CHANNELS};
use crate::control::messenger::EffectsContext;
use crate::control::parameter_slot::{ButtonParameterSlot, KnobParameterSlot};
use crate::control::soft_takeover::SoftTakeover;
use crate::effect::backend::EffectLibrary;
use crate::effect::manifest::{EffectManifest, LinkType};
use crate::effect::processor::EffectProcessor;
use crate::engine::effect::{EffectStatesMap, EngineEffect};
use crate::engine::message::EffectsRequestKind;
use crate::engine::parameter::{ParameterSet, ParameterUpdate};
use crate::error::EffectsError;
use crate::preset::{EffectPreset, ParameterPreset};

pub struct EffectSlot {
    context: Rc<EffectsContext>,
    rack_index: usize,
    chain_index: usize,
    slot_index: usize,
    manifest: Arc<EffectManifest>,
    /// Processor twin used only to allocate per-channel states; the
    /// processing instance lives on the audio thread.
    state_factory: Box<dyn EffectProcessor>,
    knobs: Vec<KnobParameterSlot>,
    buttons: Vec<ButtonParameterSlot>,
    enabled: bool,
    meta: f64,
    meta_takeover: SoftTakeover,
}

impl EffectSlot {
    /// Instantiate `effect_id` from the library, install states for the
    /// already routed `inputs`, and ship the engine-side instance to the
    /// audio thread.
    pub(crate) fn load(
        context: Rc<EffectsContext>,
        library: &EffectLibrary,
        effect_id: &str,
        rack_index: usize,
        chain_index: usize,
        slot_index: usize,
        inputs: &[ChannelHandle],
    ) -> Result<Self, EffectsError> {
        let manifest = library
            .manifest(effect_id)
            .ok_or_else(|| EffectsError::UnknownEffect(effect_id.to_string()))?;
        let processor = library
            .create_processor(effect_id)
            .ok_or_else(|| EffectsError::UnknownEffect(effect_id.to_string()))?;
        let mut state_factory = library
            .create_processor(effect_id)
            .ok_or_else(|| EffectsError::UnknownEffect(effect_id.to_string()))?;
        state_factory.load_parameters(&ParameterSet::from_manifest(&manifest))?;

        let mut knobs: Vec<KnobParameterSlot> = manifest
            .knob_parameters()
            .map(|(index, parameter)| KnobParameterSlot::new(index, Arc::clone(parameter)))
            .collect();
        let buttons: Vec<ButtonParameterSlot> = manifest
            .button_parameters()
            .map(|(index, parameter)| ButtonParameterSlot::new(index, Arc::clone(parameter)))
            .collect();
        // Every effect answers to the meta knob: if the manifest links
        // nothing by default, the first knob adopts a direct link.
        if knobs.iter().all(|k| k.link_type() == LinkType::None) {
            if let Some(first) = knobs.first_mut() {
                first.set_link_type(LinkType::Linked);
            }
        }

        let mut slot = Self {
            meta: manifest.metaknob_default(),
            manifest: Arc::clone(&manifest),
            state_factory,
            knobs,
            buttons,
            enabled: true,
            meta_takeover: SoftTakeover::new(),
            context,
            rack_index,
            chain_index,
            slot_index,
        };

        let mut effect = EngineEffect::new(manifest, processor)?;
        for input in inputs {
            effect.enable_for_input_channel(*input, slot.allocate_states());
        }
        slot.context.submit(EffectsRequestKind::AddEffectToChain {
            rack: rack_index,
            chain: chain_index,
            slot: slot_index,
            effect: Box::new(effect),
        });

        // Seat linked knobs on the meta knob's default position.
        slot.apply_meta_to_knobs(slot.meta, true);
        Ok(slot)
    }

    pub fn manifest(&self) -> &Arc<EffectManifest> {
        &self.manifest
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn meta_parameter(&self) -> f64 {
        self.meta
    }

    pub fn knobs(&self) -> &[KnobParameterSlot] {
        &self.knobs
    }

    pub fn buttons(&self) -> &[ButtonParameterSlot] {
        &self.buttons
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.context.submit(EffectsRequestKind::SetEffectEnabled {
            rack: self.rack_index,
            chain: self.chain_index,
            slot: self.slot_index,
            enabled,
        });
    }

    /// Move the meta knob. Soft takeover guards unforced moves, but only
    /// while the effect is enabled; a disabled effect always follows so
    /// it comes back in a predictable state.
    pub fn set_meta_parameter(&mut self, meta: f64, force: bool) {
        let clamped = meta.clamp(0.0, 1.0);
        if clamped != meta {
            log::warn!(
                "meta value {} for effect {:?} out of range [0, 1], clamping",
                meta,
                self.manifest.id()
            );
        }
        if force || !self.enabled {
            self.meta_takeover.ignore_next();
        } else if self.meta_takeover.ignore(self.meta, clamped) {
            return;
        }
        self.meta = clamped;
        self.apply_meta_to_knobs(clamped, force);
    }

    /// Set a knob by its position in [`Self::knobs`].
    pub fn set_knob_value(&mut self, knob: usize, value: f64) -> Result<(), EffectsError> {
        let capacity = self.knobs.len();
        let slot = self
            .knobs
            .get_mut(knob)
            .ok_or(EffectsError::SlotOutOfRange {
                slot: knob,
                capacity,
            })?;
        let update = slot.set_value(value);
        let parameter = slot.index();
        self.send_parameter(parameter, update);
        Ok(())
    }

    pub fn set_button_value(&mut self, button: usize, value: f64) -> Result<(), EffectsError> {
        let capacity = self.buttons.len();
        let slot = self
            .buttons
            .get_mut(button)
            .ok_or(EffectsError::SlotOutOfRange {
                slot: button,
                capacity,
            })?;
        let update = slot.set_value(value);
        let parameter = slot.index();
        self.send_parameter(parameter, update);
        Ok(())
    }

    pub fn set_knob_link_type(&mut self, knob: usize, link_type: LinkType) {
        if let Some(slot) = self.knobs.get_mut(knob) {
            slot.set_link_type(link_type);
        }
    }

    pub fn set_knob_link_inverted(&mut self, knob: usize, inverted: bool) {
        if let Some(slot) = self.knobs.get_mut(knob) {
            slot.set_link_inverted(inverted);
        }
    }

    /// Snapshot this effect for persistence.
    pub fn to_preset(&self) -> EffectPreset {
        let parameters = self
            .knobs
            .iter()
            .map(|knob| ParameterPreset {
                id: knob.manifest().id().to_string(),
                value: knob.value(),
                link_type: knob.link_type(),
                link_inverted: knob.link_inverted(),
            })
            .chain(self.buttons.iter().map(|button| ParameterPreset {
                id: button.manifest().id().to_string(),
                value: button.value(),
                link_type: LinkType::None,
                link_inverted: false,
            }))
            .collect();
        EffectPreset {
            id: self.manifest.id().to_string(),
            meta: self.meta,
            parameters,
        }
    }

    /// Restore parameter values, link configuration and the meta knob
    /// position from a preset. Parameters the preset names but this
    /// effect lacks are skipped with a warning.
    pub fn apply_preset(&mut self, preset: &EffectPreset) {
        for parameter in &preset.parameters {
            if let Some(knob) = self
                .knobs
                .iter()
                .position(|k| k.manifest().id() == parameter.id)
            {
                self.knobs[knob].set_link_type(parameter.link_type);
                self.knobs[knob].set_link_inverted(parameter.link_inverted);
                let update = self.knobs[knob].set_value(parameter.value);
                let index = self.knobs[knob].index();
                self.send_parameter(index, update);
            } else if let Some(button) = self
                .buttons
                .iter()
                .position(|b| b.manifest().id() == parameter.id)
            {
                let update = self.buttons[button].set_value(parameter.value);
                let index = self.buttons[button].index();
                self.send_parameter(index, update);
            } else {
                log::warn!(
                    "preset parameter {:?} does not exist on effect {:?}",
                    parameter.id,
                    self.manifest.id()
                );
            }
        }
        // Meta goes last so linked knobs end up following it.
        self.set_meta_parameter(preset.meta, true);
    }

    pub(crate) fn slot_index(&self) -> usize {
        self.slot_index
    }

    /// Fresh states for one input channel, one per registered output
    /// channel. Allocation happens here, on the control thread; the
    /// audio thread only installs the map.
    pub(crate) fn allocate_states(&self) -> EffectStatesMap {
        let buffer_parameters = self.context.buffer_parameters();
        let mut states = EffectStatesMap::with_channel_capacity(MAX_CHANNELS);
        for output in self.context.output_channels() {
            states.insert(output, self.state_factory.create_state(&buffer_parameters));
        }
        states
    }

    fn apply_meta_to_knobs(&mut self, meta: f64, force: bool) {
        let mut sends: Vec<(usize, ParameterUpdate)> = Vec::with_capacity(self.knobs.len());
        for knob in &mut self.knobs {
            if let Some(update) = knob.on_meta_parameter_changed(meta, force) {
                sends.push((knob.index(), update));
            }
        }
        for (parameter, update) in sends {
            self.send_parameter(parameter, update);
        }
    }

    fn send_parameter(&self, parameter: usize, update: ParameterUpdate) {
        self.context.submit(EffectsRequestKind::SetParameter {
            rack: self.rack_index,
            chain: self.chain_index,
            slot: self.slot_index,
            parameter,
            update: Box::new(update),
        });
    }
}
