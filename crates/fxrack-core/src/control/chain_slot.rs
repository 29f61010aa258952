//! Control-side effect chain slot.

use std::rc::Rc;

use crate::channel::ChannelHandle;
use crate::control::effect_slot::EffectSlot;
use crate::control::messenger::EffectsContext;
use crate::effect::backend::EffectLibrary;
use crate::engine::chain::{EngineEffectChain, MixMode, MAX_EFFECTS_PER_CHAIN};
use crate::engine::message::{ChainStatesPayload, EffectsRequestKind};
use crate::error::EffectsError;
use crate::preset::ChainPreset;

/// Effect slots a chain starts with. More become visible when a preset
/// or an explicit load addresses a higher slot, up to
/// [`MAX_EFFECTS_PER_CHAIN`].
pub const NUM_EFFECT_SLOTS: usize = 4;

/// Control-side state of one chain: its effect slots, mixing controls,
/// super knob and channel routing.
pub struct ChainSlot {
    context: Rc<EffectsContext>,
    rack_index: usize,
    chain_index: usize,
    /// Grows with `None` placeholders only, so slot indices already sent
    /// to the audio thread never shift.
    effects: Vec<Option<EffectSlot>>,
    enabled: bool,
    mix: f64,
    mix_mode: MixMode,
    super_value: f64,
    routed_inputs: Vec<ChannelHandle>,
}

impl ChainSlot {
    /// Create the chain and install its engine-side twin.
    pub(crate) fn new(context: Rc<EffectsContext>, rack_index: usize, chain_index: usize) -> Self {
        context.submit(EffectsRequestKind::AddChainToRack {
            rack: rack_index,
            chain: chain_index,
            chain_object: Box::new(EngineEffectChain::new()),
        });
        let mut effects = Vec::with_capacity(NUM_EFFECT_SLOTS);
        effects.resize_with(NUM_EFFECT_SLOTS, || None);
        Self {
            context,
            rack_index,
            chain_index,
            effects,
            enabled: true,
            mix: 1.0,
            mix_mode: MixMode::default(),
            super_value: 0.5,
            routed_inputs: Vec::new(),
        }
    }

    pub fn num_effect_slots(&self) -> usize {
        self.effects.len()
    }

    pub fn effect(&self, slot: usize) -> Option<&EffectSlot> {
        self.effects.get(slot).and_then(Option::as_ref)
    }

    pub fn effect_mut(&mut self, slot: usize) -> Option<&mut EffectSlot> {
        self.effects.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    pub fn mix_mode(&self) -> MixMode {
        self.mix_mode
    }

    pub fn super_parameter(&self) -> f64 {
        self.super_value
    }

    pub fn routed_inputs(&self) -> &[ChannelHandle] {
        &self.routed_inputs
    }

    /// Load an effect into a slot, replacing what was there. Slots
    /// beyond the current count come into existence as placeholders so
    /// earlier indices stay stable.
    pub fn load_effect(
        &mut self,
        library: &EffectLibrary,
        slot: usize,
        effect_id: &str,
    ) -> Result<(), EffectsError> {
        if slot >= MAX_EFFECTS_PER_CHAIN {
            return Err(EffectsError::SlotOutOfRange {
                slot,
                capacity: MAX_EFFECTS_PER_CHAIN,
            });
        }
        if slot >= self.effects.len() {
            self.effects.resize_with(slot + 1, || None);
        }
        if self.effects[slot].is_some() {
            self.unload_effect(slot);
        }

        let mut effect = EffectSlot::load(
            Rc::clone(&self.context),
            library,
            effect_id,
            self.rack_index,
            self.chain_index,
            slot,
            &self.routed_inputs,
        )?;
        // A freshly loaded effect picks up the chain's super knob.
        effect.set_meta_parameter(self.super_value, true);
        self.effects[slot] = Some(effect);
        Ok(())
    }

    /// Load an effect into the first empty slot, growing the slot list
    /// when all visible slots are occupied. Returns the slot used.
    pub fn add_effect(
        &mut self,
        library: &EffectLibrary,
        effect_id: &str,
    ) -> Result<usize, EffectsError> {
        let slot = self
            .effects
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.effects.len());
        self.load_effect(library, slot, effect_id)?;
        Ok(slot)
    }

    /// Unload a slot. The slot itself stays, as an empty placeholder.
    pub fn unload_effect(&mut self, slot: usize) -> bool {
        match self.effects.get_mut(slot).and_then(Option::take) {
            Some(_) => {
                self.context
                    .submit(EffectsRequestKind::RemoveEffectFromChain {
                        rack: self.rack_index,
                        chain: self.chain_index,
                        slot,
                    });
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.send_chain_parameters();
        }
    }

    pub fn set_mix(&mut self, mix: f64) {
        let clamped = mix.clamp(0.0, 1.0);
        if clamped != mix {
            log::warn!("chain mix {} out of range [0, 1], clamping", mix);
        }
        self.mix = clamped;
        self.send_chain_parameters();
    }

    pub fn set_mix_mode(&mut self, mix_mode: MixMode) {
        self.mix_mode = mix_mode;
        self.send_chain_parameters();
    }

    /// Move the super knob, forwarding it to every loaded effect's meta
    /// knob (each with its own soft takeover).
    pub fn set_super_parameter(&mut self, value: f64, force: bool) {
        let clamped = value.clamp(0.0, 1.0);
        if clamped != value {
            log::warn!("chain super value {} out of range [0, 1], clamping", value);
        }
        self.super_value = clamped;
        for effect in self.effects.iter_mut().flatten() {
            effect.set_meta_parameter(clamped, force);
        }
    }

    /// Route an input channel through this chain. Allocates one state
    /// per loaded effect and output channel and ships them along; a
    /// channel that is already routed is left alone.
    pub fn enable_for_input_channel(&mut self, input: ChannelHandle) {
        if self.routed_inputs.contains(&input) {
            return;
        }
        let per_slot = self
            .effects
            .iter()
            .map(|entry| entry.as_ref().map(EffectSlot::allocate_states))
            .collect();
        self.context
            .submit(EffectsRequestKind::EnableChainForInputChannel {
                rack: self.rack_index,
                chain: self.chain_index,
                channel: input,
                states: Box::new(ChainStatesPayload { per_slot }),
            });
        self.routed_inputs.push(input);
    }

    /// Stop routing an input channel. The audio thread ramps the chain
    /// out and returns the channel's states as garbage afterwards.
    pub fn disable_for_input_channel(&mut self, input: ChannelHandle) {
        let Some(position) = self.routed_inputs.iter().position(|i| *i == input) else {
            return;
        };
        self.routed_inputs.swap_remove(position);
        self.context
            .submit(EffectsRequestKind::DisableChainForInputChannel {
                rack: self.rack_index,
                chain: self.chain_index,
                channel: input,
            });
    }

    /// Unload every effect. Mixing state, the super knob and channel
    /// routing are properties of the slot and stay as they are.
    pub fn clear_effects(&mut self) {
        for slot in 0..self.effects.len() {
            self.unload_effect(slot);
        }
    }

    /// Snapshot the chain's effects for persistence. Mixing state and
    /// the super knob are live-performance state and stay out.
    pub fn to_preset(&self, name: impl Into<String>) -> ChainPreset {
        ChainPreset {
            name: name.into(),
            effects: self
                .effects
                .iter()
                .map(|entry| entry.as_ref().map(EffectSlot::to_preset))
                .collect(),
        }
    }

    /// Load a preset: effects named by the preset are loaded and
    /// configured, slots the preset leaves empty are unloaded.
    pub fn apply_preset(
        &mut self,
        library: &EffectLibrary,
        preset: &ChainPreset,
    ) -> Result<(), EffectsError> {
        let slots = preset.effects.len().max(self.effects.len());
        for slot in 0..slots {
            match preset.effects.get(slot).and_then(Option::as_ref) {
                Some(effect_preset) => {
                    self.load_effect(library, slot, &effect_preset.id)?;
                    if let Some(effect) = self.effect_mut(slot) {
                        effect.apply_preset(effect_preset);
                    }
                }
                None => {
                    self.unload_effect(slot);
                }
            }
        }
        Ok(())
    }

    fn send_chain_parameters(&self) {
        self.context.submit(EffectsRequestKind::SetChainParameters {
            rack: self.rack_index,
            chain: self.chain_index,
            enabled: self.enabled,
            mix: self.mix,
            mix_mode: self.mix_mode,
        });
    }
}
