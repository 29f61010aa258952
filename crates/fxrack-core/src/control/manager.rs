//! Control-side entry point of the effects framework.
//!
//! Owns the effect library, the channel registry and the racks, and
//! holds the audio-side [`EngineEffectsManager`] until the host's audio
//! thread takes it. Everything reaches the audio thread through the
//! shared [`EffectsContext`].

use std::rc::Rc;

use crate::channel::{ChannelHandle, ChannelRegistry};
use crate::control::messenger::{EffectsContext, EffectsMessenger};
use crate::control::rack::EffectRack;
use crate::effect::backend::EffectLibrary;
use crate::effect::processor::BufferParameters;
use crate::engine::manager::{EngineEffectsManager, MAX_RACKS};
use crate::engine::message::{request_channel, response_channel, EffectsRequestKind};
use crate::engine::rack::NUM_CHAINS_PER_RACK;
use crate::error::EffectsError;
use crate::preset::ChainPreset;

pub struct EffectsManager {
    context: Rc<EffectsContext>,
    library: EffectLibrary,
    registry: ChannelRegistry,
    input_channels: Vec<ChannelHandle>,
    racks: Vec<EffectRack>,
    /// The audio-side endpoint, held until the audio thread claims it.
    engine: Option<EngineEffectsManager>,
}

impl EffectsManager {
    pub fn new(library: EffectLibrary) -> Self {
        let (request_tx, request_rx) = request_channel();
        let (response_tx, response_rx) = response_channel();
        let engine = EngineEffectsManager::new(request_rx, response_tx);
        let messenger = EffectsMessenger::new(request_tx, response_rx);
        Self {
            context: EffectsContext::new(messenger),
            library,
            registry: ChannelRegistry::new(),
            input_channels: Vec::new(),
            racks: Vec::new(),
            engine: Some(engine),
        }
    }

    /// Hand the audio-side endpoint to the audio thread. Yields once.
    pub fn take_engine(&mut self) -> Option<EngineEffectsManager> {
        self.engine.take()
    }

    pub fn library(&self) -> &EffectLibrary {
        &self.library
    }

    pub fn channel_registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Register a processable input channel (deck, microphone, aux).
    /// Channels register at startup, before any rack exists.
    pub fn register_input_channel(&mut self, group: &str) -> Result<ChannelHandle, EffectsError> {
        let handle = self.registry.register(group)?;
        self.input_channels.push(handle);
        Ok(handle)
    }

    /// Register an output channel (master, headphones, booth). Every
    /// routed input gets one effect state per output channel.
    pub fn register_output_channel(&mut self, group: &str) -> Result<ChannelHandle, EffectsError> {
        let handle = self.registry.register(group)?;
        self.context.add_output_channel(handle);
        Ok(handle)
    }

    /// Add a rack whose chains are pre-routed one-per-input-channel.
    /// Returns the rack index.
    pub fn add_standard_rack(&mut self) -> Result<usize, EffectsError> {
        let rack_index = self.racks.len();
        if rack_index >= MAX_RACKS {
            return Err(EffectsError::SlotOutOfRange {
                slot: rack_index,
                capacity: MAX_RACKS,
            });
        }
        self.racks.push(EffectRack::new(
            Rc::clone(&self.context),
            rack_index,
            &self.input_channels,
        ));
        Ok(rack_index)
    }

    pub fn num_racks(&self) -> usize {
        self.racks.len()
    }

    pub fn rack(&self, rack: usize) -> Option<&EffectRack> {
        self.racks.get(rack)
    }

    pub fn rack_mut(&mut self, rack: usize) -> Option<&mut EffectRack> {
        self.racks.get_mut(rack)
    }

    /// Load an effect from the library into a chain slot.
    pub fn load_effect(
        &mut self,
        rack: usize,
        chain: usize,
        slot: usize,
        effect_id: &str,
    ) -> Result<(), EffectsError> {
        let library = &self.library;
        let chain_slot = self
            .racks
            .get_mut(rack)
            .and_then(|r| r.chain_mut(chain))
            .ok_or(EffectsError::SlotOutOfRange {
                slot: chain,
                capacity: NUM_CHAINS_PER_RACK,
            })?;
        chain_slot.load_effect(library, slot, effect_id)
    }

    /// Load an effect from the library into the chain's first empty
    /// slot. Returns the slot used.
    pub fn add_effect(
        &mut self,
        rack: usize,
        chain: usize,
        effect_id: &str,
    ) -> Result<usize, EffectsError> {
        let library = &self.library;
        let chain_slot = self
            .racks
            .get_mut(rack)
            .and_then(|r| r.chain_mut(chain))
            .ok_or(EffectsError::SlotOutOfRange {
                slot: chain,
                capacity: NUM_CHAINS_PER_RACK,
            })?;
        chain_slot.add_effect(library, effect_id)
    }

    /// Snapshot a chain into a preset.
    pub fn save_chain_preset(
        &self,
        rack: usize,
        chain: usize,
        name: impl Into<String>,
    ) -> Option<ChainPreset> {
        self.racks
            .get(rack)
            .and_then(|r| r.chain(chain))
            .map(|c| c.to_preset(name))
    }

    /// Load a preset into a chain.
    pub fn apply_chain_preset(
        &mut self,
        rack: usize,
        chain: usize,
        preset: &ChainPreset,
    ) -> Result<(), EffectsError> {
        let library = &self.library;
        let chain_slot = self
            .racks
            .get_mut(rack)
            .and_then(|r| r.chain_mut(chain))
            .ok_or(EffectsError::SlotOutOfRange {
                slot: chain,
                capacity: NUM_CHAINS_PER_RACK,
            })?;
        chain_slot.apply_preset(library, preset)
    }

    /// Propagate a new audio configuration to the audio thread; every
    /// installed effect state gets reconfigured before its next use.
    pub fn set_buffer_parameters(&mut self, parameters: BufferParameters) {
        self.context.set_buffer_parameters(parameters);
        self.context
            .submit(EffectsRequestKind::UpdateBufferParameters { parameters });
    }

    /// Pump responses from the audio thread. Call periodically from the
    /// control thread's event loop.
    pub fn process_responses(&mut self) -> usize {
        self.context.process_responses()
    }

    pub fn in_flight(&self) -> usize {
        self.context.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::processor::GroupFeatures;
    use crate::types::{StereoBuffer, StereoSample};

    const GAIN: &str = "org.fxrack.effects.gain";
    const ECHO: &str = "org.fxrack.effects.echo";

    fn session() -> (EffectsManager, EngineEffectsManager, ChannelHandle, ChannelHandle) {
        let mut manager = EffectsManager::new(EffectLibrary::with_builtins());
        let deck = manager.register_input_channel("[Channel1]").unwrap();
        let master = manager.register_output_channel("[Master]").unwrap();
        let engine = manager.take_engine().unwrap();
        (manager, engine, deck, master)
    }

    #[test]
    fn test_full_session_roundtrip() {
        let (mut manager, mut engine, deck, master) = session();

        let rack = manager.add_standard_rack().unwrap();
        manager.load_effect(rack, 0, 0, GAIN).unwrap();
        manager
            .rack_mut(rack)
            .unwrap()
            .chain_mut(0)
            .unwrap()
            .effect_mut(0)
            .unwrap()
            .set_knob_value(0, 2.0)
            .unwrap();

        engine.drain_requests();
        manager.process_responses();
        assert_eq!(manager.in_flight(), 0);

        // First buffer ramps the chain and effect in.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        // Second buffer is steady state: 0.25 * 2.0 at full wet.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        assert!((buffer[63].left - 0.5).abs() < 1e-5);

        // Un-route the deck: one ramp-out buffer, then the channel's
        // states come back as a stand-alone garbage response.
        manager
            .rack_mut(rack)
            .unwrap()
            .chain_mut(0)
            .unwrap()
            .disable_for_input_channel(deck);
        engine.drain_requests();
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        engine.drain_requests();

        // Disable ack plus the garbage disposal.
        assert_eq!(manager.process_responses(), 2);
        assert_eq!(manager.in_flight(), 0);

        // The channel is no longer processed.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        assert!((buffer[0].left - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_slot_placeholders_survive_replacement() {
        let (mut manager, mut engine, _deck, _master) = session();
        let rack = manager.add_standard_rack().unwrap();

        manager.load_effect(rack, 0, 3, GAIN).unwrap();
        let chain = manager.rack(rack).unwrap().chain(0).unwrap();
        assert_eq!(chain.num_effect_slots(), 4);

        // Loading beyond the visible slots grows the list with empty
        // placeholders; earlier indices do not shift.
        manager.load_effect(rack, 0, 5, ECHO).unwrap();
        let chain = manager.rack(rack).unwrap().chain(0).unwrap();
        assert_eq!(chain.num_effect_slots(), 6);
        assert!(chain.effect(4).is_none());
        assert_eq!(chain.effect(3).unwrap().manifest().id(), GAIN);
        assert_eq!(chain.effect(5).unwrap().manifest().id(), ECHO);

        // Replacing a loaded slot unloads the old effect first.
        manager.load_effect(rack, 0, 3, ECHO).unwrap();
        let chain = manager.rack(rack).unwrap().chain(0).unwrap();
        assert_eq!(chain.effect(3).unwrap().manifest().id(), ECHO);

        // All structural requests go through cleanly.
        engine.drain_requests();
        manager.process_responses();
        assert_eq!(manager.in_flight(), 0);

        // Slots beyond the chain capacity are refused.
        let result = manager.load_effect(rack, 0, 99, GAIN);
        assert!(matches!(result, Err(EffectsError::SlotOutOfRange { .. })));
    }

    #[test]
    fn test_reroute_in_one_batch_keeps_audio_flowing() {
        let (mut manager, mut engine, deck, master) = session();
        let rack = manager.add_standard_rack().unwrap();
        manager.load_effect(rack, 0, 0, GAIN).unwrap();
        manager
            .rack_mut(rack)
            .unwrap()
            .chain_mut(0)
            .unwrap()
            .effect_mut(0)
            .unwrap()
            .set_knob_value(0, 2.0)
            .unwrap();

        // Un-route and re-route the deck before the audio thread runs.
        let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
        chain.disable_for_input_channel(deck);
        chain.enable_for_input_channel(deck);

        engine.drain_requests();
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 64]);
        engine.process_in_place(deck, master, &mut buffer, &GroupFeatures::default());
        // Still routed: 0.25 through a 2x gain at full wet.
        assert!((buffer[63].left - 0.5).abs() < 1e-5);

        engine.drain_requests();
        manager.process_responses();
        assert_eq!(manager.in_flight(), 0);
        // No ramp-out stayed pending, so no garbage is owed.
        assert_eq!(manager.process_responses(), 0);
    }

    #[test]
    fn test_add_effect_takes_first_empty_slot() {
        let (mut manager, _engine, _deck, _master) = session();
        let rack = manager.add_standard_rack().unwrap();

        assert_eq!(manager.add_effect(rack, 0, GAIN).unwrap(), 0);
        manager.load_effect(rack, 0, 2, ECHO).unwrap();
        assert_eq!(manager.add_effect(rack, 0, ECHO).unwrap(), 1);
        assert_eq!(manager.add_effect(rack, 0, GAIN).unwrap(), 3);
        // All visible slots occupied: the list grows by one.
        assert_eq!(manager.add_effect(rack, 0, GAIN).unwrap(), 4);
        let chain = manager.rack(rack).unwrap().chain(0).unwrap();
        assert_eq!(chain.num_effect_slots(), 5);
        assert_eq!(chain.effect(2).unwrap().manifest().id(), ECHO);
    }

    #[test]
    fn test_out_of_range_parameter_indices_are_refused() {
        let (mut manager, _engine, _deck, _master) = session();
        let rack = manager.add_standard_rack().unwrap();
        manager.load_effect(rack, 0, 0, GAIN).unwrap();

        let effect = manager
            .rack_mut(rack)
            .unwrap()
            .chain_mut(0)
            .unwrap()
            .effect_mut(0)
            .unwrap();
        assert!(matches!(
            effect.set_knob_value(99, 1.0),
            Err(EffectsError::SlotOutOfRange { .. })
        ));
        assert!(matches!(
            effect.set_button_value(99, 1.0),
            Err(EffectsError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn test_chain_preset_roundtrip_excludes_mix_state() {
        let (mut manager, mut engine, _deck, _master) = session();
        let rack = manager.add_standard_rack().unwrap();
        manager.load_effect(rack, 0, 0, ECHO).unwrap();

        {
            let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
            chain.set_mix(0.3);
            let effect = chain.effect_mut(0).unwrap();
            effect.set_meta_parameter(0.8, true);
        }
        let preset = manager.save_chain_preset(rack, 0, "dub").unwrap();
        assert_eq!(preset.effects[0].as_ref().unwrap().id, ECHO);
        assert_eq!(preset.effects[0].as_ref().unwrap().meta, 0.8);

        // Change live state, then restore the preset into another chain.
        manager
            .rack_mut(rack)
            .unwrap()
            .chain_mut(1)
            .unwrap()
            .set_mix(0.9);
        manager.apply_chain_preset(rack, 1, &preset).unwrap();

        let chain = manager.rack(rack).unwrap().chain(1).unwrap();
        assert_eq!(chain.effect(0).unwrap().manifest().id(), ECHO);
        assert_eq!(chain.effect(0).unwrap().meta_parameter(), 0.8);
        // Mixing state is not part of the preset.
        assert_eq!(chain.mix(), 0.9);

        engine.drain_requests();
        manager.process_responses();
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn test_routing_is_idempotent_on_the_control_side() {
        let mut manager = EffectsManager::new(EffectLibrary::with_builtins());
        let deck1 = manager.register_input_channel("[Channel1]").unwrap();
        let deck2 = manager.register_input_channel("[Channel2]").unwrap();
        manager.register_output_channel("[Master]").unwrap();
        let _engine = manager.take_engine().unwrap();
        let rack = manager.add_standard_rack().unwrap();

        // Chain 0 is already routed to deck 1; routing deck 2 as well
        // issues exactly one request no matter how often it is asked.
        let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
        assert_eq!(chain.routed_inputs(), &[deck1]);
        let before = manager.in_flight();
        let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
        chain.enable_for_input_channel(deck2);
        chain.enable_for_input_channel(deck2);
        assert_eq!(manager.in_flight(), before + 1);

        let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
        chain.disable_for_input_channel(deck2);
        chain.disable_for_input_channel(deck2);
        assert_eq!(manager.in_flight(), before + 2);
    }

    #[test]
    fn test_mix_and_super_clamp_to_unit_range() {
        let (mut manager, _engine, _deck, _master) = session();
        let rack = manager.add_standard_rack().unwrap();

        let before = manager.in_flight();
        let chain = manager.rack_mut(rack).unwrap().chain_mut(0).unwrap();
        chain.set_mix(1.5);
        assert_eq!(chain.mix(), 1.0);
        chain.set_super_parameter(-0.2, true);
        assert_eq!(chain.super_parameter(), 0.0);
        // One set-chain-parameters request; the super knob only fans out
        // to loaded effects, of which there are none.
        assert_eq!(manager.in_flight(), before + 1);
    }

    #[test]
    fn test_rack_capacity_is_bounded() {
        let (mut manager, _engine, _deck, _master) = session();
        for _ in 0..MAX_RACKS {
            manager.add_standard_rack().unwrap();
        }
        assert!(matches!(
            manager.add_standard_rack(),
            Err(EffectsError::SlotOutOfRange { .. })
        ));
    }
}
