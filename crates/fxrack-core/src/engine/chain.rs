//! Audio-side effect chain.

use crate::channel::{ChannelHandle, ChannelMap, MAX_CHANNELS};
use crate::effect::processor::{BufferParameters, EnableState, GroupFeatures};
use crate::engine::effect::EngineEffect;
use crate::engine::message::ChainStatesPayload;
use crate::engine::parameter::ParameterUpdate;
use crate::types::{StereoBuffer, MAX_FRAMES_PER_BUFFER};

/// Hard cap on effect slots per chain. The slot table is pre-sized to
/// this on the control thread so installing an effect never grows it on
/// the audio thread.
pub const MAX_EFFECTS_PER_CHAIN: usize = 16;

/// How the chain combines its wet output with the dry input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Crossfade: dry * (1 - mix) + wet * mix
    #[default]
    DrySlashWet,
    /// Additive: dry + wet * mix
    DryPlusWet,
}

/// Routing status of one input channel within a chain.
struct ChainChannel {
    enable_state: EnableState,
    /// This channel's view of the chain-level toggle. Tracked per
    /// channel so every routed input plays the enable ramp, not just
    /// the first one processed in a callback.
    chain_state: EnableState,
    /// Mix level at the end of this channel's previous buffer.
    prev_mix: f64,
    /// Set when a ramp-out finished and the effects' states for this
    /// channel are waiting to be collected into a disposal.
    collect_after_ramp: bool,
}

/// An ordered list of effect slots with dry/wet mixing, as it lives on
/// the audio thread.
///
/// Slots keep their positions: removing an effect leaves a `None`
/// placeholder so slot indices in queued messages stay valid.
pub struct EngineEffectChain {
    effects: Vec<Option<Box<EngineEffect>>>,
    channels: ChannelMap<ChainChannel>,
    enabled: bool,
    mix: f64,
    mix_mode: MixMode,
    scratch_in: StereoBuffer,
    scratch_out: StereoBuffer,
}

impl EngineEffectChain {
    /// Build a chain with empty slots and pre-allocated scratch buffers.
    /// Control thread only.
    pub fn new() -> Self {
        let mut effects = Vec::with_capacity(MAX_EFFECTS_PER_CHAIN);
        effects.resize_with(MAX_EFFECTS_PER_CHAIN, || None);
        Self {
            effects,
            channels: ChannelMap::with_channel_capacity(MAX_CHANNELS),
            enabled: true,
            mix: 1.0,
            mix_mode: MixMode::default(),
            scratch_in: StereoBuffer::with_capacity(MAX_FRAMES_PER_BUFFER),
            scratch_out: StereoBuffer::with_capacity(MAX_FRAMES_PER_BUFFER),
        }
    }

    /// Install an effect. On an occupied or out-of-range slot the effect
    /// comes back to the caller for disposal.
    pub fn add_effect(
        &mut self,
        slot: usize,
        effect: Box<EngineEffect>,
    ) -> Result<(), Box<EngineEffect>> {
        match self.effects.get_mut(slot) {
            Some(entry @ None) => {
                *entry = Some(effect);
                Ok(())
            }
            _ => Err(effect),
        }
    }

    pub fn remove_effect(&mut self, slot: usize) -> Option<Box<EngineEffect>> {
        self.effects.get_mut(slot).and_then(Option::take)
    }

    pub fn effect_mut(&mut self, slot: usize) -> Option<&mut EngineEffect> {
        self.effects
            .get_mut(slot)
            .and_then(|entry| entry.as_deref_mut())
    }

    pub fn set_parameters(&mut self, enabled: bool, mix: f64, mix_mode: MixMode) {
        if enabled != self.enabled {
            self.enabled = enabled;
            for (_, channel) in self.channels.iter_mut() {
                channel.chain_state = match (enabled, channel.chain_state) {
                    (true, EnableState::Disabled | EnableState::Disabling) => EnableState::Enabling,
                    (false, EnableState::Enabled | EnableState::Enabling) => {
                        EnableState::Disabling
                    }
                    (_, unchanged) => unchanged,
                };
            }
        }
        self.mix = mix;
        self.mix_mode = mix_mode;
    }

    /// Route an input channel through this chain, handing each loaded
    /// effect its pre-allocated states. Idempotent: enabling an already
    /// routed channel succeeds and returns the unused payload for
    /// disposal.
    pub fn enable_for_input_channel(
        &mut self,
        input: ChannelHandle,
        mut states: ChainStatesPayload,
    ) -> Option<ChainStatesPayload> {
        if let Some(channel) = self.channels.get_mut(input) {
            // A channel whose ramp-out is still pending falls through and
            // is re-routed with the fresh states; otherwise the payload
            // would be disposed while the collection removes the channel.
            if channel.enable_state.is_processing() && !channel.collect_after_ramp {
                return Some(states);
            }
        }
        for (slot, entry) in states.per_slot.iter_mut().enumerate() {
            if let (Some(Some(effect)), Some(slot_states)) =
                (self.effects.get_mut(slot), entry.take())
            {
                if let Some(old) = effect.enable_for_input_channel(input, slot_states) {
                    // Stale states from a lost disable; send them back.
                    *entry = Some(old);
                }
            }
        }
        self.channels.insert(
            input,
            ChainChannel {
                enable_state: EnableState::Enabling,
                chain_state: if self.enabled {
                    EnableState::Enabled
                } else {
                    EnableState::Disabled
                },
                prev_mix: self.mix,
                collect_after_ramp: false,
            },
        );
        if states.per_slot.iter().any(Option::is_some) {
            Some(states)
        } else {
            None
        }
    }

    /// Start a ramp-out for an input channel. The states stay installed
    /// for the final buffer and are collected afterwards. Idempotent.
    pub fn disable_for_input_channel(&mut self, input: ChannelHandle) {
        if let Some(channel) = self.channels.get_mut(input) {
            if channel.enable_state.is_processing() {
                channel.enable_state = EnableState::Disabling;
                channel.collect_after_ramp = true;
            }
        }
    }

    /// Collect states for channels whose ramp-out completed, invoking
    /// `dispose` once per such channel.
    pub fn collect_disposed_states(&mut self, dispose: &mut dyn FnMut(ChainStatesPayload)) {
        let mut done: Option<ChannelHandle> = None;
        loop {
            for (handle, channel) in self.channels.iter() {
                if channel.collect_after_ramp && channel.enable_state == EnableState::Disabled {
                    done = Some(handle);
                    break;
                }
            }
            let Some(input) = done.take() else {
                return;
            };
            self.channels.remove(input);
            let per_slot = self
                .effects
                .iter_mut()
                .map(|entry| {
                    entry
                        .as_deref_mut()
                        .and_then(|effect| effect.take_states_for_input(input))
                })
                .collect();
            dispose(ChainStatesPayload { per_slot });
        }
    }

    pub fn set_effect_enabled(&mut self, slot: usize, enabled: bool) -> bool {
        match self.effect_mut(slot) {
            Some(effect) => {
                effect.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn update_parameter(
        &mut self,
        slot: usize,
        parameter: usize,
        update: &ParameterUpdate,
    ) -> bool {
        match self.effect_mut(slot) {
            Some(effect) => effect.update_parameter(parameter, update),
            None => false,
        }
    }

    pub fn reconfigure(&mut self, parameters: &BufferParameters) {
        for effect in self.effects.iter_mut().flatten() {
            effect.reconfigure(parameters);
        }
    }

    /// Process one buffer in place for one (input, output) pair.
    ///
    /// Returns false when the chain is not routing this input or no
    /// effect produced output; in either case the buffer is untouched
    /// (an empty chain must not re-mix dry with dry).
    pub fn process_channel(
        &mut self,
        input: ChannelHandle,
        output: ChannelHandle,
        buffer: &mut StereoBuffer,
        buffer_parameters: &BufferParameters,
        group_features: &GroupFeatures,
    ) -> bool {
        let Some(channel) = self.channels.get(input) else {
            return false;
        };
        let channel_state = channel.enable_state;
        let chain_state = channel.chain_state;
        let prev_mix = channel.prev_mix;
        let effective = combine_states(chain_state, channel_state);
        if !effective.is_processing() {
            return false;
        }

        // Run every loaded effect, ping-ponging between scratch buffers.
        self.scratch_in.copy_from(buffer);
        let mut any_processed = false;
        for effect in self.effects.iter_mut().flatten() {
            if effect.process_channel(
                input,
                output,
                &self.scratch_in,
                &mut self.scratch_out,
                buffer_parameters,
                group_features,
            ) {
                std::mem::swap(&mut self.scratch_in, &mut self.scratch_out);
                any_processed = true;
            }
        }

        let mut new_prev_mix = prev_mix;
        if any_processed {
            let (start_mix, end_mix) = match effective {
                EnableState::Enabling => (0.0, self.mix),
                EnableState::Disabling => (prev_mix, 0.0),
                _ => (prev_mix, self.mix),
            };
            let frames = buffer.len();
            for i in 0..frames {
                let t = (i + 1) as f64 / frames as f64;
                let m = (start_mix + (end_mix - start_mix) * t) as f32;
                let dry = buffer[i];
                let wet = self.scratch_in[i];
                buffer[i] = match self.mix_mode {
                    MixMode::DrySlashWet => dry * (1.0 - m) + wet * m,
                    MixMode::DryPlusWet => dry + wet * m,
                };
            }
            new_prev_mix = end_mix;
        }

        if let Some(channel) = self.channels.get_mut(input) {
            channel.enable_state = promote(channel_state);
            channel.chain_state = promote(chain_state);
            channel.prev_mix = new_prev_mix;
        }
        any_processed
    }
}

impl Default for EngineEffectChain {
    fn default() -> Self {
        Self::new()
    }
}

fn combine_states(chain: EnableState, channel: EnableState) -> EnableState {
    use EnableState::*;
    match (chain, channel) {
        (Disabled, _) | (_, Disabled) => Disabled,
        (Disabling, _) | (_, Disabling) => Disabling,
        (Enabling, _) | (_, Enabling) => Enabling,
        (Enabled, Enabled) => Enabled,
    }
}

fn promote(state: EnableState) -> EnableState {
    match state {
        EnableState::Enabling => EnableState::Enabled,
        EnableState::Disabling => EnableState::Disabled,
        unchanged => unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::effect::builtin::gain::GainProcessor;
    use crate::engine::effect::EffectStatesMap;
    use crate::types::StereoSample;
    use std::sync::Arc;

    fn handles() -> (ChannelHandle, ChannelHandle) {
        let mut registry = ChannelRegistry::new();
        let input = registry.register("[Channel1]").unwrap();
        let output = registry.register("[Master]").unwrap();
        (input, output)
    }

    fn gain_effect() -> Box<EngineEffect> {
        Box::new(
            EngineEffect::new(
                Arc::new(GainProcessor::manifest()),
                Box::new(GainProcessor::default()),
            )
            .unwrap(),
        )
    }

    fn states_for(chain: &EngineEffectChain, output: ChannelHandle) -> ChainStatesPayload {
        let parameters = BufferParameters::new(48000, 4);
        let per_slot = chain
            .effects
            .iter()
            .map(|entry| {
                entry.as_deref().map(|effect| {
                    let mut map = EffectStatesMap::with_channel_capacity(MAX_CHANNELS);
                    map.insert(output, GainProcessor::default().create_state(&parameters));
                    map
                })
            })
            .collect();
        ChainStatesPayload { per_slot }
    }

    fn run(
        chain: &mut EngineEffectChain,
        input: ChannelHandle,
        output: ChannelHandle,
        buffer: &mut StereoBuffer,
    ) -> bool {
        chain.process_channel(
            input,
            output,
            buffer,
            &BufferParameters::new(48000, buffer.len()),
            &GroupFeatures::default(),
        )
    }

    use crate::effect::processor::EffectProcessor;

    #[test]
    fn test_unrouted_channel_is_skipped() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(!run(&mut chain, input, output, &mut buffer));
        assert_eq!(buffer[0], StereoSample::mono(0.5));
    }

    #[test]
    fn test_empty_chain_leaves_buffer_untouched() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        let payload = chain.enable_for_input_channel(input, states_for(&chain, output));
        assert!(payload.is_none());

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(!run(&mut chain, input, output, &mut buffer));
        assert_eq!(buffer[0], StereoSample::mono(0.5));
    }

    #[test]
    fn test_slot_positions_survive_removal() {
        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());
        assert!(chain.add_effect(2, gain_effect()).is_ok());
        assert!(chain.remove_effect(0).is_some());
        // Slot 2 is still addressable at its old index.
        assert!(chain.effect_mut(2).is_some());
        assert!(chain.effect_mut(0).is_none());
        // Occupied slots reject double insertion.
        assert!(chain.add_effect(2, gain_effect()).is_err());
    }

    #[test]
    fn test_enable_is_idempotent() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());

        assert!(chain
            .enable_for_input_channel(input, states_for(&chain, output))
            .is_none());
        // Second enable returns the whole unused payload for disposal.
        let returned = chain.enable_for_input_channel(input, states_for(&chain, output));
        assert!(returned.is_some());
        assert!(returned.unwrap().per_slot[0].is_some());
    }

    #[test]
    fn test_disable_ramp_then_state_collection() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());
        chain.enable_for_input_channel(input, states_for(&chain, output));

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, input, output, &mut buffer));

        chain.disable_for_input_channel(input);
        // Nothing to collect until the ramp-out buffer ran.
        let mut collected = 0;
        chain.collect_disposed_states(&mut |_| collected += 1);
        assert_eq!(collected, 0);

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, input, output, &mut buffer));

        chain.collect_disposed_states(&mut |payload| {
            assert!(payload.per_slot[0].is_some());
            collected += 1;
        });
        assert_eq!(collected, 1);

        // Disable of an unrouted channel stays a no-op.
        chain.disable_for_input_channel(input);
        chain.collect_disposed_states(&mut |_| collected += 1);
        assert_eq!(collected, 1);
    }

    #[test]
    fn test_reenable_during_ramp_out_keeps_channel_routed() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());
        chain.enable_for_input_channel(input, states_for(&chain, output));

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, input, output, &mut buffer));

        // Disable and re-enable before the ramp-out buffer runs. The
        // superseded states come back for disposal and the channel stays
        // routed with the fresh ones.
        chain.disable_for_input_channel(input);
        let superseded = chain.enable_for_input_channel(input, states_for(&chain, output));
        assert!(superseded.is_some());
        assert!(superseded.unwrap().per_slot[0].is_some());

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, input, output, &mut buffer));
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, input, output, &mut buffer));

        // Nothing was left pending collection.
        let mut collected = 0;
        chain.collect_disposed_states(&mut |_| collected += 1);
        assert_eq!(collected, 0);
    }

    #[test]
    fn test_each_channel_plays_its_own_mix_ramp() {
        let mut registry = ChannelRegistry::new();
        let deck1 = registry.register("[Channel1]").unwrap();
        let deck2 = registry.register("[Channel2]").unwrap();
        let output = registry.register("[Master]").unwrap();

        let mut chain = EngineEffectChain::new();
        let mut effect = gain_effect();
        let gain_index = effect.parameters().index_of("gain").unwrap();
        effect.update_parameter(
            gain_index,
            &ParameterUpdate {
                value: 2.0,
                minimum: 0.0,
                maximum: 2.0,
                default_value: 1.0,
            },
        );
        assert!(chain.add_effect(0, effect).is_ok());
        chain.enable_for_input_channel(deck1, states_for(&chain, output));
        chain.enable_for_input_channel(deck2, states_for(&chain, output));

        // Bring both channels to steady state at full wet.
        for input in [deck1, deck2] {
            let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
            run(&mut chain, input, output, &mut buffer);
            let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
            run(&mut chain, input, output, &mut buffer);
        }

        // Halve the mix. Both channels ramp from their own previous
        // level; the second one processed must not jump.
        chain.set_parameters(true, 0.5, MixMode::DrySlashWet);
        let mut first = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        run(&mut chain, deck1, output, &mut first);
        let mut second = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        run(&mut chain, deck2, output, &mut second);

        // Frame 0 of a 4-frame buffer ramping 1.0 -> 0.5: m = 0.875,
        // dry 0.5, wet 1.0.
        let expected = 0.5 * (1.0 - 0.875) + 1.0 * 0.875;
        assert!((first[0].left - expected).abs() < 1e-5);
        assert!((second[0].left - expected).abs() < 1e-5);
    }

    #[test]
    fn test_chain_disable_ramps_every_channel_out() {
        let mut registry = ChannelRegistry::new();
        let deck1 = registry.register("[Channel1]").unwrap();
        let deck2 = registry.register("[Channel2]").unwrap();
        let output = registry.register("[Master]").unwrap();

        let mut chain = EngineEffectChain::new();
        assert!(chain.add_effect(0, gain_effect()).is_ok());
        chain.enable_for_input_channel(deck1, states_for(&chain, output));
        chain.enable_for_input_channel(deck2, states_for(&chain, output));
        for input in [deck1, deck2] {
            let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
            run(&mut chain, input, output, &mut buffer);
        }

        chain.set_parameters(false, 1.0, MixMode::DrySlashWet);
        // Every routed channel still gets its own ramp-out buffer, even
        // after another channel's ramp already finished.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, deck1, output, &mut buffer));
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(run(&mut chain, deck2, output, &mut buffer));
        // Then both are off.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(!run(&mut chain, deck1, output, &mut buffer));
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]);
        assert!(!run(&mut chain, deck2, output, &mut buffer));
    }

    #[test]
    fn test_dry_slash_wet_mix() {
        let (input, output) = handles();
        let mut chain = EngineEffectChain::new();
        let mut effect = gain_effect();
        // Double the signal so wet differs from dry.
        let gain_index = effect.parameters().index_of("gain").unwrap();
        effect.update_parameter(
            gain_index,
            &ParameterUpdate {
                value: 2.0,
                minimum: 0.0,
                maximum: 2.0,
                default_value: 1.0,
            },
        );
        assert!(chain.add_effect(0, effect).is_ok());
        chain.enable_for_input_channel(input, states_for(&chain, output));
        chain.set_parameters(true, 0.5, MixMode::DrySlashWet);

        // First buffer ramps in; run a second for steady state.
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 8]);
        run(&mut chain, input, output, &mut buffer);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 8]);
        run(&mut chain, input, output, &mut buffer);

        // dry 0.5, wet 1.0, mix 0.5 -> 0.75
        assert!((buffer[7].left - 0.75).abs() < 1e-5);
    }
}
