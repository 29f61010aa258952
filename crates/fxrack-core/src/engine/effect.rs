//! Audio-side effect instance.

use std::sync::Arc;

use crate::channel::{ChannelHandle, ChannelMap, MAX_CHANNELS};
use crate::effect::manifest::EffectManifest;
use crate::effect::processor::{
    BufferParameters, EffectProcessor, EffectState, EnableState, GroupFeatures,
};
use crate::engine::parameter::{ParameterSet, ParameterUpdate};
use crate::error::EffectsError;
use crate::types::StereoBuffer;

/// One [`EffectState`] per output channel.
pub type EffectStatesMap = ChannelMap<Box<dyn EffectState>>;

/// Routing status of one input channel within an effect.
struct ChannelStatus {
    enable_state: EnableState,
    states: EffectStatesMap,
}

/// An effect as it lives on the audio thread: manifest, parameter
/// snapshot, DSP processor and the per-channel states it borrows.
///
/// Constructed entirely on the control thread and shipped across the
/// queue inside an add request. The audio thread mutates it only through
/// index-addressed messages and `process_channel`.
pub struct EngineEffect {
    manifest: Arc<EffectManifest>,
    parameters: ParameterSet,
    processor: Box<dyn EffectProcessor>,
    /// Effect-level toggle; channel routing is tracked separately.
    enabled: bool,
    channels: ChannelMap<ChannelStatus>,
}

impl EngineEffect {
    /// Build the engine-side instance with every parameter at its
    /// manifest default. Fails if the processor expects a parameter the
    /// manifest does not declare.
    pub fn new(
        manifest: Arc<EffectManifest>,
        mut processor: Box<dyn EffectProcessor>,
    ) -> Result<Self, EffectsError> {
        let parameters = ParameterSet::from_manifest(&manifest);
        processor.load_parameters(&parameters)?;
        Ok(Self {
            manifest,
            parameters,
            processor,
            enabled: true,
            channels: ChannelMap::with_channel_capacity(MAX_CHANNELS),
        })
    }

    pub fn manifest(&self) -> &Arc<EffectManifest> {
        &self.manifest
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn update_parameter(&mut self, index: usize, update: &ParameterUpdate) -> bool {
        self.parameters.apply(index, update)
    }

    /// Toggle the effect. Routed channels transition through
    /// `Enabling`/`Disabling` so the next processed buffer ramps.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        for (_, status) in self.channels.iter_mut() {
            status.enable_state = match (enabled, status.enable_state) {
                (true, EnableState::Disabled | EnableState::Disabling) => EnableState::Enabling,
                (false, EnableState::Enabled | EnableState::Enabling) => EnableState::Disabling,
                (_, unchanged) => unchanged,
            };
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Adopt pre-allocated states for a newly routed input channel.
    /// Returns previously installed states, if any, for disposal.
    pub fn enable_for_input_channel(
        &mut self,
        input: ChannelHandle,
        states: EffectStatesMap,
    ) -> Option<EffectStatesMap> {
        let enable_state = if self.enabled {
            EnableState::Enabling
        } else {
            EnableState::Disabled
        };
        self.channels
            .insert(
                input,
                ChannelStatus {
                    enable_state,
                    states,
                },
            )
            .map(|old| old.states)
    }

    /// Drop an input channel's routing, returning its states for
    /// disposal on the control thread.
    pub fn take_states_for_input(&mut self, input: ChannelHandle) -> Option<EffectStatesMap> {
        self.channels.remove(input).map(|status| status.states)
    }

    /// Forward a configuration change to every installed state.
    pub fn reconfigure(&mut self, parameters: &BufferParameters) {
        for (_, status) in self.channels.iter_mut() {
            for (_, state) in status.states.iter_mut() {
                state.reconfigure(parameters);
            }
        }
    }

    /// Process one buffer for one routed (input, output) pair.
    ///
    /// Returns false without touching `output` when the effect is off
    /// for this channel or no state is installed for the pair; the chain
    /// then skips this slot. Missing states mean a routing message was
    /// lost, so the only safe move is to not process.
    pub fn process_channel(
        &mut self,
        input: ChannelHandle,
        output_channel: ChannelHandle,
        input_buffer: &StereoBuffer,
        output_buffer: &mut StereoBuffer,
        buffer_parameters: &BufferParameters,
        group_features: &GroupFeatures,
    ) -> bool {
        let Some(status) = self.channels.get_mut(input) else {
            return false;
        };
        let enable_state = status.enable_state;
        if !enable_state.is_processing() {
            return false;
        }
        let Some(state) = status.states.get_mut(output_channel) else {
            return false;
        };

        output_buffer.set_len_from_capacity(input_buffer.len());
        self.processor.process_channel(
            state.as_mut(),
            &self.parameters,
            input_buffer,
            output_buffer,
            buffer_parameters,
            enable_state,
            group_features,
        );

        // Generic enable crossfade for effects that do not ramp their
        // own wet signal from dry.
        if !self.manifest.ramps_from_dry() {
            let frames = output_buffer.len();
            match enable_state {
                EnableState::Enabling => {
                    for i in 0..frames {
                        let t = (i + 1) as f32 / frames as f32;
                        output_buffer[i] = output_buffer[i] * t + input_buffer[i] * (1.0 - t);
                    }
                }
                EnableState::Disabling => {
                    for i in 0..frames {
                        let t = (i + 1) as f32 / frames as f32;
                        output_buffer[i] = output_buffer[i] * (1.0 - t) + input_buffer[i] * t;
                    }
                }
                _ => {}
            }
        }

        if self.manifest.add_dry_to_wet() {
            for i in 0..output_buffer.len() {
                output_buffer[i] += input_buffer[i];
            }
        }

        status.enable_state = match enable_state {
            EnableState::Enabling => EnableState::Enabled,
            EnableState::Disabling => EnableState::Disabled,
            unchanged => unchanged,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::effect::builtin::gain::GainProcessor;
    use crate::types::{StereoSample, MAX_FRAMES_PER_BUFFER};

    fn routed_effect() -> (EngineEffect, ChannelHandle, ChannelHandle) {
        let mut registry = ChannelRegistry::new();
        let input = registry.register("[Channel1]").unwrap();
        let output = registry.register("[Master]").unwrap();

        let manifest = Arc::new(GainProcessor::manifest());
        let processor = Box::new(GainProcessor::default());
        let mut effect = EngineEffect::new(manifest, processor).unwrap();

        let buffer_parameters = BufferParameters::new(48000, 4);
        let mut states = EffectStatesMap::with_channel_capacity(MAX_CHANNELS);
        states.insert(output, effect_state(&effect, &buffer_parameters));
        effect.enable_for_input_channel(input, states);
        (effect, input, output)
    }

    fn effect_state(
        effect: &EngineEffect,
        parameters: &BufferParameters,
    ) -> Box<dyn crate::effect::processor::EffectState> {
        effect.processor.create_state(parameters)
    }

    fn process_once(
        effect: &mut EngineEffect,
        input: ChannelHandle,
        output: ChannelHandle,
        dry: &StereoBuffer,
    ) -> (bool, StereoBuffer) {
        let mut wet = StereoBuffer::with_capacity(MAX_FRAMES_PER_BUFFER);
        let processed = effect.process_channel(
            input,
            output,
            dry,
            &mut wet,
            &BufferParameters::new(48000, dry.len()),
            &GroupFeatures::default(),
        );
        (processed, wet)
    }

    #[test]
    fn test_missing_state_skips_processing() {
        let (mut effect, input, _output) = routed_effect();
        let mut registry = ChannelRegistry::new();
        registry.register("[Channel1]").unwrap();
        registry.register("[Master]").unwrap();
        let unrouted_output = registry.register("[Headphones]").unwrap();

        let dry = StereoBuffer::silence(4);
        let (processed, _) = process_once(&mut effect, input, unrouted_output, &dry);
        assert!(!processed);
    }

    #[test]
    fn test_enable_ramp_promotes_to_enabled() {
        let (mut effect, input, output) = routed_effect();
        let dry = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 4]);

        // First buffer after routing ramps in (Enabling), unity gain
        // means the crossfade of identical signals is still unity.
        let (processed, wet) = process_once(&mut effect, input, output, &dry);
        assert!(processed);
        assert!((wet[3].left - 1.0).abs() < 1e-6);

        // Second buffer is steady-state Enabled.
        let (processed, wet) = process_once(&mut effect, input, output, &dry);
        assert!(processed);
        assert!((wet[0].left - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_disable_ramps_out_then_skips() {
        let (mut effect, input, output) = routed_effect();
        let dry = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 4]);
        process_once(&mut effect, input, output, &dry);

        effect.set_enabled(false);
        // Disabling buffer still processes (the ramp-out).
        let (processed, _) = process_once(&mut effect, input, output, &dry);
        assert!(processed);
        // After the ramp the channel is Disabled and skipped.
        let (processed, _) = process_once(&mut effect, input, output, &dry);
        assert!(!processed);
    }

    #[test]
    fn test_take_states_returns_them_for_disposal() {
        let (mut effect, input, output) = routed_effect();
        let states = effect.take_states_for_input(input).unwrap();
        assert!(states.get(output).is_some());

        let dry = StereoBuffer::silence(4);
        let (processed, _) = process_once(&mut effect, input, output, &dry);
        assert!(!processed);
    }
}
