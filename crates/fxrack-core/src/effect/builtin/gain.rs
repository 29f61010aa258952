//! Utility gain effect.
//!
//! The simplest possible processor; doubles as the reference
//! implementation of the processor contract and the workhorse of the
//! engine test suite.

use std::any::Any;

use crate::effect::manifest::{EffectManifest, LinkType, ParameterManifest};
use crate::effect::processor::{
    BufferParameters, EffectProcessor, EffectState, EnableState, GroupFeatures,
};
use crate::engine::parameter::ParameterSet;
use crate::error::EffectsError;
use crate::types::StereoBuffer;

use super::RampingValue;

pub struct GainState {
    prev_gain: f64,
}

impl EffectState for GainState {
    fn reconfigure(&mut self, _parameters: &BufferParameters) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct GainProcessor {
    gain_index: usize,
}

impl GainProcessor {
    pub fn manifest() -> EffectManifest {
        EffectManifest::new("org.fxrack.effects.gain", "Gain")
            .with_author("The Fxrack Team")
            .with_version("1.0")
            .with_description("Scales the signal by a constant factor")
            .with_parameter(
                ParameterManifest::new("gain", "Gain")
                    .with_description("Linear gain applied to the signal")
                    .with_range(0.0, 1.0, 2.0)
                    .with_default_link(LinkType::Linked),
            )
    }
}

impl EffectProcessor for GainProcessor {
    fn load_parameters(&mut self, parameters: &ParameterSet) -> Result<(), EffectsError> {
        self.gain_index =
            parameters
                .index_of("gain")
                .ok_or_else(|| EffectsError::MissingParameter {
                    effect: "org.fxrack.effects.gain".into(),
                    parameter: "gain".into(),
                })?;
        Ok(())
    }

    fn create_state(&self, _parameters: &BufferParameters) -> Box<dyn EffectState> {
        Box::new(GainState { prev_gain: 1.0 })
    }

    fn process_channel(
        &mut self,
        state: &mut dyn EffectState,
        parameters: &ParameterSet,
        input: &StereoBuffer,
        output: &mut StereoBuffer,
        _buffer_parameters: &BufferParameters,
        enable_state: EnableState,
        _group_features: &GroupFeatures,
    ) {
        let Some(state) = state.as_any_mut().downcast_mut::<GainState>() else {
            debug_assert!(false, "state type mismatch");
            output.copy_from(input);
            return;
        };

        let gain = parameters.value(self.gain_index);
        let mut ramp = RampingValue::new(gain, state.prev_gain, input.len());
        for i in 0..input.len() {
            output[i] = input[i] * ramp.next();
        }

        if enable_state == EnableState::Disabling {
            state.prev_gain = 1.0;
        } else {
            state.prev_gain = gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn run(gain: f64, frames: usize) -> StereoBuffer {
        let mut processor = GainProcessor::default();
        let manifest = std::sync::Arc::new(GainProcessor::manifest());
        let mut parameters = ParameterSet::from_manifest(&manifest);
        processor.load_parameters(&parameters).unwrap();
        parameters.apply(
            0,
            &crate::engine::parameter::ParameterUpdate {
                value: gain,
                minimum: 0.0,
                maximum: 2.0,
                default_value: 1.0,
            },
        );

        let buffer_parameters = BufferParameters::new(48000, frames);
        let mut state = processor.create_state(&buffer_parameters);
        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); frames]);
        let mut output = StereoBuffer::silence(frames);
        processor.process_channel(
            state.as_mut(),
            &parameters,
            &input,
            &mut output,
            &buffer_parameters,
            EnableState::Enabled,
            &GroupFeatures::default(),
        );
        output
    }

    #[test]
    fn test_steady_gain_after_ramp() {
        let output = run(2.0, 64);
        // The ramp from the initial 1.0 finishes within the buffer.
        assert!((output[63].left - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unity_gain_is_transparent() {
        let output = run(1.0, 16);
        assert!((output[0].left - 0.5).abs() < 1e-6);
        assert!((output[15].right - 0.5).abs() < 1e-6);
    }
}
