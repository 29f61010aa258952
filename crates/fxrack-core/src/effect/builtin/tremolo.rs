//! Tremolo: cycles the volume up and down.

use std::any::Any;
use std::f64::consts::PI;

use crate::effect::manifest::{
    ControlHint, EffectManifest, LinkType, ParameterManifest, UnitsHint,
};
use crate::effect::processor::{
    BufferParameters, EffectProcessor, EffectState, EnableState, GroupFeatures,
};
use crate::engine::parameter::ParameterSet;
use crate::error::EffectsError;
use crate::types::{Sample, StereoBuffer};

// Used to avoid gain discontinuities when changing parameters too fast
const MAX_GAIN_INCREMENT: f64 = 0.001;

pub struct TremoloState {
    current_frame: usize,
    gain: f64,
    quantize_enabled: bool,
    triplet_enabled: bool,
}

impl EffectState for TremoloState {
    fn reconfigure(&mut self, _parameters: &BufferParameters) {
        self.current_frame = 0;
        self.gain = 0.0;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct TremoloProcessor {
    depth_index: usize,
    rate_index: usize,
    width_index: usize,
    waveform_index: usize,
    phase_index: usize,
    quantize_index: usize,
    triplet_index: usize,
}

impl TremoloProcessor {
    pub const ID: &'static str = "org.fxrack.effects.tremolo";

    pub fn manifest() -> EffectManifest {
        EffectManifest::new(Self::ID, "Tremolo")
            .with_author("The Fxrack Team")
            .with_version("1.0")
            .with_description("Cycles the volume up and down")
            .with_metaknob_default(1.0)
            .with_parameter(
                ParameterManifest::new("depth", "Depth")
                    .with_description("How much the effect changes the volume")
                    .with_default_link(LinkType::Linked)
                    .with_range(0.0, 1.0, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("rate", "Rate")
                    .with_description(
                        "Rate of the volume changes\n4 beats - 1/8 beat if tempo is detected\n\
                         1/4 Hz - 8 Hz if no tempo is detected",
                    )
                    .with_hint(ControlHint::KnobLogarithmic)
                    .with_units(UnitsHint::Beats)
                    .with_range(0.25, 1.0, 8.0),
            )
            .with_parameter(
                ParameterManifest::new("width", "Width")
                    .with_description("Width of the volume peak\n10% - 90% of the effect period")
                    .with_range(0.1, 0.5, 0.9),
            )
            .with_parameter(
                ParameterManifest::new("waveform", "Waveform")
                    .with_description(
                        "Shape of the volume modulation wave\n\
                         Fully left: Square wave\nFully right: Sine wave",
                    )
                    .with_hint(ControlHint::KnobLogarithmic)
                    .with_range(0.005, 0.5, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("phase", "Phase")
                    .with_description(
                        "Shifts the position of the volume peak within the period",
                    )
                    .with_range(0.0, 0.0, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("quantize", "Quantize")
                    .with_description(
                        "Round the Rate parameter to the nearest whole division of a beat",
                    )
                    .with_hint(ControlHint::ToggleStepping)
                    .with_range(0.0, 1.0, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("triplet", "Triplets")
                    .with_description(
                        "When the Quantize parameter is enabled, divide the effect period by 3",
                    )
                    .with_hint(ControlHint::ToggleStepping)
                    .with_range(0.0, 0.0, 1.0),
            )
    }
}

impl EffectProcessor for TremoloProcessor {
    fn load_parameters(&mut self, parameters: &ParameterSet) -> Result<(), EffectsError> {
        let index = |id: &str| {
            parameters
                .index_of(id)
                .ok_or_else(|| EffectsError::MissingParameter {
                    effect: Self::ID.into(),
                    parameter: id.into(),
                })
        };
        self.depth_index = index("depth")?;
        self.rate_index = index("rate")?;
        self.width_index = index("width")?;
        self.waveform_index = index("waveform")?;
        self.phase_index = index("phase")?;
        self.quantize_index = index("quantize")?;
        self.triplet_index = index("triplet")?;
        Ok(())
    }

    fn create_state(&self, _parameters: &BufferParameters) -> Box<dyn EffectState> {
        Box::new(TremoloState {
            current_frame: 0,
            gain: 0.0,
            quantize_enabled: false,
            triplet_enabled: false,
        })
    }

    fn process_channel(
        &mut self,
        state: &mut dyn EffectState,
        parameters: &ParameterSet,
        input: &StereoBuffer,
        output: &mut StereoBuffer,
        buffer_parameters: &BufferParameters,
        enable_state: EnableState,
        group_features: &GroupFeatures,
    ) {
        let Some(gs) = state.as_any_mut().downcast_mut::<TremoloState>() else {
            debug_assert!(false, "state type mismatch");
            output.copy_from(input);
            return;
        };

        let width = parameters.value(self.width_index);
        let smooth = parameters.value(self.waveform_index);
        let depth = parameters.value(self.depth_index);
        let quantize = parameters.toggle(self.quantize_index);
        let triplet = parameters.toggle(self.triplet_index);

        let sample_rate = buffer_parameters.sample_rate as f64;
        let mut current_frame = gs.current_frame;
        let mut gain = gs.gain;

        let has_tempo =
            group_features.beat_length_sec.is_some() && group_features.beat_fraction.is_some();

        // Restart the LFO in phase with the beat when the effect kicks in
        // or the quantization mode just changed.
        let quantize_enabling = !gs.quantize_enabled && quantize;
        let triplet_disabling = gs.triplet_enabled && !triplet;
        if enable_state == EnableState::Enabling || quantize_enabling || triplet_disabling {
            current_frame = match (group_features.beat_length_sec, group_features.beat_fraction) {
                (Some(beat_length_sec), Some(beat_fraction)) => {
                    (beat_fraction * beat_length_sec * sample_rate) as usize
                }
                _ => 0,
            };
            gain = 0.0;
        }

        let mut rate = parameters.value(self.rate_index);
        let frames_per_period = if has_tempo {
            if quantize {
                let divider = rate.log2() as i32;
                rate = 2f64.powi(divider);
                if triplet {
                    rate *= 3.0;
                }
            }
            let beat_length_sec = group_features.beat_length_sec.unwrap_or(0.5);
            let frames_per_beat = (beat_length_sec * sample_rate) as usize;
            ((frames_per_beat as f64) / rate) as usize
        } else {
            (sample_rate / rate) as usize
        }
        .max(1);

        let phase_offset_frames =
            (parameters.value(self.phase_index) * frames_per_period as f64) as usize;
        current_frame %= frames_per_period;

        for i in 0..input.len() {
            let position_frame =
                (current_frame + frames_per_period - phase_offset_frames % frames_per_period)
                    % frames_per_period;

            // Relative position (0 to 1) in the period
            let mut position = position_frame as f64 / frames_per_period as f64;

            // Bend the position according to the width parameter.
            // This maps [0 width] to [0 0.5] and [width 1] to [0.5 1].
            if position < width {
                position = 0.5 / width * position;
            } else {
                position = 0.5 + 0.5 * (position - width) / (1.0 - width);
            }

            // From a sine to a square wave depending on the smooth parameter
            let gain_target = 1.0 - (depth / 2.0)
                + (((2.0 * PI * position).sin() / smooth).atan() / (2.0 * (1.0 / smooth).atan()))
                    * depth;

            if gain_target > gain + MAX_GAIN_INCREMENT {
                gain += MAX_GAIN_INCREMENT;
            } else if gain_target < gain - MAX_GAIN_INCREMENT {
                gain -= MAX_GAIN_INCREMENT;
            } else {
                gain = gain_target;
            }

            output[i] = input[i] * gain as Sample;
            current_frame += 1;
        }

        gs.current_frame = current_frame;
        gs.gain = gain;
        gs.quantize_enabled = quantize;
        gs.triplet_enabled = triplet;
    }
}
