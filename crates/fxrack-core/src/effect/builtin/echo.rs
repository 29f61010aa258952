//! Beat-synced stereo echo with ping-pong.

use std::any::Any;

use crate::effect::manifest::{
    ControlHint, EffectManifest, LinkType, ParameterManifest, UnitsHint,
};
use crate::effect::processor::{
    BufferParameters, EffectProcessor, EffectState, EnableState, GroupFeatures,
};
use crate::engine::parameter::ParameterSet;
use crate::error::EffectsError;
use crate::types::{Sample, StereoBuffer, StereoSample};

use super::RampingValue;

const MAX_DELAY_SECONDS: usize = 3;
/// Delay buffers are sized for the highest supported rate so a sample
/// rate change never requires the audio thread to reallocate.
const MAX_SUPPORTED_SAMPLE_RATE: usize = 192000;

/// Shortest delay, in beats or seconds depending on tempo availability.
const MIN_PERIOD: f64 = 1.0 / 8.0;

fn db_to_ratio(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

fn round_to_fraction(value: f64, denominator: f64) -> f64 {
    (value * denominator).round() / denominator
}

pub struct EchoState {
    delay_buf: Vec<StereoSample>,
    write_position: usize,
    ping_pong: usize,
    /// Send level at the end of the previous buffer; `None` until the
    /// state has processed one.
    prev_send: Option<f64>,
    prev_feedback: f64,
    prev_delay_frames: usize,
}

impl EchoState {
    fn clear(&mut self) {
        self.delay_buf.fill(StereoSample::silence());
        self.write_position = 0;
        self.ping_pong = 0;
        self.prev_delay_frames = 0;
    }
}

impl EffectState for EchoState {
    fn reconfigure(&mut self, _parameters: &BufferParameters) {
        // Delay positions are in frames, so a rate change moves the
        // echoes in time; restarting cleanly beats a pitch-shifted tail.
        self.clear();
        self.prev_send = None;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct EchoProcessor {
    delay_index: usize,
    feedback_index: usize,
    pingpong_index: usize,
    send_index: usize,
    quantize_index: usize,
    triplet_index: usize,
}

impl EchoProcessor {
    pub const ID: &'static str = "org.fxrack.effects.echo";

    pub fn manifest() -> EffectManifest {
        EffectManifest::new(Self::ID, "Echo")
            .with_author("The Fxrack Team")
            .with_version("1.0")
            .with_description(
                "Stores the input signal in a temporary buffer and outputs it after a short time",
            )
            .ramping_from_dry()
            .adding_dry_to_wet()
            .with_metaknob_default(db_to_ratio(-3.0))
            .with_parameter(
                ParameterManifest::new("delay_time", "Time")
                    .with_description(
                        "Delay time\n1/8 - 2 beats if tempo is detected\n\
                         1/8 - 2 seconds if no tempo is detected",
                    )
                    .with_units(UnitsHint::Beats)
                    .with_range(0.0, 0.5, 2.0),
            )
            .with_parameter(
                ParameterManifest::new("feedback_amount", "Feedback")
                    .with_description("Amount the echo fades each time it loops")
                    .with_range(0.0, db_to_ratio(-3.0), 1.0),
            )
            .with_parameter(
                ParameterManifest::new("pingpong_amount", "Ping Pong")
                    .with_description(
                        "How much the echoed sound bounces between the left and right sides",
                    )
                    .with_range(0.0, 0.0, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("send_amount", "Send")
                    .with_description("How much of the signal to send into the delay buffer")
                    .with_default_link(LinkType::Linked)
                    .with_range(0.0, db_to_ratio(-3.0), 1.0),
            )
            .with_parameter(
                ParameterManifest::new("quantize", "Quantize")
                    .with_description("Round the Time parameter to the nearest 1/4 beat")
                    .with_hint(ControlHint::ToggleStepping)
                    .with_range(0.0, 1.0, 1.0),
            )
            .with_parameter(
                ParameterManifest::new("triplet", "Triplets")
                    .with_description(
                        "When Quantize is enabled, divide rounded 1/4 beats of Time by 3",
                    )
                    .with_hint(ControlHint::ToggleStepping)
                    .with_range(0.0, 0.0, 1.0),
            )
    }
}

impl EffectProcessor for EchoProcessor {
    fn load_parameters(&mut self, parameters: &ParameterSet) -> Result<(), EffectsError> {
        let index = |id: &str| {
            parameters
                .index_of(id)
                .ok_or_else(|| EffectsError::MissingParameter {
                    effect: Self::ID.into(),
                    parameter: id.into(),
                })
        };
        self.delay_index = index("delay_time")?;
        self.feedback_index = index("feedback_amount")?;
        self.pingpong_index = index("pingpong_amount")?;
        self.send_index = index("send_amount")?;
        self.quantize_index = index("quantize")?;
        self.triplet_index = index("triplet")?;
        Ok(())
    }

    fn create_state(&self, _parameters: &BufferParameters) -> Box<dyn EffectState> {
        Box::new(EchoState {
            delay_buf: vec![
                StereoSample::silence();
                MAX_DELAY_SECONDS * MAX_SUPPORTED_SAMPLE_RATE
            ],
            write_position: 0,
            ping_pong: 0,
            prev_send: None,
            prev_feedback: 0.0,
            prev_delay_frames: 0,
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
        let Some(gs) = state.as_any_mut().downcast_mut::<EchoState>() else {
            debug_assert!(false, "state type mismatch");
            output.copy_from(input);
            return;
        };

        let mut period = parameters.value(self.delay_index);
        let send_current = parameters.value(self.send_index);
        let feedback_current = parameters.value(self.feedback_index);
        let pingpong = parameters.value(self.pingpong_index) as Sample;

        let frames = input.len();
        let sample_rate = buffer_parameters.sample_rate as f64;

        let delay_frames = if let Some(beat_length_sec) = group_features.beat_length_sec {
            // period is a number of beats
            if parameters.toggle(self.quantize_index) {
                period = round_to_fraction(period, 4.0).max(MIN_PERIOD);
                if parameters.toggle(self.triplet_index) {
                    period /= 3.0;
                }
            } else if period < MIN_PERIOD {
                period = MIN_PERIOD;
            }
            (period * beat_length_sec * sample_rate) as usize
        } else {
            // period is a number of seconds
            (period.max(MIN_PERIOD) * sample_rate) as usize
        };
        let buf_len = gs.delay_buf.len();
        let delay_frames = delay_frames.clamp(1, buf_len);

        let mut prev_read =
            (gs.write_position + buf_len - gs.prev_delay_frames.min(buf_len)) % buf_len;
        let mut read = (gs.write_position + buf_len - delay_frames) % buf_len;

        // The fade from zero belongs to the enabling buffer; a state
        // that has never processed one otherwise starts at the current
        // send instead of ramping up from nothing.
        let send_start = if enable_state == EnableState::Enabling {
            0.0
        } else {
            gs.prev_send.unwrap_or(send_current)
        };
        let mut send = RampingValue::new(send_current, send_start, frames);
        let mut feedback = RampingValue::new(feedback_current, gs.prev_feedback, frames);

        for i in 0..frames {
            let send_ramped = send.next();
            let feedback_ramped = feedback.next();

            let mut buffered = gs.delay_buf[read];
            if read != prev_read {
                // Crossfade to the new delay length over this buffer.
                let frac = i as Sample / frames as Sample;
                buffered = buffered * frac + gs.delay_buf[prev_read] * (1.0 - frac);
                prev_read = (prev_read + 1) % buf_len;
            }
            read = (read + 1) % buf_len;

            // Actual delays distort and saturate, so clamp the buffer here.
            gs.delay_buf[gs.write_position] =
                (input[i] * send_ramped + buffered * feedback_ramped).clamped();

            // Bounce the output between the sides. At zero ping-pong
            // both branches reduce to a plain copy of the delay buffer.
            output[i] = if gs.ping_pong < delay_frames / 2 {
                StereoSample::new(
                    (buffered.left + buffered.right * pingpong) / (1.0 + pingpong),
                    buffered.right * (1.0 - pingpong),
                )
            } else {
                StereoSample::new(
                    buffered.left * (1.0 - pingpong),
                    (buffered.right + buffered.left * pingpong) / (1.0 + pingpong),
                )
            };

            gs.write_position = (gs.write_position + 1) % buf_len;
            gs.ping_pong += 1;
            if gs.ping_pong >= delay_frames {
                gs.ping_pong = 0;
            }
        }

        // The send ramp already fades the echo in while enabling, so the
        // ramp to dry when disabling is handled here instead of by the
        // engine's generic crossfade.
        if enable_state == EnableState::Disabling {
            for i in 0..frames {
                let t = 1.0 - (i + 1) as Sample / frames as Sample;
                output[i] *= t;
            }
            gs.clear();
            gs.prev_send = None;
        } else {
            gs.prev_send = Some(send_current);
        }

        gs.prev_feedback = feedback_current;
        gs.prev_delay_frames = delay_frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parameter::ParameterUpdate;

    fn setup(
        overrides: &[(&str, f64)],
    ) -> (EchoProcessor, ParameterSet, Box<dyn EffectState>) {
        let mut processor = EchoProcessor::default();
        let manifest = std::sync::Arc::new(EchoProcessor::manifest());
        let mut parameters = ParameterSet::from_manifest(&manifest);
        processor.load_parameters(&parameters).unwrap();
        for (id, value) in overrides {
            let index = parameters.index_of(id).unwrap();
            let current = parameters.get(index).unwrap();
            let update = ParameterUpdate {
                value: *value,
                minimum: current.minimum(),
                maximum: current.maximum(),
                default_value: current.default_value(),
            };
            parameters.apply(index, &update);
        }
        let state = processor.create_state(&BufferParameters::new(8000, 1000));
        (processor, parameters, state)
    }

    fn run(
        processor: &mut EchoProcessor,
        parameters: &ParameterSet,
        state: &mut dyn EffectState,
        input: &StereoBuffer,
        enable_state: EnableState,
    ) -> StereoBuffer {
        let mut output = StereoBuffer::silence(input.len());
        processor.process_channel(
            state,
            parameters,
            input,
            &mut output,
            &BufferParameters::new(8000, input.len()),
            enable_state,
            &GroupFeatures::default(),
        );
        output
    }

    #[test]
    fn test_impulse_returns_after_delay() {
        // 1/8 s at 8 kHz is exactly one 1000-frame buffer of delay.
        let (mut processor, parameters, mut state) = setup(&[
            ("delay_time", 0.0),
            ("send_amount", 1.0),
            ("feedback_amount", 0.0),
        ]);

        let mut impulse = StereoBuffer::silence(1000);
        impulse[0] = StereoSample::mono(1.0);
        let first = run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &impulse,
            EnableState::Enabled,
        );
        // Nothing in the buffer yet.
        assert!(first.peak() < 1e-6);

        let silence = StereoBuffer::silence(1000);
        let second = run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &silence,
            EnableState::Enabled,
        );
        assert!((second[0].left - 1.0).abs() < 1e-5);
        assert!(second[1].peak() < 1e-6);
    }

    #[test]
    fn test_enabling_fades_send_in() {
        let (mut processor, parameters, mut state) = setup(&[
            ("delay_time", 0.0),
            ("send_amount", 1.0),
            ("feedback_amount", 0.0),
        ]);

        let mut impulse = StereoBuffer::silence(1000);
        impulse[0] = StereoSample::mono(1.0);
        run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &impulse,
            EnableState::Enabling,
        );

        // The impulse entered the delay buffer at the very start of the
        // fade-in, so it comes back heavily attenuated.
        let silence = StereoBuffer::silence(1000);
        let second = run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &silence,
            EnableState::Enabled,
        );
        assert!(second[0].peak() > 0.0);
        assert!(second[0].peak() < 1e-2);
    }

    #[test]
    fn test_disabling_clears_tail() {
        let (mut processor, parameters, mut state) = setup(&[
            ("delay_time", 0.0),
            ("send_amount", 1.0),
            ("feedback_amount", 0.9),
        ]);

        let mut impulse = StereoBuffer::silence(1000);
        impulse[0] = StereoSample::mono(1.0);
        run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &impulse,
            EnableState::Enabled,
        );
        run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &impulse,
            EnableState::Disabling,
        );

        // A fresh enable starts from a silent buffer.
        let silence = StereoBuffer::silence(1000);
        let after = run(
            &mut processor,
            &parameters,
            state.as_mut(),
            &silence,
            EnableState::Enabling,
        );
        assert!(after.peak() < 1e-6);
    }

    #[test]
    fn test_quantize_rounds_period_to_quarter_beats() {
        assert_eq!(round_to_fraction(0.30, 4.0), 0.25);
        assert_eq!(round_to_fraction(0.40, 4.0), 0.5);
        assert_eq!(round_to_fraction(1.0, 4.0), 1.0);
    }
}
