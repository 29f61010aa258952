//! The audio-side contract every effect implements.
//!
//! A processor is split from its per-channel state: one
//! [`EffectProcessor`] instance serves every routed channel, while each
//! (input channel, output channel) pair gets its own [`EffectState`].
//! States are allocated on the control thread and shipped to the audio
//! thread inside queue messages; the audio thread only ever borrows them.

use std::any::Any;

use crate::engine::parameter::ParameterSet;
use crate::error::EffectsError;
use crate::types::{StereoBuffer, MAX_FRAMES_PER_BUFFER, SAMPLE_RATE};

/// Audio configuration snapshot handed to states and processors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferParameters {
    pub sample_rate: u32,
    pub frames_per_buffer: usize,
}

impl BufferParameters {
    pub fn new(sample_rate: u32, frames_per_buffer: usize) -> Self {
        debug_assert!(frames_per_buffer <= MAX_FRAMES_PER_BUFFER);
        Self {
            sample_rate,
            frames_per_buffer,
        }
    }

    /// Buffer duration in seconds.
    pub fn seconds_per_buffer(&self) -> f64 {
        self.frames_per_buffer as f64 / self.sample_rate as f64
    }
}

impl Default for BufferParameters {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frames_per_buffer: 1024,
        }
    }
}

/// Lifecycle of an effect on one channel.
///
/// `Enabling` and `Disabling` last exactly one processed buffer; the
/// engine promotes them to `Enabled`/`Disabled` afterwards. Effects use
/// them to ramp in and out without clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnableState {
    #[default]
    Disabled,
    Enabled,
    /// Turning on, processing the first buffer
    Enabling,
    /// Turning off, processing the last buffer
    Disabling,
}

impl EnableState {
    /// Whether audio should run through the effect in this state.
    #[inline]
    pub fn is_processing(&self) -> bool {
        !matches!(self, EnableState::Disabled)
    }
}

/// Tempo information for the input channel being processed.
///
/// Produced by the host's beat tracking and passed into every process
/// call; effects with beat-synced parameters fall back to seconds when
/// no tempo is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupFeatures {
    /// Length of one beat in seconds, if the channel has a tempo.
    pub beat_length_sec: Option<f64>,
    /// Position within the current beat in [0, 1), if known.
    pub beat_fraction: Option<f64>,
}

/// Per-(input, output) channel state owned by one effect.
///
/// All buffers a state needs are allocated up front for the worst-case
/// configuration; `reconfigure` must not allocate, since it runs on the
/// audio thread when the buffer configuration changes.
pub trait EffectState: Send {
    fn reconfigure(&mut self, parameters: &BufferParameters);

    /// Downcast hook so processors can recover their concrete state type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An effect's DSP entry points.
pub trait EffectProcessor: Send {
    /// Resolve manifest parameter ids to indices in `parameters`.
    ///
    /// Called once on the control thread when the effect is instantiated,
    /// before any state exists. A missing id is a mismatch between the
    /// effect's manifest and its processor.
    fn load_parameters(&mut self, parameters: &ParameterSet) -> Result<(), EffectsError>;

    /// Allocate a fresh per-channel state. Control thread only.
    fn create_state(&self, parameters: &BufferParameters) -> Box<dyn EffectState>;

    /// Process one buffer for one (input, output) channel pair.
    ///
    /// `input` and `output` have the same length. Runs on the audio
    /// thread: no allocation, locking or blocking. When `enable_state`
    /// is `Disabling` the effect must leave its state ready for a clean
    /// restart (clear tails, reset ramps).
    #[allow(clippy::too_many_arguments)]
    fn process_channel(
        &mut self,
        state: &mut dyn EffectState,
        parameters: &ParameterSet,
        input: &StereoBuffer,
        output: &mut StereoBuffer,
        buffer_parameters: &BufferParameters,
        enable_state: EnableState,
        group_features: &GroupFeatures,
    );
}
