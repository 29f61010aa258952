//! Error types for the effects engine.

use thiserror::Error;

/// Errors surfaced by control-side operations.
///
/// Conditions that can only arise from a programming bug (stale indices,
/// unrouted channels) are logged and ignored rather than surfaced here.
#[derive(Debug, Error)]
pub enum EffectsError {
    #[error("channel group {0:?} is already registered")]
    ChannelAlreadyRegistered(String),

    #[error("channel registry is full")]
    TooManyChannels,

    #[error("no effect with id {0:?} is registered")]
    UnknownEffect(String),

    #[error("effect {effect:?} declares no parameter with id {parameter:?}")]
    MissingParameter { effect: String, parameter: String },

    #[error("effect slot index {slot} exceeds the chain capacity of {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },
}
