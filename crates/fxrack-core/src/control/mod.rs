//! Control-thread side of the effects framework.
//!
//! Slots own the authoritative state the UI and controllers interact
//! with; every change is mirrored to the audio thread through the
//! message queues. Nothing in this module is touched by the audio
//! callback.

pub mod chain_slot;
pub mod effect_slot;
pub mod manager;
pub mod messenger;
pub mod parameter_slot;
pub mod rack;
pub mod soft_takeover;

pub use chain_slot::{ChainSlot, NUM_EFFECT_SLOTS};
pub use effect_slot::EffectSlot;
pub use manager::EffectsManager;
pub use messenger::{EffectsContext, EffectsMessenger};
pub use parameter_slot::{ButtonParameterSlot, KnobParameterSlot};
pub use rack::EffectRack;
pub use soft_takeover::{SoftTakeover, DEFAULT_TAKEOVER_THRESHOLD};
