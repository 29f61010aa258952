//! Audio-thread side of the effects framework.
//!
//! Everything in this module runs in the audio callback and is
//! real-time safe: no allocation, no locks, no blocking. Heap objects
//! are built on the control side and moved in (and back out) through
//! the message queues.

pub mod chain;
pub mod effect;
pub mod manager;
pub mod message;
pub mod parameter;
pub mod rack;

pub use chain::{EngineEffectChain, MixMode, MAX_EFFECTS_PER_CHAIN};
pub use effect::{EffectStatesMap, EngineEffect};
pub use manager::{EngineEffectsManager, MAX_RACKS};
pub use message::{
    ChainStatesPayload, Disposal, EffectsRequest, EffectsRequestKind, EffectsResponse,
    OverflowPolicy, RequestId, REQUEST_QUEUE_CAPACITY, RESPONSE_QUEUE_CAPACITY,
};
pub use parameter::{EngineEffectParameter, ParameterSet, ParameterUpdate};
pub use rack::{EngineEffectRack, NUM_CHAINS_PER_RACK};
