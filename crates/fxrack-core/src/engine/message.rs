//! Lock-free message protocol between the control and audio threads.
//!
//! All mutation of the audio-side effect graph happens through
//! [`EffectsRequest`] messages; the audio thread answers every request
//! with an [`EffectsResponse`] and ships superseded heap objects back
//! inside [`Disposal`] payloads so they are dropped on the control
//! thread, never in the audio callback.
//!
//! Both directions are bounded SPSC ring buffers. Neither side ever
//! blocks: the control side applies an explicit per-kind policy when the
//! request queue is full, and the audio side parks responses that do not
//! fit and retries them next callback.

use crate::channel::ChannelHandle;
use crate::effect::processor::BufferParameters;
use crate::engine::chain::{EngineEffectChain, MixMode};
use crate::engine::effect::{EffectStatesMap, EngineEffect};
use crate::engine::parameter::ParameterUpdate;
use crate::engine::rack::EngineEffectRack;

/// Identifier correlating a request with its response.
pub type RequestId = u64;

/// Pre-allocated per-effect-slot states shipped with a routing enable.
///
/// Entry `per_slot[i]` holds the output-channel state map for the effect
/// in slot `i`, or `None` for empty slots.
pub struct ChainStatesPayload {
    pub per_slot: Vec<Option<EffectStatesMap>>,
}

/// What the control side does with a request that does not fit in the
/// queue. The queue is sized so this only happens under bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop this request with a warning. Only for high-rate value
    /// streams where a following update supersedes the lost one.
    DropAndWarn,
    /// Park the request and retry in FIFO order before later submissions.
    Defer,
}

/// A mutation of the audio-side effect graph.
///
/// Targets are addressed by (rack, chain, slot) indices, which stay
/// valid because slot lists keep their positions (`None` placeholders)
/// across removals. Large payloads are boxed so the enum stays small for
/// cache-efficient queueing.
pub enum EffectsRequestKind {
    // ─────────────────────────────────────────────────────────────
    // Rack management
    // ─────────────────────────────────────────────────────────────
    /// Install a fully-built rack. Boxed: the rack carries pre-sized
    /// chain tables and scratch buffers.
    AddRack {
        rack: usize,
        rack_object: Box<EngineEffectRack>,
    },
    RemoveRack {
        rack: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Chain management
    // ─────────────────────────────────────────────────────────────
    AddChainToRack {
        rack: usize,
        chain: usize,
        chain_object: Box<EngineEffectChain>,
    },
    RemoveChainFromRack {
        rack: usize,
        chain: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Effect management
    // ─────────────────────────────────────────────────────────────
    /// Install an effect into a chain slot. The effect arrives with its
    /// processor, parameter set and any states for channels that are
    /// already routed through the chain.
    AddEffectToChain {
        rack: usize,
        chain: usize,
        slot: usize,
        effect: Box<EngineEffect>,
    },
    RemoveEffectFromChain {
        rack: usize,
        chain: usize,
        slot: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Parameter updates
    // ─────────────────────────────────────────────────────────────
    SetChainParameters {
        rack: usize,
        chain: usize,
        enabled: bool,
        mix: f64,
        mix_mode: MixMode,
    },
    SetEffectEnabled {
        rack: usize,
        chain: usize,
        slot: usize,
        enabled: bool,
    },
    /// Update one parameter of one effect. Boxed because this is the
    /// highest-rate message and the full snapshot would push the enum
    /// past a cache line.
    SetParameter {
        rack: usize,
        chain: usize,
        slot: usize,
        parameter: usize,
        update: Box<ParameterUpdate>,
    },

    // ─────────────────────────────────────────────────────────────
    // Channel routing
    // ─────────────────────────────────────────────────────────────
    /// Route an input channel through a chain. Carries one freshly
    /// allocated state per loaded effect and registered output channel;
    /// the audio thread only installs them.
    EnableChainForInputChannel {
        rack: usize,
        chain: usize,
        channel: ChannelHandle,
        states: Box<ChainStatesPayload>,
    },
    /// Stop routing an input channel through a chain. The chain ramps
    /// out over one buffer, then its states come back in a disposal.
    DisableChainForInputChannel {
        rack: usize,
        chain: usize,
        channel: ChannelHandle,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────
    /// The audio configuration changed; every installed state gets a
    /// `reconfigure` call before it is used again.
    UpdateBufferParameters {
        parameters: BufferParameters,
    },
}

impl EffectsRequestKind {
    pub fn overflow_policy(&self) -> OverflowPolicy {
        match self {
            // Knob streams: the next update supersedes a dropped one.
            EffectsRequestKind::SetParameter { .. } => OverflowPolicy::DropAndWarn,
            // Everything else changes structure or carries state and
            // must eventually be delivered, in order.
            _ => OverflowPolicy::Defer,
        }
    }
}

pub struct EffectsRequest {
    pub request_id: RequestId,
    pub kind: EffectsRequestKind,
}

/// Heap objects the audio thread no longer owns, returned for dropping
/// on the control thread.
pub enum Disposal {
    Effect(Box<EngineEffect>),
    Chain(Box<EngineEffectChain>),
    Rack(Box<EngineEffectRack>),
    States(ChainStatesPayload),
}

/// Answer to a request, or a stand-alone garbage delivery.
///
/// `request_id` is `None` for disposals the audio thread emits on its
/// own, such as channel states collected after a ramp-out finished.
pub struct EffectsResponse {
    pub request_id: Option<RequestId>,
    pub success: bool,
    pub disposal: Option<Disposal>,
}

impl EffectsResponse {
    pub fn ack(request_id: RequestId, success: bool) -> Self {
        Self {
            request_id: Some(request_id),
            success,
            disposal: None,
        }
    }

    pub fn with_disposal(request_id: RequestId, disposal: Disposal) -> Self {
        Self {
            request_id: Some(request_id),
            success: true,
            disposal: Some(disposal),
        }
    }

    pub fn garbage(disposal: Disposal) -> Self {
        Self {
            request_id: None,
            success: true,
            disposal: Some(disposal),
        }
    }
}

/// Capacity of the request queue.
///
/// Loading a full chain preset sends a burst of one structural request
/// per effect plus one parameter snapshot per knob; 2048 gives ample
/// headroom for four chains of presets in one burst.
pub const REQUEST_QUEUE_CAPACITY: usize = 2048;

/// Capacity of the response queue. Every request produces exactly one
/// response, plus occasional stand-alone disposals, so it matches the
/// request capacity.
pub const RESPONSE_QUEUE_CAPACITY: usize = 2048;

/// Create the control→audio request channel.
pub fn request_channel() -> (rtrb::Producer<EffectsRequest>, rtrb::Consumer<EffectsRequest>) {
    rtrb::RingBuffer::new(REQUEST_QUEUE_CAPACITY)
}

/// Create the audio→control response channel.
pub fn response_channel() -> (rtrb::Producer<EffectsResponse>, rtrb::Consumer<EffectsResponse>) {
    rtrb::RingBuffer::new(RESPONSE_QUEUE_CAPACITY)
}
