//! Audio-side endpoint of the effects message protocol.
//!
//! `drain_requests` runs at the start of every audio callback, before
//! any processing, so all mutations land on buffer boundaries and
//! requests apply in exactly the order they were sent.

use std::collections::VecDeque;

use crate::channel::ChannelHandle;
use crate::effect::processor::{BufferParameters, GroupFeatures};
use crate::engine::message::{
    Disposal, EffectsRequest, EffectsRequestKind, EffectsResponse, RESPONSE_QUEUE_CAPACITY,
};
use crate::engine::rack::EngineEffectRack;
use crate::types::StereoBuffer;

/// Hard cap on racks; the rack table is pre-sized so installing a rack
/// never grows it on the audio thread.
pub const MAX_RACKS: usize = 8;

pub struct EngineEffectsManager {
    requests: rtrb::Consumer<EffectsRequest>,
    responses: rtrb::Producer<EffectsResponse>,
    racks: Vec<Option<Box<EngineEffectRack>>>,
    buffer_parameters: BufferParameters,
    /// Responses that did not fit in the queue, retried next callback.
    /// Pre-allocated so parking does not allocate in the callback.
    parked: VecDeque<EffectsResponse>,
}

impl EngineEffectsManager {
    /// Built on the control thread (allocates the rack table), then
    /// moved to the audio thread.
    pub(crate) fn new(
        requests: rtrb::Consumer<EffectsRequest>,
        responses: rtrb::Producer<EffectsResponse>,
    ) -> Self {
        let mut racks = Vec::with_capacity(MAX_RACKS);
        racks.resize_with(MAX_RACKS, || None);
        Self {
            requests,
            responses,
            racks,
            buffer_parameters: BufferParameters::default(),
            parked: VecDeque::with_capacity(RESPONSE_QUEUE_CAPACITY),
        }
    }

    /// Apply all pending requests. Call at the start of each callback.
    pub fn drain_requests(&mut self) {
        self.flush_parked();

        // Channel states whose ramp-out finished last callback go back
        // to the control thread for dropping, one response per channel.
        let responses = &mut self.responses;
        let parked = &mut self.parked;
        for rack in self.racks.iter_mut().flatten() {
            rack.collect_disposed_states(&mut |payload| {
                let response = EffectsResponse::garbage(Disposal::States(payload));
                push_or_park(responses, parked, response);
            });
        }

        while let Ok(request) = self.requests.pop() {
            let (success, disposal) = self.apply(request.kind);
            let response = EffectsResponse {
                request_id: Some(request.request_id),
                success,
                disposal,
            };
            push_or_park(&mut self.responses, &mut self.parked, response);
        }
    }

    /// Apply one request. Returns success and anything the control
    /// thread must drop. Invalid targets fail silently (no logging on
    /// the audio thread); payloads of failed requests are returned
    /// rather than dropped here.
    fn apply(&mut self, kind: EffectsRequestKind) -> (bool, Option<Disposal>) {
        match kind {
            EffectsRequestKind::AddRack { rack, rack_object } => {
                match self.racks.get_mut(rack) {
                    Some(entry @ None) => {
                        *entry = Some(rack_object);
                        (true, None)
                    }
                    _ => (false, Some(Disposal::Rack(rack_object))),
                }
            }
            EffectsRequestKind::RemoveRack { rack } => {
                match self.racks.get_mut(rack).and_then(Option::take) {
                    Some(removed) => (true, Some(Disposal::Rack(removed))),
                    None => (false, None),
                }
            }
            EffectsRequestKind::AddChainToRack {
                rack,
                chain,
                chain_object,
            } => match self.rack_mut(rack) {
                Some(r) => match r.add_chain(chain, chain_object) {
                    Ok(()) => (true, None),
                    Err(rejected) => (false, Some(Disposal::Chain(rejected))),
                },
                None => (false, Some(Disposal::Chain(chain_object))),
            },
            EffectsRequestKind::RemoveChainFromRack { rack, chain } => {
                match self.rack_mut(rack).and_then(|r| r.remove_chain(chain)) {
                    Some(removed) => (true, Some(Disposal::Chain(removed))),
                    None => (false, None),
                }
            }
            EffectsRequestKind::AddEffectToChain {
                rack,
                chain,
                slot,
                effect,
            } => match self.rack_mut(rack).and_then(|r| r.chain_mut(chain)) {
                Some(c) => match c.add_effect(slot, effect) {
                    Ok(()) => (true, None),
                    Err(rejected) => (false, Some(Disposal::Effect(rejected))),
                },
                None => (false, Some(Disposal::Effect(effect))),
            },
            EffectsRequestKind::RemoveEffectFromChain { rack, chain, slot } => {
                match self
                    .rack_mut(rack)
                    .and_then(|r| r.chain_mut(chain))
                    .and_then(|c| c.remove_effect(slot))
                {
                    Some(removed) => (true, Some(Disposal::Effect(removed))),
                    None => (false, None),
                }
            }
            EffectsRequestKind::SetChainParameters {
                rack,
                chain,
                enabled,
                mix,
                mix_mode,
            } => match self.rack_mut(rack).and_then(|r| r.chain_mut(chain)) {
                Some(c) => {
                    c.set_parameters(enabled, mix, mix_mode);
                    (true, None)
                }
                None => (false, None),
            },
            EffectsRequestKind::SetEffectEnabled {
                rack,
                chain,
                slot,
                enabled,
            } => {
                let applied = self
                    .rack_mut(rack)
                    .and_then(|r| r.chain_mut(chain))
                    .is_some_and(|c| c.set_effect_enabled(slot, enabled));
                (applied, None)
            }
            EffectsRequestKind::SetParameter {
                rack,
                chain,
                slot,
                parameter,
                update,
            } => {
                let applied = self
                    .rack_mut(rack)
                    .and_then(|r| r.chain_mut(chain))
                    .is_some_and(|c| c.update_parameter(slot, parameter, &update));
                (applied, None)
            }
            EffectsRequestKind::EnableChainForInputChannel {
                rack,
                chain,
                channel,
                states,
            } => match self.rack_mut(rack).and_then(|r| r.chain_mut(chain)) {
                Some(c) => {
                    let leftover = c.enable_for_input_channel(channel, *states);
                    (true, leftover.map(Disposal::States))
                }
                None => (false, Some(Disposal::States(*states))),
            },
            EffectsRequestKind::DisableChainForInputChannel {
                rack,
                chain,
                channel,
            } => match self.rack_mut(rack).and_then(|r| r.chain_mut(chain)) {
                Some(c) => {
                    c.disable_for_input_channel(channel);
                    (true, None)
                }
                None => (false, None),
            },
            EffectsRequestKind::UpdateBufferParameters { parameters } => {
                self.buffer_parameters = parameters;
                for rack in self.racks.iter_mut().flatten() {
                    rack.reconfigure(&parameters);
                }
                (true, None)
            }
        }
    }

    fn rack_mut(&mut self, rack: usize) -> Option<&mut EngineEffectRack> {
        self.racks
            .get_mut(rack)
            .and_then(|entry| entry.as_deref_mut())
    }

    /// Run all racks for one (input, output) pair, in place.
    pub fn process_in_place(
        &mut self,
        input: ChannelHandle,
        output: ChannelHandle,
        buffer: &mut StereoBuffer,
        group_features: &GroupFeatures,
    ) {
        let buffer_parameters = BufferParameters {
            sample_rate: self.buffer_parameters.sample_rate,
            frames_per_buffer: buffer.len(),
        };
        for rack in self.racks.iter_mut().flatten() {
            rack.process_in_place(input, output, buffer, &buffer_parameters, group_features);
        }
    }

    fn flush_parked(&mut self) {
        while let Some(response) = self.parked.pop_front() {
            if let Err(rtrb::PushError::Full(response)) = self.responses.push(response) {
                self.parked.push_front(response);
                return;
            }
        }
    }
}

fn push_or_park(
    responses: &mut rtrb::Producer<EffectsResponse>,
    parked: &mut VecDeque<EffectsResponse>,
    response: EffectsResponse,
) {
    if let Err(rtrb::PushError::Full(response)) = responses.push(response) {
        parked.push_back(response);
    }
}
