//! Control-side endpoint of the effects message protocol.
//!
//! The messenger assigns request ids, applies each request kind's
//! overflow policy when the queue is full, and pumps the response queue
//! so heap objects coming back from the audio thread are dropped here.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::channel::ChannelHandle;
use crate::effect::processor::BufferParameters;
use crate::engine::message::{
    EffectsRequest, EffectsRequestKind, EffectsResponse, OverflowPolicy, RequestId,
};

pub struct EffectsMessenger {
    request_tx: rtrb::Producer<EffectsRequest>,
    response_rx: rtrb::Consumer<EffectsResponse>,
    /// Requests deferred by a full queue, flushed in submission order.
    deferred: VecDeque<EffectsRequest>,
    next_request_id: RequestId,
    in_flight: usize,
}

impl EffectsMessenger {
    pub(crate) fn new(
        request_tx: rtrb::Producer<EffectsRequest>,
        response_rx: rtrb::Consumer<EffectsResponse>,
    ) -> Self {
        Self {
            request_tx,
            response_rx,
            deferred: VecDeque::new(),
            next_request_id: 1,
            in_flight: 0,
        }
    }

    /// Submit a request to the audio thread. Returns the request id, or
    /// `None` when the queue is congested and the kind's overflow policy
    /// drops it.
    ///
    /// Pending responses are drained first, bounding the number of
    /// unacknowledged requests in flight.
    pub fn submit(&mut self, kind: EffectsRequestKind) -> Option<RequestId> {
        self.process_responses();
        let policy = kind.overflow_policy();
        if !self.deferred.is_empty() && policy == OverflowPolicy::DropAndWarn {
            // A value update must not overtake deferred structural
            // requests, and the next update supersedes this one anyway.
            log::warn!("effects request queue congested, dropping parameter update");
            return None;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let request = EffectsRequest { request_id, kind };

        if !self.deferred.is_empty() {
            self.deferred.push_back(request);
            self.in_flight += 1;
            return Some(request_id);
        }
        match self.request_tx.push(request) {
            Ok(()) => {
                self.in_flight += 1;
                Some(request_id)
            }
            Err(rtrb::PushError::Full(request)) => match policy {
                OverflowPolicy::DropAndWarn => {
                    log::warn!("effects request queue full, dropping parameter update");
                    None
                }
                OverflowPolicy::Defer => {
                    log::warn!("effects request queue full, deferring request");
                    self.deferred.push_back(request);
                    self.in_flight += 1;
                    Some(request_id)
                }
            },
        }
    }

    /// Pump the response queue. Disposal payloads shipped back by the
    /// audio thread are dropped here. Returns the number of responses
    /// handled.
    pub fn process_responses(&mut self) -> usize {
        self.flush_deferred();
        let mut handled = 0;
        while let Ok(response) = self.response_rx.pop() {
            handled += 1;
            let EffectsResponse {
                request_id,
                success,
                disposal,
            } = response;
            if let Some(request_id) = request_id {
                self.in_flight = self.in_flight.saturating_sub(1);
                if !success {
                    log::warn!("effects request {request_id} was rejected by the engine");
                }
            }
            drop(disposal);
        }
        handled
    }

    /// Requests submitted but not yet answered (including deferred ones).
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn flush_deferred(&mut self) {
        while let Some(request) = self.deferred.pop_front() {
            if let Err(rtrb::PushError::Full(request)) = self.request_tx.push(request) {
                self.deferred.push_front(request);
                return;
            }
        }
    }
}

/// Shared control-side context: the messenger plus global audio
/// configuration, passed explicitly to every slot.
pub struct EffectsContext {
    messenger: RefCell<EffectsMessenger>,
    /// Channels effects can write to; one state per output channel is
    /// allocated whenever an input channel is routed through a chain.
    output_channels: RefCell<Vec<ChannelHandle>>,
    buffer_parameters: Cell<BufferParameters>,
}

impl EffectsContext {
    pub(crate) fn new(messenger: EffectsMessenger) -> Rc<Self> {
        Rc::new(Self {
            messenger: RefCell::new(messenger),
            output_channels: RefCell::new(Vec::new()),
            buffer_parameters: Cell::new(BufferParameters::default()),
        })
    }

    pub fn submit(&self, kind: EffectsRequestKind) -> Option<RequestId> {
        self.messenger.borrow_mut().submit(kind)
    }

    pub fn process_responses(&self) -> usize {
        self.messenger.borrow_mut().process_responses()
    }

    pub fn in_flight(&self) -> usize {
        self.messenger.borrow().in_flight()
    }

    pub(crate) fn add_output_channel(&self, handle: ChannelHandle) {
        self.output_channels.borrow_mut().push(handle);
    }

    pub fn output_channels(&self) -> Vec<ChannelHandle> {
        self.output_channels.borrow().clone()
    }

    pub fn buffer_parameters(&self) -> BufferParameters {
        self.buffer_parameters.get()
    }

    pub(crate) fn set_buffer_parameters(&self, parameters: BufferParameters) {
        self.buffer_parameters.set(parameters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::message::Disposal;

    fn tiny_messenger(
        request_capacity: usize,
    ) -> (
        EffectsMessenger,
        rtrb::Consumer<EffectsRequest>,
        rtrb::Producer<EffectsResponse>,
    ) {
        let (request_tx, request_rx) = rtrb::RingBuffer::new(request_capacity);
        let (response_tx, response_rx) = rtrb::RingBuffer::new(16);
        (EffectsMessenger::new(request_tx, response_rx), request_rx, response_tx)
    }

    #[test]
    fn test_structural_requests_defer_on_full_queue() {
        let (mut messenger, mut request_rx, _response_tx) = tiny_messenger(1);

        let first = messenger.submit(EffectsRequestKind::RemoveRack { rack: 0 });
        assert!(first.is_some());
        // Queue full: a structural request is deferred, not lost.
        let second = messenger.submit(EffectsRequestKind::RemoveRack { rack: 1 });
        assert!(second.is_some());
        assert_eq!(messenger.in_flight(), 2);

        // Draining one slot lets the deferred request through, in order.
        let popped = request_rx.pop().unwrap();
        assert_eq!(popped.request_id, first.unwrap());
        messenger.process_responses();
        let popped = request_rx.pop().unwrap();
        assert_eq!(popped.request_id, second.unwrap());
    }

    #[test]
    fn test_parameter_updates_drop_on_full_queue() {
        let (mut messenger, _request_rx, _response_tx) = tiny_messenger(1);

        assert!(messenger
            .submit(EffectsRequestKind::RemoveRack { rack: 0 })
            .is_some());
        let update = crate::engine::parameter::ParameterUpdate {
            value: 0.5,
            minimum: 0.0,
            maximum: 1.0,
            default_value: 0.5,
        };
        let dropped = messenger.submit(EffectsRequestKind::SetParameter {
            rack: 0,
            chain: 0,
            slot: 0,
            parameter: 0,
            update: Box::new(update),
        });
        assert!(dropped.is_none());
        assert_eq!(messenger.in_flight(), 1);
    }

    #[test]
    fn test_responses_settle_in_flight_count() {
        let (mut messenger, mut request_rx, mut response_tx) = tiny_messenger(4);

        let id = messenger
            .submit(EffectsRequestKind::RemoveRack { rack: 0 })
            .unwrap();
        let request = request_rx.pop().unwrap();
        response_tx
            .push(EffectsResponse::ack(request.request_id, false))
            .unwrap();
        // A stand-alone garbage response does not touch the count.
        response_tx
            .push(EffectsResponse::garbage(Disposal::States(
                crate::engine::message::ChainStatesPayload { per_slot: vec![] },
            )))
            .unwrap();

        assert_eq!(messenger.process_responses(), 2);
        assert_eq!(messenger.in_flight(), 0);
        assert_eq!(id, request.request_id);
    }
}
