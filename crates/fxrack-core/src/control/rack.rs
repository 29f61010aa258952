//! Control-side effect rack.

use std::rc::Rc;

use crate::channel::ChannelHandle;
use crate::control::chain_slot::ChainSlot;
use crate::control::messenger::EffectsContext;
use crate::engine::message::EffectsRequestKind;
use crate::engine::rack::{EngineEffectRack, NUM_CHAINS_PER_RACK};

/// A fixed group of chains. Standard racks pair chain N with the Nth
/// registered input channel, the usual one-chain-per-deck layout.
pub struct EffectRack {
    rack_index: usize,
    chains: Vec<ChainSlot>,
}

impl EffectRack {
    pub(crate) fn new(
        context: Rc<EffectsContext>,
        rack_index: usize,
        inputs: &[ChannelHandle],
    ) -> Self {
        context.submit(EffectsRequestKind::AddRack {
            rack: rack_index,
            rack_object: Box::new(EngineEffectRack::new(NUM_CHAINS_PER_RACK)),
        });
        let mut chains = Vec::with_capacity(NUM_CHAINS_PER_RACK);
        for chain_index in 0..NUM_CHAINS_PER_RACK {
            let mut chain = ChainSlot::new(Rc::clone(&context), rack_index, chain_index);
            if let Some(input) = inputs.get(chain_index) {
                chain.enable_for_input_channel(*input);
            }
            chains.push(chain);
        }
        Self { rack_index, chains }
    }

    pub fn index(&self) -> usize {
        self.rack_index
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn chain(&self, chain: usize) -> Option<&ChainSlot> {
        self.chains.get(chain)
    }

    pub fn chain_mut(&mut self, chain: usize) -> Option<&mut ChainSlot> {
        self.chains.get_mut(chain)
    }

    pub fn chains(&self) -> &[ChainSlot] {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut [ChainSlot] {
        &mut self.chains
    }
}
