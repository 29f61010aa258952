//! Audio-side effect rack: an ordered table of chains.

use crate::channel::ChannelHandle;
use crate::effect::processor::{BufferParameters, GroupFeatures};
use crate::engine::chain::EngineEffectChain;
use crate::engine::message::ChainStatesPayload;
use crate::types::StereoBuffer;

/// Default number of chain slots in a rack.
pub const NUM_CHAINS_PER_RACK: usize = 4;

pub struct EngineEffectRack {
    chains: Vec<Option<Box<EngineEffectChain>>>,
}

impl EngineEffectRack {
    /// Build a rack with `num_chains` empty chain slots. Control thread
    /// only; the table never grows afterwards.
    pub fn new(num_chains: usize) -> Self {
        let mut chains = Vec::with_capacity(num_chains);
        chains.resize_with(num_chains, || None);
        Self { chains }
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    /// Install a chain. On an occupied or out-of-range slot the chain
    /// comes back to the caller for disposal.
    pub fn add_chain(
        &mut self,
        index: usize,
        chain: Box<EngineEffectChain>,
    ) -> Result<(), Box<EngineEffectChain>> {
        match self.chains.get_mut(index) {
            Some(entry @ None) => {
                *entry = Some(chain);
                Ok(())
            }
            _ => Err(chain),
        }
    }

    pub fn remove_chain(&mut self, index: usize) -> Option<Box<EngineEffectChain>> {
        self.chains.get_mut(index).and_then(Option::take)
    }

    pub fn chain_mut(&mut self, index: usize) -> Option<&mut EngineEffectChain> {
        self.chains
            .get_mut(index)
            .and_then(|entry| entry.as_deref_mut())
    }

    pub fn reconfigure(&mut self, parameters: &BufferParameters) {
        for chain in self.chains.iter_mut().flatten() {
            chain.reconfigure(parameters);
        }
    }

    pub fn collect_disposed_states(&mut self, dispose: &mut dyn FnMut(ChainStatesPayload)) {
        for chain in self.chains.iter_mut().flatten() {
            chain.collect_disposed_states(dispose);
        }
    }

    /// Run every chain that routes `input`, in order, in place.
    pub fn process_in_place(
        &mut self,
        input: ChannelHandle,
        output: ChannelHandle,
        buffer: &mut StereoBuffer,
        buffer_parameters: &BufferParameters,
        group_features: &GroupFeatures,
    ) {
        for chain in self.chains.iter_mut().flatten() {
            chain.process_channel(input, output, buffer, buffer_parameters, group_features);
        }
    }
}
