//! Real-time effects framework for DJ mixing.
//!
//! The crate is split along the thread boundary:
//!
//! - [`control`] owns the authoritative state (racks, chains, effect
//!   slots, parameter slots with meta-knob linking and soft takeover)
//!   and runs on the application's main thread.
//! - [`engine`] mirrors that state on the audio thread and processes
//!   audio; it never allocates, locks or blocks.
//!
//! The two sides talk exclusively through bounded lock-free queues:
//! requests flow in, acknowledgements and superseded heap objects flow
//! back out so everything is dropped on the control thread.
//!
//! ```no_run
//! use fxrack_core::control::EffectsManager;
//! use fxrack_core::effect::EffectLibrary;
//!
//! let mut manager = EffectsManager::new(EffectLibrary::with_builtins());
//! let deck = manager.register_input_channel("[Channel1]").unwrap();
//! let _master = manager.register_output_channel("[Master]").unwrap();
//! let engine = manager.take_engine().unwrap();
//! // Move `engine` to the audio callback; keep `manager` on this thread.
//! let rack = manager.add_standard_rack().unwrap();
//! manager
//!     .load_effect(rack, 0, 0, "org.fxrack.effects.echo")
//!     .unwrap();
//! let _ = deck;
//! ```

pub mod channel;
pub mod control;
pub mod effect;
pub mod engine;
pub mod error;
pub mod preset;
pub mod types;

pub use channel::{ChannelHandle, ChannelRegistry, MAX_CHANNELS};
pub use control::EffectsManager;
pub use effect::{EffectLibrary, EffectManifest};
pub use engine::EngineEffectsManager;
pub use error::EffectsError;
pub use types::{StereoBuffer, StereoSample};
