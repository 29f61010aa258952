//! Effect descriptors, the processor contract, and effect backends.

pub mod backend;
pub mod builtin;
pub mod manifest;
pub mod processor;

pub use backend::{BuiltinBackend, EffectLibrary, EffectsBackend};
pub use manifest::{BackendKind, ControlHint, EffectManifest, LinkType, ParameterManifest, UnitsHint};
pub use processor::{BufferParameters, EffectProcessor, EffectState, EnableState, GroupFeatures};
