//! Effects shipped with the engine.

pub mod echo;
pub mod gain;
pub mod tremolo;

use crate::effect::backend::BuiltinBackend;
use crate::types::Sample;

/// Register every built-in effect with a backend.
pub fn register_builtin_effects(backend: &mut BuiltinBackend) {
    backend.register(gain::GainProcessor::manifest(), || {
        Box::new(gain::GainProcessor::default())
    });
    backend.register(echo::EchoProcessor::manifest(), || {
        Box::new(echo::EchoProcessor::default())
    });
    backend.register(tremolo::TremoloProcessor::manifest(), || {
        Box::new(tremolo::TremoloProcessor::default())
    });
}

/// Linear per-frame interpolation from a previous parameter value to the
/// current one, smearing control changes over a buffer to avoid zipper
/// noise.
pub(crate) struct RampingValue {
    value: Sample,
    increment: Sample,
}

impl RampingValue {
    pub(crate) fn new(target: f64, start: f64, frames: usize) -> Self {
        let start = start as Sample;
        let increment = if frames > 0 {
            (target as Sample - start) / frames as Sample
        } else {
            0.0
        };
        Self {
            value: start,
            increment,
        }
    }

    #[inline]
    pub(crate) fn next(&mut self) -> Sample {
        self.value += self.increment;
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramping_value_reaches_target() {
        let mut ramp = RampingValue::new(1.0, 0.0, 4);
        let steps: Vec<Sample> = (0..4).map(|_| ramp.next()).collect();
        assert_eq!(steps, vec![0.25, 0.5, 0.75, 1.0]);
    }
}
