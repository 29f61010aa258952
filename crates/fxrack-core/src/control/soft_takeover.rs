//! Soft takeover for physical controllers.
//!
//! When a knob's value jumps (preset load, meta-knob link change), the
//! physical controller position no longer matches the parameter. Soft
//! takeover ignores incoming hardware values until the controller
//! crosses or comes close to the current value, avoiding sudden jumps.

use std::time::{Duration, Instant};

/// Threshold as a fraction of the normalized [0, 1] scale; three ticks
/// of a 7-bit MIDI controller.
pub const DEFAULT_TAKEOVER_THRESHOLD: f64 = 3.0 / 128.0;

/// Values arriving within this window of an accepted one are part of the
/// same physical gesture and always pass.
const SUBSEQUENT_VALUE_OVERRIDE: Duration = Duration::from_millis(50);

pub struct SoftTakeover {
    threshold: f64,
    prev_parameter: f64,
    last_accepted: Option<Instant>,
}

impl SoftTakeover {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_TAKEOVER_THRESHOLD,
            prev_parameter: 0.0,
            last_accepted: None,
        }
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Arm the takeover: the next incoming value gets the full distance
    /// check even if a value was accepted very recently. Called after a
    /// parameter is force-set from elsewhere.
    pub fn ignore_next(&mut self) {
        self.last_accepted = None;
    }

    /// Decide whether to ignore `new_parameter` arriving while the
    /// parameter sits at `current_parameter` (both normalized).
    pub fn ignore(&mut self, current_parameter: f64, new_parameter: f64) -> bool {
        let mut ignore = false;
        let mid_gesture = self
            .last_accepted
            .is_some_and(|t| t.elapsed() < SUBSEQUENT_VALUE_OVERRIDE);
        if !mid_gesture {
            let difference = current_parameter - new_parameter;
            let prev_difference = current_parameter - self.prev_parameter;
            // Ignore only when the previous and the new value sit on the
            // same side of the current one, both beyond the threshold;
            // anything crossing or near the current value takes over.
            if ((prev_difference < 0.0 && difference < 0.0)
                || (prev_difference > 0.0 && difference > 0.0))
                && difference.abs() > self.threshold
                && prev_difference.abs() > self.threshold
            {
                ignore = true;
            }
        }
        if !ignore {
            self.last_accepted = Some(Instant::now());
        }
        self.prev_parameter = new_parameter;
        ignore
    }
}

impl Default for SoftTakeover {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_same_side_values_are_ignored() {
        let mut takeover = SoftTakeover::new();
        // Prime with a far value, then send another on the same side.
        takeover.prev_parameter = 0.9;
        assert!(takeover.ignore(0.2, 0.8));
    }

    #[test]
    fn test_value_near_current_takes_over() {
        let mut takeover = SoftTakeover::new();
        takeover.prev_parameter = 0.9;
        assert!(!takeover.ignore(0.2, 0.21));
    }

    #[test]
    fn test_crossing_value_takes_over() {
        let mut takeover = SoftTakeover::new();
        // Previous below, new above: the knob swept across the value.
        takeover.prev_parameter = 0.1;
        assert!(!takeover.ignore(0.5, 0.9));
    }

    #[test]
    fn test_gesture_window_passes_subsequent_values() {
        let mut takeover = SoftTakeover::new();
        takeover.prev_parameter = 0.5;
        assert!(!takeover.ignore(0.5, 0.51));
        // Within the gesture window even a far value passes.
        assert!(!takeover.ignore(0.5, 0.9));
        // Arming resets the window.
        takeover.ignore_next();
        takeover.prev_parameter = 0.9;
        assert!(takeover.ignore(0.5, 0.95));
    }
}
