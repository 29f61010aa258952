//! Immutable effect descriptors.
//!
//! A manifest describes everything the control side needs to know about
//! an effect before instantiating it: identity, parameter list, ranges,
//! default meta-knob linkage and mixing behavior. Manifests are built
//! once by a backend, wrapped in `Arc`, and never mutated afterwards, so
//! they can be shared freely between slots and presets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which backend an effect comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Builtin,
    /// Hosted through an external plugin standard.
    Plugin,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Builtin => "builtin",
            BackendKind::Plugin => "plugin",
        }
    }
}

/// How a parameter should be presented and scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlHint {
    #[default]
    KnobLinear,
    KnobLogarithmic,
    /// Discrete stepped toggle (buttons, waveform selectors).
    ToggleStepping,
}

/// Unit annotation for display and host integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitsHint {
    #[default]
    Unknown,
    Seconds,
    Hertz,
    /// Value is a number of beats when tempo information is available.
    Beats,
}

/// How a parameter follows the effect's meta knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkType {
    /// Not controlled by the meta knob
    #[default]
    None,
    /// Controlled by the meta knob as it is
    Linked,
    /// Controlled by the left side of the meta knob
    LinkedLeft,
    /// Controlled by the right side of the meta knob
    LinkedRight,
    /// Controlled by both sides of the meta knob
    LinkedLeftRight,
}

/// Descriptor for a single effect parameter.
#[derive(Debug, Clone)]
pub struct ParameterManifest {
    id: String,
    name: String,
    description: String,
    control_hint: ControlHint,
    units_hint: UnitsHint,
    minimum: f64,
    default_value: f64,
    maximum: f64,
    /// Position of the parameter's neutral point on the normalized scale.
    /// Strictly between 0 and 1 for bipolar (split) knobs, 0 otherwise.
    neutral_point: f64,
    default_link_type: LinkType,
    default_link_inverted: bool,
}

impl ParameterManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            control_hint: ControlHint::KnobLinear,
            units_hint: UnitsHint::Unknown,
            minimum: 0.0,
            default_value: 0.0,
            maximum: 1.0,
            neutral_point: 0.0,
            default_link_type: LinkType::None,
            default_link_inverted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_hint(mut self, hint: ControlHint) -> Self {
        self.control_hint = hint;
        self
    }

    pub fn with_units(mut self, units: UnitsHint) -> Self {
        self.units_hint = units;
        self
    }

    /// Set minimum, default and maximum raw values.
    pub fn with_range(mut self, minimum: f64, default_value: f64, maximum: f64) -> Self {
        debug_assert!(minimum <= default_value && default_value <= maximum);
        self.minimum = minimum;
        self.default_value = default_value;
        self.maximum = maximum;
        self
    }

    pub fn with_neutral_point(mut self, neutral: f64) -> Self {
        self.neutral_point = neutral;
        self
    }

    pub fn with_default_link(mut self, link_type: LinkType) -> Self {
        self.default_link_type = link_type;
        self
    }

    pub fn with_default_link_inverted(mut self) -> Self {
        self.default_link_inverted = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn control_hint(&self) -> ControlHint {
        self.control_hint
    }

    pub fn units_hint(&self) -> UnitsHint {
        self.units_hint
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn neutral_point_on_scale(&self) -> f64 {
        self.neutral_point
    }

    pub fn default_link_type(&self) -> LinkType {
        self.default_link_type
    }

    pub fn default_link_inverted(&self) -> bool {
        self.default_link_inverted
    }

    /// True for stepped toggles, which get button slots instead of knobs.
    pub fn is_button(&self) -> bool {
        self.control_hint == ControlHint::ToggleStepping
    }

    /// Map a normalized knob position in [0, 1] to a raw value.
    ///
    /// Logarithmic knobs use a geometric scale and therefore require a
    /// positive minimum; ranges that include zero degrade to linear.
    pub fn raw_from_normalized(&self, position: f64) -> f64 {
        let position = position.clamp(0.0, 1.0);
        match self.control_hint {
            ControlHint::KnobLogarithmic if self.minimum > 0.0 => {
                self.minimum * (self.maximum / self.minimum).powf(position)
            }
            _ => self.minimum + position * (self.maximum - self.minimum),
        }
    }

    /// Inverse of [`Self::raw_from_normalized`].
    pub fn normalized_from_raw(&self, value: f64) -> f64 {
        let value = value.clamp(self.minimum, self.maximum);
        let position = match self.control_hint {
            ControlHint::KnobLogarithmic if self.minimum > 0.0 => {
                (value / self.minimum).ln() / (self.maximum / self.minimum).ln()
            }
            _ => {
                if self.maximum > self.minimum {
                    (value - self.minimum) / (self.maximum - self.minimum)
                } else {
                    0.0
                }
            }
        };
        position.clamp(0.0, 1.0)
    }
}

/// Descriptor for an effect.
#[derive(Debug, Clone)]
pub struct EffectManifest {
    id: String,
    name: String,
    short_name: String,
    author: String,
    version: String,
    description: String,
    backend: BackendKind,
    parameters: Vec<Arc<ParameterManifest>>,
    /// The effect fades its own wet signal in from dry while enabling, so
    /// the engine must not apply its generic enable crossfade on top.
    ramps_from_dry: bool,
    /// The effect outputs only the wet signal; the engine adds the dry
    /// input back after processing (delays, reverb tails).
    add_dry_to_wet: bool,
    metaknob_default: f64,
}

impl EffectManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            short_name: name.clone(),
            name,
            author: String::new(),
            version: String::new(),
            description: String::new(),
            backend: BackendKind::Builtin,
            parameters: Vec::new(),
            ramps_from_dry: false,
            add_dry_to_wet: false,
            metaknob_default: 0.5,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterManifest) -> Self {
        self.parameters.push(Arc::new(parameter));
        self
    }

    pub fn ramping_from_dry(mut self) -> Self {
        self.ramps_from_dry = true;
        self
    }

    pub fn adding_dry_to_wet(mut self) -> Self {
        self.add_dry_to_wet = true;
        self
    }

    pub fn with_metaknob_default(mut self, value: f64) -> Self {
        self.metaknob_default = value;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier that is unique across backends.
    pub fn unique_id(&self) -> String {
        format!("{} {}", self.id, self.backend.name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn parameters(&self) -> &[Arc<ParameterManifest>] {
        &self.parameters
    }

    pub fn parameter(&self, id: &str) -> Option<&Arc<ParameterManifest>> {
        self.parameters.iter().find(|p| p.id() == id)
    }

    /// Continuous parameters, in manifest order, paired with their index.
    pub fn knob_parameters(&self) -> impl Iterator<Item = (usize, &Arc<ParameterManifest>)> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_button())
    }

    /// Stepped toggle parameters, in manifest order, paired with their index.
    pub fn button_parameters(&self) -> impl Iterator<Item = (usize, &Arc<ParameterManifest>)> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_button())
    }

    pub fn ramps_from_dry(&self) -> bool {
        self.ramps_from_dry
    }

    pub fn add_dry_to_wet(&self) -> bool {
        self.add_dry_to_wet
    }

    pub fn metaknob_default(&self) -> f64 {
        self.metaknob_default
    }
}
