//! Factor, configuration and trial types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{N_CONFIGS, N_FACTORS};

/// One of the seven binary prompting-strategy toggles.
///
/// The declaration order is the bit order: bit `i` of a [`Configuration`]
/// index switches factor `Factor::ALL[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Document lines are fed as `N -> text` instead of plain text.
    ArrowFormat,
    /// The model answers in a structured (JSON) schema.
    StructuredOutput,
    /// The prompt tells the model to avoid style-only suggestions.
    AvoidStyle,
    /// The prompt restricts scope to objective errors.
    ScopeRestriction,
    /// Issues carry a confidence score and low-confidence ones are dropped.
    UseConfidence,
    /// The prompt asks the model to prefer precision over recall.
    PrioritizePrecision,
    /// Reasoning tokens are enabled.
    UseReasoning,
}

impl Factor {
    /// All factors in bit order.
    pub const ALL: [Factor; N_FACTORS] = [
        Factor::ArrowFormat,
        Factor::StructuredOutput,
        Factor::AvoidStyle,
        Factor::ScopeRestriction,
        Factor::UseConfidence,
        Factor::PrioritizePrecision,
        Factor::UseReasoning,
    ];

    /// Bit position of this factor in a configuration index.
    pub fn bit(self) -> usize {
        self as usize
    }

    /// Key used for this factor in trial `config` maps.
    pub fn key(self) -> &'static str {
        match self {
            Factor::ArrowFormat => "arrow_format",
            Factor::StructuredOutput => "structured_output",
            Factor::AvoidStyle => "avoid_style",
            Factor::ScopeRestriction => "scope_restriction",
            Factor::UseConfidence => "use_confidence",
            Factor::PrioritizePrecision => "prioritize_precision",
            Factor::UseReasoning => "use_reasoning",
        }
    }

    /// Name of this factor's random effect in the model.
    pub fn parameter_name(self) -> &'static str {
        match self {
            Factor::ArrowFormat => "u_s_i",
            Factor::StructuredOutput => "u_s_o",
            Factor::AvoidStyle => "u_s_d",
            Factor::ScopeRestriction => "u_s_s",
            Factor::UseConfidence => "u_s_c",
            Factor::PrioritizePrecision => "u_s_a",
            Factor::UseReasoning => "u_s_r",
        }
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Factor::ArrowFormat => "Arrow format input",
            Factor::StructuredOutput => "Structured output",
            Factor::AvoidStyle => "Avoid style direction",
            Factor::ScopeRestriction => "Scope restriction",
            Factor::UseConfidence => "Confidence filtering",
            Factor::PrioritizePrecision => "Prioritize precision",
            Factor::UseReasoning => "Reasoning tokens",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered tuple of the seven factor toggles.
///
/// Serialized as a map of the seven named booleans. All seven keys are
/// required when deserializing; a partial map is a malformed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "FactorMap", into = "FactorMap")]
pub struct FactorVector([bool; N_FACTORS]);

impl FactorVector {
    /// Create a factor vector from its bits in factor order.
    pub fn new(bits: [bool; N_FACTORS]) -> Self {
        Self(bits)
    }

    /// Every factor switched off.
    pub fn all_off() -> Self {
        Self([false; N_FACTORS])
    }

    /// Every factor switched on.
    pub fn all_on() -> Self {
        Self([true; N_FACTORS])
    }

    /// Whether `factor` is switched on.
    pub fn is_on(&self, factor: Factor) -> bool {
        self.0[factor.bit()]
    }

    /// Return a copy with `factor` set to `on`.
    pub fn with(mut self, factor: Factor, on: bool) -> Self {
        self.0[factor.bit()] = on;
        self
    }

    /// The bits in factor order.
    pub fn bits(&self) -> [bool; N_FACTORS] {
        self.0
    }

    /// The bits as 0.0 / 1.0 weights, as they enter the linear predictor.
    pub fn weights(&self) -> [f64; N_FACTORS] {
        self.0.map(|b| if b { 1.0 } else { 0.0 })
    }

    /// Number of factors switched on.
    pub fn count_on(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    /// Configuration index of this factor vector.
    pub fn configuration(&self) -> Configuration {
        let index = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .fold(0u8, |acc, (bit, _)| acc | (1 << bit));
        Configuration(index)
    }
}

/// Wire form of [`FactorVector`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FactorMap {
    arrow_format: bool,
    structured_output: bool,
    avoid_style: bool,
    scope_restriction: bool,
    use_confidence: bool,
    prioritize_precision: bool,
    use_reasoning: bool,
}

impl From<FactorMap> for FactorVector {
    fn from(m: FactorMap) -> Self {
        Self([
            m.arrow_format,
            m.structured_output,
            m.avoid_style,
            m.scope_restriction,
            m.use_confidence,
            m.prioritize_precision,
            m.use_reasoning,
        ])
    }
}

impl From<FactorVector> for FactorMap {
    fn from(v: FactorVector) -> Self {
        let [arrow_format, structured_output, avoid_style, scope_restriction, use_confidence, prioritize_precision, use_reasoning] =
            v.0;
        Self {
            arrow_format,
            structured_output,
            avoid_style,
            scope_restriction,
            use_confidence,
            prioritize_precision,
            use_reasoning,
        }
    }
}

/// Error returned for a configuration index outside `[0, 128)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidConfiguration(pub usize);

impl fmt::Display for InvalidConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration index {} is outside [0, {})",
            self.0, N_CONFIGS
        )
    }
}

impl std::error::Error for InvalidConfiguration {}

/// One of the 128 factor combinations, identified by its 7-bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Configuration(u8);

impl Configuration {
    /// Create a configuration from its index.
    pub fn new(index: usize) -> Result<Self, InvalidConfiguration> {
        if index < N_CONFIGS {
            Ok(Self(index as u8))
        } else {
            Err(InvalidConfiguration(index))
        }
    }

    /// The configuration index in `[0, 128)`.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Decode the factor vector (bit i ⇔ factor i).
    pub fn factors(&self) -> FactorVector {
        FactorVector(core::array::from_fn(|bit| self.0 & (1 << bit) != 0))
    }

    /// Iterate over all 128 configurations in index order.
    pub fn all() -> impl Iterator<Item = Configuration> {
        (0..N_CONFIGS as u8).map(Configuration)
    }
}

impl TryFrom<usize> for Configuration {
    type Error = InvalidConfiguration;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<Configuration> for usize {
    fn from(c: Configuration) -> Self {
        c.index()
    }
}

impl From<FactorVector> for Configuration {
    fn from(v: FactorVector) -> Self {
        v.configuration()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config {}", self.0)
    }
}

/// One executed run of a configuration against the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    /// Factor toggles the trial ran with.
    pub factors: FactorVector,

    /// Configuration index the trial was recorded under, if the source
    /// record carried one. Must agree with `factors`.
    pub declared_index: Option<usize>,

    /// Lines the trial flagged.
    pub detected_lines: BTreeSet<u32>,
}

impl TrialRecord {
    /// Create a trial record without a declared index.
    pub fn new(factors: FactorVector, detected_lines: impl IntoIterator<Item = u32>) -> Self {
        Self {
            factors,
            declared_index: None,
            detected_lines: detected_lines.into_iter().collect(),
        }
    }

    /// Create a trial record for a configuration index.
    pub fn for_configuration(
        configuration: Configuration,
        detected_lines: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            factors: configuration.factors(),
            declared_index: Some(configuration.index()),
            detected_lines: detected_lines.into_iter().collect(),
        }
    }

    /// Configuration implied by the factor toggles.
    pub fn configuration(&self) -> Configuration {
        self.factors.configuration()
    }
}
