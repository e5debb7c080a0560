//! Condition data model.
//!
//! A [`Condition`] is one diagnosable entity of the knowledge base. Its
//! [`MatchCriteria`] is the evidentiary profile the engine reasons over; the
//! remedy, exercise and warning fields are display content only.
//!
//! Records deserialize from the camelCase JSON used by the knowledge base.
//! Tokens are compared in normalized form (see [`normalize_token`]); the
//! catalog normalizes every record once at load time.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Stable string key of a condition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(pub String);

impl ConditionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConditionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ConditionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConditionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConditionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Clinical severity of a condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Benign,
    Mild,
    MildModerate,
    #[default]
    Moderate,
    ModerateSevere,
    Severe,
    Chronic,
    Critical,
}

/// Prior-probability band of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prevalence {
    VeryCommon,
    Common,
    Uncommon,
    Rare,
    VeryRare,
}

impl Prevalence {
    /// Prior probability associated with the band.
    pub fn prior(self) -> f64 {
        match self {
            Prevalence::VeryCommon => 0.1,
            Prevalence::Common => 0.05,
            Prevalence::Uncommon => 0.01,
            Prevalence::Rare => 0.001,
            Prevalence::VeryRare => 0.0001,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Prevalence::VeryCommon => "very_common",
            Prevalence::Common => "common",
            Prevalence::Uncommon => "uncommon",
            Prevalence::Rare => "rare",
            Prevalence::VeryRare => "very_rare",
        }
    }
}

impl Default for Prevalence {
    /// Records without a band are treated as `uncommon`, so a catalog with no
    /// bands at all yields a uniform prior.
    fn default() -> Self {
        Prevalence::Uncommon
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationHint {
    Acute,
    Chronic,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Onset {
    Sudden,
    Gradual,
    Episodic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progression {
    Worsening,
    Stable,
    Fluctuating,
    Improving,
}

/// Namespace of an evidence token.
///
/// Triggers and pain qualities live in their own namespaces so that, for
/// example, the trigger "cold" never collides with the symptom "cold".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Symptom,
    Trigger,
    Type,
}

impl TokenKind {
    const TRIGGER_PREFIX: &'static str = "trigger:";
    const TYPE_PREFIX: &'static str = "type:";

    /// Index key for `token` in this namespace.
    pub fn namespaced(self, token: &str) -> String {
        match self {
            TokenKind::Symptom => token.to_string(),
            TokenKind::Trigger => format!("{}{}", Self::TRIGGER_PREFIX, token),
            TokenKind::Type => format!("{}{}", Self::TYPE_PREFIX, token),
        }
    }

    /// Split an index key back into namespace and token.
    pub fn parse_namespaced(key: &str) -> (TokenKind, &str) {
        if let Some(rest) = key.strip_prefix(Self::TRIGGER_PREFIX) {
            (TokenKind::Trigger, rest)
        } else if let Some(rest) = key.strip_prefix(Self::TYPE_PREFIX) {
            (TokenKind::Type, rest)
        } else {
            (TokenKind::Symptom, key)
        }
    }
}

/// Explicit sensitivity/specificity profile of one symptom token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomWeight {
    /// P(symptom | condition present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    /// P(no symptom | condition absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specificity: Option<f64>,
    /// Manual multiplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// A [`SymptomWeight`] with the neutral defaults filled in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedWeight {
    pub sensitivity: f64,
    pub specificity: f64,
    pub weight: f64,
    /// Whether the catalog declared this weight explicitly.
    pub explicit: bool,
}

impl ResolvedWeight {
    pub const NEUTRAL_SENSITIVITY: f64 = 0.5;
    pub const NEUTRAL_SPECIFICITY: f64 = 0.5;
    pub const NEUTRAL_WEIGHT: f64 = 1.0;

    /// Implicit prior for tokens without an explicit weight.
    pub fn neutral() -> Self {
        Self {
            sensitivity: Self::NEUTRAL_SENSITIVITY,
            specificity: Self::NEUTRAL_SPECIFICITY,
            weight: Self::NEUTRAL_WEIGHT,
            explicit: false,
        }
    }
}

impl From<SymptomWeight> for ResolvedWeight {
    fn from(w: SymptomWeight) -> Self {
        Self {
            sensitivity: w.sensitivity.unwrap_or(Self::NEUTRAL_SENSITIVITY).clamp(0.0, 1.0),
            specificity: w.specificity.unwrap_or(Self::NEUTRAL_SPECIFICITY).clamp(0.0, 1.0),
            weight: w.weight.unwrap_or(Self::NEUTRAL_WEIGHT).max(0.0),
            explicit: true,
        }
    }
}

/// Evidentiary profile of a condition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCriteria {
    /// Anatomical regions
    #[serde(default)]
    pub locations: Vec<String>,
    /// Pain or sensation qualities
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub special_symptoms: Vec<String>,
    /// Symptoms whose presence argues against the condition
    #[serde(default)]
    pub absent_symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint: Option<DurationHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<Onset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<Progression>,
    #[serde(default)]
    pub symptom_weights: BTreeMap<String, SymptomWeight>,
}

impl MatchCriteria {
    /// Weight profile for `token`, or the neutral prior.
    pub fn weight_for(&self, token: &str) -> ResolvedWeight {
        self.symptom_weights
            .get(token)
            .map(|w| ResolvedWeight::from(*w))
            .unwrap_or_else(ResolvedWeight::neutral)
    }

    /// Whether `token` belongs to the profile in namespace `kind`.
    pub fn exhibits(&self, kind: TokenKind, token: &str) -> bool {
        let list = match kind {
            TokenKind::Symptom => &self.special_symptoms,
            TokenKind::Trigger => &self.triggers,
            TokenKind::Type => &self.types,
        };
        list.iter().any(|t| t == token)
    }

    /// Whether `token` is listed as arguing against the condition.
    pub fn argues_against(&self, token: &str) -> bool {
        self.absent_symptoms.iter().any(|t| t == token)
    }

    /// Every profile token with its namespace.
    pub fn profile_tokens(&self) -> impl Iterator<Item = (TokenKind, &str)> {
        self.special_symptoms
            .iter()
            .map(|s| (TokenKind::Symptom, s.as_str()))
            .chain(self.triggers.iter().map(|s| (TokenKind::Trigger, s.as_str())))
            .chain(self.types.iter().map(|s| (TokenKind::Type, s.as_str())))
    }

    fn normalize(&mut self) {
        normalize_all(&mut self.locations);
        normalize_all(&mut self.types);
        normalize_all(&mut self.triggers);
        normalize_all(&mut self.special_symptoms);
        normalize_all(&mut self.absent_symptoms);
        self.symptom_weights = std::mem::take(&mut self.symptom_weights)
            .into_iter()
            .map(|(k, v)| (normalize_token(&k), v))
            .collect();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remedy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// A diagnosable entity. Immutable once loaded into a catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: ConditionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub match_criteria: MatchCriteria,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevalence: Option<Prevalence>,
    /// Emergency symptom combinations, e.g. "chest pain + sweating"
    #[serde(default)]
    pub red_flags: Vec<String>,
    /// Hard gate: every one must be affirmed for the condition to score
    #[serde(default)]
    pub mandatory_symptoms: Vec<String>,
    /// Conditions commonly confused with this one
    #[serde(default)]
    pub mimics: Vec<ConditionId>,
    #[serde(default)]
    pub remedies: Vec<Remedy>,
    #[serde(default)]
    pub indian_home_remedies: Vec<Remedy>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub seek_help: String,
}

impl Condition {
    /// Minimal record, mostly for tests and fixtures.
    pub fn new(id: impl Into<String>, name: impl Into<String>, match_criteria: MatchCriteria) -> Self {
        Self {
            id: ConditionId::new(id),
            name: name.into(),
            description: String::new(),
            match_criteria,
            severity: Severity::default(),
            prevalence: None,
            red_flags: Vec::new(),
            mandatory_symptoms: Vec::new(),
            mimics: Vec::new(),
            remedies: Vec::new(),
            indian_home_remedies: Vec::new(),
            exercises: Vec::new(),
            warnings: Vec::new(),
            seek_help: String::new(),
        }
    }

    /// Prevalence band, defaulting to `uncommon`.
    pub fn prevalence_band(&self) -> Prevalence {
        self.prevalence.unwrap_or_default()
    }

    /// Whether this condition lists `other` as a mimic.
    pub fn is_mimicked_by(&self, other: &ConditionId) -> bool {
        self.mimics.iter().any(|m| m == other)
    }

    /// Returns a copy with every reasoning token in normalized form.
    pub fn normalized(mut self) -> Self {
        self.id = ConditionId(self.id.0.trim().to_string());
        self.match_criteria.normalize();
        normalize_all(&mut self.mandatory_symptoms);
        self
    }
}

/// Canonical form of a token: lowercase, `_` read as a space, whitespace collapsed.
pub fn normalize_token(raw: &str) -> String {
    raw.to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_all(tokens: &mut Vec<String>) {
    let mut seen = std::collections::BTreeSet::new();
    let normalized: Vec<String> = tokens
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect();
    *tokens = normalized;
}
