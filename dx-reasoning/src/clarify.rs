//! Clarification questions about the illness as a whole
//!
//! Besides single profile tokens the engine can ask two multiple-choice
//! questions: how long the symptoms have lasted and how intense they are.
//! Each answer maps to a factor on the candidates whose profile agrees with
//! it; candidates that do not lean either way are left alone.

use serde::{Deserialize, Serialize};

use dx_core::{Condition, DurationHint, Severity};

use crate::belief::{Likelihood, TraceKind};
use crate::temporal::{self, DurationClass};

/// Factor for a condition whose severity agrees with the reported intensity
pub const INTENSITY_BOOST: f64 = 1.5;

/// Intake intensity (1-10) at or above which symptoms count as severe
pub const SEVERE_INTENSITY: u8 = 7;

/// Pain-type token that marks a condition as severe
const SEVERE_TYPE: &str = "severe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clarification {
    Duration,
    Intensity,
}

impl Clarification {
    pub const ALL: [Clarification; 2] = [Clarification::Duration, Clarification::Intensity];

    /// Answer key; namespaced so it never collides with a plain symptom.
    pub fn key(self) -> &'static str {
        match self {
            Clarification::Duration => "clarify:duration",
            Clarification::Intensity => "clarify:intensity",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Clarification::Duration => "How long have you been experiencing these symptoms?",
            Clarification::Intensity => "How would you describe the intensity?",
        }
    }

    /// Option labels, in the order [`ClarificationAnswer::from_option`] reads them.
    pub fn options(self) -> [&'static str; 2] {
        match self {
            Clarification::Duration => ["Recently (Days/Weeks)", "Long time (Months/Years)"],
            Clarification::Intensity => ["Mild / Manageable", "Severe / Unbearable"],
        }
    }

    /// The answer `condition` would predict, or `None` when it has no opinion.
    pub fn expected(self, condition: &Condition) -> Option<ClarificationAnswer> {
        match self {
            Clarification::Duration => match condition.match_criteria.duration_hint? {
                DurationHint::Acute => Some(ClarificationAnswer::Duration(DurationClass::Acute)),
                DurationHint::Chronic => Some(ClarificationAnswer::Duration(DurationClass::Chronic)),
                DurationHint::Any => None,
            },
            Clarification::Intensity => Some(ClarificationAnswer::Intensity(if is_severe(condition) {
                Intensity::Severe
            } else {
                Intensity::Mild
            })),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Mild,
    Severe,
}

impl Intensity {
    /// Class of an intake intensity on the 1-10 scale.
    pub fn from_scale(level: u8) -> Self {
        if level >= SEVERE_INTENSITY {
            Intensity::Severe
        } else {
            Intensity::Mild
        }
    }
}

/// Reply to one clarification question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "clarification", content = "reply", rename_all = "snake_case")]
pub enum ClarificationAnswer {
    Duration(DurationClass),
    Intensity(Intensity),
}

impl ClarificationAnswer {
    pub fn topic(&self) -> Clarification {
        match self {
            ClarificationAnswer::Duration(_) => Clarification::Duration,
            ClarificationAnswer::Intensity(_) => Clarification::Intensity,
        }
    }

    /// Reply for the option at `index` of [`Clarification::options`].
    pub fn from_option(topic: Clarification, index: usize) -> Option<Self> {
        match (topic, index) {
            (Clarification::Duration, 0) => Some(ClarificationAnswer::Duration(DurationClass::Acute)),
            (Clarification::Duration, 1) => Some(ClarificationAnswer::Duration(DurationClass::Chronic)),
            (Clarification::Intensity, 0) => Some(ClarificationAnswer::Intensity(Intensity::Mild)),
            (Clarification::Intensity, 1) => Some(ClarificationAnswer::Intensity(Intensity::Severe)),
            _ => None,
        }
    }
}

/// Severe or critical conditions, and those typed as severe pain.
pub fn is_severe(condition: &Condition) -> bool {
    matches!(condition.severity, Severity::Severe | Severity::Critical)
        || condition.match_criteria.types.iter().any(|t| t == SEVERE_TYPE)
}

/// Factor `answer` contributes to `condition`, or `None` if it does not
/// agree with the condition's profile.
pub fn likelihood(condition: &Condition, answer: &ClarificationAnswer) -> Option<Likelihood> {
    match answer {
        ClarificationAnswer::Duration(class) => {
            let m = temporal::duration_match(condition.match_criteria.duration_hint, Some(*class))?;
            Some(Likelihood {
                factor: m.factor,
                kind: TraceKind::Temporal,
                label: m.label,
                matched: false,
            })
        }
        ClarificationAnswer::Intensity(intensity) => {
            let agrees = (*intensity == Intensity::Severe) == is_severe(condition);
            agrees.then(|| Likelihood {
                factor: INTENSITY_BOOST,
                kind: TraceKind::Intensity,
                label: match intensity {
                    Intensity::Severe => "Intensity: severe (matches)".to_string(),
                    Intensity::Mild => "Intensity: mild (matches)".to_string(),
                },
                matched: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_core::MatchCriteria;

    fn condition(hint: Option<DurationHint>, severity: Severity) -> Condition {
        let mut c = Condition::new(
            "c",
            "c",
            MatchCriteria {
                locations: vec!["head".into()],
                duration_hint: hint,
                ..Default::default()
            },
        );
        c.severity = severity;
        c
    }

    #[test]
    fn test_options_map_to_replies() {
        assert_eq!(
            ClarificationAnswer::from_option(Clarification::Duration, 1),
            Some(ClarificationAnswer::Duration(DurationClass::Chronic))
        );
        assert_eq!(
            ClarificationAnswer::from_option(Clarification::Intensity, 0),
            Some(ClarificationAnswer::Intensity(Intensity::Mild))
        );
        assert_eq!(ClarificationAnswer::from_option(Clarification::Intensity, 2), None);
    }

    #[test]
    fn test_expected_replies() {
        let chronic = condition(Some(DurationHint::Chronic), Severity::Mild);
        assert_eq!(
            Clarification::Duration.expected(&chronic),
            Some(ClarificationAnswer::Duration(DurationClass::Chronic))
        );
        assert_eq!(Clarification::Duration.expected(&condition(Some(DurationHint::Any), Severity::Mild)), None);
        assert_eq!(
            Clarification::Intensity.expected(&condition(None, Severity::Critical)),
            Some(ClarificationAnswer::Intensity(Intensity::Severe))
        );

        let mut typed = condition(None, Severity::Moderate);
        typed.match_criteria.types = vec!["severe".into()];
        assert!(is_severe(&typed));
    }

    #[test]
    fn test_intensity_factor_follows_agreement() {
        let severe = condition(None, Severity::Severe);
        let mild = condition(None, Severity::Mild);
        let reply = ClarificationAnswer::Intensity(Intensity::Severe);

        let l = likelihood(&severe, &reply).unwrap();
        assert_eq!(l.factor, INTENSITY_BOOST);
        assert_eq!(l.kind, TraceKind::Intensity);
        assert!(likelihood(&mild, &reply).is_none());
    }

    #[test]
    fn test_duration_factor_reuses_temporal_boost() {
        let acute = condition(Some(DurationHint::Acute), Severity::Mild);
        let recent = ClarificationAnswer::Duration(DurationClass::Acute);
        assert_eq!(likelihood(&acute, &recent).unwrap().factor, temporal::DURATION_BOOST);
        assert!(likelihood(&acute, &ClarificationAnswer::Duration(DurationClass::Chronic)).is_none());
        assert!(likelihood(&condition(None, Severity::Mild), &recent).is_none());
    }

    #[test]
    fn test_intake_scale() {
        assert_eq!(Intensity::from_scale(8), Intensity::Severe);
        assert_eq!(Intensity::from_scale(4), Intensity::Mild);
    }
}
