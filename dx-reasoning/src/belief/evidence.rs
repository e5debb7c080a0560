//! Answers and the likelihood factors they contribute
//!
//! An [`Answer`] affirms or denies one namespaced token. For each candidate
//! the answer maps to a multiplicative factor on the candidate's score:
//!
//! | token in...          | affirmed                    | denied                 |
//! |----------------------|-----------------------------|------------------------|
//! | profile (symptom, trigger, type) | `1 + GAIN * weight * sensitivity` | `(1 - sensitivity)^weight` |
//! | `absentSymptoms`     | `1 - specificity`           | unchanged              |
//! | neither              | unchanged                   | unchanged              |
//!
//! Penalties never go below [`MIN_FACTOR`], so a single answer can always be
//! outweighed by later evidence.

use serde::{Deserialize, Serialize};

use dx_core::{normalize_token, Condition, QuestionToken, TokenKind};

/// Scale of the boost for an affirmed profile token
pub const AFFIRM_GAIN: f64 = 2.0;

/// Floor for penalty factors
pub const MIN_FACTOR: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Affirmed,
    Denied,
}

impl Polarity {
    pub fn flipped(self) -> Self {
        match self {
            Polarity::Affirmed => Polarity::Denied,
            Polarity::Denied => Polarity::Affirmed,
        }
    }
}

/// One answered yes/no question.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Answer {
    pub token: QuestionToken,
    pub polarity: Polarity,
}

impl Answer {
    pub fn new(token: QuestionToken, polarity: Polarity) -> Self {
        let token = QuestionToken::new(token.kind, normalize_token(&token.symptom));
        Self { token, polarity }
    }

    pub fn yes(token: QuestionToken) -> Self {
        Self::new(token, Polarity::Affirmed)
    }

    pub fn no(token: QuestionToken) -> Self {
        Self::new(token, Polarity::Denied)
    }

    /// Affirmed plain symptom
    pub fn has(symptom: &str) -> Self {
        Self::yes(QuestionToken::symptom(symptom))
    }

    /// Denied plain symptom
    pub fn lacks(symptom: &str) -> Self {
        Self::no(QuestionToken::symptom(symptom))
    }

    pub fn key(&self) -> String {
        self.token.key()
    }

    pub fn is_affirmed(&self) -> bool {
        self.polarity == Polarity::Affirmed
    }
}

/// Category of a reasoning trace entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Prior,
    Symptom,
    Trigger,
    Type,
    /// A symptom that argues against the condition
    Absent,
    Mandatory,
    Temporal,
    /// Agreement with the reported intensity
    Intensity,
    /// Retraction of an earlier factor after the answer changed
    Revised,
    Fallback,
}

/// One contribution to a candidate's score. `impact` is the multiplicative
/// factor applied (1.0 is neutral). The prior entry carries the prior itself,
/// so a candidate's raw score is the product of all impacts in its trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTraceEntry {
    pub factor: String,
    pub impact: f64,
    #[serde(rename = "type")]
    pub kind: TraceKind,
}

impl ReasoningTraceEntry {
    pub fn new(factor: impl Into<String>, impact: f64, kind: TraceKind) -> Self {
        Self {
            factor: factor.into(),
            impact,
            kind,
        }
    }
}

/// Factor an answer contributes to one condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Likelihood {
    pub factor: f64,
    pub kind: TraceKind,
    pub label: String,
    /// Whether the answer counts as a matched keyword for the condition
    pub matched: bool,
}

/// Likelihood factor of `answer` for `condition`, or `None` if the token is
/// irrelevant to it.
pub fn likelihood(condition: &Condition, answer: &Answer) -> Option<Likelihood> {
    let criteria = &condition.match_criteria;
    let token = answer.token.symptom.as_str();
    let kind = answer.token.kind;

    if criteria.exhibits(kind, token) {
        let w = criteria.weight_for(token);
        let trace_kind = match kind {
            TokenKind::Symptom => TraceKind::Symptom,
            TokenKind::Trigger => TraceKind::Trigger,
            TokenKind::Type => TraceKind::Type,
        };
        return Some(match answer.polarity {
            Polarity::Affirmed => Likelihood {
                factor: 1.0 + AFFIRM_GAIN * w.weight * w.sensitivity,
                kind: trace_kind,
                label: match kind {
                    TokenKind::Symptom => format!("Symptom match: {}", token),
                    TokenKind::Trigger => format!("Trigger: {}", token),
                    TokenKind::Type => format!("Pain type: {}", token),
                },
                matched: true,
            },
            Polarity::Denied => Likelihood {
                factor: (1.0 - w.sensitivity).powf(w.weight).max(MIN_FACTOR),
                kind: trace_kind,
                label: format!("Excluded: {}", token),
                matched: false,
            },
        });
    }

    if kind == TokenKind::Symptom && criteria.argues_against(token) && answer.is_affirmed() {
        let w = criteria.weight_for(token);
        return Some(Likelihood {
            factor: (1.0 - w.specificity).max(MIN_FACTOR),
            kind: TraceKind::Absent,
            label: format!("Contradicting symptom: {}", token),
            matched: false,
        });
    }

    None
}
