//! Candidate hypotheses and their score bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use dx_core::{Condition, ConditionId};

use super::evidence::{Likelihood, ReasoningTraceEntry, TraceKind};
use crate::errors::{ReasoningError, Result};

/// Unique identifier for a diagnostic session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Admissibility of a candidate within one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    /// Takes part in normalization and ranking
    Active,
    /// Waiting for a mandatory symptom to be affirmed; scores zero
    Dormant,
    /// A mandatory symptom was denied
    Excluded,
    /// Dropped by pruning for the rest of the session
    Pruned,
}

impl HypothesisStatus {
    /// Gate states move freely between each other as answers change;
    /// only active candidates can be pruned, and pruning is final.
    pub fn can_transition_to(&self, next: &HypothesisStatus) -> bool {
        use HypothesisStatus::*;
        match (self, next) {
            (Pruned, _) => false,
            (Active, Pruned) => true,
            (_, Pruned) => false,
            (a, b) => a != b,
        }
    }

    pub fn is_active(&self) -> bool {
        *self == HypothesisStatus::Active
    }
}

/// One candidate condition with its running score.
///
/// The score lives in log space: the log prior plus the log of every factor
/// applied since. Factors are remembered per answer key so a changed answer
/// can be retracted exactly.
#[derive(Clone, Debug)]
pub struct Hypothesis {
    pub condition: Arc<Condition>,
    pub prior: f64,
    log_score: f64,
    status: HypothesisStatus,
    /// answer key -> matched keyword
    matched: BTreeMap<String, String>,
    /// answer key -> (factor, label)
    applied: BTreeMap<String, (f64, String)>,
    trace: Vec<ReasoningTraceEntry>,
    pub updated_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(condition: Arc<Condition>) -> Self {
        let band = condition.prevalence_band();
        let prior = band.prior();
        let status = if condition.mandatory_symptoms.is_empty() {
            HypothesisStatus::Active
        } else {
            HypothesisStatus::Dormant
        };
        let trace = vec![ReasoningTraceEntry::new(
            format!("Prior: {}", band.as_str()),
            prior,
            TraceKind::Prior,
        )];
        Self {
            condition,
            prior,
            log_score: prior.ln(),
            status,
            matched: BTreeMap::new(),
            applied: BTreeMap::new(),
            trace,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &ConditionId {
        &self.condition.id
    }

    pub fn status(&self) -> HypothesisStatus {
        self.status
    }

    /// Moves the candidate between gate states, or retires it by pruning.
    pub fn set_status(&mut self, new_status: HypothesisStatus) -> Result<()> {
        if !self.status.can_transition_to(&new_status) {
            return Err(ReasoningError::InvalidState(format!(
                "Invalid status transition for {}: {:?} -> {:?}",
                self.condition.id, self.status, new_status
            )));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn log_score(&self) -> f64 {
        self.log_score
    }

    /// Unnormalized score: prior times every applied factor.
    pub fn raw_score(&self) -> f64 {
        self.log_score.exp()
    }

    /// Apply the factor of the answer stored under `key`.
    pub fn apply(&mut self, key: &str, likelihood: Likelihood) {
        self.log_score += likelihood.factor.ln();
        if likelihood.matched {
            if let Some(kw) = key_keyword(key) {
                self.matched.insert(key.to_string(), kw);
            }
        }
        self.trace.push(ReasoningTraceEntry::new(
            likelihood.label.clone(),
            likelihood.factor,
            likelihood.kind,
        ));
        self.applied.insert(key.to_string(), (likelihood.factor, likelihood.label));
        self.updated_at = Utc::now();
    }

    /// Undo the factor applied for `key`, if any. Returns the retracted factor.
    pub fn retract(&mut self, key: &str) -> Option<f64> {
        let (factor, label) = self.applied.remove(key)?;
        self.log_score -= factor.ln();
        self.matched.remove(key);
        self.trace.push(ReasoningTraceEntry::new(
            format!("Revised: {}", label),
            1.0 / factor,
            TraceKind::Revised,
        ));
        self.updated_at = Utc::now();
        Some(factor)
    }

    /// Apply a factor that is not tied to an answer.
    pub fn boost(&mut self, label: impl Into<String>, factor: f64, kind: TraceKind) {
        self.log_score += factor.ln();
        self.trace.push(ReasoningTraceEntry::new(label, factor, kind));
        self.updated_at = Utc::now();
    }

    /// Whether a factor for `key` is currently applied.
    pub fn has_applied(&self, key: &str) -> bool {
        self.applied.contains_key(key)
    }

    /// Namespaced keys of the affirmed tokens this candidate exhibits
    pub fn matched_keys(&self) -> impl Iterator<Item = &str> {
        self.matched.keys().map(String::as_str)
    }

    pub fn matched_keywords(&self) -> Vec<String> {
        self.matched.values().cloned().collect()
    }

    pub fn trace(&self) -> &[ReasoningTraceEntry] {
        &self.trace
    }

    pub(crate) fn push_trace(&mut self, entry: ReasoningTraceEntry) {
        self.trace.push(entry);
    }
}

fn key_keyword(key: &str) -> Option<String> {
    let (_, token) = dx_core::TokenKind::parse_namespaced(key);
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::evidence::{likelihood, Answer};
    use dx_core::{MatchCriteria, Prevalence};

    fn condition(mandatory: &[&str]) -> Arc<Condition> {
        let mut c = Condition::new(
            "migraine",
            "Migraine",
            MatchCriteria {
                locations: vec!["head".into()],
                special_symptoms: vec!["nausea".into()],
                ..Default::default()
            },
        );
        c.prevalence = Some(Prevalence::Common);
        c.mandatory_symptoms = mandatory.iter().map(|s| s.to_string()).collect();
        Arc::new(c)
    }

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_status_transitions() {
        use HypothesisStatus::*;
        assert!(Dormant.can_transition_to(&Active));
        assert!(Active.can_transition_to(&Excluded));
        assert!(Active.can_transition_to(&Pruned));
        assert!(!Dormant.can_transition_to(&Pruned));
        assert!(!Pruned.can_transition_to(&Active));
        assert!(!Active.can_transition_to(&Active));
    }

    #[test]
    fn test_prior_and_gate() {
        let h = Hypothesis::new(condition(&[]));
        assert!((h.raw_score() - 0.05).abs() < 1e-12);
        assert_eq!(h.status(), HypothesisStatus::Active);
        assert_eq!(h.trace()[0].kind, TraceKind::Prior);

        let gated = Hypothesis::new(condition(&["chest pain"]));
        assert_eq!(gated.status(), HypothesisStatus::Dormant);
    }

    #[test]
    fn test_retract_restores_score() {
        let mut h = Hypothesis::new(condition(&[]));
        let before = h.raw_score();
        let answer = Answer::has("nausea");
        let l = likelihood(&h.condition, &answer).unwrap();
        h.apply(&answer.key(), l);
        assert!(h.raw_score() > before);
        assert_eq!(h.matched_keywords(), vec!["nausea"]);

        assert_eq!(h.retract(&answer.key()), Some(2.0));
        assert!((h.raw_score() - before).abs() < 1e-12);
        assert!(h.matched_keywords().is_empty());
        assert_eq!(h.trace().last().unwrap().kind, TraceKind::Revised);
        assert_eq!(h.retract(&answer.key()), None);
    }

    #[test]
    fn test_pruned_is_final() {
        let mut h = Hypothesis::new(condition(&[]));
        h.set_status(HypothesisStatus::Pruned).unwrap();
        assert!(h.set_status(HypothesisStatus::Active).is_err());
    }
}
