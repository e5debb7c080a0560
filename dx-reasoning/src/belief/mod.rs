//! Belief state over the candidate conditions of one session
//!
//! Scores are multiplicative, kept in log space and normalized with the
//! log-sum-exp trick. Only [`HypothesisStatus::Active`] candidates take part
//! in normalization; dormant (mandatory-gated) and excluded candidates stay
//! in bookkeeping at an effective score of zero so a later answer can bring
//! them back.

pub mod confidence;
pub mod evidence;
pub mod hypothesis;

pub use confidence::{Confidence, ConfidenceError};
pub use evidence::{likelihood, Answer, Likelihood, Polarity, ReasoningTraceEntry, TraceKind};
pub use hypothesis::{Hypothesis, HypothesisStatus, SessionId};

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use dx_core::{Condition, ConditionId};

use crate::errors::Result;

/// Candidate reported when every candidate was pruned away.
#[derive(Clone, Debug, PartialEq)]
pub struct Fallback {
    pub id: ConditionId,
    /// Normalized probability before the pruning pass that emptied the set
    pub confidence: f64,
}

/// Outcome of one pruning pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PruneReport {
    pub before: usize,
    pub dropped: Vec<ConditionId>,
    pub fallback: Option<ConditionId>,
}

impl PruneReport {
    pub fn retained(&self) -> usize {
        self.before - self.dropped.len()
    }
}

/// Scores of every candidate in one session
#[derive(Clone, Debug, Default)]
pub struct BeliefState {
    hypotheses: IndexMap<ConditionId, Hypothesis>,
    fallback: Option<Fallback>,
}

impl BeliefState {
    /// Seed one hypothesis per distinct candidate with its prevalence prior.
    pub fn seed(candidates: impl IntoIterator<Item = Arc<Condition>>) -> Self {
        let mut hypotheses = IndexMap::new();
        for condition in candidates {
            if !hypotheses.contains_key(&condition.id) {
                hypotheses.insert(condition.id.clone(), Hypothesis::new(condition));
            }
        }
        Self {
            hypotheses,
            fallback: None,
        }
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.hypotheses.values().filter(|h| h.status().is_active()).count()
    }

    pub fn get(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.get(id)
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.values()
    }

    /// Active hypotheses in insertion order
    pub fn active(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.values().filter(|h| h.status().is_active())
    }

    pub fn fallback(&self) -> Option<&Fallback> {
        self.fallback.as_ref()
    }

    /// Apply `answer` to every candidate still in play, replacing whatever
    /// factor an earlier answer on the same token contributed. Returns the
    /// number of candidates the answer is relevant to.
    pub fn apply(&mut self, answer: &Answer) -> usize {
        let key = answer.key();
        let affected = self.apply_keyed(&key, |c| likelihood(c, answer));
        tracing::debug!(token = %key, polarity = ?answer.polarity, affected, "Applied answer");
        affected
    }

    /// Replace the factor stored under `key` on every candidate still in
    /// play with whatever `factor_for` yields for it.
    pub fn apply_keyed(&mut self, key: &str, factor_for: impl Fn(&Condition) -> Option<Likelihood>) -> usize {
        let mut affected = 0;
        for h in self.hypotheses.values_mut() {
            if h.status() == HypothesisStatus::Pruned {
                continue;
            }
            h.retract(key);
            if let Some(l) = factor_for(&h.condition) {
                h.apply(key, l);
                affected += 1;
            }
        }
        affected
    }

    /// Multiply one candidate's score by `factor`.
    pub fn boost(&mut self, id: &str, label: impl Into<String>, factor: f64, kind: TraceKind) {
        if let Some(h) = self.hypotheses.get_mut(id) {
            h.boost(label, factor, kind);
        }
    }

    /// Re-derive the mandatory-symptom gate of every gated candidate from
    /// the affirmed (`known`) and denied (`excluded`) token keys.
    pub fn refresh_gates(&mut self, known: &BTreeSet<String>, excluded: &BTreeSet<String>) -> Result<()> {
        for h in self.hypotheses.values_mut() {
            let mandatory = &h.condition.mandatory_symptoms;
            if mandatory.is_empty() || h.status() == HypothesisStatus::Pruned {
                continue;
            }
            let target = if let Some(denied) = mandatory.iter().find(|m| excluded.contains(*m)) {
                let label = format!("Mandatory symptom denied: {}", denied);
                (HypothesisStatus::Excluded, label)
            } else if mandatory.iter().all(|m| known.contains(m)) {
                let label = format!("Mandatory symptoms confirmed: {}", mandatory.join(", "));
                (HypothesisStatus::Active, label)
            } else {
                (HypothesisStatus::Dormant, String::new())
            };
            if target.0 != h.status() {
                tracing::debug!(condition = %h.id(), from = ?h.status(), to = ?target.0, "Gate changed");
                h.set_status(target.0)?;
                if !target.1.is_empty() {
                    h.push_trace(ReasoningTraceEntry::new(target.1, 1.0, TraceKind::Mandatory));
                }
            }
        }
        if self.fallback.is_some() && self.active_count() > 0 {
            tracing::debug!("Gate reopened; dropping fallback");
            self.fallback = None;
        }
        Ok(())
    }

    /// Normalized probabilities of the active candidates, highest first.
    /// Ties break by condition id.
    pub fn posterior(&self) -> Vec<(ConditionId, f64)> {
        let logs: Vec<(&ConditionId, f64)> = self
            .active()
            .map(|h| (h.id(), h.log_score()))
            .collect();
        let max = logs.iter().map(|(_, l)| *l).fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Vec::new();
        }
        let total: f64 = logs.iter().map(|(_, l)| (l - max).exp()).sum();

        let mut posterior: Vec<(ConditionId, f64)> = logs
            .into_iter()
            .map(|(id, l)| (id.clone(), (l - max).exp() / total))
            .collect();
        posterior.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        posterior
    }

    /// Normalized probability of `id`; zero unless it is active.
    pub fn probability(&self, id: &str) -> f64 {
        self.posterior()
            .into_iter()
            .find(|(c, _)| c.as_str() == id)
            .map(|(_, p)| p)
            .unwrap_or(0.0)
    }

    /// Effective unnormalized score: zero for gated, excluded or pruned
    /// candidates.
    pub fn score(&self, id: &str) -> f64 {
        match self.hypotheses.get(id) {
            Some(h) if h.status().is_active() => h.raw_score(),
            _ => 0.0,
        }
    }

    /// Drop active candidates below `threshold`, then keep at most `max`.
    pub fn prune(&mut self, threshold: f64, max: usize) -> Result<PruneReport> {
        let posterior = self.posterior();
        let keep: BTreeSet<ConditionId> = posterior
            .iter()
            .filter(|(_, p)| *p >= threshold)
            .take(max)
            .map(|(id, _)| id.clone())
            .collect();
        self.retain(&posterior, keep)
    }

    /// Start-of-session pruning for oversized candidate sets: cap at `max`
    /// first, then drop what falls below `threshold` among the survivors.
    pub fn prune_aggressive(&mut self, threshold: f64, max: usize) -> Result<PruneReport> {
        let posterior = self.posterior();
        let head = &posterior[..posterior.len().min(max)];
        let mass: f64 = head.iter().map(|(_, p)| p).sum();
        let keep: BTreeSet<ConditionId> = head
            .iter()
            .filter(|(_, p)| mass > 0.0 && p / mass >= threshold)
            .map(|(id, _)| id.clone())
            .collect();
        self.retain(&posterior, keep)
    }

    fn retain(&mut self, posterior: &[(ConditionId, f64)], keep: BTreeSet<ConditionId>) -> Result<PruneReport> {
        let mut report = PruneReport {
            before: posterior.len(),
            ..Default::default()
        };
        if posterior.is_empty() {
            return Ok(report);
        }

        if keep.is_empty() {
            let fallback = self.pick_fallback(posterior);
            if let Some(fb) = &fallback {
                tracing::warn!(
                    condition = %fb.id,
                    confidence = fb.confidence,
                    "Every candidate was pruned; falling back to the most prevalent one"
                );
                report.fallback = Some(fb.id.clone());
            }
            self.fallback = fallback;
        }

        for (id, _) in posterior {
            if keep.contains(id) {
                continue;
            }
            if let Some(h) = self.hypotheses.get_mut(id) {
                h.set_status(HypothesisStatus::Pruned)?;
                report.dropped.push(id.clone());
            }
        }
        tracing::debug!(before = report.before, dropped = report.dropped.len(), "Pruned candidates");
        Ok(report)
    }

    fn pick_fallback(&self, posterior: &[(ConditionId, f64)]) -> Option<Fallback> {
        posterior
            .iter()
            .filter_map(|(id, p)| self.hypotheses.get(id).map(|h| (h, *p)))
            .max_by(|(a, _), (b, _)| fallback_order(a, b))
            .map(|(h, p)| Fallback {
                id: h.id().clone(),
                confidence: p,
            })
    }

    /// Candidate to report while nothing is active: the one pruning left
    /// behind, else the best gated candidate, else the best excluded one.
    /// Reading it changes nothing, so a later answer can still reopen a gate.
    pub fn report_fallback(&self) -> Option<Fallback> {
        if self.active_count() > 0 {
            return None;
        }
        if let Some(fallback) = &self.fallback {
            return Some(fallback.clone());
        }
        let pick = |status: HypothesisStatus| {
            self.hypotheses
                .values()
                .filter(|h| h.status() == status)
                .max_by(|a, b| fallback_order(a, b))
        };
        pick(HypothesisStatus::Dormant)
            .or_else(|| pick(HypothesisStatus::Excluded))
            .or_else(|| pick(HypothesisStatus::Pruned))
            .map(|h| Fallback {
                id: h.id().clone(),
                confidence: 0.0,
            })
    }
}

/// Higher prevalence wins, then higher raw score, then the smaller id.
fn fallback_order(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    a.prior
        .partial_cmp(&b.prior)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.log_score().partial_cmp(&b.log_score()).unwrap_or(Ordering::Equal))
        .then_with(|| b.id().cmp(a.id()))
}
