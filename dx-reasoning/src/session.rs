//! Diagnostic sessions
//!
//! A [`DiagnosticSession`] owns the belief state of one conversation. It is
//! never shared: the catalog and indices it reads come from a shared
//! [`IndexStore`], everything it writes is its own. Abandoning a session at
//! any question boundary needs no cleanup.
//!
//! Lifecycle:
//!
//! ```text
//! Initialized ──answer──> Updating ──answer──> ... ──> Terminal(reason)
//!      │                                                   ▲
//!      └── more than `aggressive_prune_threshold` ──> Pruned ┘
//! ```

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use dx_core::{Condition, EngineConfig, IndexStore, QuestionToken, UserSymptomData};

use crate::belief::{
    Answer, BeliefState, Confidence, HypothesisStatus, Polarity, ReasoningTraceEntry, SessionId, TraceKind,
};
use crate::clarify::{self, Clarification, ClarificationAnswer, Intensity};
use crate::errors::{ReasoningError, Result};
use crate::question::{CompoundQuestion, Question, Topic};
use crate::report::{DiagnosisReport, DiagnosisResult, TerminalReason};
use crate::selector::{QuestionChoice, QuestionSelector, SelectionReason};
use crate::temporal;
use crate::text::EvidenceExtractor;
use crate::triage::{TriageAlert, TriageScanner};
use crate::uncertainty::{EvidenceMetrics, UncertaintyEstimator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Seeded from retrieval, nothing answered yet
    Initialized,
    /// At least one answer applied
    Updating,
    /// Oversized candidate set pruned before the first question
    Pruned,
    Terminal(TerminalReason),
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Terminal(_))
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        match self {
            SessionPhase::Terminal(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Belief state and answers of one diagnostic conversation.
pub struct DiagnosticSession {
    id: SessionId,
    index: Arc<IndexStore>,
    config: EngineConfig,
    triage: TriageScanner,
    belief: BeliefState,
    answers: IndexMap<String, Answer>,
    clarified: IndexMap<Clarification, ClarificationAnswer>,
    /// Clarifications the intake already answered
    settled: BTreeSet<Clarification>,
    phase: SessionPhase,
    pending: Option<QuestionChoice>,
    alerts: Vec<TriageAlert>,
    intake_text: String,
    temporal_clarity: bool,
    questions_asked: usize,
    started_at: DateTime<Utc>,
}

impl DiagnosticSession {
    /// Seed a session from retrieved `candidates` and the user's intake.
    ///
    /// Intake fields and notes become initial answers, temporal cues adjust
    /// the priors, and built-in emergency rules run over the intake text.
    pub fn start(
        index: Arc<IndexStore>,
        config: EngineConfig,
        candidates: Vec<Arc<Condition>>,
        data: &UserSymptomData,
        extractor: &EvidenceExtractor,
        triage: TriageScanner,
    ) -> Result<Self> {
        let vocabulary = EvidenceExtractor::vocabulary(&candidates);
        let mut session = Self {
            id: SessionId::new(),
            index,
            config,
            triage,
            belief: BeliefState::seed(candidates),
            answers: IndexMap::new(),
            clarified: IndexMap::new(),
            settled: BTreeSet::new(),
            phase: SessionPhase::Initialized,
            pending: None,
            alerts: Vec::new(),
            intake_text: intake_text(data),
            temporal_clarity: temporal::has_temporal_clarity(data),
            questions_asked: 0,
            started_at: Utc::now(),
        };

        temporal::apply_temporal(&mut session.belief, data);
        if data.duration.as_deref().and_then(temporal::classify_duration).is_some() {
            session.settled.insert(Clarification::Duration);
        }
        if let Some(level) = data.intensity {
            let reply = ClarificationAnswer::Intensity(Intensity::from_scale(level));
            session.apply_clarification(reply);
        }

        let intake = extractor.extract(data, &vocabulary);
        for answer in &intake {
            session.apply_answer(answer.clone());
        }
        session.belief.refresh_gates(&session.known(), &session.excluded())?;

        let active = session.belief.active_count();
        if active > session.config.aggressive_prune_threshold {
            let report = session
                .belief
                .prune_aggressive(session.config.pruning_threshold, session.config.max_candidates)?;
            tracing::info!(before = report.before, retained = report.retained(), "Aggressive pruning before first question");
            session.phase = SessionPhase::Pruned;
        } else if !intake.is_empty() {
            session.prune()?;
        }

        session.scan_alerts();
        session.evaluate();

        tracing::info!(
            session = %session.id,
            candidates = session.belief.len(),
            active = session.belief.active_count(),
            intake_answers = intake.len(),
            phase = ?session.phase,
            "Diagnostic session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    pub fn alerts(&self) -> &[TriageAlert] {
        &self.alerts
    }

    /// Answers in the order they were first given
    pub fn answers(&self) -> impl Iterator<Item = &Answer> {
        self.answers.values()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Keys of affirmed tokens
    pub fn known(&self) -> BTreeSet<String> {
        self.keys_with(Polarity::Affirmed)
    }

    /// Keys of denied tokens
    pub fn excluded(&self) -> BTreeSet<String> {
        self.keys_with(Polarity::Denied)
    }

    fn keys_with(&self, polarity: Polarity) -> BTreeSet<String> {
        self.answers
            .iter()
            .filter(|(_, a)| a.polarity == polarity)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Clarification replies in the order they were first given
    pub fn clarifications(&self) -> impl Iterator<Item = &ClarificationAnswer> {
        self.clarified.values()
    }

    fn asked(&self) -> BTreeSet<String> {
        let clarifications = self.clarified.keys().chain(self.settled.iter()).map(|c| c.key().to_string());
        self.answers.keys().cloned().chain(clarifications).collect()
    }

    /// Active candidates with normalized probabilities, best first.
    pub fn ranked(&self) -> Vec<(dx_core::ConditionId, f64)> {
        self.belief.posterior()
    }

    /// The question to ask next, if the session is still open.
    pub fn next_question(&self) -> Option<Question> {
        if self.phase.is_terminal() {
            return None;
        }
        self.pending
            .as_ref()
            .map(|c| Question::new(c.topic.clone(), c.reason.clone()))
    }

    /// Up to `limit` symptom tokens bundled into one multi-choice question.
    pub fn next_compound_question(&self, limit: usize) -> Option<CompoundQuestion> {
        if self.phase.is_terminal() || limit == 0 {
            return None;
        }
        let selector = QuestionSelector::new(&self.index, &self.config);
        let options = selector.select_many(&self.belief, &self.asked(), limit);
        (!options.is_empty()).then(|| CompoundQuestion::new(options))
    }

    /// Apply one answer. A token answered before is overridden: its earlier
    /// factor is retracted and the new one applied.
    pub fn answer(&mut self, answer: Answer) -> Result<SessionPhase> {
        if self.phase.is_terminal() {
            return Err(ReasoningError::SessionTerminated(self.id));
        }
        let answer = Answer::new(answer.token, answer.polarity);
        if self.answers.get(&answer.key()) == Some(&answer) {
            return Ok(self.phase);
        }
        self.questions_asked += 1;
        self.apply_answer(answer);
        self.after_update()
    }

    /// Answer a duration or intensity question. A changed reply replaces
    /// the earlier one.
    pub fn answer_clarification(&mut self, reply: ClarificationAnswer) -> Result<SessionPhase> {
        if self.phase.is_terminal() {
            return Err(ReasoningError::SessionTerminated(self.id));
        }
        if self.clarified.get(&reply.topic()) == Some(&reply) {
            return Ok(self.phase);
        }
        self.questions_asked += 1;
        self.apply_clarification(reply);
        self.after_update()
    }

    /// Answer `question` by the index of the chosen option.
    pub fn respond(&mut self, question: &Question, option: usize) -> Result<SessionPhase> {
        let invalid = || ReasoningError::InvalidAnswer(format!("option {} of \"{}\"", option, question.text));
        match &question.topic {
            Topic::Token(token) => match option {
                0 => self.answer(Answer::yes(token.clone())),
                1 => self.answer(Answer::no(token.clone())),
                _ => Err(invalid()),
            },
            Topic::Clarification(topic) => {
                let reply = ClarificationAnswer::from_option(*topic, option).ok_or_else(invalid)?;
                self.answer_clarification(reply)
            }
        }
    }

    /// Answer a compound question: picked options are affirmed, every other
    /// option denied. An empty pick means "none of the above".
    pub fn answer_compound(&mut self, question: &CompoundQuestion, picked: &[QuestionToken]) -> Result<SessionPhase> {
        if self.phase.is_terminal() {
            return Err(ReasoningError::SessionTerminated(self.id));
        }
        if let Some(stray) = picked.iter().find(|p| !question.options.contains(p)) {
            return Err(ReasoningError::InvalidAnswer(format!(
                "{} is not an option of this question",
                stray
            )));
        }
        self.questions_asked += 1;
        for option in &question.options {
            let polarity = if picked.contains(option) {
                Polarity::Affirmed
            } else {
                Polarity::Denied
            };
            self.apply_answer(Answer::new(option.clone(), polarity));
            self.prune()?;
        }
        self.after_update()
    }

    /// Apply `answers` in order regardless of early exit, then re-evaluate.
    pub fn replay(&mut self, answers: impl IntoIterator<Item = Answer>) -> Result<SessionPhase> {
        let mut applied = false;
        for answer in answers {
            let answer = Answer::new(answer.token, answer.polarity);
            if self.answers.get(&answer.key()) == Some(&answer) {
                continue;
            }
            self.apply_answer(answer);
            self.belief.refresh_gates(&self.known(), &self.excluded())?;
            self.prune()?;
            applied = true;
        }
        if applied && !self.phase.is_terminal() {
            self.phase = SessionPhase::Updating;
        }
        self.scan_alerts();
        self.evaluate();
        Ok(self.phase)
    }

    fn apply_answer(&mut self, answer: Answer) {
        self.belief.apply(&answer);
        self.answers.insert(answer.key(), answer);
    }

    fn apply_clarification(&mut self, reply: ClarificationAnswer) {
        let topic = reply.topic();
        let affected = self
            .belief
            .apply_keyed(topic.key(), |c| clarify::likelihood(c, &reply));
        tracing::debug!(session = %self.id, ?reply, affected, "Applied clarification");
        if topic == Clarification::Duration {
            self.temporal_clarity = true;
        }
        self.clarified.insert(topic, reply);
    }

    fn after_update(&mut self) -> Result<SessionPhase> {
        self.belief.refresh_gates(&self.known(), &self.excluded())?;
        self.prune()?;
        self.phase = SessionPhase::Updating;
        self.scan_alerts();
        self.evaluate();
        Ok(self.phase)
    }

    fn prune(&mut self) -> Result<()> {
        let report = self
            .belief
            .prune(self.config.pruning_threshold, self.config.max_candidates)?;
        if !report.dropped.is_empty() {
            tracing::debug!(session = %self.id, dropped = report.dropped.len(), retained = report.retained(), "Pruned after update");
        }
        Ok(())
    }

    /// Emergency rules over the intake plus every affirmed token, and the
    /// red flags of every candidate still in bookkeeping. Alerts accumulate.
    fn scan_alerts(&mut self) {
        let affirmed: Vec<String> = self
            .answers
            .values()
            .filter(|a| a.is_affirmed())
            .map(|a| a.token.symptom.clone())
            .collect();
        let text = format!("{}. {}", self.intake_text, affirmed.join(", "));
        let conditions = self.belief.hypotheses().map(|h| h.condition.as_ref());
        for alert in self.triage.scan(conditions, &text) {
            if !self.alerts.contains(&alert) {
                self.alerts.push(alert);
            }
        }
    }

    /// Decide whether to stop, and if not, which question comes next.
    fn evaluate(&mut self) {
        self.pending = None;
        if self.phase.is_terminal() {
            return;
        }

        let posterior = self.belief.posterior();
        let reason = if posterior.len() <= 1 {
            if let Some(choice) = self.mandatory_choice() {
                self.pending = Some(choice);
                return;
            }
            Some(if posterior.is_empty() {
                TerminalReason::Exhausted
            } else {
                TerminalReason::SingleCandidate
            })
        } else if posterior[0].1 >= self.config.early_exit_probability() {
            Some(TerminalReason::Confident)
        } else {
            let selector = QuestionSelector::new(&self.index, &self.config);
            match selector.select(&self.belief, &self.asked()) {
                Some(choice) => {
                    self.pending = Some(choice);
                    None
                }
                None => Some(TerminalReason::NoInformativeQuestion),
            }
        };

        if let Some(reason) = reason {
            tracing::info!(session = %self.id, ?reason, questions = self.questions_asked, "Session reached terminal state");
            self.phase = SessionPhase::Terminal(reason);
        }
    }

    /// First unasked mandatory symptom of the most prevalent gated candidate.
    fn mandatory_choice(&self) -> Option<QuestionChoice> {
        let asked = self.asked();
        let mut dormant: Vec<_> = self
            .belief
            .hypotheses()
            .filter(|h| h.status() == HypothesisStatus::Dormant)
            .collect();
        dormant.sort_by(|a, b| {
            b.prior
                .partial_cmp(&a.prior)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        dormant.into_iter().find_map(|h| {
            h.condition
                .mandatory_symptoms
                .iter()
                .find(|m| !asked.contains(*m))
                .map(|m| QuestionChoice {
                    topic: Topic::Token(QuestionToken::symptom(m.clone())),
                    reason: SelectionReason::Mandatory {
                        condition: h.id().clone(),
                    },
                    coverage: 0.0,
                })
        })
    }

    /// Ranked results with uncertainty. Never empty for a non-empty
    /// candidate set: when nothing is admissible the fallback candidate is
    /// reported with `is_fallback` and `uncertainty_flag` set. Reading
    /// results leaves the session untouched.
    pub fn results(&self) -> Result<Vec<DiagnosisResult>> {
        let estimator = UncertaintyEstimator::new(self.config.uncertainty_overlap_ratio);
        let posterior = self.belief.posterior();

        if posterior.is_empty() {
            let Some(fallback) = self.belief.report_fallback() else {
                return Ok(Vec::new());
            };
            let Some(h) = self.belief.get(fallback.id.as_str()) else {
                return Ok(Vec::new());
            };
            let metrics = EvidenceMetrics::for_hypothesis(h, self.temporal_clarity);
            let mut uncertainty = estimator.estimate(fallback.confidence * 100.0, &metrics, 0);
            uncertainty.should_request_more_info = true;
            let mut reasoning_trace = h.trace().to_vec();
            reasoning_trace.push(ReasoningTraceEntry::new(
                "Fallback: no admissible candidate left",
                1.0,
                TraceKind::Fallback,
            ));
            return Ok(vec![DiagnosisResult {
                condition: Arc::clone(&h.condition),
                confidence: Confidence::saturating(fallback.confidence)?,
                matched_keywords: h.matched_keywords(),
                reasoning_trace,
                uncertainty,
                uncertainty_flag: true,
                is_fallback: true,
            }]);
        }

        let members: Vec<_> = posterior
            .iter()
            .filter_map(|(id, p)| self.belief.get(id.as_str()).map(|h| (h, *p)))
            .collect();
        let ranked: Vec<(f64, EvidenceMetrics)> = members
            .iter()
            .map(|(h, p)| (p * 100.0, EvidenceMetrics::for_hypothesis(h, self.temporal_clarity)))
            .collect();
        let (estimates, flags) = estimator.estimate_ranked(&ranked);

        members
            .into_iter()
            .zip(estimates)
            .zip(flags)
            .map(|(((h, p), uncertainty), flag)| -> Result<DiagnosisResult> {
                Ok(DiagnosisResult {
                    condition: Arc::clone(&h.condition),
                    confidence: Confidence::saturating(p)?,
                    matched_keywords: h.matched_keywords(),
                    reasoning_trace: h.trace().to_vec(),
                    uncertainty,
                    uncertainty_flag: flag,
                    is_fallback: false,
                })
            })
            .collect()
    }

    /// Final report. May be called at any point; an open session reports
    /// its current ranking without a terminal reason.
    pub fn finish(&self) -> Result<DiagnosisReport> {
        let results = self.results()?;
        tracing::info!(
            session = %self.id,
            results = results.len(),
            alerts = self.alerts.len(),
            questions = self.questions_asked,
            "Session finished"
        );
        Ok(DiagnosisReport {
            session_id: self.id,
            results,
            alerts: self.alerts.clone(),
            terminal_reason: self.phase.terminal_reason(),
            questions_asked: self.questions_asked,
            completed_at: Utc::now(),
        })
    }
}

fn intake_text(data: &UserSymptomData) -> String {
    let mut parts: Vec<&str> = data.locations.iter().map(String::as_str).collect();
    parts.extend(data.pain_type.as_deref());
    parts.extend(data.triggers.as_deref());
    parts.extend(data.additional_notes.as_deref());
    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_core::{Catalog, IndexConfig, MatchCriteria, Prevalence};

    fn condition(id: &str, symptoms: &[&str]) -> Condition {
        Condition::new(
            id,
            id,
            MatchCriteria {
                locations: vec!["head".into()],
                special_symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    fn session(conditions: Vec<Condition>, data: &UserSymptomData) -> DiagnosticSession {
        let catalog = Catalog::new(conditions).unwrap();
        let candidates = catalog.all();
        let index = IndexStore::shared(catalog, &IndexConfig::default());
        DiagnosticSession::start(
            index,
            EngineConfig::default(),
            candidates,
            data,
            &EvidenceExtractor::new().unwrap(),
            TriageScanner::new().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_session_asks_a_question() {
        let s = session(
            vec![condition("a", &["nausea"]), condition("b", &["aura"])],
            &UserSymptomData::at(["head"]),
        );
        assert_eq!(s.phase(), SessionPhase::Initialized);
        let q = s.next_question().unwrap();
        assert!(q.text.starts_with("Do you also experience"));
    }

    #[test]
    fn test_answer_after_terminal_is_rejected() {
        let mut s = session(vec![condition("a", &["nausea"])], &UserSymptomData::default());
        assert_eq!(s.phase(), SessionPhase::Terminal(TerminalReason::SingleCandidate));
        assert!(s.next_question().is_none());
        assert!(matches!(
            s.answer(Answer::has("nausea")),
            Err(ReasoningError::SessionTerminated(_))
        ));
    }

    #[test]
    fn test_repeated_answer_is_a_no_op() {
        let mut s = session(
            vec![condition("a", &["nausea", "aura"]), condition("b", &["fever", "rash"])],
            &UserSymptomData::default(),
        );
        s.answer(Answer::lacks("aura")).unwrap();
        let before = s.ranked();
        let asked = s.questions_asked;
        s.answer(Answer::lacks("aura")).unwrap();
        assert_eq!(s.ranked(), before);
        assert_eq!(s.questions_asked, asked);
    }

    #[test]
    fn test_intake_notes_seed_answers() {
        let data = UserSymptomData {
            locations: vec!["head".into()],
            additional_notes: Some("feeling queasy, no fever".into()),
            ..Default::default()
        };
        let s = session(
            vec![condition("a", &["nausea", "aura"]), condition("b", &["fever", "rash"])],
            &data,
        );
        assert!(s.known().contains("nausea"));
        assert!(s.excluded().contains("fever"));
        assert!(s.belief().probability("a") > s.belief().probability("b"));
    }

    #[test]
    fn test_compound_question_denies_unpicked_options() {
        let mut s = session(
            vec![
                condition("a", &["nausea", "aura"]),
                condition("b", &["fever", "rash"]),
                condition("c", &["cough"]),
            ],
            &UserSymptomData::default(),
        );
        let q = s.next_compound_question(3).unwrap();
        assert_eq!(q.options.len(), 3);
        let picked = vec![q.options[0].clone()];
        s.answer_compound(&q, &picked).unwrap();
        assert_eq!(s.known().len(), 1);
        assert_eq!(s.excluded().len(), 2);

        let stray = vec![QuestionToken::symptom("sneezing")];
        assert!(matches!(
            s.answer_compound(&q, &stray),
            Err(ReasoningError::InvalidAnswer(_)) | Err(ReasoningError::SessionTerminated(_))
        ));
    }

    #[test]
    fn test_intake_settles_clarifications() {
        let mut a = condition("a", &["nausea"]);
        a.match_criteria.duration_hint = Some(dx_core::DurationHint::Chronic);
        a.severity = dx_core::Severity::Severe;
        let mut b = condition("b", &["nausea"]);
        b.match_criteria.duration_hint = Some(dx_core::DurationHint::Acute);
        let data = UserSymptomData {
            locations: vec!["head".into()],
            duration: Some("6months+".into()),
            intensity: Some(9),
            ..Default::default()
        };
        let s = session(vec![a, b], &data);

        let asked = s.asked();
        assert!(asked.contains(Clarification::Duration.key()));
        assert!(asked.contains(Clarification::Intensity.key()));
        assert_eq!(
            s.clarifications().collect::<Vec<_>>(),
            vec![&ClarificationAnswer::Intensity(Intensity::Severe)]
        );
        assert!(s.belief().probability("a") > s.belief().probability("b"));
    }

    #[test]
    fn test_respond_rejects_unknown_option() {
        let mut s = session(
            vec![condition("a", &["nausea"]), condition("b", &["aura"])],
            &UserSymptomData::at(["head"]),
        );
        let q = s.next_question().unwrap();
        assert!(matches!(s.respond(&q, 2), Err(ReasoningError::InvalidAnswer(_))));
        s.respond(&q, 1).unwrap();
        assert_eq!(s.excluded().len(), 1);
    }

    #[test]
    fn test_gated_candidate_gets_mandatory_question() {
        let mut gated = condition("acs", &["sweating"]);
        gated.mandatory_symptoms = vec!["chest pain".into()];
        gated.prevalence = Some(Prevalence::Common);
        let s = session(vec![gated, condition("b", &["nausea"])], &UserSymptomData::default());

        let q = s.next_question().unwrap();
        assert_eq!(q.token(), Some(&QuestionToken::symptom("chest pain")));
        assert!(matches!(q.reason, SelectionReason::Mandatory { .. }));
    }
}
