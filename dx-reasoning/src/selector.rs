//! Question Selector
//!
//! Picks the next clarification token for a session. In order:
//!
//! 1. **Mimic differentiation**: if two of the leading candidates list each
//!    other as mimics, ask the token that best separates exactly that pair.
//! 2. The configured [`SelectionStrategy`]: either the global
//!    discriminability ranking (with information gain over the live
//!    candidates as backup), or information gain alone.
//! 3. A duration or intensity [`Clarification`] replaces that token when it
//!    is expected to carry more information.
//!
//! A token is only asked when its *coverage* over the active candidates,
//! `2 * min(yes_mass, 1 - yes_mass)`, reaches `min_coverage_ratio`; a
//! clarification likewise needs `2 * min(mass of one reply, mass of the
//! other)` to reach it. When nothing qualifies the session has nothing
//! informative left to ask.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use dx_core::{ConditionId, EngineConfig, IndexStore, QuestionToken, SelectionStrategy, TokenKind};

use crate::belief::{BeliefState, Hypothesis};
use crate::clarify::{Clarification, ClarificationAnswer};
use crate::question::Topic;

/// Generic infection words never asked as triggers.
pub const TRIGGER_BLACKLIST: &[&str] = &["flu", "virus", "infection", "bacteria", "disease", "sickness", "cold"];

/// P(yes) assumed for a candidate that does not mention the token at all
pub const UNRELATED_YES_RATE: f64 = 0.1;

/// P(reply) for a candidate whose profile predicts that reply
pub const EXPECTED_REPLY_RATE: f64 = 0.8;

/// Why a token was selected
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// Separates two leading candidates that mimic each other
    Mimic { a: ConditionId, b: ConditionId },
    /// Highest-ranked token of the global discriminability ranking
    GlobalRanking { rank: usize },
    /// Maximum expected information gain over the live candidates
    InformationGain { bits: f64 },
    /// Confirms a mandatory symptom of a gated candidate
    Mandatory { condition: ConditionId },
    /// Duration or intensity question splitting the live candidates
    Clarification { bits: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuestionChoice {
    pub topic: Topic,
    pub reason: SelectionReason,
    pub coverage: f64,
}

impl QuestionChoice {
    fn token(token: QuestionToken, reason: SelectionReason, coverage: f64) -> Self {
        Self {
            topic: Topic::Token(token),
            reason,
            coverage,
        }
    }
}

/// Chooses questions against one shared index.
pub struct QuestionSelector<'a> {
    index: &'a IndexStore,
    config: &'a EngineConfig,
}

impl<'a> QuestionSelector<'a> {
    pub fn new(index: &'a IndexStore, config: &'a EngineConfig) -> Self {
        Self { index, config }
    }

    pub fn is_blacklisted(token: &QuestionToken) -> bool {
        token.kind == TokenKind::Trigger && TRIGGER_BLACKLIST.contains(&token.symptom.as_str())
    }

    /// Next question to ask, or `None` when nothing informative is left.
    /// `asked` holds the namespaced keys already answered.
    pub fn select(&self, belief: &BeliefState, asked: &BTreeSet<String>) -> Option<QuestionChoice> {
        let live = Live::new(belief);
        if live.len() < 2 {
            return None;
        }

        if let Some(choice) = self.mimic_choice(&live, asked) {
            tracing::debug!(topic = ?choice.topic, reason = ?choice.reason, "Selected mimic question");
            return Some(choice);
        }

        let token_choice = match self.config.selection_strategy {
            SelectionStrategy::GlobalRanking => self
                .ranking_choice(&live, asked)
                .or_else(|| self.information_gain_choice(&live, asked)),
            SelectionStrategy::InformationGain => self.information_gain_choice(&live, asked),
        };
        let choice = match (token_choice, self.clarification_choice(&live, asked)) {
            (Some(token), Some((clarify, bits))) => {
                let token_bits = match (&token.topic, &token.reason) {
                    (_, SelectionReason::InformationGain { bits: token_gain }) => *token_gain,
                    (Topic::Token(t), _) => live.information_gain(t),
                    _ => 0.0,
                };
                Some(if bits > token_bits { clarify } else { token })
            }
            (token, clarify) => token.or(clarify.map(|(c, _)| c)),
        };
        match &choice {
            Some(c) => tracing::debug!(topic = ?c.topic, reason = ?c.reason, coverage = c.coverage, "Selected question"),
            None => tracing::debug!(active = live.len(), "No informative question left"),
        }
        choice
    }

    /// Unasked clarification with the highest expected information gain,
    /// provided its replies split the live candidates widely enough.
    fn clarification_choice(&self, live: &Live<'_>, asked: &BTreeSet<String>) -> Option<(QuestionChoice, f64)> {
        Clarification::ALL
            .into_iter()
            .filter(|c| !asked.contains(c.key()))
            .filter_map(|topic| {
                let (first, second) = live.reply_masses(topic);
                let coverage = 2.0 * first.min(second);
                if coverage < self.config.min_coverage_ratio {
                    return None;
                }
                let bits = live.clarification_gain(topic);
                (bits > f64::EPSILON).then(|| {
                    let choice = QuestionChoice {
                        topic: Topic::Clarification(topic),
                        reason: SelectionReason::Clarification { bits },
                        coverage,
                    };
                    (choice, bits)
                })
            })
            .max_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(Ordering::Equal).then_with(|| y.0.topic.cmp(&x.0.topic)))
    }

    /// Up to `limit` informative symptom tokens, best first.
    pub fn select_many(&self, belief: &BeliefState, asked: &BTreeSet<String>, limit: usize) -> Vec<QuestionToken> {
        let live = Live::new(belief);
        let mut scored: Vec<(QuestionToken, f64)> = live
            .tokens()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Symptom && !asked.contains(&t.key()))
            .filter(|t| live.coverage(t) > 0.0)
            .map(|t| {
                let gain = live.information_gain(&t);
                (t, gain)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.into_iter().take(limit).map(|(t, _)| t).collect()
    }

    /// Coverage of `token` over the active candidates of `belief`.
    pub fn coverage(belief: &BeliefState, token: &QuestionToken) -> f64 {
        Live::new(belief).coverage(token)
    }

    /// Expected information gain, in bits, of asking `token`.
    pub fn expected_information_gain(belief: &BeliefState, token: &QuestionToken) -> f64 {
        Live::new(belief).information_gain(token)
    }

    fn askable(&self, token: &QuestionToken, asked: &BTreeSet<String>) -> bool {
        !asked.contains(&token.key()) && !Self::is_blacklisted(token)
    }

    fn mimic_choice(&self, live: &Live<'_>, asked: &BTreeSet<String>) -> Option<QuestionChoice> {
        let top = &live.members[..live.len().min(self.config.mimic_window)];
        let (a, pa, b, pb) = top.iter().enumerate().find_map(|(i, (a, pa))| {
            top[i + 1..]
                .iter()
                .find(|(b, _)| a.condition.is_mimicked_by(b.id()) || b.condition.is_mimicked_by(a.id()))
                .map(|(b, pb)| (*a, *pa, *b, *pb))
        })?;

        // within the pair a unique token splits pa : pb
        let share = pa / (pa + pb);
        let pair_coverage = 2.0 * share.min(1.0 - share);
        if pair_coverage < self.config.min_coverage_ratio {
            return None;
        }

        let side = |owner: &Hypothesis, other: &Hypothesis| -> Vec<(QuestionToken, f64)> {
            owner
                .condition
                .match_criteria
                .profile_tokens()
                .filter(|(kind, token)| !other.condition.match_criteria.exhibits(*kind, token))
                .map(|(kind, token)| {
                    let w = owner.condition.match_criteria.weight_for(token);
                    (QuestionToken::new(kind, token), w.weight * w.sensitivity)
                })
                .collect()
        };
        let mut unique = side(a, b);
        unique.extend(side(b, a));

        unique
            .into_iter()
            .filter(|(t, _)| self.askable(t, asked))
            .max_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(Ordering::Equal).then_with(|| y.0.cmp(&x.0)))
            .map(|(token, _)| {
                let reason = SelectionReason::Mimic {
                    a: a.id().clone(),
                    b: b.id().clone(),
                };
                QuestionChoice::token(token, reason, pair_coverage)
            })
    }

    fn ranking_choice(&self, live: &Live<'_>, asked: &BTreeSet<String>) -> Option<QuestionChoice> {
        self.index
            .symptoms()
            .ranking()
            .iter()
            .enumerate()
            .filter(|(_, q)| self.askable(&q.token, asked))
            .map(|(rank, q)| (rank, q, live.coverage(&q.token)))
            .find(|(_, _, coverage)| *coverage >= self.config.min_coverage_ratio)
            .map(|(rank, q, coverage)| {
                QuestionChoice::token(q.token.clone(), SelectionReason::GlobalRanking { rank }, coverage)
            })
    }

    fn information_gain_choice(&self, live: &Live<'_>, asked: &BTreeSet<String>) -> Option<QuestionChoice> {
        live.tokens()
            .into_iter()
            .filter(|t| self.askable(t, asked))
            .map(|t| {
                let coverage = live.coverage(&t);
                (t, coverage)
            })
            .filter(|(_, coverage)| *coverage >= self.config.min_coverage_ratio)
            .map(|(t, coverage)| {
                let bits = live.information_gain(&t);
                (t, coverage, bits)
            })
            .filter(|(_, _, bits)| *bits > f64::EPSILON)
            .max_by(|x, y| x.2.partial_cmp(&y.2).unwrap_or(Ordering::Equal).then_with(|| y.0.cmp(&x.0)))
            .map(|(token, coverage, bits)| {
                QuestionChoice::token(token, SelectionReason::InformationGain { bits }, coverage)
            })
    }
}

/// Active candidates with their normalized probabilities, highest first.
struct Live<'a> {
    members: Vec<(&'a Hypothesis, f64)>,
}

impl<'a> Live<'a> {
    fn new(belief: &'a BeliefState) -> Self {
        let members = belief
            .posterior()
            .into_iter()
            .filter_map(|(id, p)| belief.get(id.as_str()).map(|h| (h, p)))
            .collect();
        Self { members }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    /// Every profile token of the live candidates
    fn tokens(&self) -> BTreeSet<QuestionToken> {
        self.members
            .iter()
            .flat_map(|&(h, _)| h.condition.match_criteria.profile_tokens())
            .map(|(kind, token)| QuestionToken::new(kind, token))
            .collect()
    }

    fn coverage(&self, token: &QuestionToken) -> f64 {
        let yes: f64 = self
            .members
            .iter()
            .filter(|(h, _)| h.condition.match_criteria.exhibits(token.kind, &token.symptom))
            .map(|(_, p)| p)
            .sum();
        2.0 * yes.min(1.0 - yes).max(0.0)
    }

    fn information_gain(&self, token: &QuestionToken) -> f64 {
        self.gain_with(|h| yes_rate(h, token))
    }

    /// Probability mass predicting the first and the second reply of `topic`.
    fn reply_masses(&self, topic: Clarification) -> (f64, f64) {
        let first = ClarificationAnswer::from_option(topic, 0);
        let second = ClarificationAnswer::from_option(topic, 1);
        self.members.iter().fold((0.0, 0.0), |(a, b), (h, p)| {
            let expected = topic.expected(&h.condition);
            if expected.is_some() && expected == first {
                (a + p, b)
            } else if expected.is_some() && expected == second {
                (a, b + p)
            } else {
                (a, b)
            }
        })
    }

    /// Expected information gain of asking `topic`, read as "is it the
    /// second option?".
    fn clarification_gain(&self, topic: Clarification) -> f64 {
        let second = ClarificationAnswer::from_option(topic, 1);
        self.gain_with(|h| match topic.expected(&h.condition) {
            None => 0.5,
            expected if expected == second => EXPECTED_REPLY_RATE,
            _ => 1.0 - EXPECTED_REPLY_RATE,
        })
    }

    fn gain_with(&self, yes_rate: impl Fn(&Hypothesis) -> f64) -> f64 {
        let rates: Vec<(f64, f64)> = self
            .members
            .iter()
            .map(|(h, p)| (*p, yes_rate(h)))
            .collect();
        let p_yes: f64 = rates.iter().map(|(p, q)| p * q).sum();
        if p_yes <= 0.0 || p_yes >= 1.0 {
            return 0.0;
        }
        let prior = entropy(rates.iter().map(|(p, _)| *p));
        let after_yes = entropy(rates.iter().map(|(p, q)| p * q / p_yes));
        let after_no = entropy(rates.iter().map(|(p, q)| p * (1.0 - q) / (1.0 - p_yes)));
        (prior - p_yes * after_yes - (1.0 - p_yes) * after_no).max(0.0)
    }
}

/// P(user answers yes | candidate)
fn yes_rate(h: &Hypothesis, token: &QuestionToken) -> f64 {
    let criteria = &h.condition.match_criteria;
    if criteria.exhibits(token.kind, &token.symptom) {
        criteria.weight_for(&token.symptom).sensitivity
    } else if token.kind == TokenKind::Symptom && criteria.argues_against(&token.symptom) {
        1.0 - criteria.weight_for(&token.symptom).specificity
    } else {
        UNRELATED_YES_RATE
    }
}

fn entropy(ps: impl Iterator<Item = f64>) -> f64 {
    ps.filter(|p| *p > 0.0).map(|p| -p * p.log2()).sum()
}
