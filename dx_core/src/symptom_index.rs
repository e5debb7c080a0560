//! Symptom Discriminability Index.
//!
//! Inverted index from namespaced token to the conditions exhibiting it, and
//! a global ranking of tokens by how evenly they split the full catalog.
//! The ranking is a prior computed once per catalog; it is not conditioned
//! on any session's live candidate set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::condition::{ConditionId, TokenKind};
use crate::config::IndexConfig;

/// A clarification question candidate: a token and its namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionToken {
    pub symptom: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl QuestionToken {
    pub fn new(kind: TokenKind, symptom: impl Into<String>) -> Self {
        Self {
            symptom: symptom.into(),
            kind,
        }
    }

    pub fn symptom(symptom: impl Into<String>) -> Self {
        Self::new(TokenKind::Symptom, symptom)
    }

    /// Namespaced index key, e.g. `trigger:cold`.
    pub fn key(&self) -> String {
        self.kind.namespaced(&self.symptom)
    }

    pub fn from_key(key: &str) -> Self {
        let (kind, symptom) = TokenKind::parse_namespaced(key);
        Self::new(kind, symptom)
    }
}

impl std::fmt::Display for QuestionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedQuestion {
    pub token: QuestionToken,
    /// Conditions in the full catalog exhibiting the token
    pub condition_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymptomIndex {
    postings: BTreeMap<String, BTreeSet<ConditionId>>,
    ranking: Vec<RankedQuestion>,
    total: usize,
}

impl SymptomIndex {
    pub fn build(catalog: &Catalog, config: &IndexConfig) -> Self {
        let mut postings: BTreeMap<String, BTreeSet<ConditionId>> = BTreeMap::new();
        for condition in catalog.iter() {
            for (kind, token) in condition.match_criteria.profile_tokens() {
                postings
                    .entry(kind.namespaced(token))
                    .or_default()
                    .insert(condition.id.clone());
            }
        }

        let total = catalog.len();
        let ranking = rank(&postings, total, config);
        Self {
            postings,
            ranking,
            total,
        }
    }

    /// Conditions exhibiting `token` in namespace `kind`.
    pub fn conditions_with(&self, kind: TokenKind, token: &str) -> Option<&BTreeSet<ConditionId>> {
        self.postings.get(&kind.namespaced(token))
    }

    pub fn postings(&self) -> impl Iterator<Item = (&str, &BTreeSet<ConditionId>)> {
        self.postings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Precomputed ranking, best discriminator first.
    pub fn ranking(&self) -> &[RankedQuestion] {
        &self.ranking
    }

    /// Number of conditions the ranking was computed against.
    pub fn total_conditions(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// First ranked token whose key is in neither `known` nor `excluded`.
    pub fn best_question(
        &self,
        known: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Option<&QuestionToken> {
        self.ranking
            .iter()
            .map(|q| &q.token)
            .find(|t| {
                let key = t.key();
                !known.contains(&key) && !excluded.contains(&key)
            })
    }
}

fn rank(
    postings: &BTreeMap<String, BTreeSet<ConditionId>>,
    total: usize,
    config: &IndexConfig,
) -> Vec<RankedQuestion> {
    if total == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<RankedQuestion> = postings
        .iter()
        .filter(|(_, ids)| {
            let ratio = ids.len() as f64 / total as f64;
            ratio >= config.min_token_ratio && ratio <= config.max_token_ratio
        })
        .map(|(key, ids)| RankedQuestion {
            token: QuestionToken::from_key(key),
            condition_count: ids.len(),
        })
        .collect();

    // Distance from an even split, doubled to stay in integers.
    ranked.sort_by(|a, b| {
        let da = (2 * a.condition_count).abs_diff(total);
        let db = (2 * b.condition_count).abs_diff(total);
        da.cmp(&db).then_with(|| a.token.key().cmp(&b.token.key()))
    });
    ranked.truncate(config.top_questions);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, MatchCriteria};

    fn condition(id: &str, symptoms: &[&str], triggers: &[&str]) -> Condition {
        Condition::new(
            id,
            id,
            MatchCriteria {
                locations: vec!["head".to_string()],
                special_symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
                triggers: triggers.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            condition("a", &["nausea", "fever"], &["cold"]),
            condition("b", &["nausea", "cold"], &[]),
            condition("c", &["fever"], &[]),
            condition("d", &["rash"], &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let index = SymptomIndex::build(&catalog(), &IndexConfig::default());
        let trigger = index.conditions_with(TokenKind::Trigger, "cold").unwrap();
        let symptom = index.conditions_with(TokenKind::Symptom, "cold").unwrap();
        assert_eq!(trigger.iter().map(|c| c.as_str()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(symptom.iter().map(|c| c.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_even_split_ranks_first() {
        let index = SymptomIndex::build(&catalog(), &IndexConfig::default());
        let first = &index.ranking()[0];
        // fever and nausea both split 2/4; ties break on the key
        assert_eq!(first.token, QuestionToken::symptom("fever"));
        assert_eq!(first.condition_count, 2);
    }

    #[test]
    fn test_ratio_window_excludes_extremes() {
        let config = IndexConfig {
            min_token_ratio: 0.3,
            max_token_ratio: 0.6,
            top_questions: 50,
        };
        let index = SymptomIndex::build(&catalog(), &config);
        // single-condition tokens (ratio 0.25) are dropped
        assert!(index.ranking().iter().all(|q| q.condition_count == 2));
    }

    #[test]
    fn test_best_question_skips_answered() {
        let index = SymptomIndex::build(&catalog(), &IndexConfig::default());
        let known = BTreeSet::from(["fever".to_string()]);
        let excluded = BTreeSet::from(["nausea".to_string()]);
        let next = index.best_question(&known, &excluded).unwrap();
        assert_ne!(next.key(), "fever");
        assert_ne!(next.key(), "nausea");
    }

    #[test]
    fn test_best_question_none_when_exhausted() {
        let index = SymptomIndex::build(&catalog(), &IndexConfig::default());
        let known: BTreeSet<String> = index.ranking().iter().map(|q| q.token.key()).collect();
        assert!(index.best_question(&known, &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_empty_catalog() {
        let index = SymptomIndex::build(&Catalog::empty(), &IndexConfig::default());
        assert!(index.ranking().is_empty());
        assert!(index.best_question(&BTreeSet::new(), &BTreeSet::new()).is_none());
    }
}
