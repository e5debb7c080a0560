//! Free-text evidence extraction
//!
//! Turns the structured intake fields and the free-form notes of a
//! [`UserSymptomData`] into initial answers. Notes are matched against a
//! vocabulary drawn from the candidates themselves, so only tokens that can
//! move a score are ever extracted.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dx_core::{normalize_token, Condition, QuestionToken, TokenKind, UserSymptomData};

use crate::belief::Answer;
use crate::errors::Result;

const NEGATION_PATTERN: &str =
    r"\b(?:no|not|without|doesn't have|doesnt have|dont have|don't have)\s+([a-z\s]+?)(?:[.,;]|$)";

/// Everyday words users type for catalog vocabulary.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("nausea", &["vomit", "puke", "throw up", "sick to stomach", "queasy"]),
    ("fever", &["high temp", "hot", "temperature", "burning up", "chills"]),
    ("pain", &["hurt", "ache", "sore", "throbbing", "discomfort"]),
    ("stomach", &["belly", "tummy", "abdomen", "gut"]),
    ("cold", &["chilly", "freezing", "shivering"]),
    ("cough", &["coughing", "hack"]),
    ("breathing", &["breath", "short of breath", "gasping"]),
    ("fatigue", &["tired", "weak", "exhausted", "drained", "sleepy"]),
];

/// Extracts answers from intake text.
#[derive(Debug, Clone)]
pub struct EvidenceExtractor {
    negation: Regex,
}

impl EvidenceExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            negation: Regex::new(NEGATION_PATTERN)?,
        })
    }

    /// Every token the candidates can react to.
    pub fn vocabulary(candidates: &[Arc<Condition>]) -> BTreeSet<QuestionToken> {
        let mut vocabulary = BTreeSet::new();
        for c in candidates {
            let criteria = &c.match_criteria;
            vocabulary.extend(
                criteria
                    .profile_tokens()
                    .map(|(kind, token)| QuestionToken::new(kind, token)),
            );
            vocabulary.extend(
                criteria
                    .absent_symptoms
                    .iter()
                    .chain(&c.mandatory_symptoms)
                    .map(QuestionToken::symptom),
            );
        }
        vocabulary
    }

    /// Initial answers, one per token. Structured fields take precedence
    /// over notes.
    pub fn extract(&self, data: &UserSymptomData, vocabulary: &BTreeSet<QuestionToken>) -> Vec<Answer> {
        let mut answers: BTreeMap<String, Answer> = BTreeMap::new();
        let mut push = |answer: Answer| {
            answers.entry(answer.key()).or_insert(answer);
        };

        for part in data.pain_type.iter().flat_map(|p| split_list(p)) {
            let ty = QuestionToken::new(TokenKind::Type, part.clone());
            if vocabulary.contains(&ty) {
                push(Answer::yes(ty));
            } else if vocabulary.contains(&QuestionToken::symptom(part.clone())) {
                push(Answer::has(&part));
            }
        }
        for part in data.triggers.iter().flat_map(|t| split_list(t)) {
            let trigger = QuestionToken::new(TokenKind::Trigger, part);
            if vocabulary.contains(&trigger) {
                push(Answer::yes(trigger));
            }
        }
        for denied in &data.excluded_symptoms {
            let token = normalize_token(denied);
            if !token.is_empty() {
                push(Answer::lacks(&token));
            }
        }

        if let Some(notes) = data.additional_notes.as_deref() {
            for answer in self.scan_notes(notes, vocabulary) {
                push(answer);
            }
        }

        let answers: Vec<Answer> = answers.into_values().collect();
        tracing::debug!(count = answers.len(), "Extracted intake answers");
        answers
    }

    /// Symptom and type mentions in `notes`, denied when they fall inside a
    /// negated phrase.
    pub fn scan_notes(&self, notes: &str, vocabulary: &BTreeSet<QuestionToken>) -> Vec<Answer> {
        let lowered = notes.to_lowercase();
        let text = padded(&lowered);
        let negated: Vec<String> = self
            .negation
            .captures_iter(&lowered)
            .filter_map(|c| c.get(1))
            .map(|m| padded(m.as_str()))
            .collect();

        let mut answers = Vec::new();
        for token in vocabulary.iter().filter(|t| t.kind != TokenKind::Trigger) {
            let spellings = spellings(&token.symptom);
            let mentioned = |haystack: &str| spellings.iter().any(|s| haystack.contains(&padded(s)));
            if !mentioned(text.as_str()) {
                continue;
            }
            if negated.iter().any(|phrase| mentioned(phrase.as_str())) {
                answers.push(Answer::no(token.clone()));
            } else {
                answers.push(Answer::yes(token.clone()));
            }
        }
        answers
    }
}

/// The token itself plus every combination of synonym substitutions.
fn spellings(token: &str) -> Vec<String> {
    let mut out = vec![token.to_string()];
    for (canonical, variants) in SYNONYMS {
        if !padded(token).contains(&padded(canonical)) {
            continue;
        }
        let substituted: Vec<String> = out
            .iter()
            .flat_map(|s| variants.iter().map(move |v| s.replace(canonical, v)))
            .collect();
        out.extend(substituted);
    }
    out
}

/// Lowercase words separated by single spaces, with a space on either end so
/// `contains` only matches whole words.
pub(crate) fn padded(text: &str) -> String {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '/', ';'])
        .flat_map(|p| p.split(" and "))
        .map(normalize_token)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(tokens: &[(TokenKind, &str)]) -> BTreeSet<QuestionToken> {
        tokens.iter().map(|(k, t)| QuestionToken::new(*k, *t)).collect()
    }

    #[test]
    fn test_negated_mentions_are_denied() {
        let extractor = EvidenceExtractor::new().unwrap();
        let v = vocab(&[(TokenKind::Symptom, "fever"), (TokenKind::Symptom, "nausea")]);
        let answers = extractor.scan_notes("I feel nausea all day, but no fever.", &v);

        assert!(answers.contains(&Answer::has("nausea")));
        assert!(answers.contains(&Answer::lacks("fever")));
    }

    #[test]
    fn test_synonyms_widen_matching() {
        let extractor = EvidenceExtractor::new().unwrap();
        let v = vocab(&[(TokenKind::Symptom, "nausea"), (TokenKind::Symptom, "stomach pain")]);
        let answers = extractor.scan_notes("my tummy ache is bad and I want to throw up", &v);

        assert!(answers.contains(&Answer::has("nausea")));
        assert!(answers.contains(&Answer::has("stomach pain")));
    }

    #[test]
    fn test_whole_words_only() {
        let extractor = EvidenceExtractor::new().unwrap();
        let v = vocab(&[(TokenKind::Symptom, "fever")]);
        // "hot" is a fever synonym but "shot" must not match
        assert!(extractor.scan_notes("I got a flu shot", &v).is_empty());
    }

    #[test]
    fn test_structured_fields() {
        let extractor = EvidenceExtractor::new().unwrap();
        let v = vocab(&[
            (TokenKind::Type, "throbbing"),
            (TokenKind::Trigger, "stress"),
            (TokenKind::Symptom, "nausea"),
        ]);
        let data = UserSymptomData {
            pain_type: Some("Throbbing".into()),
            triggers: Some("stress, noise".into()),
            excluded_symptoms: vec!["Nausea".into()],
            additional_notes: Some("lots of nausea".into()),
            ..Default::default()
        };
        let answers = extractor.extract(&data, &v);

        assert!(answers.contains(&Answer::yes(QuestionToken::new(TokenKind::Type, "throbbing"))));
        assert!(answers.contains(&Answer::yes(QuestionToken::new(TokenKind::Trigger, "stress"))));
        // the explicit exclusion wins over the note
        assert!(answers.contains(&Answer::lacks("nausea")));
        assert_eq!(answers.len(), 3);
    }

    #[test]
    fn test_vocabulary_covers_absent_and_mandatory() {
        let mut c = Condition::new(
            "acs",
            "ACS",
            dx_core::MatchCriteria {
                locations: vec!["chest".into()],
                absent_symptoms: vec!["fever".into()],
                ..Default::default()
            },
        );
        c.mandatory_symptoms = vec!["chest pain".into()];
        let v = EvidenceExtractor::vocabulary(&[Arc::new(c)]);
        assert!(v.contains(&QuestionToken::symptom("fever")));
        assert!(v.contains(&QuestionToken::symptom("chest pain")));
    }
}
