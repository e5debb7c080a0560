//! Clarification questions as shown to the user

use serde::{Deserialize, Serialize};

use dx_core::{QuestionToken, TokenKind};

use crate::clarify::Clarification;
use crate::selector::SelectionReason;

/// Label of the escape option of a compound question
pub const NONE_OF_THE_ABOVE: &str = "None of the above";

/// What a question asks about
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Yes/no on one profile token
    Token(QuestionToken),
    Clarification(Clarification),
}

/// One question with its answer options. For token questions option 0 is
/// "yes" and option 1 is "no".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub topic: Topic,
    pub text: String,
    pub options: Vec<String>,
    pub reason: SelectionReason,
}

impl Question {
    pub fn new(topic: Topic, reason: SelectionReason) -> Self {
        let (text, options) = match &topic {
            Topic::Token(token) => (render(token), vec![yes_label(token), "No".to_string()]),
            Topic::Clarification(c) => (
                c.text().to_string(),
                c.options().iter().map(|o| o.to_string()).collect(),
            ),
        };
        Self {
            topic,
            text,
            options,
            reason,
        }
    }

    /// The token asked about, unless this is a clarification.
    pub fn token(&self) -> Option<&QuestionToken> {
        match &self.topic {
            Topic::Token(token) => Some(token),
            Topic::Clarification(_) => None,
        }
    }
}

/// Several symptom tokens asked at once. Every option the user does not
/// pick counts as denied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundQuestion {
    pub text: String,
    pub options: Vec<QuestionToken>,
    pub none_option: String,
}

impl CompoundQuestion {
    pub fn new(options: Vec<QuestionToken>) -> Self {
        Self {
            text: "Are you experiencing any of the following?".to_string(),
            options,
            none_option: NONE_OF_THE_ABOVE.to_string(),
        }
    }

    /// Display labels, with the escape option last.
    pub fn labels(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|t| capitalize(&t.symptom))
            .chain(std::iter::once(self.none_option.clone()))
            .collect()
    }
}

/// Phrase `token` as a yes/no question.
pub fn render(token: &QuestionToken) -> String {
    match token.kind {
        TokenKind::Symptom => format!("Do you also experience {}?", token.symptom),
        TokenKind::Trigger => format!("Does it worsen with {}?", token.symptom),
        TokenKind::Type => format!("Is the sensation {}?", token.symptom),
    }
}

fn yes_label(token: &QuestionToken) -> String {
    match token.kind {
        TokenKind::Symptom => format!("Yes, I have {}", token.symptom),
        TokenKind::Trigger => format!("Yes, worsens with {}", token.symptom),
        TokenKind::Type => format!("Yes, it is {}", token.symptom),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
