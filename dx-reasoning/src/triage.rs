//! Red-flag triage
//!
//! Emergency screening runs independently of scoring: a matched rule raises
//! a [`TriageAlert`] no matter how the candidates rank. Two sources feed it:
//! a fixed table of built-in rules scanned over everything the user wrote or
//! affirmed, and the `redFlags` declared by each candidate condition.

use regex::Regex;
use serde::{Deserialize, Serialize};

use dx_core::{Condition, ConditionId, Severity};

use crate::errors::Result;
use crate::text::padded;

const CRISIS_PATTERN: &str = r"suicid|kill myself|end my life|want to die|self.?harm|cutting myself|hurt myself|no reason to live|better off dead";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageLevel {
    Emergency,
    Urgent,
}

/// A score-independent warning surfaced to the caller immediately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageAlert {
    pub level: TriageLevel,
    /// Built-in rule name, or the red flag text for condition alerts
    pub rule: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionId>,
}

/// Every clause must match; a clause matches when any of its terms does.
struct TriageRule {
    name: &'static str,
    level: TriageLevel,
    clauses: &'static [&'static [&'static str]],
    message: &'static str,
}

const CALL_NOW: &str = "Call emergency services or go to the nearest emergency department now.";

const RULES: &[TriageRule] = &[
    TriageRule {
        name: "cardiac",
        level: TriageLevel::Emergency,
        clauses: &[
            &["chest pain", "chest pressure", "chest tightness", "crushing", "squeezing"],
            &["sweat", "arm", "jaw", "short of breath", "shortness of breath"],
        ],
        message: "Possible heart attack.",
    },
    TriageRule {
        name: "heart_attack",
        level: TriageLevel::Emergency,
        clauses: &[&["heart attack"]],
        message: "Possible heart attack.",
    },
    TriageRule {
        name: "atypical_cardiac",
        level: TriageLevel::Emergency,
        clauses: &[&["nausea", "indigestion"], &["jaw", "arm", "shoulder"], &["sweat", "clammy"]],
        message: "Possible atypical heart attack.",
    },
    TriageRule {
        name: "aortic_dissection",
        level: TriageLevel::Emergency,
        clauses: &[&["tearing", "ripping"], &["chest", "back"]],
        message: "Possible aortic dissection.",
    },
    TriageRule {
        name: "stroke",
        level: TriageLevel::Emergency,
        clauses: &[&[
            "stroke",
            "face drooping",
            "facial droop",
            "slurred speech",
            "sudden numbness",
            "weakness on one side",
        ]],
        message: "Possible stroke. Note the time symptoms started.",
    },
    TriageRule {
        name: "meningitis",
        level: TriageLevel::Emergency,
        clauses: &[
            &["stiff neck", "neck stiffness"],
            &["fever", "high temperature"],
            &["headache", "light sensitivity", "rash", "confusion"],
        ],
        message: "Possible meningitis.",
    },
    TriageRule {
        name: "thunderclap_headache",
        level: TriageLevel::Emergency,
        clauses: &[&["worst headache", "thunderclap", "sudden severe headache"]],
        message: "Sudden severe headache needs emergency assessment.",
    },
    TriageRule {
        name: "seizure",
        level: TriageLevel::Urgent,
        clauses: &[&["seizure", "convulsion", "fitting"]],
        message: "Seizures need prompt medical assessment.",
    },
    TriageRule {
        name: "respiratory_distress",
        level: TriageLevel::Emergency,
        clauses: &[&[
            "can't breathe",
            "cant breathe",
            "cannot breathe",
            "unable to breathe",
            "difficulty breathing",
            "turning blue",
            "lips blue",
            "blue lips",
        ]],
        message: "Severe breathing difficulty.",
    },
    TriageRule {
        name: "choking",
        level: TriageLevel::Emergency,
        clauses: &[&["choking", "throat closing", "can't swallow"]],
        message: "Airway obstruction.",
    },
    TriageRule {
        name: "severe_asthma",
        level: TriageLevel::Emergency,
        clauses: &[&["asthma"], &["severe", "attack", "inhaler not working"]],
        message: "Severe asthma attack.",
    },
    TriageRule {
        name: "anaphylaxis",
        level: TriageLevel::Emergency,
        clauses: &[&["anaphyla", "throat swelling", "tongue swelling", "swollen throat"]],
        message: "Possible anaphylaxis. Use an epinephrine auto-injector if available.",
    },
    TriageRule {
        name: "allergic_airway",
        level: TriageLevel::Emergency,
        clauses: &[&["allergic reaction"], &["swelling", "hives", "breath"]],
        message: "Allergic reaction affecting breathing or swelling.",
    },
    TriageRule {
        name: "open_fracture",
        level: TriageLevel::Emergency,
        clauses: &[&["bone sticking out", "compound fracture", "visible bone", "deformed"]],
        message: "Possible serious fracture. Do not move the affected area.",
    },
    TriageRule {
        name: "head_injury",
        level: TriageLevel::Emergency,
        clauses: &[
            &["head injury", "hit my head", "head trauma"],
            &["vomit", "confusion", "unconscious", "passed out", "drowsy"],
        ],
        message: "Head injury with warning signs.",
    },
    TriageRule {
        name: "severe_bleeding",
        level: TriageLevel::Emergency,
        clauses: &[&["severe bleeding", "won't stop bleeding", "wont stop bleeding", "heavy bleeding"]],
        message: "Severe bleeding. Apply firm pressure.",
    },
    TriageRule {
        name: "unresponsive",
        level: TriageLevel::Emergency,
        clauses: &[&["unconscious", "passed out", "unresponsive"]],
        message: "Loss of consciousness.",
    },
    TriageRule {
        name: "cannot_bear_weight",
        level: TriageLevel::Urgent,
        clauses: &[&["can't bear weight", "cannot bear weight", "can't walk", "unable to walk"]],
        message: "Unable to bear weight; an X-ray may be needed.",
    },
    TriageRule {
        name: "rigid_abdomen",
        level: TriageLevel::Emergency,
        clauses: &[&["rigid abdomen", "rigid stomach", "board-like"]],
        message: "Possible abdominal emergency.",
    },
    TriageRule {
        name: "ectopic_pregnancy",
        level: TriageLevel::Emergency,
        clauses: &[
            &["pregnant", "missed period"],
            &["abdominal pain", "pelvic pain", "bleeding", "shoulder tip"],
        ],
        message: "Possible ectopic pregnancy.",
    },
    TriageRule {
        name: "diabetic_emergency",
        level: TriageLevel::Emergency,
        clauses: &[&["diabetic", "diabetes"], &["confusion", "fruity breath", "vomiting", "unconscious"]],
        message: "Possible diabetic emergency.",
    },
    TriageRule {
        name: "overdose",
        level: TriageLevel::Emergency,
        clauses: &[&["overdose", "took too many", "poisoning", "poisoned"]],
        message: "Possible overdose or poisoning.",
    },
];

/// Scans text and candidate red flags for emergencies.
#[derive(Debug, Clone)]
pub struct TriageScanner {
    crisis: Regex,
}

impl TriageScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            crisis: Regex::new(CRISIS_PATTERN)?,
        })
    }

    /// Built-in rules over free text.
    pub fn scan_text(&self, text: &str) -> Vec<TriageAlert> {
        let lowered = text.to_lowercase();
        let haystack = padded(&lowered);
        let mut alerts: Vec<TriageAlert> = RULES
            .iter()
            .filter(|rule| rule.clauses.iter().all(|clause| clause.iter().any(|t| mentions(&haystack, t))))
            .map(|rule| TriageAlert {
                level: rule.level,
                rule: rule.name.to_string(),
                message: match rule.level {
                    TriageLevel::Emergency => format!("{} {}", rule.message, CALL_NOW),
                    TriageLevel::Urgent => rule.message.to_string(),
                },
                condition: None,
            })
            .collect();

        if self.crisis.is_match(&lowered) {
            alerts.push(TriageAlert {
                level: TriageLevel::Emergency,
                rule: "crisis".to_string(),
                message: "You are not alone. Please contact a crisis line or emergency services right now.".to_string(),
                condition: None,
            });
        }
        alerts
    }

    /// Declared red flags of `conditions` whose every part appears in `text`.
    pub fn scan_red_flags<'a>(
        &self,
        conditions: impl IntoIterator<Item = &'a Condition>,
        text: &str,
    ) -> Vec<TriageAlert> {
        let haystack = padded(&text.to_lowercase());
        let mut alerts = Vec::new();
        for condition in conditions {
            for flag in &condition.red_flags {
                let parts = flag_parts(flag);
                if parts.is_empty() || !parts.iter().all(|p| mentions(&haystack, p)) {
                    continue;
                }
                let level = if condition.severity == Severity::Critical {
                    TriageLevel::Emergency
                } else {
                    TriageLevel::Urgent
                };
                alerts.push(TriageAlert {
                    level,
                    rule: flag.clone(),
                    message: format!("Red flag for {}: {}", condition.name, flag),
                    condition: Some(condition.id.clone()),
                });
            }
        }
        alerts
    }

    /// Both scans over `text`, emergencies first, without duplicates.
    pub fn scan<'a>(&self, conditions: impl IntoIterator<Item = &'a Condition>, text: &str) -> Vec<TriageAlert> {
        let mut alerts = self.scan_text(text);
        alerts.extend(self.scan_red_flags(conditions, text));
        alerts.sort_by(|a, b| a.level.cmp(&b.level));
        let mut seen = std::collections::BTreeSet::new();
        alerts.retain(|a| seen.insert((a.rule.clone(), a.condition.clone())));
        if !alerts.is_empty() {
            tracing::warn!(count = alerts.len(), "Triage alerts raised");
        }
        alerts
    }
}

/// Whether a word sequence in `haystack` starts with `term`.
fn mentions(haystack: &str, term: &str) -> bool {
    let term = padded(term);
    let term = term.trim_end();
    !term.trim().is_empty() && haystack.contains(term)
}

fn flag_parts(flag: &str) -> Vec<String> {
    flag.to_lowercase()
        .split('+')
        .flat_map(|p| p.split(" with "))
        .flat_map(|p| p.split(" and "))
        .flat_map(|p| p.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
