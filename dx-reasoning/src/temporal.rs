//! Temporal reasoning over duration, onset and progression cues

use serde::{Deserialize, Serialize};

use dx_core::{DurationHint, MatchCriteria, Onset, Progression, UserSymptomData};

use crate::belief::{BeliefState, TraceKind};

/// Factor for a duration matching the condition's hint
pub const DURATION_BOOST: f64 = 1.5;
/// Factor for a matching onset
pub const ONSET_BOOST: f64 = 2.0;
/// Factor for a matching progression
pub const PROGRESSION_BOOST: f64 = 1.5;

const CHRONIC_CUES: &[&str] = &["3-6months", "6months+", "chronic", "month", "year"];
const ACUTE_CUES: &[&str] = &["hours", "1-3days", "4-7days", "1-2weeks", "hour", "day", "week"];

/// Coarse class of a reported duration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    Acute,
    Chronic,
}

pub fn classify_duration(raw: &str) -> Option<DurationClass> {
    let d = raw.to_lowercase();
    if CHRONIC_CUES.iter().any(|c| d.contains(c)) {
        Some(DurationClass::Chronic)
    } else if ACUTE_CUES.iter().any(|c| d.contains(c)) {
        Some(DurationClass::Acute)
    } else {
        None
    }
}

/// Onset implied by the reported duration text.
pub fn classify_onset(raw: &str) -> Option<Onset> {
    let d = raw.to_lowercase();
    if d.contains("sudden") || d.contains("hour") {
        Some(Onset::Sudden)
    } else if d.contains("gradual") || d.contains("month") || d.contains("year") {
        Some(Onset::Gradual)
    } else if d.contains("episod") || d.contains("comes and goes") {
        Some(Onset::Episodic)
    } else {
        None
    }
}

/// Progression cues in free-text notes.
pub fn progression_cues(notes: &str) -> Vec<Progression> {
    let n = notes.to_lowercase();
    let table: [(Progression, &[&str]); 4] = [
        (Progression::Worsening, &["worse", "getting bad", "worsening"]),
        (Progression::Fluctuating, &["comes and goes", "episod", "on and off"]),
        (Progression::Improving, &["getting better", "improving"]),
        (Progression::Stable, &["unchanged", "same as before", "constant"]),
    ];
    table
        .iter()
        .filter(|(_, cues)| cues.iter().any(|c| n.contains(c)))
        .map(|(p, _)| *p)
        .collect()
}

/// One temporal agreement between a report and a condition.
#[derive(Clone, Debug, PartialEq)]
pub struct TemporalMatch {
    pub label: String,
    pub factor: f64,
}

/// Boost earned by a condition's duration hint for a reported duration class.
pub fn duration_match(hint: Option<DurationHint>, class: Option<DurationClass>) -> Option<TemporalMatch> {
    let label = match (hint?, class) {
        (DurationHint::Acute, Some(DurationClass::Acute)) => "Duration: acute (matches)",
        (DurationHint::Chronic, Some(DurationClass::Chronic)) => "Duration: chronic (matches)",
        (DurationHint::Any, _) => "Duration: any",
        _ => return None,
    };
    Some(TemporalMatch {
        label: label.to_string(),
        factor: DURATION_BOOST,
    })
}

pub fn temporal_matches(criteria: &MatchCriteria, data: &UserSymptomData) -> Vec<TemporalMatch> {
    let mut out = Vec::new();

    if let Some(duration) = data.duration.as_deref() {
        out.extend(duration_match(criteria.duration_hint, classify_duration(duration)));

        if let (Some(expected), Some(onset)) = (criteria.onset, classify_onset(duration)) {
            if expected == onset {
                out.push(TemporalMatch {
                    label: format!("Onset: {} (matches)", format!("{:?}", onset).to_lowercase()),
                    factor: ONSET_BOOST,
                });
            }
        }
    }

    if let (Some(expected), Some(notes)) = (criteria.progression, data.additional_notes.as_deref()) {
        if progression_cues(notes).contains(&expected) {
            out.push(TemporalMatch {
                label: format!("Progression: {}", format!("{:?}", expected).to_lowercase()),
                factor: PROGRESSION_BOOST,
            });
        }
    }

    out
}

/// Whether the report carries any usable temporal information.
pub fn has_temporal_clarity(data: &UserSymptomData) -> bool {
    let duration = data.duration.as_deref().is_some_and(|d| {
        classify_duration(d).is_some() || classify_onset(d).is_some()
    });
    let progression = data
        .additional_notes
        .as_deref()
        .is_some_and(|n| !progression_cues(n).is_empty());
    duration || progression
}

/// Boost every candidate whose temporal profile agrees with the report.
/// Returns the number of factors applied.
pub fn apply_temporal(belief: &mut BeliefState, data: &UserSymptomData) -> usize {
    let updates: Vec<(String, TemporalMatch)> = belief
        .hypotheses()
        .flat_map(|h| {
            let id = h.id().to_string();
            temporal_matches(&h.condition.match_criteria, data)
                .into_iter()
                .map(move |m| (id.clone(), m))
        })
        .collect();

    let applied = updates.len();
    for (id, m) in updates {
        belief.boost(&id, m.label, m.factor, TraceKind::Temporal);
    }
    if applied > 0 {
        tracing::debug!(applied, "Applied temporal factors");
    }
    applied
}
