//! Uncertainty Estimator
//!
//! Turns a ranked belief distribution into point estimates with confidence
//! intervals and qualitative labels. All figures are on a 0-100 scale.
//!
//! Interval width starts from a base set by evidence quality, widens for
//! estimates near 50% and for every runner-up scoring within 85% of the
//! estimate, and narrows for every affirmed high-specificity symptom.

use serde::{Deserialize, Serialize};

use dx_core::TokenKind;

use crate::belief::Hypothesis;

/// Specificity at which an affirmed symptom counts as strongly diagnostic
pub const HIGH_SPECIFICITY: f64 = 0.8;

/// Runner-ups at or above this fraction of an estimate count as comparable
pub const COMPARABLE_RATIO: f64 = 0.85;

/// Widths above this always ask for more information
pub const MAX_ACCEPTABLE_WIDTH: f64 = 25.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceQuality {
    Strong,
    Moderate,
    Weak,
}

impl EvidenceQuality {
    fn base_width(self) -> f64 {
        match self {
            EvidenceQuality::Strong => 10.0,
            EvidenceQuality::Moderate => 15.0,
            EvidenceQuality::Weak => 25.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
}

/// What the evidence for one candidate looks like.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetrics {
    /// Affirmed tokens the candidate exhibits
    pub symptom_count: usize,
    /// Share of those with an explicit sensitivity/specificity profile
    pub weighted_ratio: f64,
    pub high_specificity_count: usize,
    pub temporal_clarity: bool,
}

impl EvidenceMetrics {
    pub fn for_hypothesis(h: &Hypothesis, temporal_clarity: bool) -> Self {
        let criteria = &h.condition.match_criteria;
        let weights: Vec<_> = h
            .matched_keys()
            .map(|key| {
                let (_, token) = TokenKind::parse_namespaced(key);
                criteria.weight_for(token)
            })
            .collect();
        let symptom_count = weights.len();
        let weighted = weights.iter().filter(|w| w.explicit).count();
        let high_specificity_count = weights
            .iter()
            .filter(|w| w.explicit && w.specificity >= HIGH_SPECIFICITY)
            .count();
        Self {
            symptom_count,
            weighted_ratio: if symptom_count == 0 {
                0.0
            } else {
                weighted as f64 / symptom_count as f64
            },
            high_specificity_count,
            temporal_clarity,
        }
    }

    /// Points towards [`EvidenceQuality`]; strong at 6, moderate at 3.
    pub fn score(&self) -> u32 {
        let mut score = match self.symptom_count {
            n if n >= 5 => 2,
            n if n >= 3 => 1,
            _ => 0,
        };
        score += if self.weighted_ratio >= 0.8 {
            3
        } else if self.weighted_ratio >= 0.6 {
            2
        } else if self.weighted_ratio >= 0.4 {
            1
        } else {
            0
        };
        if self.temporal_clarity {
            score += 1;
        }
        if self.high_specificity_count >= 2 {
            score += 2;
        }
        score
    }

    pub fn quality(&self) -> EvidenceQuality {
        match self.score() {
            s if s >= 6 => EvidenceQuality::Strong,
            s if s >= 3 => EvidenceQuality::Moderate,
            _ => EvidenceQuality::Weak,
        }
    }
}

/// Interval on the 0-100 scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub width: f64,
}

impl ConfidenceInterval {
    /// Interval of `width` centred on `point`, clamped to [0, 100].
    pub fn around(point: f64, width: f64) -> Self {
        let lower = (point - width / 2.0).max(0.0);
        let upper = (point + width / 2.0).min(100.0);
        Self {
            lower,
            upper,
            width: upper - lower,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Length of the intersection with `other`
    pub fn overlap(&self, other: &Self) -> f64 {
        (self.upper.min(other.upper) - self.lower.max(other.lower)).max(0.0)
    }

    /// Whether the intersection covers at least `ratio` of the narrower interval.
    pub fn overlaps_substantially(&self, other: &Self, ratio: f64) -> bool {
        let narrower = self.width.min(other.width);
        if narrower <= 0.0 {
            return self.overlap(other) > 0.0 || self.lower == other.lower;
        }
        self.overlap(other) >= ratio * narrower
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncertaintyEstimate {
    pub point_estimate: f64,
    pub confidence_interval: ConfidenceInterval,
    pub calibration_quality: CalibrationQuality,
    pub evidence_quality: EvidenceQuality,
    pub explanation: String,
    pub should_request_more_info: bool,
}

/// Computes estimates for a ranked list of candidates.
#[derive(Clone, Debug)]
pub struct UncertaintyEstimator {
    overlap_ratio: f64,
}

impl UncertaintyEstimator {
    pub fn new(overlap_ratio: f64) -> Self {
        Self { overlap_ratio }
    }

    /// Estimate for one candidate at `point` percent with `comparable`
    /// runner-ups.
    pub fn estimate(&self, point: f64, metrics: &EvidenceMetrics, comparable: usize) -> UncertaintyEstimate {
        let evidence = metrics.quality();
        let closeness_to_even = 1.0 - ((point - 50.0).abs() / 50.0).min(1.0);
        let width = evidence.base_width()
            * (1.0 + closeness_to_even * 0.5)
            * (1.0 + 0.25 * comparable as f64)
            / (1.0 + 0.2 * metrics.high_specificity_count as f64);
        let interval = ConfidenceInterval::around(point, width);

        let calibration = match evidence {
            EvidenceQuality::Strong if width < 15.0 => CalibrationQuality::Excellent,
            EvidenceQuality::Strong => CalibrationQuality::Good,
            EvidenceQuality::Moderate if width < 20.0 => CalibrationQuality::Good,
            EvidenceQuality::Moderate => CalibrationQuality::Moderate,
            EvidenceQuality::Weak => CalibrationQuality::Poor,
        };

        UncertaintyEstimate {
            point_estimate: point,
            confidence_interval: interval,
            calibration_quality: calibration,
            evidence_quality: evidence,
            explanation: explain(width),
            should_request_more_info: width > MAX_ACCEPTABLE_WIDTH
                || evidence == EvidenceQuality::Weak
                || metrics.symptom_count < 3,
        }
    }

    /// Estimates for candidates ranked best first, given as
    /// `(percent, metrics)`, plus one "statistically indistinguishable from
    /// the leader" flag per candidate.
    pub fn estimate_ranked(&self, ranked: &[(f64, EvidenceMetrics)]) -> (Vec<UncertaintyEstimate>, Vec<bool>) {
        let mut estimates: Vec<UncertaintyEstimate> = ranked
            .iter()
            .enumerate()
            .map(|(i, (point, metrics))| {
                let comparable = ranked
                    .iter()
                    .enumerate()
                    .filter(|(j, (other, _))| *j != i && *other >= COMPARABLE_RATIO * point)
                    .count();
                self.estimate(*point, metrics, comparable)
            })
            .collect();

        let mut flags = vec![false; estimates.len()];
        if let Some((top, rest)) = estimates.split_first() {
            for (i, other) in rest.iter().enumerate() {
                flags[i + 1] = top
                    .confidence_interval
                    .overlaps_substantially(&other.confidence_interval, self.overlap_ratio);
            }
        }
        if flags.iter().skip(1).any(|f| *f) {
            flags[0] = true;
            if flags.get(1).copied().unwrap_or(false) {
                estimates[0].should_request_more_info = true;
            }
        }
        (estimates, flags)
    }
}

impl Default for UncertaintyEstimator {
    fn default() -> Self {
        Self::new(0.5)
    }
}

fn explain(width: f64) -> String {
    if width < 10.0 {
        "High confidence: the estimate is well supported by the reported symptoms.".to_string()
    } else if width < 20.0 {
        "Moderate confidence: the estimate is reasonably supported, but other conditions are possible.".to_string()
    } else if width < 30.0 {
        "Low confidence: several conditions remain plausible. More information would help.".to_string()
    } else {
        "Very low confidence: the evidence cannot tell the candidates apart. Professional evaluation strongly recommended."
            .to_string()
    }
}
