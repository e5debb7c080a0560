//! Posterior probability of one diagnosis
//!
//! Stored as a probability in [0, 1]; reports show it as a percentage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

#[derive(Error, Debug)]
pub enum ConfidenceError {
    #[error("Probability is NaN")]
    NaN,

    #[error("Probability {0} outside [0, 1]")]
    OutOfRange(f64),
}

impl Confidence {
    /// # Errors
    /// `NaN`, or `OutOfRange` for values below 0 or above 1.
    pub fn new(p: f64) -> Result<Self, ConfidenceError> {
        match p {
            p if p.is_nan() => Err(ConfidenceError::NaN),
            p if (0.0..=1.0).contains(&p) => Ok(Self(p)),
            p => Err(ConfidenceError::OutOfRange(p)),
        }
    }

    /// Clamps finite values into [0, 1]; normalized posteriors can land a
    /// few ULPs outside.
    pub fn saturating(p: f64) -> Result<Self, ConfidenceError> {
        if p.is_nan() {
            return Err(ConfidenceError::NaN);
        }
        Ok(Self(p.clamp(0.0, 1.0)))
    }

    pub fn from_percent(percent: f64) -> Result<Self, ConfidenceError> {
        Self::new(percent / 100.0)
    }

    pub fn zero() -> Self {
        Self(0.0)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn percent(self) -> f64 {
        self.0 * 100.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ConfidenceError;

    fn try_from(p: f64) -> Result<Self, Self::Error> {
        Self::new(p)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(matches!(Confidence::new(-0.1), Err(ConfidenceError::OutOfRange(_))));
        assert!(matches!(Confidence::new(f64::NAN), Err(ConfidenceError::NaN)));
        assert!(matches!(Confidence::saturating(f64::NAN), Err(ConfidenceError::NaN)));
    }

    #[test]
    fn test_saturating_clamps_drift() {
        assert_eq!(Confidence::saturating(1.000_000_000_1).unwrap().get(), 1.0);
        assert_eq!(Confidence::saturating(-1e-17).unwrap().get(), 0.0);
    }

    #[test]
    fn test_percent_views() {
        let c = Confidence::from_percent(25.0).unwrap();
        assert_eq!(c.get(), 0.25);
        assert_eq!(c.percent(), 25.0);
        assert_eq!(c.to_string(), "25.0%");
    }

    #[test]
    fn test_serializes_as_plain_number() {
        let c = Confidence::new(0.5).unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "0.5");
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
    }
}
