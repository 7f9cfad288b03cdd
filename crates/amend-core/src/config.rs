//! Tunable thresholds for the learning engine.

use serde::{Deserialize, Serialize};

use crate::{
  constants::{
    AUTO_APPLY_THRESHOLD, MAX_KEYWORDS, MAX_TREND_WINDOW_DAYS,
    MAX_UPSERT_ATTEMPTS, MIN_ACCURACY, MIN_OCCURRENCES, PRUNE_MIN_ACCURACY,
    TREND_WINDOW_DAYS,
  },
  error::ValidationError,
};

/// Engine configuration. Every field falls back to the value in
/// [`crate::constants`] when absent from the source it is deserialised from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
  pub min_occurrences:      u32,
  pub min_accuracy:         f64,
  pub auto_apply_threshold: f64,
  pub max_keywords:         usize,
  pub max_upsert_attempts:  u32,
  pub trend_window_days:    u32,
  pub prune_min_accuracy:   f64,
}

impl Default for LearningConfig {
  fn default() -> Self {
    Self {
      min_occurrences:      MIN_OCCURRENCES,
      min_accuracy:         MIN_ACCURACY,
      auto_apply_threshold: AUTO_APPLY_THRESHOLD,
      max_keywords:         MAX_KEYWORDS,
      max_upsert_attempts:  MAX_UPSERT_ATTEMPTS,
      trend_window_days:    TREND_WINDOW_DAYS,
      prune_min_accuracy:   PRUNE_MIN_ACCURACY,
    }
  }
}

impl LearningConfig {
  pub fn validate(&self) -> Result<(), ValidationError> {
    check_unit("min_accuracy", self.min_accuracy)?;
    check_unit("auto_apply_threshold", self.auto_apply_threshold)?;
    check_unit("prune_min_accuracy", self.prune_min_accuracy)?;
    check_at_least("min_occurrences", self.min_occurrences as f64, 1.0)?;
    check_at_least("max_keywords", self.max_keywords as f64, 1.0)?;
    check_at_least("max_upsert_attempts", self.max_upsert_attempts as f64, 1.0)?;
    check_between(
      "trend_window_days",
      self.trend_window_days as f64,
      1.0,
      MAX_TREND_WINDOW_DAYS as f64,
    )?;
    Ok(())
  }
}

/// Reject anything outside `[0, 1]`, including NaN.
pub(crate) fn check_unit(
  name: &'static str,
  value: f64,
) -> Result<(), ValidationError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ValidationError::OutOfRange { name, value, min: 0.0, max: 1.0 })
  }
}

fn check_at_least(
  name: &'static str,
  value: f64,
  min: f64,
) -> Result<(), ValidationError> {
  if value >= min {
    Ok(())
  } else {
    Err(ValidationError::OutOfRange { name, value, min, max: f64::INFINITY })
  }
}

fn check_between(
  name: &'static str,
  value: f64,
  min: f64,
  max: f64,
) -> Result<(), ValidationError> {
  if (min..=max).contains(&value) {
    Ok(())
  } else {
    Err(ValidationError::OutOfRange { name, value, min, max })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    assert!(LearningConfig::default().validate().is_ok());
  }

  #[test]
  fn partial_source_fills_defaults() {
    let cfg: LearningConfig =
      serde_json::from_str(r#"{ "min_occurrences": 5 }"#).unwrap();
    assert_eq!(cfg.min_occurrences, 5);
    assert_eq!(cfg.min_accuracy, MIN_ACCURACY);
    assert_eq!(cfg.max_keywords, MAX_KEYWORDS);
  }

  #[test]
  fn rejects_accuracy_above_one() {
    let cfg = LearningConfig { min_accuracy: 1.5, ..Default::default() };
    assert!(matches!(
      cfg.validate(),
      Err(ValidationError::OutOfRange { name: "min_accuracy", .. })
    ));
  }

  #[test]
  fn rejects_zero_attempts() {
    let cfg = LearningConfig { max_upsert_attempts: 0, ..Default::default() };
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn trend_window_is_capped() {
    let at_cap = LearningConfig {
      trend_window_days: MAX_TREND_WINDOW_DAYS,
      ..Default::default()
    };
    assert!(at_cap.validate().is_ok());

    let huge = LearningConfig { trend_window_days: 100_000_000, ..Default::default() };
    assert!(matches!(
      huge.validate(),
      Err(ValidationError::OutOfRange { name: "trend_window_days", max, .. })
        if max == MAX_TREND_WINDOW_DAYS as f64
    ));
  }

  #[test]
  fn rejects_nan() {
    assert!(check_unit("x", f64::NAN).is_err());
  }
}
