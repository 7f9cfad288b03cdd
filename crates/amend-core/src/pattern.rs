//! Learned patterns: evidence-backed `condition → adjustment` rules.
//!
//! A pattern is unique per `(tenant, entity type, pattern type, condition)`.
//! Its evidence counters only ever grow; its lifecycle moves from candidate
//! to active, and from either to deactivated when the pruner retires it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  condition::{Condition, ConditionKind},
  config::LearningConfig,
  correction::{CorrectedField, EntityType},
  error::ValidationError,
};

// ─── PatternType ─────────────────────────────────────────────────────────────

/// The closed set of extraction rules. Each pairs one condition shape with
/// one target field.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternType {
  MerchantCategory,
  AmountRangeCategory,
  KeywordSubcategory,
  MerchantTaxDeductible,
  AmountRangeTaxDeductible,
  CategorySubcategory,
  DescriptionKeywordCategory,
}

impl PatternType {
  pub fn condition_kind(self) -> ConditionKind {
    match self {
      Self::MerchantCategory | Self::MerchantTaxDeductible => {
        ConditionKind::Merchant
      }
      Self::AmountRangeCategory | Self::AmountRangeTaxDeductible => {
        ConditionKind::AmountRange
      }
      Self::KeywordSubcategory | Self::DescriptionKeywordCategory => {
        ConditionKind::Keyword
      }
      Self::CategorySubcategory => ConditionKind::Category,
    }
  }

  pub fn target_field(self) -> CorrectedField {
    match self {
      Self::MerchantCategory
      | Self::AmountRangeCategory
      | Self::DescriptionKeywordCategory => CorrectedField::Category,
      Self::KeywordSubcategory | Self::CategorySubcategory => {
        CorrectedField::Subcategory
      }
      Self::MerchantTaxDeductible | Self::AmountRangeTaxDeductible => {
        CorrectedField::TaxDeductible
      }
    }
  }

  pub fn parse(raw: &str) -> Result<Self, ValidationError> {
    raw
      .trim()
      .to_ascii_lowercase()
      .replace('-', "_")
      .parse()
      .map_err(|_| ValidationError::UnknownPatternType(raw.to_owned()))
  }
}

// ─── Adjustment ──────────────────────────────────────────────────────────────

/// The field/value pair a pattern suggests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
  pub field: CorrectedField,
  pub value: String,
}

impl Adjustment {
  /// Trim `raw` and, for [`CorrectedField::TaxDeductible`], normalise it to
  /// `"true"` / `"false"`.
  pub fn new(field: CorrectedField, raw: &str) -> Result<Self, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(ValidationError::EmptyValue("corrected_value"));
    }
    let value = match field {
      CorrectedField::TaxDeductible => parse_bool(trimmed)?.to_string(),
      _ => trimmed.to_owned(),
    };
    Ok(Self { field, value })
  }

  /// Case-insensitive comparison against another value for the same field.
  /// Case folding is Unicode-aware, so `"CAFÉ"` agrees with `"Café"`.
  pub fn agrees_with(&self, value: &str) -> bool {
    let fold = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<String>();
    fold(&self.value) == fold(value.trim())
  }
}

fn parse_bool(raw: &str) -> Result<bool, ValidationError> {
  match raw.to_ascii_lowercase().as_str() {
    "true" | "yes" | "y" | "1" => Ok(true),
    "false" | "no" | "n" | "0" => Ok(false),
    _ => Err(ValidationError::InvalidBoolean(raw.to_owned())),
  }
}

// ─── PatternKey ──────────────────────────────────────────────────────────────

/// The unique key of a pattern within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
  pub entity_type:  EntityType,
  pub pattern_type: PatternType,
  pub condition:    Condition,
}

impl PatternKey {
  /// Pairs a pattern type with a condition of the shape it expects.
  pub fn new(
    entity_type: EntityType,
    pattern_type: PatternType,
    condition: Condition,
  ) -> Result<Self, ValidationError> {
    if condition.kind() != pattern_type.condition_kind() {
      return Err(ValidationError::InvalidCondition(format!(
        "{pattern_type} expects a {:?} condition, got {:?}",
        pattern_type.condition_kind(),
        condition.kind()
      )));
    }
    Ok(Self { entity_type, pattern_type, condition })
  }
}

impl std::fmt::Display for PatternKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}/{}/{}",
      self.entity_type,
      self.pattern_type,
      self.condition.key()
    )
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle position, derived from `active` and `deactivated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternState {
  /// Still gathering evidence; never suggested.
  Candidate,
  /// Eligible for suggestions.
  Active,
  /// Retired by the pruner. Only an operator can bring it back.
  Deactivated,
}

/// How one correction bore on an existing pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
  Reinforced,
  Contradicted,
}

// ─── Pattern ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
  pub pattern_id:     Uuid,
  pub tenant_id:      Uuid,
  pub entity_type:    EntityType,
  pub pattern_type:   PatternType,
  pub condition:      Condition,
  pub adjustment:     Adjustment,
  pub occurrences:    u32,
  pub positive:       u32,
  pub negative:       u32,
  /// `positive / (positive + negative)`, always within `[0, 1]`.
  pub accuracy:       f64,
  pub active:         bool,
  /// Set by the pruner; blocks automatic promotion.
  pub deactivated_at: Option<DateTime<Utc>>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  /// Bumped by the store on every successful update.
  pub version:        u64,
}

impl Pattern {
  /// A pattern seen for the first time: one confirming observation.
  pub fn candidate(
    tenant_id: Uuid,
    key: PatternKey,
    adjustment: Adjustment,
    config: &LearningConfig,
    now: DateTime<Utc>,
  ) -> Self {
    let mut pattern = Self {
      pattern_id: Uuid::new_v4(),
      tenant_id,
      entity_type: key.entity_type,
      pattern_type: key.pattern_type,
      condition: key.condition,
      adjustment,
      occurrences: 1,
      positive: 1,
      negative: 0,
      accuracy: 1.0,
      active: false,
      deactivated_at: None,
      created_at: now,
      updated_at: now,
      version: 0,
    };
    pattern.promote_if_eligible(config);
    pattern
  }

  pub fn key(&self) -> PatternKey {
    PatternKey {
      entity_type:  self.entity_type,
      pattern_type: self.pattern_type,
      condition:    self.condition.clone(),
    }
  }

  pub fn state(&self) -> PatternState {
    if self.deactivated_at.is_some() {
      PatternState::Deactivated
    } else if self.active {
      PatternState::Active
    } else {
      PatternState::Candidate
    }
  }

  /// Fold one more correction for this pattern's condition into its
  /// evidence. Never lowers eligibility.
  pub fn observe(
    &mut self,
    corrected_value: &str,
    config: &LearningConfig,
    now: DateTime<Utc>,
  ) -> Observation {
    self.occurrences = self.occurrences.saturating_add(1);
    let observation = if self.adjustment.agrees_with(corrected_value) {
      self.positive = self.positive.saturating_add(1);
      Observation::Reinforced
    } else {
      self.negative = self.negative.saturating_add(1);
      Observation::Contradicted
    };
    self.accuracy = accuracy(self.positive, self.negative);
    self.updated_at = now;
    self.promote_if_eligible(config);
    observation
  }

  /// Whether the evidence clears both eligibility thresholds.
  pub fn meets_thresholds(&self, config: &LearningConfig) -> bool {
    self.occurrences >= config.min_occurrences
      && self.accuracy >= config.min_accuracy
  }

  /// Set `active` once thresholds are met, unless the pattern was pruned.
  /// Returns `true` when this call flipped the flag.
  pub fn promote_if_eligible(&mut self, config: &LearningConfig) -> bool {
    if self.active || self.deactivated_at.is_some() {
      return false;
    }
    if self.meets_thresholds(config) {
      self.active = true;
      return true;
    }
    false
  }

  /// Retire the pattern. Its evidence is kept.
  pub fn deactivate(&mut self, now: DateTime<Utc>) {
    self.active = false;
    self.deactivated_at = Some(now);
    self.updated_at = now;
  }

  /// Undo a deactivation; the pattern goes back to candidate or active
  /// depending on its current evidence.
  pub fn reactivate(&mut self, config: &LearningConfig, now: DateTime<Utc>) {
    self.deactivated_at = None;
    self.active = false;
    self.updated_at = now;
    self.promote_if_eligible(config);
  }
}

/// `positive / (positive + negative)` clamped to `[0, 1]`; zero when there is
/// no evidence at all.
pub fn accuracy(positive: u32, negative: u32) -> f64 {
  let total = positive as f64 + negative as f64;
  if total == 0.0 {
    return 0.0;
  }
  (positive as f64 / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::condition::{AmountBand, MerchantName};

  fn merchant_key(name: &str) -> PatternKey {
    PatternKey::new(
      EntityType::Receipt,
      PatternType::MerchantCategory,
      Condition::Merchant(MerchantName::new(name).unwrap()),
    )
    .unwrap()
  }

  fn candidate() -> Pattern {
    Pattern::candidate(
      Uuid::new_v4(),
      merchant_key("Starbucks"),
      Adjustment::new(CorrectedField::Category, "Meals & Entertainment").unwrap(),
      &LearningConfig::default(),
      Utc::now(),
    )
  }

  #[test]
  fn every_pattern_type_targets_a_field_and_shape() {
    use strum::IntoEnumIterator;
    let categories = PatternType::iter()
      .filter(|t| t.target_field() == CorrectedField::Category)
      .count();
    assert_eq!(PatternType::iter().count(), 7);
    assert_eq!(categories, 3);
    assert_eq!(
      PatternType::CategorySubcategory.condition_kind(),
      ConditionKind::Category
    );
  }

  #[test]
  fn key_rejects_mismatched_condition_shape() {
    let err = PatternKey::new(
      EntityType::Receipt,
      PatternType::MerchantCategory,
      Condition::AmountRange(AmountBand::UpTo10),
    );
    assert!(matches!(err, Err(ValidationError::InvalidCondition(_))));
  }

  #[test]
  fn tax_deductible_values_are_normalized() {
    let adj = Adjustment::new(CorrectedField::TaxDeductible, " Yes ").unwrap();
    assert_eq!(adj.value, "true");
    assert!(Adjustment::new(CorrectedField::TaxDeductible, "maybe").is_err());
  }

  #[test]
  fn agreement_folds_non_ascii_case() {
    let cfg = LearningConfig::default();
    let mut p = Pattern::candidate(
      Uuid::new_v4(),
      merchant_key("Le Petit Bistro"),
      Adjustment::new(CorrectedField::Category, "Café").unwrap(),
      &cfg,
      Utc::now(),
    );
    assert!(p.adjustment.agrees_with(" CAFÉ "));
    assert!(!p.adjustment.agrees_with("Cafe"));

    assert_eq!(p.observe("CAFÉ", &cfg, Utc::now()), Observation::Reinforced);
    assert_eq!((p.positive, p.negative), (2, 0));
  }

  #[test]
  fn new_candidate_has_one_confirmation() {
    let p = candidate();
    assert_eq!((p.occurrences, p.positive, p.negative), (1, 1, 0));
    assert_eq!(p.accuracy, 1.0);
    assert_eq!(p.state(), PatternState::Candidate);
  }

  #[test]
  fn third_confirmation_promotes() {
    let cfg = LearningConfig::default();
    let mut p = candidate();
    p.observe("meals & entertainment", &cfg, Utc::now());
    assert_eq!(p.state(), PatternState::Candidate);
    assert_eq!(p.observe("Meals & Entertainment", &cfg, Utc::now()), Observation::Reinforced);
    assert_eq!(p.state(), PatternState::Active);
  }

  #[test]
  fn contradictions_lower_accuracy_but_not_activity() {
    let cfg = LearningConfig::default();
    let mut p = candidate();
    p.observe("Meals & Entertainment", &cfg, Utc::now());
    p.observe("Meals & Entertainment", &cfg, Utc::now());
    assert_eq!(p.observe("Office Supplies", &cfg, Utc::now()), Observation::Contradicted);
    p.observe("Office Supplies", &cfg, Utc::now());

    assert_eq!((p.occurrences, p.positive, p.negative), (5, 3, 2));
    assert!((p.accuracy - 0.6).abs() < 1e-9);
    assert!(p.active);
  }

  #[test]
  fn deactivated_patterns_are_not_promoted() {
    let cfg = LearningConfig::default();
    let mut p = candidate();
    p.deactivate(Utc::now());
    for _ in 0..5 {
      p.observe("Meals & Entertainment", &cfg, Utc::now());
    }
    assert_eq!(p.state(), PatternState::Deactivated);
    assert!(!p.active);
  }

  #[test]
  fn reactivation_restores_eligible_patterns() {
    let cfg = LearningConfig::default();
    let mut p = candidate();
    p.observe("Meals & Entertainment", &cfg, Utc::now());
    p.observe("Meals & Entertainment", &cfg, Utc::now());
    p.deactivate(Utc::now());
    p.reactivate(&cfg, Utc::now());
    assert_eq!(p.state(), PatternState::Active);
  }

  #[test]
  fn accuracy_without_evidence_is_zero() {
    assert_eq!(accuracy(0, 0), 0.0);
    assert_eq!(accuracy(3, 1), 0.75);
  }
}
