//! Correction events: the append-only evidence stream the engine learns from.
//!
//! A correction records a user overriding one field of an automatically
//! classified entity. Events are never updated or deleted; they double as the
//! audit trail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{error::ValidationError, pattern::Adjustment};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The kind of record a classification (and its correction) applies to.
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
pub enum EntityType {
  Receipt,
  Expense,
  Invoice,
  Transaction,
}

impl EntityType {
  /// Parse a boundary string, accepting `-` as a word separator.
  pub fn parse(raw: &str) -> Result<Self, ValidationError> {
    normalize_token(raw)
      .parse()
      .map_err(|_| ValidationError::UnknownEntityType(raw.to_owned()))
  }
}

/// A classified field a user may override.
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
pub enum CorrectedField {
  Category,
  Subcategory,
  TaxDeductible,
  Merchant,
}

impl CorrectedField {
  pub fn parse(raw: &str) -> Result<Self, ValidationError> {
    normalize_token(raw)
      .parse()
      .map_err(|_| ValidationError::UnknownField(raw.to_owned()))
  }
}

fn normalize_token(raw: &str) -> String {
  raw.trim().to_ascii_lowercase().replace('-', "_")
}

// ─── Entity data ─────────────────────────────────────────────────────────────

/// Attributes of a classified entity.
///
/// Serves both as the context attached to a correction (the source of
/// pattern conditions) and as the input to
/// [`SuggestionEngine::apply_learning`](crate::suggest::SuggestionEngine::apply_learning).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub merchant:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub amount:         Option<f64>,
  /// ISO 4217 code, e.g. `"EUR"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub currency:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subcategory:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tax_deductible: Option<bool>,
  /// Anything else the caller attaches; carried through but never matched.
  #[serde(flatten)]
  pub extra:          BTreeMap<String, serde_json::Value>,
}

impl EntityData {
  pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
    self.merchant = Some(merchant.into());
    self
  }

  pub fn with_amount(mut self, amount: f64) -> Self {
    self.amount = Some(amount);
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    if let Some(amount) = self.amount
      && !amount.is_finite()
    {
      return Err(ValidationError::MalformedContext(format!(
        "amount is not a finite number: {amount}"
      )));
    }

    if let Some(currency) = &self.currency {
      let code = currency.trim();
      if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::MalformedContext(format!(
          "currency is not a three-letter code: {currency:?}"
        )));
      }
    }

    Ok(())
  }

  /// The value this entity currently carries for `field`, if known.
  pub fn current_value(&self, field: CorrectedField) -> Option<String> {
    match field {
      CorrectedField::Category => self.category.clone(),
      CorrectedField::Subcategory => self.subcategory.clone(),
      CorrectedField::Merchant => self.merchant.clone(),
      CorrectedField::TaxDeductible => self.tax_deductible.map(|b| b.to_string()),
    }
  }
}

// ─── Inbound request ─────────────────────────────────────────────────────────

/// A correction as submitted by a caller, before validation.
///
/// Entity type and field arrive as strings; [`CorrectionRequest::validate`]
/// checks them against the closed enumerations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
  pub tenant_id:       Uuid,
  pub entity_type:     String,
  pub entity_id:       String,
  pub field:           String,
  pub original_value:  Option<String>,
  pub corrected_value: String,
  pub actor_id:        String,
  #[serde(default)]
  pub context:         EntityData,
}

impl CorrectionRequest {
  pub fn validate(self) -> Result<NewCorrection, ValidationError> {
    let entity_type = EntityType::parse(&self.entity_type)?;
    let field = CorrectedField::parse(&self.field)?;

    let entity_id = non_empty("entity_id", self.entity_id)?;
    let actor_id = non_empty("actor_id", self.actor_id)?;
    let adjustment = Adjustment::new(field, &self.corrected_value)?;
    self.context.validate()?;

    let original_value = self
      .original_value
      .map(|v| v.trim().to_owned())
      .filter(|v| !v.is_empty());

    Ok(NewCorrection {
      tenant_id: self.tenant_id,
      entity_type,
      entity_id,
      field,
      original_value,
      corrected_value: adjustment.value,
      actor_id,
      context: self.context,
    })
  }
}

fn non_empty(
  name: &'static str,
  value: String,
) -> Result<String, ValidationError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    Err(ValidationError::EmptyValue(name))
  } else {
    Ok(trimmed.to_owned())
  }
}

// ─── NewCorrection ───────────────────────────────────────────────────────────

/// A validated correction, ready for
/// [`PatternStore::append_correction`](crate::store::PatternStore::append_correction).
/// `event_id` and `recorded_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCorrection {
  pub tenant_id:       Uuid,
  pub entity_type:     EntityType,
  pub entity_id:       String,
  pub field:           CorrectedField,
  pub original_value:  Option<String>,
  /// Normalised through [`Adjustment::new`].
  pub corrected_value: String,
  pub actor_id:        String,
  pub context:         EntityData,
}

// ─── CorrectionEvent ─────────────────────────────────────────────────────────

/// An immutable, persisted correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
  pub event_id:        Uuid,
  pub tenant_id:       Uuid,
  pub entity_type:     EntityType,
  pub entity_id:       String,
  pub field:           CorrectedField,
  pub original_value:  Option<String>,
  pub corrected_value: String,
  pub actor_id:        String,
  pub context:         EntityData,
  /// Server-assigned; never changes after creation.
  pub recorded_at:     DateTime<Utc>,
}

impl CorrectionEvent {
  /// The field/value pair every pattern mined from this event suggests.
  pub fn adjustment(&self) -> Result<Adjustment, ValidationError> {
    Adjustment::new(self.field, &self.corrected_value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request() -> CorrectionRequest {
    CorrectionRequest {
      tenant_id:       Uuid::new_v4(),
      entity_type:     "receipt".into(),
      entity_id:       "r-1".into(),
      field:           "category".into(),
      original_value:  Some("Groceries".into()),
      corrected_value: "Meals & Entertainment".into(),
      actor_id:        "user-7".into(),
      context:         EntityData::default().with_merchant("Starbucks"),
    }
  }

  #[test]
  fn valid_request_passes() {
    let new = request().validate().unwrap();
    assert_eq!(new.entity_type, EntityType::Receipt);
    assert_eq!(new.field, CorrectedField::Category);
    assert_eq!(new.corrected_value, "Meals & Entertainment");
  }

  #[test]
  fn dashed_field_names_are_accepted() {
    let mut req = request();
    req.field = "Tax-Deductible".into();
    req.corrected_value = "yes".into();
    let new = req.validate().unwrap();
    assert_eq!(new.field, CorrectedField::TaxDeductible);
    assert_eq!(new.corrected_value, "true");
  }

  #[test]
  fn unknown_entity_type_is_rejected() {
    let mut req = request();
    req.entity_type = "payslip".into();
    assert_eq!(
      req.validate(),
      Err(ValidationError::UnknownEntityType("payslip".into()))
    );
  }

  #[test]
  fn unknown_field_is_rejected() {
    let mut req = request();
    req.field = "colour".into();
    assert_eq!(
      req.validate(),
      Err(ValidationError::UnknownField("colour".into()))
    );
  }

  #[test]
  fn blank_corrected_value_is_rejected() {
    let mut req = request();
    req.corrected_value = "   ".into();
    assert!(matches!(req.validate(), Err(ValidationError::EmptyValue(_))));
  }

  #[test]
  fn non_finite_amount_is_malformed() {
    let mut req = request();
    req.context.amount = Some(f64::NAN);
    assert!(matches!(
      req.validate(),
      Err(ValidationError::MalformedContext(_))
    ));
  }

  #[test]
  fn bad_currency_is_malformed() {
    let mut req = request();
    req.context.currency = Some("EURO".into());
    assert!(matches!(
      req.validate(),
      Err(ValidationError::MalformedContext(_))
    ));
  }

  #[test]
  fn blank_original_value_becomes_none() {
    let mut req = request();
    req.original_value = Some("  ".into());
    assert_eq!(req.validate().unwrap().original_value, None);
  }

  #[test]
  fn extra_context_keys_roundtrip() {
    let data: EntityData = serde_json::from_str(
      r#"{ "merchant": "Uber", "amount": 23.5, "trip_id": "t-9" }"#,
    )
    .unwrap();
    assert_eq!(data.merchant.as_deref(), Some("Uber"));
    assert_eq!(data.extra["trip_id"], "t-9");
  }
}
