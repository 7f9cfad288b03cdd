//! Pattern conditions, the typed predicates a learned pattern matches on.
//!
//! Each condition shape wraps a newtype that can only be built through a
//! validating constructor (serde goes through the same constructor), so a
//! malformed condition never reaches the matching logic.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
  constants::{MIN_KEYWORD_LEN, STOP_WORDS},
  correction::EntityData,
  error::ValidationError,
};

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Trim, lower-case and collapse internal whitespace.
pub fn normalize_label(raw: &str) -> String {
  raw
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

// ─── Merchant / category names ───────────────────────────────────────────────

/// A normalised merchant name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MerchantName(String);

impl MerchantName {
  pub fn new(raw: &str) -> Result<Self, ValidationError> {
    let normalized = normalize_label(raw);
    if normalized.is_empty() {
      return Err(ValidationError::InvalidCondition(
        "merchant name is empty".into(),
      ));
    }
    Ok(Self(normalized))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for MerchantName {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(&value) }
}

impl From<MerchantName> for String {
  fn from(value: MerchantName) -> Self { value.0 }
}

/// A normalised category label, used as the condition of category-based
/// patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryName(String);

impl CategoryName {
  pub fn new(raw: &str) -> Result<Self, ValidationError> {
    let normalized = normalize_label(raw);
    if normalized.is_empty() {
      return Err(ValidationError::InvalidCondition(
        "category name is empty".into(),
      ));
    }
    Ok(Self(normalized))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for CategoryName {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(&value) }
}

impl From<CategoryName> for String {
  fn from(value: CategoryName) -> Self { value.0 }
}

// ─── Keywords ────────────────────────────────────────────────────────────────

/// A significant description token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Keyword(String);

impl Keyword {
  /// Accepts a single alphanumeric token of at least
  /// [`MIN_KEYWORD_LEN`] characters that is neither a stop word nor a bare
  /// number.
  pub fn new(raw: &str) -> Result<Self, ValidationError> {
    let trimmed = raw.trim();
    if !trimmed.chars().all(char::is_alphanumeric) {
      return Err(ValidationError::InvalidCondition(format!(
        "keyword {raw:?} is not a single token"
      )));
    }
    // Lowercasing may add combining marks (`İ` becomes `i` + U+0307).
    let token: String = trimmed
      .chars()
      .flat_map(char::to_lowercase)
      .filter(|c| c.is_alphanumeric())
      .collect();
    if token.chars().count() < MIN_KEYWORD_LEN {
      return Err(ValidationError::InvalidCondition(format!(
        "keyword {raw:?} is shorter than {MIN_KEYWORD_LEN} characters"
      )));
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
      return Err(ValidationError::InvalidCondition(format!(
        "keyword {raw:?} is numeric"
      )));
    }
    if STOP_WORDS.contains(&token.as_str()) {
      return Err(ValidationError::InvalidCondition(format!(
        "keyword {raw:?} is a stop word"
      )));
    }
    Ok(Self(token))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Keyword {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(&value) }
}

impl From<Keyword> for String {
  fn from(value: Keyword) -> Self { value.0 }
}

fn raw_tokens(text: &str) -> impl Iterator<Item = &str> {
  text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty())
}

/// The significant tokens of `text`, in order of first appearance, without
/// duplicates, truncated to `limit`.
pub fn significant_tokens(text: &str, limit: usize) -> Vec<Keyword> {
  let mut seen = BTreeSet::new();
  raw_tokens(text)
    .filter_map(|t| Keyword::new(t).ok())
    .filter(|k| seen.insert(k.clone()))
    .take(limit)
    .collect()
}

/// Every significant token of `text`, for matching. Unlike
/// [`significant_tokens`] this is not truncated.
pub fn token_set(text: &str) -> BTreeSet<Keyword> {
  raw_tokens(text).filter_map(|t| Keyword::new(t).ok()).collect()
}

// ─── Amount bands ────────────────────────────────────────────────────────────

/// Fixed amount buckets. Lower bounds are inclusive, upper bounds exclusive.
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
)]
pub enum AmountBand {
  #[serde(rename = "0-10")]
  #[strum(to_string = "0-10")]
  UpTo10,
  #[serde(rename = "10-25")]
  #[strum(to_string = "10-25")]
  UpTo25,
  #[serde(rename = "25-50")]
  #[strum(to_string = "25-50")]
  UpTo50,
  #[serde(rename = "50-100")]
  #[strum(to_string = "50-100")]
  UpTo100,
  #[serde(rename = "100-250")]
  #[strum(to_string = "100-250")]
  UpTo250,
  #[serde(rename = "250-500")]
  #[strum(to_string = "250-500")]
  UpTo500,
  #[serde(rename = "500-1000")]
  #[strum(to_string = "500-1000")]
  UpTo1000,
  #[serde(rename = "1000+")]
  #[strum(to_string = "1000+")]
  Over1000,
}

impl AmountBand {
  /// Bucket by absolute value, so refunds land next to the purchases they
  /// reverse. `None` for NaN and infinities.
  pub fn for_amount(amount: f64) -> Option<Self> {
    if !amount.is_finite() {
      return None;
    }
    let a = amount.abs();
    let band = if a < 10.0 {
      Self::UpTo10
    } else if a < 25.0 {
      Self::UpTo25
    } else if a < 50.0 {
      Self::UpTo50
    } else if a < 100.0 {
      Self::UpTo100
    } else if a < 250.0 {
      Self::UpTo250
    } else if a < 500.0 {
      Self::UpTo500
    } else if a < 1000.0 {
      Self::UpTo1000
    } else {
      Self::Over1000
    };
    Some(band)
  }

  /// `(lower, upper)`; `upper` is `None` for the open-ended top band.
  pub fn bounds(self) -> (f64, Option<f64>) {
    match self {
      Self::UpTo10 => (0.0, Some(10.0)),
      Self::UpTo25 => (10.0, Some(25.0)),
      Self::UpTo50 => (25.0, Some(50.0)),
      Self::UpTo100 => (50.0, Some(100.0)),
      Self::UpTo250 => (100.0, Some(250.0)),
      Self::UpTo500 => (250.0, Some(500.0)),
      Self::UpTo1000 => (500.0, Some(1000.0)),
      Self::Over1000 => (1000.0, None),
    }
  }

  pub fn contains(self, amount: f64) -> bool {
    Self::for_amount(amount) == Some(self)
  }
}

// ─── Condition ───────────────────────────────────────────────────────────────

/// Which shape of condition a pattern type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
  Merchant,
  AmountRange,
  Keyword,
  Category,
}

/// A normalised, validated predicate over [`EntityData`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Condition {
  Merchant(MerchantName),
  AmountRange(AmountBand),
  Keyword(Keyword),
  Category(CategoryName),
}

impl Condition {
  pub fn kind(&self) -> ConditionKind {
    match self {
      Self::Merchant(_) => ConditionKind::Merchant,
      Self::AmountRange(_) => ConditionKind::AmountRange,
      Self::Keyword(_) => ConditionKind::Keyword,
      Self::Category(_) => ConditionKind::Category,
    }
  }

  /// Canonical string form; part of a pattern's unique key.
  pub fn key(&self) -> String {
    match self {
      Self::Merchant(m) => format!("merchant:{}", m.as_str()),
      Self::AmountRange(b) => format!("amount:{b}"),
      Self::Keyword(k) => format!("keyword:{}", k.as_str()),
      Self::Category(c) => format!("category:{}", c.as_str()),
    }
  }

  /// Whether `data` satisfies this condition.
  pub fn matches(&self, data: &MatchFeatures) -> bool {
    match self {
      Self::Merchant(m) => data.merchant.as_ref() == Some(m),
      Self::AmountRange(b) => data.amount_band == Some(*b),
      Self::Keyword(k) => data.keywords.contains(k),
      Self::Category(c) => data.category.as_ref() == Some(c),
    }
  }
}

impl fmt::Display for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Merchant(m) => write!(f, "merchant '{}'", m.as_str()),
      Self::AmountRange(b) => match b.bounds() {
        (lo, Some(hi)) => write!(f, "an amount between {lo} and {hi}"),
        (lo, None) => write!(f, "an amount of {lo} or more"),
      },
      Self::Keyword(k) => write!(f, "description keyword '{}'", k.as_str()),
      Self::Category(c) => write!(f, "category '{}'", c.as_str()),
    }
  }
}

// ─── Match features ──────────────────────────────────────────────────────────

/// [`EntityData`] reduced to the normalised features conditions compare
/// against. Computed once per query.
#[derive(Debug, Clone, Default)]
pub struct MatchFeatures {
  pub merchant:    Option<MerchantName>,
  pub amount_band: Option<AmountBand>,
  pub keywords:    BTreeSet<Keyword>,
  pub category:    Option<CategoryName>,
}

impl From<&EntityData> for MatchFeatures {
  fn from(data: &EntityData) -> Self {
    Self {
      merchant:    data.merchant.as_deref().and_then(|m| MerchantName::new(m).ok()),
      amount_band: data.amount.and_then(AmountBand::for_amount),
      keywords:    data.description.as_deref().map(token_set).unwrap_or_default(),
      category:    data.category.as_deref().and_then(|c| CategoryName::new(c).ok()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merchant_names_are_normalized() {
    let m = MerchantName::new("  STARBUCKS   Coffee ").unwrap();
    assert_eq!(m.as_str(), "starbucks coffee");
    assert!(MerchantName::new("   ").is_err());
  }

  #[test]
  fn keywords_reject_short_stop_and_numeric_tokens() {
    assert!(Keyword::new("ab").is_err());
    assert!(Keyword::new("the").is_err());
    assert!(Keyword::new("2024").is_err());
    assert!(Keyword::new("two words").is_err());
    assert_eq!(Keyword::new("Coffee").unwrap().as_str(), "coffee");
  }

  #[test]
  fn keywords_survive_unicode_lowercasing() {
    assert_eq!(Keyword::new("İstanbul").unwrap().as_str(), "istanbul");
    assert_eq!(Keyword::new("MÜNCHEN").unwrap().as_str(), "münchen");

    let tokens = significant_tokens("Flight to İstanbul", 5);
    let words: Vec<_> = tokens.iter().map(Keyword::as_str).collect();
    assert_eq!(words, ["flight", "istanbul"]);
  }

  #[test]
  fn significant_tokens_dedupe_and_truncate() {
    let tokens = significant_tokens(
      "Coffee and bagel, coffee again: team offsite lunch with clients 2024",
      5,
    );
    let words: Vec<_> = tokens.iter().map(Keyword::as_str).collect();
    assert_eq!(words, ["coffee", "bagel", "again", "team", "offsite"]);
  }

  #[test]
  fn token_set_is_not_truncated() {
    let set = token_set("alpha bravo charlie delta echo foxtrot golf");
    assert_eq!(set.len(), 7);
  }

  #[test]
  fn amount_bands_have_inclusive_lower_bounds() {
    assert_eq!(AmountBand::for_amount(0.0), Some(AmountBand::UpTo10));
    assert_eq!(AmountBand::for_amount(9.99), Some(AmountBand::UpTo10));
    assert_eq!(AmountBand::for_amount(10.0), Some(AmountBand::UpTo25));
    assert_eq!(AmountBand::for_amount(12.0), Some(AmountBand::UpTo25));
    assert_eq!(AmountBand::for_amount(999.99), Some(AmountBand::UpTo1000));
    assert_eq!(AmountBand::for_amount(1000.0), Some(AmountBand::Over1000));
    assert_eq!(AmountBand::for_amount(-42.0), Some(AmountBand::UpTo50));
    assert_eq!(AmountBand::for_amount(f64::INFINITY), None);
  }

  #[test]
  fn band_display_matches_serde_name() {
    let json = serde_json::to_string(&AmountBand::Over1000).unwrap();
    assert_eq!(json, "\"1000+\"");
    assert_eq!(AmountBand::UpTo50.to_string(), "25-50");
    assert_eq!("100-250".parse::<AmountBand>().unwrap(), AmountBand::UpTo250);
  }

  #[test]
  fn condition_keys_are_canonical() {
    let c = Condition::Merchant(MerchantName::new("Starbucks").unwrap());
    assert_eq!(c.key(), "merchant:starbucks");
    assert_eq!(Condition::AmountRange(AmountBand::UpTo25).key(), "amount:10-25");
  }

  #[test]
  fn deserializing_an_invalid_condition_fails() {
    let err = serde_json::from_str::<Condition>(
      r#"{ "kind": "keyword", "value": "an" }"#,
    );
    assert!(err.is_err());
  }

  #[test]
  fn condition_roundtrips_through_json() {
    let c = Condition::Keyword(Keyword::new("parking").unwrap());
    let json = serde_json::to_string(&c).unwrap();
    assert_eq!(json, r#"{"kind":"keyword","value":"parking"}"#);
    assert_eq!(serde_json::from_str::<Condition>(&json).unwrap(), c);
  }

  #[test]
  fn matching_uses_normalized_features() {
    let data = EntityData::default()
      .with_merchant("starbucks ")
      .with_amount(12.0)
      .with_description("Airport parking, terminal 2");
    let features = MatchFeatures::from(&data);

    assert!(Condition::Merchant(MerchantName::new("Starbucks").unwrap())
      .matches(&features));
    assert!(Condition::AmountRange(AmountBand::UpTo25).matches(&features));
    assert!(!Condition::AmountRange(AmountBand::UpTo10).matches(&features));
    assert!(Condition::Keyword(Keyword::new("parking").unwrap())
      .matches(&features));
    assert!(!Condition::Category(CategoryName::new("travel").unwrap())
      .matches(&features));
  }
}
