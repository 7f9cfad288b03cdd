//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that lexical order equals chronological order. Enumerations
//! are stored as their snake_case names; conditions and entity data as
//! compact JSON.

use std::str::FromStr;

use amend_core::{
  condition::Condition,
  correction::{CorrectedField, CorrectionEvent, EntityData, EntityType},
  pattern::{Adjustment, Pattern, PatternType},
  store::CorrectionTally,
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn decode_entity_type(s: &str) -> Result<EntityType> {
  decode_enum("entity type", s)
}

pub fn decode_field(s: &str) -> Result<CorrectedField> {
  decode_enum("corrected field", s)
}

pub fn decode_pattern_type(s: &str) -> Result<PatternType> {
  decode_enum("pattern type", s)
}

// ─── Structured columns ──────────────────────────────────────────────────────

pub fn encode_context(data: &EntityData) -> Result<String> {
  Ok(serde_json::to_string(data)?)
}

pub fn encode_condition(condition: &Condition) -> Result<String> {
  Ok(serde_json::to_string(condition)?)
}

/// Integers are stored as SQLite `INTEGER` (i64).
pub fn decode_count(what: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("{what} out of range: {v}")))
}

/// A non-negative `COUNT(*)` or `SUM(..)`.
pub fn decode_total(what: &str, v: i64) -> Result<u64> {
  u64::try_from(v).map_err(|_| Error::Decode(format!("negative {what}: {v}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `corrections` row.
pub struct RawCorrection {
  pub event_id:        String,
  pub tenant_id:       String,
  pub entity_type:     String,
  pub entity_id:       String,
  pub field:           String,
  pub original_value:  Option<String>,
  pub corrected_value: String,
  pub actor_id:        String,
  pub context_json:    String,
  pub recorded_at:     String,
}

pub const CORRECTION_COLUMNS: &str = "event_id, tenant_id, entity_type, entity_id, field, \
   original_value, corrected_value, actor_id, context_json, recorded_at";

impl RawCorrection {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:        row.get(0)?,
      tenant_id:       row.get(1)?,
      entity_type:     row.get(2)?,
      entity_id:       row.get(3)?,
      field:           row.get(4)?,
      original_value:  row.get(5)?,
      corrected_value: row.get(6)?,
      actor_id:        row.get(7)?,
      context_json:    row.get(8)?,
      recorded_at:     row.get(9)?,
    })
  }

  pub fn into_event(self) -> Result<CorrectionEvent> {
    Ok(CorrectionEvent {
      event_id:        decode_uuid(&self.event_id)?,
      tenant_id:       decode_uuid(&self.tenant_id)?,
      entity_type:     decode_entity_type(&self.entity_type)?,
      entity_id:       self.entity_id,
      field:           decode_field(&self.field)?,
      original_value:  self.original_value,
      corrected_value: self.corrected_value,
      actor_id:        self.actor_id,
      context:         serde_json::from_str(&self.context_json)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `patterns` row.
pub struct RawPattern {
  pub pattern_id:     String,
  pub tenant_id:      String,
  pub entity_type:    String,
  pub pattern_type:   String,
  pub condition_json: String,
  pub target_field:   String,
  pub target_value:   String,
  pub occurrences:    i64,
  pub positive:       i64,
  pub negative:       i64,
  pub accuracy:       f64,
  pub active:         bool,
  pub deactivated_at: Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
  pub version:        i64,
}

pub const PATTERN_COLUMNS: &str = "pattern_id, tenant_id, entity_type, pattern_type, \
   condition_json, target_field, target_value, occurrences, positive, negative, \
   accuracy, active, deactivated_at, created_at, updated_at, version";

impl RawPattern {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pattern_id:     row.get(0)?,
      tenant_id:      row.get(1)?,
      entity_type:    row.get(2)?,
      pattern_type:   row.get(3)?,
      condition_json: row.get(4)?,
      target_field:   row.get(5)?,
      target_value:   row.get(6)?,
      occurrences:    row.get(7)?,
      positive:       row.get(8)?,
      negative:       row.get(9)?,
      accuracy:       row.get(10)?,
      active:         row.get(11)?,
      deactivated_at: row.get(12)?,
      created_at:     row.get(13)?,
      updated_at:     row.get(14)?,
      version:        row.get(15)?,
    })
  }

  pub fn into_pattern(self) -> Result<Pattern> {
    let condition: Condition = serde_json::from_str(&self.condition_json)?;
    let field = decode_field(&self.target_field)?;
    let adjustment = Adjustment::new(field, &self.target_value)
      .map_err(|e| Error::Decode(e.to_string()))?;

    Ok(Pattern {
      pattern_id: decode_uuid(&self.pattern_id)?,
      tenant_id: decode_uuid(&self.tenant_id)?,
      entity_type: decode_entity_type(&self.entity_type)?,
      pattern_type: decode_pattern_type(&self.pattern_type)?,
      condition,
      adjustment,
      occurrences: decode_count("occurrences", self.occurrences)?,
      positive: decode_count("positive", self.positive)?,
      negative: decode_count("negative", self.negative)?,
      accuracy: self.accuracy,
      active: self.active,
      deactivated_at: self.deactivated_at.as_deref().map(decode_dt).transpose()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      version: u64::try_from(self.version)
        .map_err(|_| Error::Decode(format!("negative version: {}", self.version)))?,
    })
  }
}

/// One `GROUP BY entity_type, field` row over `corrections`.
pub struct RawTally {
  pub entity_type: String,
  pub field:       String,
  pub count:       i64,
}

impl RawTally {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { entity_type: row.get(0)?, field: row.get(1)?, count: row.get(2)? })
  }

  pub fn into_tally(self) -> Result<CorrectionTally> {
    Ok(CorrectionTally {
      entity_type: decode_entity_type(&self.entity_type)?,
      field:       decode_field(&self.field)?,
      count:       decode_total("correction count", self.count)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_roundtrip() {
    let dt = DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let s = encode_dt(dt);
    assert_eq!(s, "2026-03-01T08:00:00.000000Z");
    assert_eq!(decode_dt(&s).unwrap(), dt);
  }

  #[test]
  fn unknown_enum_names_are_decode_errors() {
    assert!(matches!(decode_entity_type("payslip"), Err(Error::Decode(_))));
    assert_eq!(decode_field("tax_deductible").unwrap(), CorrectedField::TaxDeductible);
    assert_eq!(
      decode_pattern_type("category_subcategory").unwrap(),
      PatternType::CategorySubcategory
    );
  }

  #[test]
  fn negative_counts_are_rejected() {
    assert!(decode_count("occurrences", -1).is_err());
    assert_eq!(decode_count("occurrences", 7).unwrap(), 7);
  }
}
