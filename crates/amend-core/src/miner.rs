//! PatternMiner: correction event → candidate conditions → pattern upserts.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  condition::{
    AmountBand, CategoryName, Condition, ConditionKind, MerchantName,
    significant_tokens,
  },
  config::LearningConfig,
  correction::{CorrectionEvent, EntityData},
  pattern::{Adjustment, Observation, Pattern, PatternKey, PatternType},
  store::{PatternStore, StoreResultExt as _},
};

// ─── Extraction ──────────────────────────────────────────────────────────────

/// All `(pattern type, condition)` pairs one correction supports.
///
/// Only pattern types targeting the corrected field apply. Types whose
/// context attribute is missing or unusable yield nothing.
pub fn extract_candidates(
  event: &CorrectionEvent,
  max_keywords: usize,
) -> Vec<PatternKey> {
  PatternType::iter()
    .filter(|t| t.target_field() == event.field)
    .flat_map(|pattern_type| {
      conditions_for(pattern_type.condition_kind(), &event.context, max_keywords)
        .into_iter()
        .map(move |condition| PatternKey {
          entity_type: event.entity_type,
          pattern_type,
          condition,
        })
    })
    .collect()
}

fn conditions_for(
  kind: ConditionKind,
  context: &EntityData,
  max_keywords: usize,
) -> Vec<Condition> {
  match kind {
    ConditionKind::Merchant => context
      .merchant
      .as_deref()
      .and_then(|m| MerchantName::new(m).ok())
      .map(Condition::Merchant)
      .into_iter()
      .collect(),
    ConditionKind::AmountRange => context
      .amount
      .and_then(AmountBand::for_amount)
      .map(Condition::AmountRange)
      .into_iter()
      .collect(),
    ConditionKind::Keyword => context
      .description
      .as_deref()
      .map(|d| significant_tokens(d, max_keywords))
      .unwrap_or_default()
      .into_iter()
      .map(Condition::Keyword)
      .collect(),
    ConditionKind::Category => context
      .category
      .as_deref()
      .and_then(|c| CategoryName::new(c).ok())
      .map(Condition::Category)
      .into_iter()
      .collect(),
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// What mining one event did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiningReport {
  pub candidates:   usize,
  pub created:      usize,
  pub reinforced:   usize,
  pub contradicted: usize,
  /// Patterns that became active as a result of this event.
  pub promoted:     usize,
  /// Optimistic retries spent across all candidates.
  pub retries:      u32,
}

enum Upsert {
  Created { promoted: bool },
  Updated { observation: Observation, promoted: bool },
}

// ─── Miner ───────────────────────────────────────────────────────────────────

pub struct PatternMiner<S> {
  store:  Arc<S>,
  config: LearningConfig,
}

impl<S: PatternStore> PatternMiner<S> {
  pub fn new(store: Arc<S>, config: LearningConfig) -> Self {
    Self { store, config }
  }

  /// Fold `event` into every pattern it supports.
  ///
  /// Every candidate is attempted; if any upsert fails, the first failure is
  /// returned after the rest have been processed.
  pub async fn mine(&self, event: &CorrectionEvent) -> Result<MiningReport> {
    let adjustment = event.adjustment()?;
    let candidates = extract_candidates(event, self.config.max_keywords);

    let mut report = MiningReport {
      candidates: candidates.len(),
      ..Default::default()
    };
    let mut first_error: Option<Error> = None;

    for key in candidates {
      match self.upsert(event, &key, &adjustment, &mut report.retries).await {
        Ok(Upsert::Created { promoted }) => {
          report.created += 1;
          report.promoted += promoted as usize;
          debug!(event_id = %event.event_id, key = %key, "pattern created");
        }
        Ok(Upsert::Updated { observation, promoted }) => {
          match observation {
            Observation::Reinforced => report.reinforced += 1,
            Observation::Contradicted => report.contradicted += 1,
          }
          report.promoted += promoted as usize;
          if promoted {
            info!(tenant_id = %event.tenant_id, key = %key, "pattern promoted to active");
          } else {
            debug!(event_id = %event.event_id, key = %key, ?observation, "pattern updated");
          }
        }
        Err(e) => {
          warn!(event_id = %event.event_id, key = %key, error = %e, "pattern upsert failed");
          if first_error.is_none() {
            first_error = Some(e);
          }
        }
      }
    }

    info!(
      event_id = %event.event_id,
      tenant_id = %event.tenant_id,
      candidates = report.candidates,
      created = report.created,
      reinforced = report.reinforced,
      contradicted = report.contradicted,
      promoted = report.promoted,
      "correction mined"
    );

    match first_error {
      Some(e) => Err(e),
      None => Ok(report),
    }
  }

  /// Optimistic read-modify-write of one pattern, retried on conflict.
  async fn upsert(
    &self,
    event: &CorrectionEvent,
    key: &PatternKey,
    adjustment: &Adjustment,
    retries: &mut u32,
  ) -> Result<Upsert> {
    let attempts = self.config.max_upsert_attempts;

    for attempt in 1..=attempts {
      let existing = self.store.get_pattern(event.tenant_id, key).await.into_core()?;
      let now = Utc::now();

      let outcome = match existing {
        None => {
          let pattern = Pattern::candidate(
            event.tenant_id,
            key.clone(),
            adjustment.clone(),
            &self.config,
            now,
          );
          let promoted = pattern.active;
          self
            .store
            .insert_pattern(&pattern)
            .await
            .into_core()
            .map(|()| Upsert::Created { promoted })
        }
        Some(mut pattern) => {
          let was_active = pattern.active;
          let observation =
            pattern.observe(&event.corrected_value, &self.config, now);
          let promoted = !was_active && pattern.active;
          self
            .store
            .update_pattern(&pattern)
            .await
            .into_core()
            .map(|_| Upsert::Updated { observation, promoted })
        }
      };

      match outcome {
        Err(Error::Conflict(reason)) => {
          *retries += 1;
          warn!(key = %key, attempt, %reason, "pattern write conflicted, retrying");
          tokio::task::yield_now().await;
        }
        other => return other,
      }
    }

    Err(Error::StorageConflict { key: key.to_string(), attempts })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::correction::{CorrectedField, EntityType};
  use uuid::Uuid;

  fn event(field: CorrectedField, context: EntityData) -> CorrectionEvent {
    CorrectionEvent {
      event_id: Uuid::new_v4(),
      tenant_id: Uuid::new_v4(),
      entity_type: EntityType::Expense,
      entity_id: "e-1".into(),
      field,
      original_value: None,
      corrected_value: "true".into(),
      actor_id: "u".into(),
      context,
      recorded_at: Utc::now(),
    }
  }

  fn types(keys: &[PatternKey]) -> Vec<PatternType> {
    keys.iter().map(|k| k.pattern_type).collect()
  }

  #[test]
  fn category_corrections_use_merchant_amount_and_keywords() {
    let ctx = EntityData::default()
      .with_merchant("Starbucks")
      .with_amount(12.0)
      .with_description("latte with client");
    let keys = extract_candidates(&event(CorrectedField::Category, ctx), 5);

    assert_eq!(
      types(&keys),
      [
        PatternType::MerchantCategory,
        PatternType::AmountRangeCategory,
        PatternType::DescriptionKeywordCategory,
        PatternType::DescriptionKeywordCategory,
      ]
    );
  }

  #[test]
  fn subcategory_corrections_use_keywords_and_category() {
    let ctx = EntityData::default()
      .with_merchant("Shell")
      .with_category("Travel")
      .with_description("fuel");
    let keys = extract_candidates(&event(CorrectedField::Subcategory, ctx), 5);

    assert_eq!(
      types(&keys),
      [PatternType::KeywordSubcategory, PatternType::CategorySubcategory]
    );
    assert_eq!(keys[1].condition.key(), "category:travel");
  }

  #[test]
  fn tax_deductible_corrections_use_merchant_and_amount() {
    let ctx = EntityData::default().with_merchant("Adobe").with_amount(59.99);
    let keys = extract_candidates(&event(CorrectedField::TaxDeductible, ctx), 5);
    assert_eq!(
      types(&keys),
      [
        PatternType::MerchantTaxDeductible,
        PatternType::AmountRangeTaxDeductible
      ]
    );
  }

  #[test]
  fn merchant_corrections_yield_nothing() {
    let ctx = EntityData::default().with_merchant("Starbucks");
    assert!(extract_candidates(&event(CorrectedField::Merchant, ctx), 5).is_empty());
  }

  #[test]
  fn keyword_candidates_respect_the_limit() {
    let ctx = EntityData::default()
      .with_description("alpha bravo charlie delta echo foxtrot golf");
    let keys = extract_candidates(&event(CorrectedField::Category, ctx), 3);
    assert_eq!(keys.len(), 3);
  }

  #[test]
  fn empty_context_yields_nothing() {
    let keys =
      extract_candidates(&event(CorrectedField::Category, EntityData::default()), 5);
    assert!(keys.is_empty());
  }
}
