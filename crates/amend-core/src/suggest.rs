//! SuggestionEngine: apply learned patterns to unseen data.
//!
//! Reads only; never takes locks and never mutates the caller's data.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  condition::{Condition, MatchFeatures},
  config::LearningConfig,
  constants::{MAX_OCCURRENCE_BOOST, OCCURRENCE_BOOST_SLOPE},
  correction::{CorrectedField, EntityData, EntityType},
  pattern::{Pattern, PatternType},
  store::{PatternQuery, PatternStore, StoreResultExt as _},
};

// ─── Suggestion ──────────────────────────────────────────────────────────────

/// A proposed adjustment. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
  pub field:           CorrectedField,
  pub original_value:  Option<String>,
  pub suggested_value: String,
  /// Within `[0, 1]`.
  pub confidence:      f64,
  pub pattern_id:      Uuid,
  pub pattern_type:    PatternType,
  pub condition:       Condition,
  pub occurrences:     u32,
  pub accuracy:        f64,
  pub reasoning:       String,
}

impl Suggestion {
  /// Whether a caller may apply this without asking the user.
  pub fn is_auto_applicable(&self, threshold: f64) -> bool {
    self.confidence >= threshold
  }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Multiplier in `[1, MAX_OCCURRENCE_BOOST]`, growing with `ln(occurrences)`.
pub fn occurrence_boost(occurrences: u32) -> f64 {
  if occurrences <= 1 {
    return 1.0;
  }
  let bonus = OCCURRENCE_BOOST_SLOPE * (occurrences as f64).ln();
  (1.0 + bonus).min(MAX_OCCURRENCE_BOOST)
}

/// `min(1, accuracy × boost)`; accuracy stays the dominant term.
pub fn confidence(accuracy: f64, occurrences: u32) -> f64 {
  (accuracy.clamp(0.0, 1.0) * occurrence_boost(occurrences)).min(1.0)
}

fn reasoning(pattern: &Pattern) -> String {
  format!(
    "Based on {} previous corrections, {} is usually corrected to {} = {} ({:.0}% accurate)",
    pattern.occurrences,
    pattern.condition,
    pattern.adjustment.field,
    pattern.adjustment.value,
    pattern.accuracy * 100.0,
  )
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct SuggestionEngine<S> {
  store:  Arc<S>,
  config: LearningConfig,
}

impl<S: PatternStore> SuggestionEngine<S> {
  pub fn new(store: Arc<S>, config: LearningConfig) -> Self {
    Self { store, config }
  }

  /// Ranked suggestions for `data`, at most one per target field.
  ///
  /// An empty list is the normal outcome when nothing has been learned yet
  /// or nothing matches.
  pub async fn apply_learning(
    &self,
    tenant_id: Uuid,
    entity_type: EntityType,
    data: &EntityData,
  ) -> Result<Vec<Suggestion>> {
    let query = PatternQuery {
      entity_type: Some(entity_type),
      active: Some(true),
      deactivated: Some(false),
      min_occurrences: Some(self.config.min_occurrences),
      min_accuracy: Some(self.config.min_accuracy),
      ..PatternQuery::for_tenant(tenant_id)
    };
    let patterns = self.store.query_patterns(&query).await.into_core()?;
    let scanned = patterns.len();

    let features = MatchFeatures::from(data);
    let mut best: BTreeMap<CorrectedField, (f64, Pattern)> = BTreeMap::new();

    for pattern in patterns {
      if !pattern.meets_thresholds(&self.config)
        || !pattern.condition.matches(&features)
      {
        continue;
      }
      let score = confidence(pattern.accuracy, pattern.occurrences);
      let field = pattern.adjustment.field;
      let replace = match best.get(&field) {
        None => true,
        Some((best_score, current)) => {
          outranks(score, &pattern, *best_score, current)
        }
      };
      if replace {
        best.insert(field, (score, pattern));
      }
    }

    let mut suggestions: Vec<Suggestion> = best
      .into_values()
      .filter_map(|(score, pattern)| {
        let field = pattern.adjustment.field;
        let original_value = data.current_value(field);
        if original_value
          .as_deref()
          .is_some_and(|v| pattern.adjustment.agrees_with(v))
        {
          return None;
        }
        Some(Suggestion {
          field,
          original_value,
          suggested_value: pattern.adjustment.value.clone(),
          confidence: score,
          pattern_id: pattern.pattern_id,
          pattern_type: pattern.pattern_type,
          occurrences: pattern.occurrences,
          accuracy: pattern.accuracy,
          reasoning: reasoning(&pattern),
          condition: pattern.condition,
        })
      })
      .collect();

    suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    debug!(
      tenant_id = %tenant_id,
      entity_type = %entity_type,
      scanned,
      suggestions = suggestions.len(),
      "learning applied"
    );
    Ok(suggestions)
  }
}

/// Higher confidence wins; ties go to more occurrences, then higher accuracy.
fn outranks(score: f64, candidate: &Pattern, best_score: f64, best: &Pattern) -> bool {
  score
    .total_cmp(&best_score)
    .then(candidate.occurrences.cmp(&best.occurrences))
    .then(candidate.accuracy.total_cmp(&best.accuracy))
    .is_gt()
}
