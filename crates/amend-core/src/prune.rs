//! Pruner: soft-deactivate patterns whose accuracy fell below a floor.
//!
//! Patterns are updated one at a time with version-checked writes; a sweep
//! never holds anything tenant-wide, and one failing pattern never aborts
//! the rest.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  config::{LearningConfig, check_unit},
  pattern::Pattern,
  store::{PatternQuery, PatternStore, StoreResultExt as _},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPattern {
  pub pattern_id: Uuid,
  pub reason:     String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
  pub pruned:     usize,
  pub pruned_ids: Vec<Uuid>,
  pub skipped:    Vec<SkippedPattern>,
}

enum PruneOutcome {
  Pruned,
  /// Re-read showed the pattern no longer qualifies.
  NoLongerEligible,
}

pub struct Pruner<S> {
  store:  Arc<S>,
  config: LearningConfig,
}

impl<S: PatternStore> Pruner<S> {
  pub fn new(store: Arc<S>, config: LearningConfig) -> Self {
    Self { store, config }
  }

  /// Deactivate every not-yet-deactivated pattern with at least
  /// `min_occurrences` observations and `accuracy < min_accuracy`.
  ///
  /// Idempotent: patterns already deactivated are never selected again.
  pub async fn prune_inaccurate_patterns(
    &self,
    tenant_id: Uuid,
    min_accuracy: f64,
  ) -> Result<PruneReport> {
    check_unit("min_accuracy", min_accuracy)?;

    let query = PatternQuery {
      deactivated: Some(false),
      min_occurrences: Some(self.config.min_occurrences),
      below_accuracy: Some(min_accuracy),
      ..PatternQuery::for_tenant(tenant_id)
    };
    let targets = self.store.query_patterns(&query).await.into_core()?;

    let mut report = PruneReport::default();
    for pattern in targets {
      let pattern_id = pattern.pattern_id;
      match self.prune_one(pattern, min_accuracy).await {
        Ok(PruneOutcome::Pruned) => {
          report.pruned += 1;
          report.pruned_ids.push(pattern_id);
        }
        Ok(PruneOutcome::NoLongerEligible) => {}
        Err(e) => {
          warn!(%pattern_id, error = %e, "skipping pattern during prune");
          report.skipped.push(SkippedPattern {
            pattern_id,
            reason: e.to_string(),
          });
        }
      }
    }

    info!(
      tenant_id = %tenant_id,
      min_accuracy,
      pruned = report.pruned,
      skipped = report.skipped.len(),
      "prune sweep finished"
    );
    Ok(report)
  }

  async fn prune_one(
    &self,
    mut pattern: Pattern,
    min_accuracy: f64,
  ) -> Result<PruneOutcome> {
    let attempts = self.config.max_upsert_attempts;

    for attempt in 1..=attempts {
      if !self.qualifies(&pattern, min_accuracy) {
        return Ok(PruneOutcome::NoLongerEligible);
      }

      let mut updated = pattern.clone();
      updated.deactivate(Utc::now());

      match self.store.update_pattern(&updated).await.into_core() {
        Ok(_) => return Ok(PruneOutcome::Pruned),
        Err(Error::Conflict(reason)) => {
          warn!(pattern_id = %pattern.pattern_id, attempt, %reason, "prune conflicted, re-reading");
          pattern = self
            .store
            .get_pattern_by_id(pattern.tenant_id, pattern.pattern_id)
            .await
            .into_core()?
            .ok_or(Error::PatternNotFound(pattern.pattern_id))?;
        }
        Err(e) => return Err(e),
      }
    }

    Err(Error::StorageConflict {
      key:      pattern.key().to_string(),
      attempts,
    })
  }

  fn qualifies(&self, pattern: &Pattern, min_accuracy: f64) -> bool {
    pattern.deactivated_at.is_none()
      && pattern.occurrences >= self.config.min_occurrences
      && pattern.accuracy < min_accuracy
  }

  /// Operator action: undo a deactivation.
  pub async fn reactivate_pattern(
    &self,
    tenant_id: Uuid,
    pattern_id: Uuid,
  ) -> Result<Pattern> {
    let attempts = self.config.max_upsert_attempts;

    for attempt in 1..=attempts {
      let mut pattern = self
        .store
        .get_pattern_by_id(tenant_id, pattern_id)
        .await
        .into_core()?
        .ok_or(Error::PatternNotFound(pattern_id))?;

      if pattern.deactivated_at.is_none() {
        return Ok(pattern);
      }
      pattern.reactivate(&self.config, Utc::now());

      match self.store.update_pattern(&pattern).await.into_core() {
        Ok(stored) => {
          info!(%tenant_id, %pattern_id, state = ?stored.state(), "pattern reactivated");
          return Ok(stored);
        }
        Err(Error::Conflict(reason)) => {
          warn!(%pattern_id, attempt, %reason, "reactivation conflicted, retrying");
        }
        Err(e) => return Err(e),
      }
    }

    Err(Error::StorageConflict {
      key: pattern_id.to_string(),
      attempts,
    })
  }
}
