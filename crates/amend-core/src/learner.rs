//! [`Learner`], the engine's single entry point.
//!
//! Wires the recorder, miner, suggestion engine, tracker and pruner around
//! one injected store. Holds no learning state of its own; everything that
//! outlives a call lives in the store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Result,
  config::LearningConfig,
  correction::{CorrectionEvent, CorrectionRequest, EntityData, EntityType},
  miner::{MiningReport, PatternMiner},
  pattern::Pattern,
  prune::{PruneReport, Pruner},
  recorder::CorrectionRecorder,
  store::{PatternQuery, PatternStore, StoreResultExt as _},
  suggest::{Suggestion, SuggestionEngine},
  tracker::{AccuracyReport, AccuracyTracker},
};

pub struct Learner<S> {
  store:       Arc<S>,
  config:      LearningConfig,
  recorder:    CorrectionRecorder<S>,
  suggestions: SuggestionEngine<S>,
  tracker:     AccuracyTracker<S>,
  pruner:      Pruner<S>,
}

impl<S: PatternStore> Learner<S> {
  /// Validates `config` and builds every component over `store`.
  pub fn new(store: Arc<S>, config: LearningConfig) -> Result<Self> {
    config.validate()?;
    let miner = PatternMiner::new(store.clone(), config.clone());
    Ok(Self {
      recorder: CorrectionRecorder::new(store.clone(), miner),
      suggestions: SuggestionEngine::new(store.clone(), config.clone()),
      tracker: AccuracyTracker::new(store.clone(), config.clone()),
      pruner: Pruner::new(store.clone(), config.clone()),
      store,
      config,
    })
  }

  pub fn config(&self) -> &LearningConfig { &self.config }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Corrections ───────────────────────────────────────────────────────

  pub async fn record_correction(&self, request: CorrectionRequest) -> Result<Uuid> {
    self.recorder.record_correction(request).await
  }

  pub async fn record_correction_with_report(
    &self,
    request: CorrectionRequest,
  ) -> Result<(CorrectionEvent, MiningReport)> {
    self.recorder.record(request).await
  }

  /// Count `count` initial classifications toward the correction-rate trend.
  pub async fn record_classification(
    &self,
    tenant_id: Uuid,
    entity_type: EntityType,
    count: u32,
  ) -> Result<()> {
    self
      .store
      .record_classifications(tenant_id, entity_type, count, Utc::now())
      .await
      .into_core()
  }

  // ── Suggestions ───────────────────────────────────────────────────────

  pub async fn apply_learning(
    &self,
    tenant_id: Uuid,
    entity_type: EntityType,
    data: &EntityData,
  ) -> Result<Vec<Suggestion>> {
    self.suggestions.apply_learning(tenant_id, entity_type, data).await
  }

  // ── Reporting ─────────────────────────────────────────────────────────

  pub async fn get_accuracy_stats(&self, tenant_id: Uuid) -> Result<AccuracyReport> {
    self.tracker.get_accuracy_stats(tenant_id).await
  }

  pub async fn list_patterns(&self, query: &PatternQuery) -> Result<Vec<Pattern>> {
    self.store.query_patterns(query).await.into_core()
  }

  // ── Pruning ───────────────────────────────────────────────────────────

  pub async fn prune_inaccurate_patterns(
    &self,
    tenant_id: Uuid,
    min_accuracy: f64,
  ) -> Result<PruneReport> {
    self.pruner.prune_inaccurate_patterns(tenant_id, min_accuracy).await
  }

  pub async fn reactivate_pattern(
    &self,
    tenant_id: Uuid,
    pattern_id: Uuid,
  ) -> Result<Pattern> {
    self.pruner.reactivate_pattern(tenant_id, pattern_id).await
  }
}
