//! AccuracyTracker: per-tenant statistics over corrections and patterns.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{
  Result,
  config::LearningConfig,
  constants::{MAX_TREND_WINDOW_DAYS, TREND_STABLE_BAND},
  correction::{CorrectedField, EntityType},
  error::ValidationError,
  pattern::{Pattern, PatternState},
  store::{PatternStore, StatsSnapshot, StoreResultExt as _, TrendWindows},
};

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCounts {
  pub total:       usize,
  pub active:      usize,
  /// `candidate + deactivated`.
  pub inactive:    usize,
  pub candidate:   usize,
  pub deactivated: usize,
}

/// Aggregates for one slice (a field or an entity type).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceStats {
  pub corrections:     u64,
  pub patterns:        usize,
  pub active_patterns: usize,
  pub positive:        u64,
  pub negative:        u64,
  /// Pooled `Σpositive / Σ(positive + negative)`; `None` without patterns.
  pub accuracy:        Option<f64>,
}

impl SliceStats {
  fn add_pattern(&mut self, pattern: &Pattern) {
    self.patterns += 1;
    self.active_patterns += pattern.active as usize;
    self.positive += u64::from(pattern.positive);
    self.negative += u64::from(pattern.negative);
  }

  fn finish(&mut self) {
    let total = self.positive + self.negative;
    self.accuracy = (total > 0).then(|| self.positive as f64 / total as f64);
  }
}

/// Corrections against classifications within one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRate {
  pub from:            DateTime<Utc>,
  pub to:              DateTime<Utc>,
  pub corrections:     u64,
  pub classifications: u64,
  /// `corrections / classifications`; `None` without classifications.
  pub rate:            Option<f64>,
}

impl WindowRate {
  fn new(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    corrections: u64,
    classifications: u64,
  ) -> Self {
    let rate = (classifications > 0)
      .then(|| corrections as f64 / classifications as f64);
    Self { from, to, corrections, classifications, rate }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
  /// Fewer corrections per classification than in the prior window.
  Improving,
  Degrading,
  Stable,
  InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementTrend {
  pub window_days: u32,
  pub recent:      WindowRate,
  pub prior:       WindowRate,
  /// `prior.rate - recent.rate`; positive means improvement.
  pub change:      Option<f64>,
  pub direction:   TrendDirection,
}

impl ImprovementTrend {
  fn compare(window_days: u32, recent: WindowRate, prior: WindowRate) -> Self {
    let change = recent.rate.zip(prior.rate).map(|(r, p)| p - r);
    let direction = match change {
      None => TrendDirection::InsufficientData,
      Some(c) if c.abs() < TREND_STABLE_BAND => TrendDirection::Stable,
      Some(c) if c > 0.0 => TrendDirection::Improving,
      Some(_) => TrendDirection::Degrading,
    };
    Self { window_days, recent, prior, change, direction }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
  pub tenant_id:         Uuid,
  pub generated_at:      DateTime<Utc>,
  pub total_corrections: u64,
  pub patterns:          PatternCounts,
  pub by_field:          BTreeMap<CorrectedField, SliceStats>,
  pub by_entity_type:    BTreeMap<EntityType, SliceStats>,
  pub trend:             ImprovementTrend,
}

impl AccuracyReport {
  /// Aggregate one snapshot. Pure; the tracker does the reading.
  pub fn build(tenant_id: Uuid, window_days: u32, snapshot: &StatsSnapshot) -> Self {
    let patterns = &snapshot.patterns;
    let mut counts = PatternCounts { total: patterns.len(), ..Default::default() };
    let mut by_field: BTreeMap<CorrectedField, SliceStats> = CorrectedField::iter()
      .map(|f| (f, SliceStats::default()))
      .collect();
    let mut by_entity_type: BTreeMap<EntityType, SliceStats> = EntityType::iter()
      .map(|t| (t, SliceStats::default()))
      .collect();

    for pattern in patterns {
      match pattern.state() {
        PatternState::Active => counts.active += 1,
        PatternState::Candidate => counts.candidate += 1,
        PatternState::Deactivated => counts.deactivated += 1,
      }
      by_field.entry(pattern.adjustment.field).or_default().add_pattern(pattern);
      by_entity_type.entry(pattern.entity_type).or_default().add_pattern(pattern);
    }
    counts.inactive = counts.candidate + counts.deactivated;

    for tally in &snapshot.tallies {
      by_field.entry(tally.field).or_default().corrections += tally.count;
      by_entity_type.entry(tally.entity_type).or_default().corrections += tally.count;
    }

    by_field.values_mut().for_each(SliceStats::finish);
    by_entity_type.values_mut().for_each(SliceStats::finish);

    let TrendWindows { prior_from, recent_from, until } = snapshot.windows;
    let trend = ImprovementTrend::compare(
      window_days,
      WindowRate::new(
        recent_from,
        until,
        snapshot.corrections.recent,
        snapshot.classifications.recent,
      ),
      WindowRate::new(
        prior_from,
        recent_from,
        snapshot.corrections.prior,
        snapshot.classifications.prior,
      ),
    );

    Self {
      tenant_id,
      generated_at: until,
      total_corrections: snapshot.total_corrections(),
      patterns: counts,
      by_field,
      by_entity_type,
      trend,
    }
  }
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

pub struct AccuracyTracker<S> {
  store:  Arc<S>,
  config: LearningConfig,
}

impl<S: PatternStore> AccuracyTracker<S> {
  pub fn new(store: Arc<S>, config: LearningConfig) -> Self {
    Self { store, config }
  }

  /// One [`PatternStore::stats_snapshot`] read, aggregated.
  pub async fn get_accuracy_stats(&self, tenant_id: Uuid) -> Result<AccuracyReport> {
    let window_days = self.config.trend_window_days;
    let windows = TrendWindows::ending_at(Utc::now(), window_days).ok_or(
      ValidationError::OutOfRange {
        name:  "trend_window_days",
        value: f64::from(window_days),
        min:   1.0,
        max:   f64::from(MAX_TREND_WINDOW_DAYS),
      },
    )?;

    let snapshot = self
      .store
      .stats_snapshot(tenant_id, windows)
      .await
      .into_core()?;

    tracing::debug!(
      %tenant_id,
      patterns = snapshot.patterns.len(),
      corrections = snapshot.total_corrections(),
      "accuracy snapshot read"
    );
    Ok(AccuracyReport::build(tenant_id, window_days, &snapshot))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::{
    condition::{Condition, MerchantName},
    pattern::{Adjustment, PatternKey, PatternType},
    store::{CorrectionTally, WindowCounts},
  };

  fn snapshot(patterns: Vec<Pattern>) -> StatsSnapshot {
    StatsSnapshot {
      windows: TrendWindows::ending_at(Utc::now(), 30).unwrap(),
      tallies: Vec::new(),
      corrections: WindowCounts::default(),
      classifications: WindowCounts::default(),
      patterns,
    }
  }

  fn tally(field: CorrectedField, count: u64) -> CorrectionTally {
    CorrectionTally { entity_type: EntityType::Receipt, field, count }
  }

  fn pattern(tenant_id: Uuid, merchant: &str, pos: u32, neg: u32) -> Pattern {
    let cfg = LearningConfig::default();
    let key = PatternKey::new(
      EntityType::Receipt,
      PatternType::MerchantCategory,
      Condition::Merchant(MerchantName::new(merchant).unwrap()),
    )
    .unwrap();
    let mut p = Pattern::candidate(
      tenant_id,
      key,
      Adjustment::new(CorrectedField::Category, "Travel").unwrap(),
      &cfg,
      Utc::now(),
    );
    for _ in 1..pos {
      p.observe("Travel", &cfg, Utc::now());
    }
    for _ in 0..neg {
      p.observe("Other", &cfg, Utc::now());
    }
    p
  }

  #[test]
  fn windows_are_back_to_back() {
    let now = Utc::now();
    let w = TrendWindows::ending_at(now, 7).unwrap();
    assert_eq!(w.until, now);
    assert_eq!(w.recent_from, now - Duration::days(7));
    assert_eq!(w.prior_from, now - Duration::days(14));
  }

  #[test]
  fn windows_past_the_calendar_are_refused() {
    assert!(TrendWindows::ending_at(Utc::now(), u32::MAX).is_none());
  }

  #[test]
  fn empty_snapshot_reports_insufficient_data() {
    let report = AccuracyReport::build(Uuid::new_v4(), 30, &snapshot(Vec::new()));
    assert_eq!(report.total_corrections, 0);
    assert_eq!(report.patterns, PatternCounts::default());
    assert_eq!(report.trend.direction, TrendDirection::InsufficientData);
    assert_eq!(report.by_field[&CorrectedField::Category].accuracy, None);
  }

  #[test]
  fn pattern_counts_split_by_state() {
    let t = Uuid::new_v4();
    let active = pattern(t, "a", 3, 0);
    let candidate = pattern(t, "b", 1, 0);
    let mut pruned = pattern(t, "c", 3, 3);
    pruned.deactivate(Utc::now());

    let report = AccuracyReport::build(t, 30, &snapshot(vec![active, candidate, pruned]));
    assert_eq!(
      report.patterns,
      PatternCounts {
        total:       3,
        active:      1,
        inactive:    2,
        candidate:   1,
        deactivated: 1,
      }
    );
  }

  #[test]
  fn field_accuracy_is_pooled() {
    let t = Uuid::new_v4();
    let patterns = vec![pattern(t, "a", 3, 1), pattern(t, "b", 1, 3)];
    let report = AccuracyReport::build(t, 30, &snapshot(patterns));
    let category = &report.by_field[&CorrectedField::Category];
    assert_eq!(category.patterns, 2);
    assert_eq!((category.positive, category.negative), (4, 4));
    assert_eq!(category.accuracy, Some(0.5));
    assert_eq!(report.by_entity_type[&EntityType::Receipt].patterns, 2);
  }

  #[test]
  fn tallies_fill_field_and_entity_slices() {
    let mut snap = snapshot(Vec::new());
    snap.tallies = vec![tally(CorrectedField::Category, 2), tally(CorrectedField::Subcategory, 8)];

    let report = AccuracyReport::build(Uuid::new_v4(), 30, &snap);
    assert_eq!(report.total_corrections, 10);
    assert_eq!(report.by_field[&CorrectedField::Subcategory].corrections, 8);
    assert_eq!(report.by_field[&CorrectedField::Merchant].corrections, 0);
    assert_eq!(report.by_entity_type[&EntityType::Receipt].corrections, 10);
    assert_eq!(report.by_entity_type[&EntityType::Expense].corrections, 0);
  }

  #[test]
  fn fewer_recent_corrections_per_classification_is_improving() {
    let mut snap = snapshot(Vec::new());
    snap.corrections = WindowCounts { recent: 2, prior: 8 };
    snap.classifications = WindowCounts { recent: 20, prior: 20 };

    let report = AccuracyReport::build(Uuid::new_v4(), 30, &snap);
    assert_eq!(report.trend.recent.rate, Some(0.1));
    assert_eq!(report.trend.prior.rate, Some(0.4));
    assert_eq!(report.trend.direction, TrendDirection::Improving);
    assert_eq!(report.trend.recent.to, snap.windows.until);
    assert_eq!(report.trend.prior.to, snap.windows.recent_from);
    assert_eq!(report.generated_at, snap.windows.until);
  }

  #[test]
  fn corrections_outside_both_windows_only_count_toward_totals() {
    let mut snap = snapshot(Vec::new());
    snap.tallies = vec![tally(CorrectedField::Category, 1)];
    snap.classifications = WindowCounts { recent: 10, prior: 10 };

    let report = AccuracyReport::build(Uuid::new_v4(), 30, &snap);
    assert_eq!(report.total_corrections, 1);
    assert_eq!(report.trend.direction, TrendDirection::Stable);
  }

  #[test]
  fn rising_correction_rate_is_degrading() {
    let trend = ImprovementTrend::compare(
      7,
      WindowRate::new(Utc::now(), Utc::now(), 5, 10),
      WindowRate::new(Utc::now(), Utc::now(), 1, 10),
    );
    assert_eq!(trend.direction, TrendDirection::Degrading);
  }
}
