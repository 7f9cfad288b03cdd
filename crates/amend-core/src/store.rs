//! The `PatternStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `amend-store-sqlite`).
//! The engine depends on this abstraction only; it never assumes a query
//! language.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
  correction::{CorrectedField, CorrectionEvent, EntityType, NewCorrection},
  pattern::{Pattern, PatternKey, PatternType},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`PatternStore::list_corrections`].
#[derive(Debug, Clone)]
pub struct CorrectionQuery {
  pub tenant_id:       Uuid,
  pub entity_type:     Option<EntityType>,
  pub field:           Option<CorrectedField>,
  /// Inclusive lower bound on `recorded_at`.
  pub recorded_after:  Option<DateTime<Utc>>,
  /// Exclusive upper bound on `recorded_at`.
  pub recorded_before: Option<DateTime<Utc>>,
  pub limit:           Option<usize>,
}

impl CorrectionQuery {
  pub fn for_tenant(tenant_id: Uuid) -> Self {
    Self {
      tenant_id,
      entity_type: None,
      field: None,
      recorded_after: None,
      recorded_before: None,
      limit: None,
    }
  }
}

/// Parameters for [`PatternStore::query_patterns`]. Unset filters match
/// everything.
#[derive(Debug, Clone)]
pub struct PatternQuery {
  pub tenant_id:       Uuid,
  pub entity_type:     Option<EntityType>,
  pub pattern_type:    Option<PatternType>,
  pub active:          Option<bool>,
  /// `Some(true)` for pruned patterns only, `Some(false)` to exclude them.
  pub deactivated:     Option<bool>,
  pub min_occurrences: Option<u32>,
  /// Inclusive.
  pub min_accuracy:    Option<f64>,
  /// Exclusive: only patterns with `accuracy < below_accuracy`.
  pub below_accuracy:  Option<f64>,
  pub limit:           Option<usize>,
}

impl PatternQuery {
  pub fn for_tenant(tenant_id: Uuid) -> Self {
    Self {
      tenant_id,
      entity_type: None,
      pattern_type: None,
      active: None,
      deactivated: None,
      min_occurrences: None,
      min_accuracy: None,
      below_accuracy: None,
      limit: None,
    }
  }

  /// Whether `pattern` passes every filter. Backends that cannot push a
  /// filter down may use this to post-filter.
  pub fn matches(&self, pattern: &Pattern) -> bool {
    pattern.tenant_id == self.tenant_id
      && self.entity_type.is_none_or(|t| pattern.entity_type == t)
      && self.pattern_type.is_none_or(|t| pattern.pattern_type == t)
      && self.active.is_none_or(|a| pattern.active == a)
      && self
        .deactivated
        .is_none_or(|d| pattern.deactivated_at.is_some() == d)
      && self.min_occurrences.is_none_or(|m| pattern.occurrences >= m)
      && self.min_accuracy.is_none_or(|m| pattern.accuracy >= m)
      && self.below_accuracy.is_none_or(|b| pattern.accuracy < b)
  }
}

// ─── Statistics snapshot ─────────────────────────────────────────────────────

/// Two back-to-back half-open windows, `[prior_from, recent_from)` and
/// `[recent_from, until)`, compared by the improvement trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindows {
  pub prior_from:  DateTime<Utc>,
  pub recent_from: DateTime<Utc>,
  pub until:       DateTime<Utc>,
}

impl TrendWindows {
  /// Windows of `days` each, the recent one ending at `until`. `None` when
  /// the prior window would start before the representable range.
  pub fn ending_at(until: DateTime<Utc>, days: u32) -> Option<Self> {
    let window = Duration::try_days(i64::from(days))?;
    let recent_from = until.checked_sub_signed(window)?;
    let prior_from = recent_from.checked_sub_signed(window)?;
    Some(Self { prior_from, recent_from, until })
  }
}

/// A count split across the two [`TrendWindows`]. Anything outside both
/// windows is not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
  pub recent: u64,
  pub prior:  u64,
}

/// Number of corrections recorded against one field of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionTally {
  pub entity_type: EntityType,
  pub field:       CorrectedField,
  pub count:       u64,
}

/// Everything the accuracy report reads, taken from a single consistent view
/// of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
  pub windows:         TrendWindows,
  /// All-time correction counts; pairs without corrections are omitted.
  pub tallies:         Vec<CorrectionTally>,
  pub corrections:     WindowCounts,
  pub classifications: WindowCounts,
  /// Every pattern of the tenant, pruned ones included.
  pub patterns:        Vec<Pattern>,
}

impl StatsSnapshot {
  pub fn total_corrections(&self) -> u64 {
    self.tallies.iter().map(|t| t.count).sum()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a pattern store backend.
///
/// Correction events are append-only. Patterns are written with optimistic
/// concurrency: [`insert_pattern`](Self::insert_pattern) fails when the key
/// is taken and [`update_pattern`](Self::update_pattern) fails when the
/// stored version moved on. Both failures must convert into
/// [`crate::Error::Conflict`] so the engine can retry.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait PatternStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Corrections ───────────────────────────────────────────────────────

  /// Persist a correction. `event_id` and `recorded_at` are set by the store.
  fn append_correction(
    &self,
    input: NewCorrection,
  ) -> impl Future<Output = Result<CorrectionEvent, Self::Error>> + Send + '_;

  /// Corrections matching `query`, oldest first.
  fn list_corrections<'a>(
    &'a self,
    query: &'a CorrectionQuery,
  ) -> impl Future<Output = Result<Vec<CorrectionEvent>, Self::Error>> + Send + 'a;

  // ── Classifications ───────────────────────────────────────────────────

  /// Record that `count` initial classifications were emitted at `at`.
  fn record_classifications(
    &self,
    tenant_id: Uuid,
    entity_type: EntityType,
    count: u32,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Classifications recorded in `[from, to)`.
  fn count_classifications(
    &self,
    tenant_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Patterns ──────────────────────────────────────────────────────────

  fn get_pattern<'a>(
    &'a self,
    tenant_id: Uuid,
    key: &'a PatternKey,
  ) -> impl Future<Output = Result<Option<Pattern>, Self::Error>> + Send + 'a;

  fn get_pattern_by_id(
    &self,
    tenant_id: Uuid,
    pattern_id: Uuid,
  ) -> impl Future<Output = Result<Option<Pattern>, Self::Error>> + Send + '_;

  /// Insert a brand-new pattern. Fails with a conflict if another pattern
  /// already holds the same key.
  fn insert_pattern<'a>(
    &'a self,
    pattern: &'a Pattern,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Overwrite the mutable state of `pattern` if the stored version still
  /// equals `pattern.version`. Returns the pattern with its new version.
  ///
  /// The key, adjustment and creation time are never changed.
  fn update_pattern<'a>(
    &'a self,
    pattern: &'a Pattern,
  ) -> impl Future<Output = Result<Pattern, Self::Error>> + Send + 'a;

  fn query_patterns<'a>(
    &'a self,
    query: &'a PatternQuery,
  ) -> impl Future<Output = Result<Vec<Pattern>, Self::Error>> + Send + 'a;

  // ── Statistics ────────────────────────────────────────────────────────

  /// Correction tallies, window counts and patterns for one tenant, read
  /// atomically: no write committed during the call is partially visible.
  fn stats_snapshot(
    &self,
    tenant_id: Uuid,
    windows: TrendWindows,
  ) -> impl Future<Output = Result<StatsSnapshot, Self::Error>> + Send + '_;
}

/// Lifts a backend result into the core error type.
pub(crate) trait StoreResultExt<T> {
  fn into_core(self) -> crate::Result<T>;
}

impl<T, E: Into<crate::Error>> StoreResultExt<T> for Result<T, E> {
  fn into_core(self) -> crate::Result<T> { self.map_err(Into::into) }
}
