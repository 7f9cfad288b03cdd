//! Error types for `amend-core`.

use thiserror::Error;
use uuid::Uuid;

/// Rejections raised at the boundary, before anything is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("unknown corrected field: {0:?}")]
  UnknownField(String),

  #[error("unknown pattern type: {0:?}")]
  UnknownPatternType(String),

  #[error("{0} must not be empty")]
  EmptyValue(&'static str),

  #[error("not a boolean value: {0:?}")]
  InvalidBoolean(String),

  #[error("malformed context: {0}")]
  MalformedContext(String),

  #[error("invalid condition: {0}")]
  InvalidCondition(String),

  #[error("{name} must be within {min}..={max}, got {value}")]
  OutOfRange {
    name:  &'static str,
    value: f64,
    min:   f64,
    max:   f64,
  },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  /// A single write lost a race against a concurrent writer. The engine
  /// retries these internally; callers only see [`Error::StorageConflict`].
  #[error("write conflict: {0}")]
  Conflict(String),

  #[error("pattern {key} still conflicting after {attempts} attempts")]
  StorageConflict { key: String, attempts: u32 },

  /// The correction event was persisted but deriving patterns from it failed.
  #[error("correction {event_id} recorded but mining failed: {source}")]
  MiningFailed {
    event_id: Uuid,
    #[source]
    source:   Box<Error>,
  },

  #[error("pattern not found: {0}")]
  PatternNotFound(Uuid),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether this error is, or wraps, an exhausted optimistic retry loop.
  pub fn is_storage_conflict(&self) -> bool {
    match self {
      Self::StorageConflict { .. } => true,
      Self::MiningFailed { source, .. } => source.is_storage_conflict(),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
