//! Error type for `amend-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] amend_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value the domain types reject.
  #[error("corrupt row: {0}")]
  Decode(String),

  /// Another pattern already holds this `(tenant, entity type, pattern type,
  /// condition)` key.
  #[error("pattern key already exists: {0}")]
  DuplicatePattern(String),

  /// The stored version no longer matches the one the caller read.
  #[error("pattern {pattern_id} changed since version {expected}")]
  VersionConflict { pattern_id: Uuid, expected: u64 },

  #[error("pattern not found: {0}")]
  PatternNotFound(Uuid),
}

impl From<Error> for amend_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::DuplicatePattern(_) | Error::VersionConflict { .. } => {
        amend_core::Error::Conflict(e.to_string())
      }
      Error::PatternNotFound(id) => amend_core::Error::PatternNotFound(id),
      other => amend_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
