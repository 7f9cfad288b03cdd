//! [`SqliteStore`], the SQLite implementation of [`PatternStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use tracing::debug;
use uuid::Uuid;

use amend_core::{
  correction::{CorrectionEvent, EntityType, NewCorrection},
  pattern::{Pattern, PatternKey},
  store::{
    CorrectionQuery, PatternQuery, PatternStore, StatsSnapshot, TrendWindows, WindowCounts,
  },
};

use crate::{
  Error, Result,
  encode::{
    CORRECTION_COLUMNS, PATTERN_COLUMNS, RawCorrection, RawPattern, RawTally,
    decode_total, encode_condition, encode_context, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Amend pattern store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What a version-checked `UPDATE` found.
enum UpdateOutcome {
  Updated,
  Stale,
  Missing,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── PatternStore impl ───────────────────────────────────────────────────────

impl PatternStore for SqliteStore {
  type Error = Error;

  // ── Corrections, append-only ──────────────────────────────────────────────

  async fn append_correction(&self, input: NewCorrection) -> Result<CorrectionEvent> {
    let event = CorrectionEvent {
      event_id:        Uuid::new_v4(),
      tenant_id:       input.tenant_id,
      entity_type:     input.entity_type,
      entity_id:       input.entity_id,
      field:           input.field,
      original_value:  input.original_value,
      corrected_value: input.corrected_value,
      actor_id:        input.actor_id,
      context:         input.context,
      // Stored at microsecond precision.
      recorded_at:     Utc::now().trunc_subsecs(6),
    };

    let event_id_str    = encode_uuid(event.event_id);
    let tenant_id_str   = encode_uuid(event.tenant_id);
    let entity_type_str = event.entity_type.as_ref().to_owned();
    let entity_id       = event.entity_id.clone();
    let field_str       = event.field.as_ref().to_owned();
    let original        = event.original_value.clone();
    let corrected       = event.corrected_value.clone();
    let actor_id        = event.actor_id.clone();
    let context_json    = encode_context(&event.context)?;
    let recorded_at_str = encode_dt(event.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO corrections ({CORRECTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          rusqlite::params![
            event_id_str,
            tenant_id_str,
            entity_type_str,
            entity_id,
            field_str,
            original,
            corrected,
            actor_id,
            context_json,
            recorded_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn list_corrections<'a>(
    &'a self,
    query: &'a CorrectionQuery,
  ) -> Result<Vec<CorrectionEvent>> {
    let mut conds: Vec<&'static str> = vec!["tenant_id = ?"];
    let mut args: Vec<Value> = vec![Value::Text(encode_uuid(query.tenant_id))];

    if let Some(t) = query.entity_type {
      conds.push("entity_type = ?");
      args.push(Value::Text(t.as_ref().to_owned()));
    }
    if let Some(f) = query.field {
      conds.push("field = ?");
      args.push(Value::Text(f.as_ref().to_owned()));
    }
    if let Some(after) = query.recorded_after {
      conds.push("recorded_at >= ?");
      args.push(Value::Text(encode_dt(after)));
    }
    if let Some(before) = query.recorded_before {
      conds.push("recorded_at < ?");
      args.push(Value::Text(encode_dt(before)));
    }
    let limit_val = query.limit.map_or(-1, |l| l as i64);

    let sql = format!(
      "SELECT {CORRECTION_COLUMNS} FROM corrections
       WHERE {}
       ORDER BY recorded_at, rowid
       LIMIT {limit_val}",
      conds.join(" AND ")
    );

    let raws: Vec<RawCorrection> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawCorrection::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCorrection::into_event).collect()
  }

  // ── Classifications ───────────────────────────────────────────────────────

  async fn record_classifications(
    &self,
    tenant_id:   Uuid,
    entity_type: EntityType,
    count:       u32,
    at:          DateTime<Utc>,
  ) -> Result<()> {
    let tenant_id_str   = encode_uuid(tenant_id);
    let entity_type_str = entity_type.as_ref().to_owned();
    let at_str          = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO classifications (tenant_id, entity_type, count, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![tenant_id_str, entity_type_str, count, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn count_classifications(
    &self,
    tenant_id: Uuid,
    from:      DateTime<Utc>,
    to:        DateTime<Utc>,
  ) -> Result<u64> {
    let tenant_id_str = encode_uuid(tenant_id);
    let from_str      = encode_dt(from);
    let to_str        = encode_dt(to);

    let total: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(SUM(count), 0) FROM classifications
           WHERE tenant_id = ?1 AND recorded_at >= ?2 AND recorded_at < ?3",
          rusqlite::params![tenant_id_str, from_str, to_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    decode_total("classification total", total)
  }

  // ── Patterns ──────────────────────────────────────────────────────────────

  async fn get_pattern<'a>(
    &'a self,
    tenant_id: Uuid,
    key:       &'a PatternKey,
  ) -> Result<Option<Pattern>> {
    let tenant_id_str    = encode_uuid(tenant_id);
    let entity_type_str  = key.entity_type.as_ref().to_owned();
    let pattern_type_str = key.pattern_type.as_ref().to_owned();
    let condition_key    = key.condition.key();

    let raw: Option<RawPattern> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {PATTERN_COLUMNS} FROM patterns
               WHERE tenant_id = ?1 AND entity_type = ?2
                 AND pattern_type = ?3 AND condition_key = ?4"
            ),
            rusqlite::params![tenant_id_str, entity_type_str, pattern_type_str, condition_key],
            RawPattern::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPattern::into_pattern).transpose()
  }

  async fn get_pattern_by_id(
    &self,
    tenant_id:  Uuid,
    pattern_id: Uuid,
  ) -> Result<Option<Pattern>> {
    let tenant_id_str  = encode_uuid(tenant_id);
    let pattern_id_str = encode_uuid(pattern_id);

    let raw: Option<RawPattern> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {PATTERN_COLUMNS} FROM patterns
               WHERE pattern_id = ?1 AND tenant_id = ?2"
            ),
            rusqlite::params![pattern_id_str, tenant_id_str],
            RawPattern::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPattern::into_pattern).transpose()
  }

  async fn insert_pattern<'a>(&'a self, pattern: &'a Pattern) -> Result<()> {
    let key_str            = pattern.key().to_string();
    let pattern_id_str     = encode_uuid(pattern.pattern_id);
    let tenant_id_str      = encode_uuid(pattern.tenant_id);
    let entity_type_str    = pattern.entity_type.as_ref().to_owned();
    let pattern_type_str   = pattern.pattern_type.as_ref().to_owned();
    let condition_key      = pattern.condition.key();
    let condition_json     = encode_condition(&pattern.condition)?;
    let target_field_str   = pattern.adjustment.field.as_ref().to_owned();
    let target_value       = pattern.adjustment.value.clone();
    let occurrences        = pattern.occurrences;
    let positive           = pattern.positive;
    let negative           = pattern.negative;
    let accuracy           = pattern.accuracy;
    let active             = pattern.active;
    let deactivated_at_str = pattern.deactivated_at.map(encode_dt);
    let created_at_str     = encode_dt(pattern.created_at);
    let updated_at_str     = encode_dt(pattern.updated_at);
    let version            = pattern.version as i64;

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          &format!(
            "INSERT INTO patterns ({PATTERN_COLUMNS}, condition_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
          ),
          rusqlite::params![
            pattern_id_str,
            tenant_id_str,
            entity_type_str,
            pattern_type_str,
            condition_json,
            target_field_str,
            target_value,
            occurrences,
            positive,
            negative,
            accuracy,
            active,
            deactivated_at_str,
            created_at_str,
            updated_at_str,
            version,
            condition_key,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      debug!(key = %key_str, "pattern insert lost a race");
      return Err(Error::DuplicatePattern(key_str));
    }
    Ok(())
  }

  async fn update_pattern<'a>(&'a self, pattern: &'a Pattern) -> Result<Pattern> {
    let pattern_id_str     = encode_uuid(pattern.pattern_id);
    let tenant_id_str      = encode_uuid(pattern.tenant_id);
    let occurrences        = pattern.occurrences;
    let positive           = pattern.positive;
    let negative           = pattern.negative;
    let accuracy           = pattern.accuracy;
    let active             = pattern.active;
    let deactivated_at_str = pattern.deactivated_at.map(encode_dt);
    let updated_at_str     = encode_dt(pattern.updated_at);
    let expected           = pattern.version as i64;

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patterns
           SET occurrences = ?1, positive = ?2, negative = ?3, accuracy = ?4,
               active = ?5, deactivated_at = ?6, updated_at = ?7,
               version = version + 1
           WHERE pattern_id = ?8 AND tenant_id = ?9 AND version = ?10",
          rusqlite::params![
            occurrences,
            positive,
            negative,
            accuracy,
            active,
            deactivated_at_str,
            updated_at_str,
            pattern_id_str,
            tenant_id_str,
            expected,
          ],
        )?;
        if changed > 0 {
          return Ok(UpdateOutcome::Updated);
        }

        let exists = conn
          .query_row(
            "SELECT 1 FROM patterns WHERE pattern_id = ?1 AND tenant_id = ?2",
            rusqlite::params![pattern_id_str, tenant_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        Ok(if exists { UpdateOutcome::Stale } else { UpdateOutcome::Missing })
      })
      .await?;

    match outcome {
      UpdateOutcome::Updated => Ok(Pattern {
        version: pattern.version + 1,
        ..pattern.clone()
      }),
      UpdateOutcome::Stale => {
        debug!(pattern_id = %pattern.pattern_id, expected = pattern.version, "stale pattern write");
        Err(Error::VersionConflict {
          pattern_id: pattern.pattern_id,
          expected:   pattern.version,
        })
      }
      UpdateOutcome::Missing => Err(Error::PatternNotFound(pattern.pattern_id)),
    }
  }

  async fn query_patterns<'a>(&'a self, query: &'a PatternQuery) -> Result<Vec<Pattern>> {
    // Build WHERE clause dynamically.
    let mut conds: Vec<&'static str> = vec!["tenant_id = ?"];
    let mut args: Vec<Value> = vec![Value::Text(encode_uuid(query.tenant_id))];

    if let Some(t) = query.entity_type {
      conds.push("entity_type = ?");
      args.push(Value::Text(t.as_ref().to_owned()));
    }
    if let Some(t) = query.pattern_type {
      conds.push("pattern_type = ?");
      args.push(Value::Text(t.as_ref().to_owned()));
    }
    if let Some(a) = query.active {
      conds.push("active = ?");
      args.push(Value::Integer(i64::from(a)));
    }
    match query.deactivated {
      Some(true) => conds.push("deactivated_at IS NOT NULL"),
      Some(false) => conds.push("deactivated_at IS NULL"),
      None => {}
    }
    if let Some(m) = query.min_occurrences {
      conds.push("occurrences >= ?");
      args.push(Value::Integer(i64::from(m)));
    }
    if let Some(m) = query.min_accuracy {
      conds.push("accuracy >= ?");
      args.push(Value::Real(m));
    }
    if let Some(b) = query.below_accuracy {
      conds.push("accuracy < ?");
      args.push(Value::Real(b));
    }
    let limit_val = query.limit.map_or(-1, |l| l as i64);

    let sql = format!(
      "SELECT {PATTERN_COLUMNS} FROM patterns
       WHERE {}
       ORDER BY created_at, pattern_id
       LIMIT {limit_val}",
      conds.join(" AND ")
    );

    let raws: Vec<RawPattern> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawPattern::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPattern::into_pattern).collect()
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  async fn stats_snapshot(&self, tenant_id: Uuid, windows: TrendWindows) -> Result<StatsSnapshot> {
    let tenant_id_str = encode_uuid(tenant_id);
    let prior_from    = encode_dt(windows.prior_from);
    let recent_from   = encode_dt(windows.recent_from);
    let until         = encode_dt(windows.until);

    // Every read shares one transaction, so a correction and the pattern
    // update it caused are either both visible or neither is.
    let (tallies, corrections, classifications, patterns) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let tallies = {
          let mut stmt = tx.prepare(
            "SELECT entity_type, field, COUNT(*) FROM corrections
             WHERE tenant_id = ?1
             GROUP BY entity_type, field
             ORDER BY entity_type, field",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![tenant_id_str], RawTally::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows
        };

        // (recent, prior) sums of `amount` over `table`.
        let window_sums = |table: &str, amount: &str| -> rusqlite::Result<(i64, i64)> {
          tx.query_row(
            &format!(
              "SELECT
                 COALESCE(SUM(CASE WHEN recorded_at >= ?3 THEN {amount} ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN recorded_at <  ?3 THEN {amount} ELSE 0 END), 0)
               FROM {table}
               WHERE tenant_id = ?1 AND recorded_at >= ?2 AND recorded_at < ?4"
            ),
            rusqlite::params![tenant_id_str, prior_from, recent_from, until],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
        };
        let corrections = window_sums("corrections", "1")?;
        let classifications = window_sums("classifications", "count")?;

        let patterns = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns
             WHERE tenant_id = ?1
             ORDER BY created_at, pattern_id"
          ))?;
          let rows = stmt
            .query_map(rusqlite::params![tenant_id_str], RawPattern::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows
        };

        tx.commit()?;
        Ok((tallies, corrections, classifications, patterns))
      })
      .await?;

    let counts = |what: &str, (recent, prior): (i64, i64)| -> Result<WindowCounts> {
      Ok(WindowCounts {
        recent: decode_total(what, recent)?,
        prior:  decode_total(what, prior)?,
      })
    };

    let snapshot = StatsSnapshot {
      windows,
      tallies: tallies
        .into_iter()
        .map(RawTally::into_tally)
        .collect::<Result<_>>()?,
      corrections: counts("correction count", corrections)?,
      classifications: counts("classification total", classifications)?,
      patterns: patterns
        .into_iter()
        .map(RawPattern::into_pattern)
        .collect::<Result<_>>()?,
    };
    debug!(%tenant_id, patterns = snapshot.patterns.len(), "stats snapshot read");
    Ok(snapshot)
  }
}
