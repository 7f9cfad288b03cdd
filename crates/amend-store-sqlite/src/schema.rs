//! SQL schema for the Amend SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Corrections are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS corrections (
    event_id        TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    entity_type     TEXT NOT NULL,   -- 'receipt' | 'expense' | 'invoice' | 'transaction'
    entity_id       TEXT NOT NULL,
    field           TEXT NOT NULL,   -- 'category' | 'subcategory' | 'tax_deductible' | 'merchant'
    original_value  TEXT,
    corrected_value TEXT NOT NULL,
    actor_id        TEXT NOT NULL,
    context_json    TEXT NOT NULL,   -- JSON-encoded EntityData
    recorded_at     TEXT NOT NULL    -- fixed-width RFC 3339 UTC; server-assigned
);

-- Initial classifications emitted upstream; denominator of the correction
-- rate. One row per report, summed on read.
CREATE TABLE IF NOT EXISTS classifications (
    tenant_id   TEXT    NOT NULL,
    entity_type TEXT    NOT NULL,
    count       INTEGER NOT NULL CHECK (count >= 0),
    recorded_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS patterns (
    pattern_id     TEXT    PRIMARY KEY,
    tenant_id      TEXT    NOT NULL,
    entity_type    TEXT    NOT NULL,
    pattern_type   TEXT    NOT NULL,
    condition_key  TEXT    NOT NULL,   -- canonical Condition::key()
    condition_json TEXT    NOT NULL,   -- JSON-encoded Condition
    target_field   TEXT    NOT NULL,
    target_value   TEXT    NOT NULL,
    occurrences    INTEGER NOT NULL,
    positive       INTEGER NOT NULL,
    negative       INTEGER NOT NULL,
    accuracy       REAL    NOT NULL CHECK (accuracy >= 0.0 AND accuracy <= 1.0),
    active         INTEGER NOT NULL,
    deactivated_at TEXT,
    created_at     TEXT    NOT NULL,
    updated_at     TEXT    NOT NULL,
    version        INTEGER NOT NULL,
    UNIQUE (tenant_id, entity_type, pattern_type, condition_key)
);

CREATE INDEX IF NOT EXISTS corrections_tenant_idx     ON corrections(tenant_id, recorded_at);
CREATE INDEX IF NOT EXISTS classifications_tenant_idx ON classifications(tenant_id, recorded_at);
CREATE INDEX IF NOT EXISTS patterns_lookup_idx        ON patterns(tenant_id, entity_type, active);

PRAGMA user_version = 1;
";
