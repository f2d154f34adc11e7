// src/memory/sqlite/migration.rs
//! Handles migrations for SQLite: ensures memory and history tables match
//! the latest schema. Run this at startup (idempotent).

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

/// Learned rules, one row per (vendor, type, key). The uniqueness
/// constraint is what makes bootstrap first-writer-wins.
const CREATE_MEMORIES: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor TEXT NOT NULL,
    memory_type TEXT NOT NULL CHECK (memory_type IN ('VENDOR', 'CORRECTION', 'RESOLUTION')),

    memory_key TEXT NOT NULL,
    value TEXT NOT NULL,            -- JSON payload, tagged by "action"

    confidence REAL NOT NULL DEFAULT 0.5,
    reinforcement_count INTEGER NOT NULL DEFAULT 0,
    decay_count INTEGER NOT NULL DEFAULT 0,
    last_used_at DATETIME,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,

    UNIQUE(vendor, memory_type, memory_key)
);
"#;

/// Vendor lookups stay fast even with 100k+ rules.
const CREATE_MEMORY_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_vendor ON memories(vendor);
"#;

/// One row per invoice ever processed or judged; duplicate detection and
/// outcome audit only.
const CREATE_INVOICE_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS invoice_history (
    invoice_id TEXT PRIMARY KEY,
    vendor TEXT NOT NULL,
    invoice_number TEXT NOT NULL,
    invoice_date TEXT NOT NULL,
    processed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    resolution TEXT CHECK (resolution IN ('approved', 'rejected', 'duplicate'))
);
"#;

/// Runs all required migrations for the SQLite backend.
/// Safe to call at every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_MEMORIES).await?;
    pool.execute(CREATE_MEMORY_INDICES).await?;
    pool.execute(CREATE_INVOICE_HISTORY).await?;
    Ok(())
}
