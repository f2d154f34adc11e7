// src/memory/sqlite/store.rs

//! Implements MemoryRepository for SQLite.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::warn;

use crate::memory::traits::MemoryRepository;
use crate::memory::types::{
    InvoiceResolution, Memory, MemoryType, MemoryValue, CONFIDENCE_CEILING, CONFIDENCE_FLOOR,
};

pub struct SqliteMemoryRepository {
    pub pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        super::migration::run_migrations(&self.pool).await
    }

    /// Decode one memory row. Returns None (with a warning) for rows whose
    /// type or payload is malformed; a corrupt rule must not abort the
    /// invoice being processed.
    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Option<Memory> {
        let id: i64 = row.get("id");
        let vendor: String = row.get("vendor");
        let type_str: String = row.get("memory_type");
        let key: String = row.get("memory_key");
        let value_json: String = row.get("value");
        let confidence: f64 = row.get("confidence");
        let reinforcement_count: i64 = row.get("reinforcement_count");
        let decay_count: i64 = row.get("decay_count");
        let last_used_at: Option<NaiveDateTime> = row.get("last_used_at");
        let created_at: NaiveDateTime = row.get("created_at");

        let memory_type = match MemoryType::from_str(&type_str) {
            Ok(t) => t,
            Err(e) => {
                warn!(id, error = %e, "skipping memory with unknown type");
                return None;
            }
        };

        let value = match serde_json::from_str::<MemoryValue>(&value_json) {
            Ok(v) => v,
            Err(e) => {
                warn!(id, error = %e, "skipping memory with undecodable value");
                return None;
            }
        };

        Some(Memory {
            id,
            vendor,
            memory_type,
            key,
            value,
            confidence,
            reinforcement_count,
            decay_count,
            last_used_at: last_used_at.map(|t| Utc.from_utc_datetime(&t)),
            created_at: Utc.from_utc_datetime(&created_at),
        })
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn find_memories(&self, vendor: &str, min_confidence: f64) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor, memory_type, memory_key, value,
                   confidence, reinforcement_count, decay_count,
                   last_used_at, created_at
            FROM memories
            WHERE vendor = ? AND confidence >= ?
            ORDER BY confidence DESC
            "#,
        )
        .bind(vendor)
        .bind(min_confidence)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(Self::decode_row).collect())
    }

    async fn insert_memory_if_absent(
        &self,
        vendor: &str,
        memory_type: MemoryType,
        key: &str,
        value: &MemoryValue,
        initial_confidence: f64,
    ) -> Result<bool> {
        let value_json = serde_json::to_string(value)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO memories (
                vendor, memory_type, memory_key, value,
                confidence, reinforcement_count, decay_count, created_at
            ) VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(vendor)
        .bind(memory_type.as_str())
        .bind(key)
        .bind(value_json)
        .bind(initial_confidence)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_memory(
        &self,
        id: i64,
        confidence_delta: f64,
        reinforcement_delta: i64,
        decay_delta: i64,
        last_used_at: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        // Single statement: the clamped read-modify-write is atomic, so
        // two overlapping feedback calls can never write a stale value.
        let row = sqlx::query(
            r#"
            UPDATE memories
            SET
                confidence = MAX(?, MIN(?, confidence + ?)),
                reinforcement_count = reinforcement_count + ?,
                decay_count = decay_count + ?,
                last_used_at = ?
            WHERE id = ?
            RETURNING confidence
            "#,
        )
        .bind(CONFIDENCE_FLOOR)
        .bind(CONFIDENCE_CEILING)
        .bind(confidence_delta)
        .bind(reinforcement_delta)
        .bind(decay_delta)
        .bind(last_used_at.naive_utc())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<f64, _>("confidence")))
    }

    async fn find_duplicate(
        &self,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
        window_days: i64,
    ) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM invoice_history
                WHERE vendor = ?
                  AND invoice_number = ?
                  AND ABS(julianday(invoice_date) - julianday(?)) <= ?
            )
            "#,
        )
        .bind(vendor)
        .bind(invoice_number)
        .bind(invoice_date)
        .bind(window_days)
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }

    async fn upsert_invoice_history(
        &self,
        invoice_id: &str,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
        resolution: InvoiceResolution,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO invoice_history
                (invoice_id, vendor, invoice_number, invoice_date, processed_at, resolution)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invoice_id)
        .bind(vendor)
        .bind(invoice_number)
        .bind(invoice_date)
        .bind(Utc::now().naive_utc())
        .bind(resolution.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_duplicate(
        &self,
        invoice_id: &str,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
    ) -> Result<()> {
        // OR IGNORE: resubmitting an id that was already human-resolved
        // must not overwrite that resolution.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO invoice_history
                (invoice_id, vendor, invoice_number, invoice_date, processed_at, resolution)
            VALUES (?, ?, ?, ?, ?, 'duplicate')
            "#,
        )
        .bind(invoice_id)
        .bind(vendor)
        .bind(invoice_number)
        .bind(invoice_date)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_duplicate_resolution(&self, invoice_id: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM invoice_history
                WHERE invoice_id = ? AND resolution = 'duplicate'
            )
            "#,
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }
}
