// src/memory/traits.rs

//! Repository trait for memory and history persistence.
//! All storage goes through this—no direct DB calls in pipeline stages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::memory::types::{InvoiceResolution, Memory, MemoryType, MemoryValue};

/// Abstract store of `Memory` rows and invoice history. Implementations
/// must be safe to share across concurrent pipeline runs.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Memories for a vendor at or above `min_confidence`, ordered by
    /// confidence descending. Rows whose payload cannot be decoded are
    /// skipped, never surfaced as errors.
    async fn find_memories(
        &self,
        vendor: &str,
        min_confidence: f64,
    ) -> anyhow::Result<Vec<Memory>>;

    /// Insert a rule unless one already exists for (vendor, type, key).
    /// Returns true if a row was actually inserted (first writer wins).
    async fn insert_memory_if_absent(
        &self,
        vendor: &str,
        memory_type: MemoryType,
        key: &str,
        value: &MemoryValue,
        initial_confidence: f64,
    ) -> anyhow::Result<bool>;

    /// Atomically shift a memory's confidence by `confidence_delta`
    /// (clamped to the data-model bounds), bump its counters, and stamp
    /// `last_used_at`. Returns the new confidence, or `None` if the row
    /// does not exist. Must be a single read-modify-write unit so
    /// concurrent feedback cannot apply stale deltas.
    async fn update_memory(
        &self,
        id: i64,
        confidence_delta: f64,
        reinforcement_delta: i64,
        decay_delta: i64,
        last_used_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>>;

    /// True if history holds a vendor-matching invoice with the same
    /// number and an invoice date within `window_days` calendar days.
    async fn find_duplicate(
        &self,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
        window_days: i64,
    ) -> anyhow::Result<bool>;

    /// Record the outcome of an invoice; last write wins per invoice id.
    async fn upsert_invoice_history(
        &self,
        invoice_id: &str,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
        resolution: InvoiceResolution,
    ) -> anyhow::Result<()>;

    /// Flag an invoice as a duplicate without disturbing an existing
    /// approved/rejected resolution for the same id.
    async fn mark_duplicate(
        &self,
        invoice_id: &str,
        vendor: &str,
        invoice_number: &str,
        invoice_date: &str,
    ) -> anyhow::Result<()>;

    /// True if the invoice was ever resolved as a duplicate.
    async fn has_duplicate_resolution(&self, invoice_id: &str) -> anyhow::Result<bool>;
}
