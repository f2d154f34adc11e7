// src/memory/recall.rs

//! Recall: load trust-eligible memories for a vendor, highest confidence
//! first, and apply passive staleness decay to anything unused too long.
//! Read-only; the transient decay is never written back.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::memory::traits::MemoryRepository;
use crate::memory::types::{AuditEntry, AuditStep, Memory, CONFIDENCE_FLOOR};

#[derive(Debug)]
pub struct RecallOutcome {
    /// Confidence descending (persisted order; staleness decay does not
    /// re-rank, matching how downstream eligibility is checked).
    pub memories: Vec<Memory>,
    pub audit: AuditEntry,
}

pub async fn recall_memories(
    repo: &dyn MemoryRepository,
    vendor: &str,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<RecallOutcome> {
    let mut memories = repo
        .find_memories(vendor, config.min_recall_confidence)
        .await?;

    // Rules unused for a long time are trusted less even before an
    // outcome forces a permanent change. Transient only.
    for memory in &mut memories {
        if let Some(last_used) = memory.last_used_at {
            // Full-duration comparison: 20 days and an hour is already
            // over a 20-day limit, whole-day truncation would miss it.
            let idle = now.signed_duration_since(last_used);
            if idle > Duration::days(config.stale_after_days) {
                let decayed =
                    (memory.confidence * config.stale_decay_factor).max(CONFIDENCE_FLOOR);
                debug!(
                    id = memory.id,
                    idle_hours = idle.num_hours(),
                    from = memory.confidence,
                    to = decayed,
                    "staleness decay on recall"
                );
                memory.confidence = decayed;
            }
        }
    }

    let audit = AuditEntry::now(
        AuditStep::Recall,
        format!(
            "Recalled {} memories for vendor {}",
            memories.len(),
            vendor
        ),
    );

    Ok(RecallOutcome { memories, audit })
}
