// src/memory/learn.rs

//! Learn: turn one human verdict into persisted confidence changes.
//!
//! Approval reinforces every memory that fired; rejection decays them at
//! twice the rate, so one wrong auto-correction costs more than one right
//! one earns. Every verdict also lands in the resolution ledger.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::EngineConfig;
use crate::memory::traits::MemoryRepository;
use crate::memory::types::{AuditEntry, AuditStep, MemoryType, MemoryValue};

#[derive(Debug)]
pub struct LearnInput<'a> {
    pub invoice_id: &'a str,
    pub vendor: &'a str,
    pub used_memory_ids: &'a [i64],
    pub approved: bool,
    pub is_duplicate: bool,
}

#[derive(Debug)]
pub struct LearnOutcome {
    pub memory_updates: Vec<String>,
    pub audit: Vec<AuditEntry>,
}

pub async fn learn(
    repo: &dyn MemoryRepository,
    input: LearnInput<'_>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<LearnOutcome> {
    // Duplicates must never move any rule's confidence.
    if input.is_duplicate {
        return Ok(LearnOutcome {
            memory_updates: vec![format!(
                "Skipped learning due to duplicate invoice ({})",
                input.invoice_id
            )],
            audit: vec![AuditEntry::now(
                AuditStep::Learn,
                format!(
                    "Learning skipped: invoice {} marked as duplicate",
                    input.invoice_id
                ),
            )],
        });
    }

    let mut memory_updates: Vec<String> = Vec::new();
    let mut audit: Vec<AuditEntry> = Vec::new();

    for &memory_id in input.used_memory_ids {
        let updated = if input.approved {
            repo.update_memory(memory_id, config.reinforcement_step, 1, 0, now)
                .await?
        } else {
            repo.update_memory(memory_id, -config.decay_step, 0, 1, now)
                .await?
        };

        // Row may have vanished between apply and feedback; not an error.
        let Some(new_confidence) = updated else {
            continue;
        };

        if input.approved {
            memory_updates.push(format!(
                "Reinforced memory {memory_id} (confidence → {new_confidence:.2})"
            ));
        } else {
            memory_updates.push(format!(
                "Weakened memory {memory_id} (confidence → {new_confidence:.2})"
            ));
        }
    }

    // Permanent outcome ledger, written whether or not any rule fired.
    // First writer wins, so re-judging an invoice is a no-op here.
    let decision = if input.approved { "approved" } else { "rejected" };
    repo.insert_memory_if_absent(
        input.vendor,
        MemoryType::Resolution,
        &format!("invoice_resolution_{}", input.invoice_id),
        &MemoryValue::Resolution {
            invoice_id: input.invoice_id.to_string(),
            decision: decision.to_string(),
        },
        config.resolution_confidence,
    )
    .await?;

    memory_updates.push(format!(
        "Recorded resolution memory for invoice {} ({decision})",
        input.invoice_id
    ));

    info!(
        invoice_id = input.invoice_id,
        vendor = input.vendor,
        approved = input.approved,
        updates = memory_updates.len(),
        "learning completed"
    );
    audit.push(AuditEntry::now(
        AuditStep::Learn,
        format!("Learning completed: {} update(s)", memory_updates.len()),
    ));

    Ok(LearnOutcome {
        memory_updates,
        audit,
    })
}
