// src/engine.rs

//! Orchestrator for the memory lifecycle.
//!
//! `process_invoice`: duplicate check → recall → apply → decide.
//! `learn_from_human`: duplicate re-check → bootstrap → learn → history.
//!
//! The repository is injected; the engine owns no storage of its own
//! beyond the per-invoice record of which memories fired, which feedback
//! later consumes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::invoice::{HumanFeedback, Invoice};
use crate::memory::apply::apply_memories;
use crate::memory::bootstrap::bootstrap_memories;
use crate::memory::decide::decide;
use crate::memory::learn::{learn, LearnInput};
use crate::memory::recall::recall_memories;
use crate::memory::traits::MemoryRepository;
use crate::memory::types::{AuditEntry, AuditStep, InvoiceResolution, ProcessOutcome};

pub struct MemoryEngine {
    repo: Arc<dyn MemoryRepository>,
    config: EngineConfig,
    /// Memory ids that fired per processed invoice, pending feedback.
    used_by_invoice: Mutex<HashMap<String, Vec<i64>>>,
    /// Feedback is serialized: overlapping learning calls on the same
    /// rules would race their reinforcement/decay deltas.
    learn_lock: tokio::sync::Mutex<()>,
}

impl MemoryEngine {
    pub fn new(repo: Arc<dyn MemoryRepository>, config: EngineConfig) -> Self {
        Self {
            repo,
            config,
            used_by_invoice: Mutex::new(HashMap::new()),
            learn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of processed invoices whose fired memories still await
    /// human feedback.
    pub fn pending_feedback(&self) -> usize {
        self.used_by_invoice
            .lock()
            .expect("used-memory map poisoned")
            .len()
    }

    /// Run one invoice through the pipeline and return the recommendation.
    /// The only `Err` here is repository unavailability; every expected
    /// condition is expressed in the outcome itself.
    pub async fn process_invoice(&self, invoice: &Invoice) -> anyhow::Result<ProcessOutcome> {
        let mut audit_trail = vec![AuditEntry::now(
            AuditStep::Recall,
            format!(
                "Processing invoice {} ({})",
                invoice.invoice_id, invoice.vendor
            ),
        )];

        // Duplicate gate. A duplicate is never auto-approved and never
        // feeds learning, so the rest of the pipeline is skipped outright.
        let is_duplicate = self
            .repo
            .find_duplicate(
                &invoice.vendor,
                &invoice.fields.invoice_number,
                &invoice.fields.invoice_date,
                self.config.duplicate_window_days,
            )
            .await?;

        if is_duplicate {
            info!(
                invoice_id = %invoice.invoice_id,
                vendor = %invoice.vendor,
                "duplicate invoice detected"
            );
            audit_trail.push(AuditEntry::now(
                AuditStep::Decide,
                "Duplicate invoice detected",
            ));

            self.repo
                .mark_duplicate(
                    &invoice.invoice_id,
                    &invoice.vendor,
                    &invoice.fields.invoice_number,
                    &invoice.fields.invoice_date,
                )
                .await?;

            self.remember_used(&invoice.invoice_id, Vec::new());

            return Ok(ProcessOutcome {
                normalized_fields: invoice.fields.clone(),
                proposed_corrections: Vec::new(),
                requires_human_review: true,
                reasoning: "Duplicate invoice detected (same vendor, number, close date)"
                    .to_string(),
                confidence_score: 0.0,
                memory_updates: vec!["Duplicate invoice — learning suppressed".to_string()],
                audit_trail,
            });
        }

        let recall = recall_memories(&*self.repo, &invoice.vendor, &self.config, Utc::now()).await?;
        audit_trail.push(recall.audit);

        let applied = apply_memories(invoice, &recall.memories, &self.config);
        audit_trail.extend(applied.audit);

        let used_confidences: Vec<f64> = recall
            .memories
            .iter()
            .filter(|m| applied.used_memory_ids.contains(&m.id))
            .map(|m| m.confidence)
            .collect();

        self.remember_used(&invoice.invoice_id, applied.used_memory_ids);

        let decision = decide(
            &applied.normalized,
            &applied.corrections,
            &used_confidences,
            invoice.confidence,
            &self.config,
        );
        audit_trail.push(decision.audit);

        Ok(ProcessOutcome {
            normalized_fields: applied.normalized,
            proposed_corrections: applied.corrections,
            requires_human_review: decision.requires_review,
            reasoning: decision.reasoning,
            confidence_score: decision.confidence_score,
            memory_updates: Vec::new(),
            audit_trail,
        })
    }

    /// Feed a human verdict back into the rule base. Accepts a bare bool
    /// or a full `HumanFeedback`; only `approved` drives learning, the
    /// structured corrections ride along for audit purposes.
    pub async fn learn_from_human(
        &self,
        invoice: &Invoice,
        feedback: impl Into<HumanFeedback>,
    ) -> anyhow::Result<Vec<String>> {
        let feedback = feedback.into();

        // Refuse to learn from anything ever resolved as a duplicate.
        if self
            .repo
            .has_duplicate_resolution(&invoice.invoice_id)
            .await?
        {
            debug!(invoice_id = %invoice.invoice_id, "learning refused for duplicate");
            return Ok(vec!["Duplicate invoice — learning skipped".to_string()]);
        }

        let _guard = self.learn_lock.lock().await;

        let mut audit_trail = vec![AuditEntry::now(
            AuditStep::Learn,
            format!("Learning from human decision on {}", invoice.invoice_id),
        )];
        let mut memory_updates: Vec<String> = Vec::new();

        // Approved corrections can seed rules the vendor doesn't have yet.
        if feedback.approved {
            memory_updates.extend(bootstrap_memories(&*self.repo, invoice, &self.config).await?);
        }

        let used_memory_ids = self.take_used(&invoice.invoice_id);

        let learned = learn(
            &*self.repo,
            LearnInput {
                invoice_id: &invoice.invoice_id,
                vendor: &invoice.vendor,
                used_memory_ids: &used_memory_ids,
                approved: feedback.approved,
                is_duplicate: false,
            },
            &self.config,
            Utc::now(),
        )
        .await?;
        memory_updates.extend(learned.memory_updates);
        audit_trail.extend(learned.audit);

        let resolution = if feedback.approved {
            InvoiceResolution::Approved
        } else {
            InvoiceResolution::Rejected
        };
        self.repo
            .upsert_invoice_history(
                &invoice.invoice_id,
                &invoice.vendor,
                &invoice.fields.invoice_number,
                &invoice.fields.invoice_date,
                resolution,
            )
            .await?;

        for entry in &audit_trail {
            debug!(step = ?entry.step, details = %entry.details, "feedback audit");
        }

        Ok(memory_updates)
    }

    /// Record which memories fired for an invoice. Nothing fired means
    /// nothing to learn about, so any stale record for the id is dropped
    /// instead — the map only ever holds invoices with pending,
    /// learnable feedback.
    fn remember_used(&self, invoice_id: &str, used: Vec<i64>) {
        let mut pending = self
            .used_by_invoice
            .lock()
            .expect("used-memory map poisoned");
        if used.is_empty() {
            pending.remove(invoice_id);
        } else {
            pending.insert(invoice_id.to_string(), used);
        }
    }

    fn take_used(&self, invoice_id: &str) -> Vec<i64> {
        self.used_by_invoice
            .lock()
            .expect("used-memory map poisoned")
            .remove(invoice_id)
            .unwrap_or_default()
    }
}
