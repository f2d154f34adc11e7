// src/config/mod.rs

//! All tunable thresholds for the memory pipeline in one injected struct.
//! Defaults are the values the system shipped with; none of them is
//! load-bearing beyond "this is what worked", so treat them as knobs.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    // ── Recall
    /// Minimum persisted confidence for a memory to be recalled at all.
    pub min_recall_confidence: f64,
    /// Days since `last_used_at` after which a recalled memory is
    /// considered stale.
    pub stale_after_days: i64,
    /// Multiplier applied to a stale memory's confidence during recall
    /// (transient, never persisted).
    pub stale_decay_factor: f64,

    // ── Apply
    /// Minimum (possibly decayed) confidence for a recalled memory to
    /// actually fire against an invoice.
    pub min_apply_confidence: f64,
    /// Absolute tolerance when checking net + tax against gross.
    pub totals_epsilon: f64,

    // ── Decide
    /// Both memory and extraction confidence must reach this for
    /// auto-approval.
    pub auto_approve_confidence: f64,

    // ── Learn
    /// Confidence gained when a human approves a memory's contribution.
    pub reinforcement_step: f64,
    /// Confidence lost when a human rejects it. Deliberately twice the
    /// reinforcement step: one wrong auto-correction costs more than one
    /// right one earns.
    pub decay_step: f64,
    /// Initial confidence of a bootstrapped rule.
    pub bootstrap_confidence: f64,
    /// Initial confidence of a RESOLUTION memory. Below the recall floor,
    /// so the outcome ledger is never replayed.
    pub resolution_confidence: f64,

    // ── Duplicate detection
    /// Same vendor + invoice number within this many calendar days of a
    /// recorded invoice date counts as a duplicate.
    pub duplicate_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_recall_confidence: 0.6,
            stale_after_days: 20,
            stale_decay_factor: 0.9,
            min_apply_confidence: 0.7,
            totals_epsilon: 0.02,
            auto_approve_confidence: 0.8,
            reinforcement_step: 0.1,
            decay_step: 0.2,
            bootstrap_confidence: 0.7,
            resolution_confidence: 0.5,
            duplicate_window_days: 5,
        }
    }
}
