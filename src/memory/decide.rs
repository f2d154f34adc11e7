// src/memory/decide.rs

//! Decide: fold extraction confidence and used-memory confidence into a
//! single accept/review verdict. First matching rule wins.

use crate::config::EngineConfig;
use crate::invoice::InvoiceFields;
use crate::memory::types::{AuditEntry, AuditStep};

#[derive(Debug)]
pub struct Decision {
    pub requires_review: bool,
    pub reasoning: String,
    pub confidence_score: f64,
    pub audit: AuditEntry,
}

pub fn decide(
    normalized: &InvoiceFields,
    corrections: &[String],
    used_memory_confidences: &[f64],
    extraction_confidence: f64,
    config: &EngineConfig,
) -> Decision {
    let missing_critical =
        normalized.invoice_number.is_empty() || normalized.invoice_date.is_empty();

    let memory_confidence = if used_memory_confidences.is_empty() {
        0.0
    } else {
        used_memory_confidences.iter().sum::<f64>() / used_memory_confidences.len() as f64
    };

    // No memory involvement must not deflate the score.
    let confidence_score = if used_memory_confidences.is_empty() {
        extraction_confidence
    } else {
        extraction_confidence * memory_confidence
    };

    let (requires_review, reasoning) = if missing_critical {
        (
            true,
            "Critical invoice identifiers missing after memory application.".to_string(),
        )
    } else if memory_confidence >= config.auto_approve_confidence
        && extraction_confidence >= config.auto_approve_confidence
    {
        (
            false,
            "Auto-approved based on validated high-confidence memory.".to_string(),
        )
    } else if !corrections.is_empty() {
        (
            true,
            format!(
                "Corrections suggested but confidence insufficient \
                 (memory {memory_confidence:.2}, extraction {extraction_confidence:.2})."
            ),
        )
    } else {
        (
            true,
            "No applicable memory found; invoice requires human review.".to_string(),
        )
    };

    let audit = AuditEntry::now(
        AuditStep::Decide,
        format!(
            "Decision={}, confidenceScore={confidence_score:.2}",
            if requires_review { "REVIEW" } else { "APPROVE" }
        ),
    );

    Decision {
        requires_review,
        reasoning,
        confidence_score,
        audit,
    }
}
