// src/memory/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::invoice::InvoiceFields;

/// Confidence may never reach 0 (a rule would become unrecoverable) or 1
/// (a rule would bypass oversight forever). Data-model invariant, not a
/// tunable.
pub const CONFIDENCE_FLOOR: f64 = 0.1;
pub const CONFIDENCE_CEILING: f64 = 0.95;

/// Kind of a learned rule. Stored as its uppercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryType {
    /// Vendor-scoped field/SKU/currency recovery rule.
    Vendor,
    /// Vendor-specific numeric correction convention.
    Correction,
    /// Outcome ledger entry; never replayed.
    Resolution,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Vendor => "VENDOR",
            MemoryType::Correction => "CORRECTION",
            MemoryType::Resolution => "RESOLUTION",
        }
    }
}

/// A stored type tag that matches none of the known kinds.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown memory type: {0}")]
pub struct UnknownMemoryType(pub String);

// Parse MemoryType from strings defensively (DB/text interop)
impl FromStr for MemoryType {
    type Err = UnknownMemoryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VENDOR" => Ok(MemoryType::Vendor),
            "CORRECTION" => Ok(MemoryType::Correction),
            "RESOLUTION" => Ok(MemoryType::Resolution),
            _ => Err(UnknownMemoryType(s.to_string())),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule payload, discriminated by its `action` tag. Decoded once at the
/// repository boundary; apply dispatches by exhaustive match instead of
/// probing dynamic fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum MemoryValue {
    /// A label seen in raw text that maps to a structured field.
    #[serde(rename = "FIELD_MAPPING", rename_all = "camelCase")]
    FieldMapping {
        target_field: String,
        pattern: String,
    },
    /// Description substrings that imply a SKU.
    #[serde(rename = "SKU_MAPPING", rename_all = "camelCase")]
    SkuMapping {
        patterns: Vec<String>,
        mapped_sku: String,
    },
    /// A currency code recoverable from raw text.
    #[serde(rename = "CURRENCY_RECOVERY", rename_all = "camelCase")]
    CurrencyRecovery { currency: String },
    /// Vendor convention that quoted totals include VAT.
    #[serde(rename = "VAT_INCLUDED", rename_all = "camelCase")]
    VatIncluded { keywords: Vec<String> },
    /// Outcome log for one invoice; carried by RESOLUTION memories.
    #[serde(rename = "RESOLUTION", rename_all = "camelCase")]
    Resolution { invoice_id: String, decision: String },
}

/// A persisted, confidence-weighted correction rule scoped to one vendor.
/// Mutated only by learn (confidence/counters/last_used_at); never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub vendor: String,
    pub memory_type: MemoryType,
    /// Rule identity; unique together with vendor + type, so the same
    /// rule is never learned twice.
    pub key: String,
    pub value: MemoryValue,
    pub confidence: f64,
    pub reinforcement_count: i64,
    pub decay_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Terminal state of an invoice in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceResolution {
    Approved,
    Rejected,
    Duplicate,
}

impl InvoiceResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceResolution::Approved => "approved",
            InvoiceResolution::Rejected => "rejected",
            InvoiceResolution::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStep {
    Recall,
    Apply,
    Decide,
    Learn,
}

/// One line of the per-call audit trail. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub step: AuditStep,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl AuditEntry {
    pub fn now(step: AuditStep, details: impl Into<String>) -> Self {
        Self {
            step,
            timestamp: Utc::now(),
            details: details.into(),
        }
    }
}

/// Output of one `process_invoice` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub normalized_fields: InvoiceFields,
    pub proposed_corrections: Vec<String>,
    pub requires_human_review: bool,
    pub reasoning: String,
    pub confidence_score: f64,
    pub memory_updates: Vec<String>,
    pub audit_trail: Vec<AuditEntry>,
}
