// src/invoice.rs

//! Extraction-stage output types. An `Invoice` is the immutable input to a
//! processing run; the pipeline only ever mutates a copy of its fields.
//! Wire names stay camelCase to match the upstream extractor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub qty: f64,
    pub unit_price: f64,
}

/// Normalized structured fields for one invoice.
/// The two critical identifiers are plain strings; the extractor emits an
/// empty string when it could not find them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFields {
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub invoice_date: String,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub net_total: Option<f64>,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub tax_total: Option<f64>,
    #[serde(default)]
    pub gross_total: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: String,
    pub vendor: String,
    pub fields: InvoiceFields,
    /// Extraction-stage confidence, 0–1.
    pub confidence: f64,
    /// Original unstructured text, used for regex recovery.
    pub raw_text: String,
}

/// One field-level correction made by a reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanCorrection {
    pub field: String,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
    pub reason: String,
}

/// Reviewer verdict on an invoice. Corrections are carried for the audit
/// trail; only `approved` drives reinforcement/decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanFeedback {
    pub approved: bool,
    #[serde(default)]
    pub corrections: Vec<HumanCorrection>,
}

impl From<bool> for HumanFeedback {
    fn from(approved: bool) -> Self {
        Self {
            approved,
            corrections: Vec::new(),
        }
    }
}
