// src/memory/bootstrap.rs

//! Bootstrap detectors: seed brand-new rules from patterns visible in a
//! human-approved invoice. Each insertion is first-writer-wins against the
//! (vendor, type, key) uniqueness constraint, so a vendor never learns the
//! same rule twice and an existing rule is never overwritten.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::config::EngineConfig;
use crate::invoice::Invoice;
use crate::memory::traits::MemoryRepository;
use crate::memory::types::{MemoryType, MemoryValue};

/// Service-date label followed by a date shape.
static SERVICE_DATE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)leistungsdatum[:\s]*?(\d{2}[.\-]\d{2}[.\-]\d{4}|\d{4}-\d{2}-\d{2})")
        .expect("static regex")
});

/// Shipping-related line item descriptions.
static FREIGHT_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(seefracht|shipping)").expect("static regex"));

/// Bare 3-letter currency code in raw text.
static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(EUR|USD|GBP)\b").expect("static regex"));

/// VAT-inclusive phrasing ("MwSt. inkl.", "prices incl. VAT").
static VAT_INCLUDED_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(mwst\.?\s*inkl|prices?\s+incl\.?\s+vat)").expect("static regex"));

/// Run all detectors over an approved invoice. Returns one message per
/// rule actually created.
pub async fn bootstrap_memories(
    repo: &dyn MemoryRepository,
    invoice: &Invoice,
    config: &EngineConfig,
) -> anyhow::Result<Vec<String>> {
    let mut memory_updates: Vec<String> = Vec::new();

    // Field label → field: the extractor missed the service date but the
    // raw text carries a labeled one.
    if invoice.fields.service_date.is_none() && SERVICE_DATE_LABEL.is_match(&invoice.raw_text) {
        let inserted = repo
            .insert_memory_if_absent(
                &invoice.vendor,
                MemoryType::Vendor,
                "field_mapping_leistungsdatum",
                &MemoryValue::FieldMapping {
                    target_field: "serviceDate".to_string(),
                    pattern: "Leistungsdatum".to_string(),
                },
                config.bootstrap_confidence,
            )
            .await?;
        if inserted {
            memory_updates
                .push("Learned field mapping: Leistungsdatum → serviceDate".to_string());
        }
    }

    // SKU from description: freight lines billed without a SKU.
    for item in &invoice.fields.line_items {
        let has_sku = item.sku.as_deref().is_some_and(|s| !s.is_empty());
        let Some(description) = item.description.as_deref() else {
            continue;
        };
        if !has_sku && FREIGHT_DESCRIPTION.is_match(description) {
            let inserted = repo
                .insert_memory_if_absent(
                    &invoice.vendor,
                    MemoryType::Vendor,
                    "sku_from_description",
                    &MemoryValue::SkuMapping {
                        patterns: vec!["seefracht".to_string(), "shipping".to_string()],
                        mapped_sku: "FREIGHT".to_string(),
                    },
                    config.bootstrap_confidence,
                )
                .await?;
            if inserted {
                memory_updates
                    .push("Learned SKU mapping: Seefracht/Shipping → FREIGHT".to_string());
            }
            break;
        }
    }

    // Currency: missing in fields but printed in the raw text.
    if invoice.fields.currency.is_none() {
        if let Some(captures) = CURRENCY_CODE.captures(&invoice.raw_text) {
            let currency = captures[1].to_uppercase();
            let inserted = repo
                .insert_memory_if_absent(
                    &invoice.vendor,
                    MemoryType::Vendor,
                    "currency_from_rawtext",
                    &MemoryValue::CurrencyRecovery {
                        currency: currency.clone(),
                    },
                    config.bootstrap_confidence,
                )
                .await?;
            if inserted {
                memory_updates.push(format!("Learned currency recovery → {currency}"));
            }
        }
    }

    // VAT-included convention.
    if VAT_INCLUDED_PHRASE.is_match(&invoice.raw_text) {
        let inserted = repo
            .insert_memory_if_absent(
                &invoice.vendor,
                MemoryType::Correction,
                "vat_included_rule",
                &MemoryValue::VatIncluded {
                    keywords: vec![
                        "mwst".to_string(),
                        "vat".to_string(),
                        "inkl".to_string(),
                        "incl".to_string(),
                    ],
                },
                config.bootstrap_confidence,
            )
            .await?;
        if inserted {
            memory_updates.push("Learned VAT-included correction rule".to_string());
        }
    }

    if !memory_updates.is_empty() {
        info!(
            vendor = %invoice.vendor,
            invoice_id = %invoice.invoice_id,
            rules = memory_updates.len(),
            "bootstrapped new memories"
        );
    }

    Ok(memory_updates)
}
