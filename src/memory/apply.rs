// src/memory/apply.rs

//! Apply: replay recalled memories against one invoice's fields.
//!
//! Pure over its inputs — works on a copy of the extracted fields and
//! reports which memories actually fired. Rules only ever fill gaps or
//! reconcile totals; a field that already has a value is left alone.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::invoice::{Invoice, InvoiceFields};
use crate::memory::types::{AuditEntry, AuditStep, Memory, MemoryType, MemoryValue};

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(EUR|USD|GBP)\b").expect("static regex"));

#[derive(Debug)]
pub struct ApplyOutcome {
    pub normalized: InvoiceFields,
    pub corrections: Vec<String>,
    /// Ids of memories that fired, deduplicated, in firing order.
    pub used_memory_ids: Vec<i64>,
    pub audit: Vec<AuditEntry>,
}

pub fn apply_memories(
    invoice: &Invoice,
    memories: &[Memory],
    config: &EngineConfig,
) -> ApplyOutcome {
    let mut normalized = invoice.fields.clone();
    let mut corrections: Vec<String> = Vec::new();
    let mut used_memory_ids: Vec<i64> = Vec::new();
    let mut audit: Vec<AuditEntry> = Vec::new();

    fn mark_used(ids: &mut Vec<i64>, id: i64) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    for memory in memories {
        // Recall's floor is "worth considering"; this is "worth acting on".
        if memory.confidence < config.min_apply_confidence {
            continue;
        }

        match (memory.memory_type, &memory.value) {
            (
                MemoryType::Vendor,
                MemoryValue::FieldMapping {
                    target_field,
                    pattern,
                },
            ) => {
                let unset = match field_is_unset(&normalized, target_field) {
                    Some(unset) => unset,
                    None => {
                        warn!(
                            id = memory.id,
                            %target_field,
                            "field mapping targets unknown field; rule does not fire"
                        );
                        continue;
                    }
                };
                if !unset {
                    continue;
                }

                let regex = match build_label_date_regex(pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        warn!(id = memory.id, error = %e, "unusable field-mapping pattern");
                        continue;
                    }
                };

                if let Some(captures) = regex.captures(&invoice.raw_text) {
                    let date = captures[1].to_string();
                    set_field(&mut normalized, target_field, date);
                    corrections.push(format!("Mapped '{pattern}' → '{target_field}'"));
                    mark_used(&mut used_memory_ids, memory.id);
                    audit.push(AuditEntry::now(
                        AuditStep::Apply,
                        format!("Vendor memory applied ({pattern} → {target_field})"),
                    ));
                }
            }

            (
                MemoryType::Vendor,
                MemoryValue::SkuMapping {
                    patterns,
                    mapped_sku,
                },
            ) => {
                // One memory may fill several line items.
                for item in &mut normalized.line_items {
                    if item.sku.as_deref().is_some_and(|s| !s.is_empty()) {
                        continue;
                    }
                    let Some(description) = item.description.as_deref() else {
                        continue;
                    };
                    let description_lower = description.to_lowercase();
                    if patterns
                        .iter()
                        .any(|p| description_lower.contains(&p.to_lowercase()))
                    {
                        item.sku = Some(mapped_sku.clone());
                        corrections.push(format!(
                            "Mapped description '{description}' → SKU {mapped_sku}"
                        ));
                        mark_used(&mut used_memory_ids, memory.id);
                        audit.push(AuditEntry::now(
                            AuditStep::Apply,
                            format!("Vendor memory applied (description → SKU {mapped_sku})"),
                        ));
                    }
                }
            }

            (MemoryType::Vendor, MemoryValue::CurrencyRecovery { .. }) => {
                if normalized.currency.as_deref().is_some_and(|c| !c.is_empty()) {
                    continue;
                }
                if let Some(captures) = CURRENCY_CODE.captures(&invoice.raw_text) {
                    let currency = captures[1].to_uppercase();
                    corrections.push(format!("Recovered currency {currency} from raw text"));
                    audit.push(AuditEntry::now(
                        AuditStep::Apply,
                        format!("Vendor memory applied (currency → {currency})"),
                    ));
                    normalized.currency = Some(currency);
                    mark_used(&mut used_memory_ids, memory.id);
                }
            }

            (MemoryType::Correction, MemoryValue::VatIncluded { .. }) => {
                // Gate: without gross and rate there is no opportunity, and
                // absence of opportunity is not evidence against the rule.
                let (Some(gross), Some(tax_rate)) = (normalized.gross_total, normalized.tax_rate)
                else {
                    continue;
                };

                match (normalized.net_total, normalized.tax_total) {
                    // Validation mode: totals already consistent. The rule
                    // is confirmed (and eligible for reinforcement) without
                    // touching anything.
                    (Some(net), Some(tax))
                        if (net + tax - gross).abs() < config.totals_epsilon =>
                    {
                        mark_used(&mut used_memory_ids, memory.id);
                        audit.push(AuditEntry::now(
                            AuditStep::Apply,
                            "VAT-included rule validated (numeric consistency)",
                        ));
                    }

                    // Correction mode: back out the net from a VAT-inclusive
                    // gross.
                    (None, _) => {
                        let inferred_net = gross / (1.0 + tax_rate);
                        let inferred_tax = gross - inferred_net;
                        normalized.net_total = Some(round2(inferred_net));
                        normalized.tax_total = Some(round2(inferred_tax));
                        corrections
                            .push("Recalculated net/tax using VAT-included rule".to_string());
                        mark_used(&mut used_memory_ids, memory.id);
                        audit.push(AuditEntry::now(
                            AuditStep::Apply,
                            "VAT-included rule applied (correction)",
                        ));
                    }

                    // Net present but inconsistent: not this rule's call.
                    _ => {}
                }
            }

            // Resolution ledger entries and type/payload mismatches never
            // fire.
            _ => {
                debug!(
                    id = memory.id,
                    memory_type = %memory.memory_type,
                    "memory not applicable to this stage"
                );
            }
        }
    }

    ApplyOutcome {
        normalized,
        corrections,
        used_memory_ids,
        audit,
    }
}

/// Matcher for "<label> <date>" in raw text: the stored label (escaped, so
/// rule text cannot inject pattern syntax), optional separator, then a
/// DD.MM.YYYY / DD-MM-YYYY / YYYY-MM-DD shaped capture.
fn build_label_date_regex(label: &str) -> Result<Regex, regex::Error> {
    let pattern = format!(
        r"{}[:\s]*?(\d{{2}}[.\-]\d{{2}}[.\-]\d{{4}}|\d{{4}}-\d{{2}}-\d{{2}})",
        regex::escape(label)
    );
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

/// Whether a mapping target is currently empty. `None` means the rule
/// names a field this stage does not know how to set.
fn field_is_unset(fields: &InvoiceFields, name: &str) -> Option<bool> {
    match name {
        "invoiceNumber" => Some(fields.invoice_number.is_empty()),
        "invoiceDate" => Some(fields.invoice_date.is_empty()),
        "serviceDate" => Some(opt_is_unset(&fields.service_date)),
        "currency" => Some(opt_is_unset(&fields.currency)),
        "poNumber" => Some(opt_is_unset(&fields.po_number)),
        _ => None,
    }
}

fn set_field(fields: &mut InvoiceFields, name: &str, value: String) {
    match name {
        "invoiceNumber" => fields.invoice_number = value,
        "invoiceDate" => fields.invoice_date = value,
        "serviceDate" => fields.service_date = Some(value),
        "currency" => fields.currency = Some(value),
        "poNumber" => fields.po_number = Some(value),
        // Unknown targets are rejected by field_is_unset before this point.
        _ => {}
    }
}

fn opt_is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
