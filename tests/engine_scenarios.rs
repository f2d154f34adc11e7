// tests/engine_scenarios.rs
// End-to-end pipeline runs against an in-memory store.


use apmem::memory::types::{MemoryType, MemoryValue};
use apmem::LineItem;
use test_helpers::{basic_fields, create_test_engine, invoice};

#[tokio::test]
async fn unknown_vendor_goes_to_review_with_undeflated_score() {
    let (engine, _repo) = create_test_engine().await;

    let inv = invoice(
        "INV-1",
        "Supplier GmbH",
        basic_fields("R-1001", "2024-01-05"),
        "Rechnung R-1001",
    );

    let outcome = engine.process_invoice(&inv).await.unwrap();

    assert!(outcome.requires_human_review);
    assert!(outcome.reasoning.contains("No applicable memory"));
    assert!(outcome.proposed_corrections.is_empty());
    // No memory involvement: score is extraction confidence alone.
    assert!((outcome.confidence_score - 0.9).abs() < 1e-9);
    assert!(!outcome.audit_trail.is_empty());
}

#[tokio::test]
async fn missing_identifiers_force_review() {
    let (engine, _repo) = create_test_engine().await;

    let inv = invoice(
        "INV-1",
        "Supplier GmbH",
        basic_fields("", "2024-01-05"),
        "no number anywhere",
    );

    let outcome = engine.process_invoice(&inv).await.unwrap();

    assert!(outcome.requires_human_review);
    assert!(outcome.reasoning.contains("Critical"));
}

/// Scenario A: the vendor's first invoice teaches a field mapping, the
/// second invoice benefits from it.
#[tokio::test]
async fn field_mapping_is_learned_and_replayed() {
    let (engine, repo) = create_test_engine().await;

    let mut fields = basic_fields("R-1001", "2024-01-05");
    fields.service_date = None;
    let first = invoice(
        "INV-1",
        "Supplier GmbH",
        fields,
        "Rechnung R-1001\nLeistungsdatum: 01.01.2024",
    );

    let outcome = engine.process_invoice(&first).await.unwrap();
    assert!(outcome.requires_human_review);
    assert!(outcome.proposed_corrections.is_empty());

    // Human fixes the service date and approves; a rule is bootstrapped.
    let updates = engine.learn_from_human(&first, true).await.unwrap();
    assert!(updates
        .iter()
        .any(|u| u.contains("Learned field mapping: Leistungsdatum → serviceDate")));

    use apmem::MemoryRepository;
    let memories = repo.find_memories("Supplier GmbH", 0.0).await.unwrap();
    let rule = memories
        .iter()
        .find(|m| m.key == "field_mapping_leistungsdatum")
        .expect("bootstrapped field mapping");
    assert_eq!(rule.memory_type, MemoryType::Vendor);
    assert!((rule.confidence - 0.7).abs() < 1e-9);

    // Second invoice from the same vendor now gets the date filled in.
    let mut fields = basic_fields("R-1002", "2024-02-05");
    fields.service_date = None;
    let second = invoice(
        "INV-2",
        "Supplier GmbH",
        fields,
        "Rechnung R-1002\nLeistungsdatum: 15.01.2024",
    );

    let outcome = engine.process_invoice(&second).await.unwrap();
    assert_eq!(
        outcome.normalized_fields.service_date.as_deref(),
        Some("15.01.2024")
    );
    assert_eq!(outcome.proposed_corrections.len(), 1);
    // Rule confidence 0.7 is below the auto-approve bar.
    assert!(outcome.requires_human_review);
}

/// Scenario B: duplicate resubmissions are flagged every time, never
/// auto-approved, and never feed learning.
#[tokio::test]
async fn duplicates_are_flagged_and_never_learned_from() {
    let (engine, repo) = create_test_engine().await;

    let original = invoice(
        "INV-1",
        "Supplier GmbH",
        basic_fields("R-1001", "2024-01-05"),
        "Rechnung R-1001",
    );
    engine.process_invoice(&original).await.unwrap();
    engine.learn_from_human(&original, true).await.unwrap();

    use apmem::MemoryRepository;
    let memories_before = repo.find_memories("Supplier GmbH", 0.0).await.unwrap();

    // Same vendor and number, two days later: inside the window.
    let resubmission = invoice(
        "INV-1-RESUB",
        "Supplier GmbH",
        basic_fields("R-1001", "2024-01-07"),
        "Rechnung R-1001 (again)",
    );

    for _ in 0..2 {
        let outcome = engine.process_invoice(&resubmission).await.unwrap();
        assert!(outcome.requires_human_review);
        assert_eq!(outcome.confidence_score, 0.0);
        assert!(outcome.reasoning.contains("Duplicate"));
        assert_eq!(
            outcome.memory_updates,
            vec!["Duplicate invoice — learning suppressed".to_string()]
        );
    }

    let updates = engine.learn_from_human(&resubmission, true).await.unwrap();
    assert_eq!(
        updates,
        vec!["Duplicate invoice — learning skipped".to_string()]
    );

    // No rule was touched or created by the duplicate.
    let memories_after = repo.find_memories("Supplier GmbH", 0.0).await.unwrap();
    assert_eq!(memories_before.len(), memories_after.len());
    for (before, after) in memories_before.iter().zip(&memories_after) {
        assert_eq!(before.confidence, after.confidence);
        assert_eq!(before.reinforcement_count, after.reinforcement_count);
    }
}

#[tokio::test]
async fn processing_alone_does_not_create_history() {
    let (engine, _repo) = create_test_engine().await;

    let inv = invoice(
        "INV-1",
        "Supplier GmbH",
        basic_fields("R-1001", "2024-01-05"),
        "Rechnung R-1001",
    );

    // Only human feedback (or a duplicate verdict) writes history, so
    // re-processing the same unjudged invoice is not a duplicate.
    engine.process_invoice(&inv).await.unwrap();
    let outcome = engine.process_invoice(&inv).await.unwrap();
    assert!(!outcome.reasoning.contains("Duplicate"));
}

#[tokio::test]
async fn pending_feedback_tracks_only_invoices_with_fired_memories() {
    let (engine, repo) = create_test_engine().await;

    // Nothing fired: nothing left pending.
    let inert = invoice(
        "INV-A",
        "Acme AG",
        basic_fields("R-1", "2024-01-05"),
        "plain invoice",
    );
    engine.process_invoice(&inert).await.unwrap();
    assert_eq!(engine.pending_feedback(), 0);

    use apmem::MemoryRepository;
    repo.insert_memory_if_absent(
        "Supplier GmbH",
        MemoryType::Vendor,
        "currency_from_rawtext",
        &MemoryValue::CurrencyRecovery {
            currency: "EUR".to_string(),
        },
        0.8,
    )
    .await
    .unwrap();

    let mut fields = basic_fields("R-2", "2024-01-05");
    fields.currency = None;
    let inv = invoice("INV-B", "Supplier GmbH", fields, "Betrag in EUR");

    engine.process_invoice(&inv).await.unwrap();
    assert_eq!(engine.pending_feedback(), 1);

    // Re-extraction with the currency already present: the rule has
    // nothing to do, and the earlier pending record is dropped rather
    // than left behind.
    let mut fields = basic_fields("R-2", "2024-01-05");
    fields.currency = Some("EUR".to_string());
    let refreshed = invoice("INV-B", "Supplier GmbH", fields, "Betrag in EUR");
    engine.process_invoice(&refreshed).await.unwrap();
    assert_eq!(engine.pending_feedback(), 0);

    // Fire again; feedback consumes the record.
    engine.process_invoice(&inv).await.unwrap();
    assert_eq!(engine.pending_feedback(), 1);
    engine.learn_from_human(&inv, true).await.unwrap();
    assert_eq!(engine.pending_feedback(), 0);
}

#[tokio::test]
async fn vat_rule_corrects_totals_and_auto_approves() {
    let (engine, repo) = create_test_engine().await;

    use apmem::MemoryRepository;
    repo.insert_memory_if_absent(
        "Supplier GmbH",
        MemoryType::Correction,
        "vat_included_rule",
        &MemoryValue::VatIncluded {
            keywords: vec!["mwst".to_string(), "inkl".to_string()],
        },
        0.85,
    )
    .await
    .unwrap();

    let mut fields = basic_fields("R-2001", "2024-03-01");
    fields.gross_total = Some(1190.0);
    fields.tax_rate = Some(0.19);
    fields.line_items = vec![LineItem {
        sku: Some("SVC-1".to_string()),
        description: Some("Wartung".to_string()),
        qty: 1.0,
        unit_price: 1000.0,
    }];
    let inv = invoice(
        "INV-3",
        "Supplier GmbH",
        fields,
        "Alle Preise MwSt. inkl.",
    );

    let outcome = engine.process_invoice(&inv).await.unwrap();

    assert_eq!(outcome.normalized_fields.net_total, Some(1000.0));
    assert_eq!(outcome.normalized_fields.tax_total, Some(190.0));
    assert_eq!(outcome.proposed_corrections.len(), 1);
    // Memory 0.85 and extraction 0.9 both clear the 0.8 bar.
    assert!(!outcome.requires_human_review);
    assert!((outcome.confidence_score - 0.9 * 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn outcome_fields_survive_a_pipeline_with_no_memories() {
    let (engine, _repo) = create_test_engine().await;

    let mut fields = basic_fields("R-1", "2024-01-05");
    fields.currency = Some("EUR".to_string());
    let inv = invoice("INV-9", "Acme AG", fields, "Invoice R-1");

    let outcome = engine.process_invoice(&inv).await.unwrap();

    // The normalized copy is unchanged input.
    assert_eq!(outcome.normalized_fields.invoice_number, "R-1");
    assert_eq!(outcome.normalized_fields.currency.as_deref(), Some("EUR"));
    assert!(outcome.memory_updates.is_empty());

    // Trail covers recall and decide at minimum.
    use apmem::AuditStep;
    assert!(outcome
        .audit_trail
        .iter()
        .any(|e| e.step == AuditStep::Recall));
    assert!(outcome
        .audit_trail
        .iter()
        .any(|e| e.step == AuditStep::Decide));
}
