use lifecycle_core::error::PipelineError;
use lifecycle_core::lifecycle::LifecycleStatus;
use lifecycle_core::month::ReferenceMonth;
use lifecycle_core::pipeline::{PipelineOrchestrator, SilverDatasets};
use lifecycle_core::record::{
    AssignmentRecord, ConsumerRecord, MerchantRecord, OrderRecord, TestGroup,
};
use lifecycle_core::store::FactStore;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn months() -> Vec<ReferenceMonth> {
    vec![
        ReferenceMonth::from_ym(2018, 12).unwrap(),
        ReferenceMonth::from_ym(2019, 1).unwrap(),
    ]
}

fn order(order_id: &str, customer: &str, merchant: &str, ts: &str, amount: f64, items: Option<&str>) -> OrderRecord {
    OrderRecord {
        order_id: order_id.into(),
        customer_id: customer.into(),
        merchant_id: merchant.into(),
        order_created_at: ts.parse().unwrap(),
        order_total_amount: amount,
        items: items.map(String::from),
    }
}

fn consumer(id: &str, created_at: &str) -> ConsumerRecord {
    ConsumerRecord {
        customer_id: id.into(),
        created_at: created_at.parse().unwrap(),
        active: true,
    }
}

fn merchant(id: &str) -> MerchantRecord {
    MerchantRecord {
        merchant_id: id.into(),
        created_at: "2017-01-01T00:00:00".parse().unwrap(),
        enabled: true,
    }
}

fn assignment(id: &str, group: TestGroup) -> AssignmentRecord {
    AssignmentRecord {
        customer_id: id.into(),
        is_target: group,
    }
}

/// Two assigned customers (one target with orders in both months, one
/// control who goes silent), one unassigned consumer, one order with a
/// discount payload and one with a broken payload, one order at an unknown
/// merchant.
fn fixture() -> SilverDatasets {
    let discounted = r#"[{"totalDiscount": {"value": "1.50"}, "garnishItems": [{"totalDiscount": {"value": 0.50}}]}]"#;
    SilverDatasets {
        orders: vec![
            order("o-1", "c-target", "m-1", "2018-12-03T12:00:00", 25.0, Some(discounted)),
            order("o-2", "c-target", "m-2", "2018-12-20T19:00:00", 35.0, Some("{broken")),
            order("o-3", "c-target", "m-1", "2019-01-07T12:30:00", 40.0, None),
            order("o-4", "c-control", "m-ghost", "2018-12-10T13:00:00", 18.0, None),
        ],
        consumers: vec![
            consumer("c-target", "2018-06-15T08:30:00"),
            consumer("c-control", "2018-11-02T10:00:00"),
            consumer("c-bystander", "2018-01-01T00:00:00"),
        ],
        merchants: vec![merchant("m-1"), merchant("m-2")],
        assignments: vec![
            assignment("c-target", TestGroup::Target),
            assignment("c-control", TestGroup::Control),
        ],
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// End-to-end: the orchestrator emits one fact per assigned customer per
/// month and reports recoverable issues through the summary.
#[test]
fn run_produces_facts_and_summary() {
    let _ = env_logger::builder().is_test(true).try_init();

    let orchestrator = PipelineOrchestrator::new(months()).unwrap();
    let output = orchestrator.run(&fixture()).unwrap();

    assert_eq!(output.summary.facts_emitted, 4); // 2 customers × 2 months
    assert_eq!(output.summary.customers_classified, 2);
    assert_eq!(output.summary.consumers_unassigned, 1);
    assert_eq!(output.summary.malformed_payloads, 1);
    assert_eq!(output.summary.discounted_orders, 1);
    assert_eq!(output.summary.orders_unknown_merchant, 1);
    assert_eq!(output.facts.len(), 4);
    assert_eq!(output.discounts.len(), 4);

    let first = output
        .discounts
        .iter()
        .find(|d| d.order_id == "o-1")
        .unwrap();
    assert_eq!(first.discount_values, vec![1.5, 0.5]);
    assert_eq!(first.total_discount_sum, 2.0);

    let control: Vec<_> = output
        .facts
        .iter()
        .filter(|f| f.customer_id == "c-control")
        .collect();
    assert_eq!(control[0].status, LifecycleStatus::Active);
    assert_eq!(control[1].status, LifecycleStatus::Churned);
}

/// Facts survive a store round-trip unchanged, and the breakdown queries
/// group them the way downstream reporting expects.
#[test]
fn facts_round_trip_through_store() {
    let orchestrator = PipelineOrchestrator::new(months()).unwrap();
    let output = orchestrator.run(&fixture()).unwrap();

    let store = FactStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
        .insert_run(&output.run_id, "2026-08-04T00:00:00Z", "0.1.0", orchestrator.months())
        .unwrap();
    for fact in &output.facts {
        store.insert_fact(&output.run_id, fact).unwrap();
    }
    for discount in &output.discounts {
        store.insert_order_discount(&output.run_id, discount).unwrap();
    }

    assert_eq!(store.fact_count(&output.run_id).unwrap(), 4);
    assert_eq!(store.discount_count(&output.run_id).unwrap(), 4);

    let restored = store
        .facts_for_customer(&output.run_id, "c-target")
        .unwrap();
    let original: Vec<_> = output
        .facts
        .iter()
        .filter(|f| f.customer_id == "c-target")
        .collect();
    assert_eq!(restored.len(), 2);
    for (restored, original) in restored.iter().zip(&original) {
        assert_eq!(restored.reference_month, original.reference_month);
        assert_eq!(restored.is_target, original.is_target);
        assert_eq!(restored.customer_aging, original.customer_aging);
        assert_eq!(restored.status, original.status);
        assert_eq!(restored.last_status, original.last_status);
        assert_eq!(restored.total_order, original.total_order);
        assert_eq!(restored.total_order_lm, original.total_order_lm);
        assert_eq!(restored.alteracao_frequencia, original.alteracao_frequencia);
        assert_eq!(restored.total_amount, original.total_amount);
        assert_eq!(restored.total_amount_lm, original.total_amount_lm);
        assert_eq!(restored.ticket_medio, original.ticket_medio);
        assert_eq!(restored.ticket_medio_lm, original.ticket_medio_lm);
    }

    let breakdown = store.status_breakdown(&output.run_id).unwrap();
    let december_active: i64 = breakdown
        .iter()
        .filter(|r| r.reference_month == "2018-12-01" && r.label == "active")
        .map(|r| r.total_customer)
        .sum();
    assert_eq!(december_active, 2);

    let frequency = store.frequency_breakdown(&output.run_id).unwrap();
    assert!(frequency
        .iter()
        .all(|r| r.reference_month != "2018-12-01" || r.label == "not_applicable"));
}

/// Fatal conditions surface immediately with the offending key, before any
/// facts are assembled.
#[test]
fn fatal_errors_name_the_offender() {
    let mut datasets = fixture();
    datasets
        .assignments
        .push(assignment("c-target", TestGroup::Control));

    let orchestrator = PipelineOrchestrator::new(months()).unwrap();
    let err = orchestrator.run(&datasets).unwrap_err();
    assert!(err.to_string().contains("c-target"));

    let err = PipelineOrchestrator::new(vec![]).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyReferenceMonths));
}
