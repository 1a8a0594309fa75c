use lifecycle_core::discount::{enrich_orders, extract_discounts, total_discount_sum};
use lifecycle_core::record::OrderRecord;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_order(order_id: &str, items: Option<&str>) -> OrderRecord {
    OrderRecord {
        order_id: order_id.into(),
        customer_id: "c-1".into(),
        merchant_id: "m-1".into(),
        order_created_at: "2018-12-03T12:00:00".parse().unwrap(),
        order_total_amount: 25.0,
        items: items.map(String::from),
    }
}

/// Three-level nesting: item → garnish → garnish, discount only at the
/// innermost level.
const DEEP_PAYLOAD: &str = r#"[
    {"name": "combo", "garnishItems": [
        {"name": "side", "garnishItems": [
            {"name": "sauce", "totalDiscount": {"value": "2.75"}}
        ]}
    ]}
]"#;

const MULTI_PAYLOAD: &str = r#"[
    {"totalDiscount": {"value": 1.0}, "garnishItems": [
        {"totalDiscount": {"value": "0.50"}},
        {"totalDiscount": {"value": 0.25}}
    ]},
    {"totalDiscount": {"value": "3.00"}}
]"#;

// ── Tests ────────────────────────────────────────────────────────────────────

/// Re-parsing the same payload yields the same sequence in the same order —
/// extraction is a pure function with no hidden state.
#[test]
fn extraction_is_idempotent() {
    let first = extract_discounts(Some(MULTI_PAYLOAD));
    let second = extract_discounts(Some(MULTI_PAYLOAD));
    assert_eq!(first, second);
}

/// For a 3-level nested tree where only the innermost node has a discount,
/// extraction returns exactly that one value.
#[test]
fn extracts_discount_at_depth() {
    let discounts = extract_discounts(Some(DEEP_PAYLOAD));
    assert_eq!(discounts, vec![2.75]);
}

/// Depth-first traversal order: parent discount first, then its garnishes
/// in sequence, then the next top-level item. No deduplication.
#[test]
fn extracts_all_discounts_in_traversal_order() {
    let discounts = extract_discounts(Some(MULTI_PAYLOAD));
    assert_eq!(discounts, vec![1.0, 0.5, 0.25, 3.0]);
}

/// Discount values arrive either as JSON numbers or as numeric strings;
/// both are parsed.
#[test]
fn parses_string_and_numeric_values() {
    let payload = r#"[{"totalDiscount": {"value": "1.50"}}, {"totalDiscount": {"value": 2}}]"#;
    assert_eq!(extract_discounts(Some(payload)), vec![1.5, 2.0]);
}

/// Malformed, absent, and empty payloads all yield an empty sequence —
/// extraction never errors.
#[test]
fn bad_payloads_yield_empty() {
    assert!(extract_discounts(Some("{not json")).is_empty());
    assert!(extract_discounts(Some("")).is_empty());
    assert!(extract_discounts(None).is_empty());
    assert!(extract_discounts(Some("[]")).is_empty());
}

/// A node without totalDiscount, a totalDiscount without a value, and a
/// null garnish list are all tolerated.
#[test]
fn tolerates_sparse_nodes() {
    let payload = r#"[
        {"name": "plain"},
        {"totalDiscount": {}},
        {"totalDiscount": {"value": 0.75}, "garnishItems": null}
    ]"#;
    assert_eq!(extract_discounts(Some(payload)), vec![0.75]);
}

/// The derived sum is 0 for an empty sequence and additive otherwise.
#[test]
fn discount_sum_matches_sequence() {
    assert_eq!(total_discount_sum(None), 0.0);
    assert_eq!(total_discount_sum(Some(MULTI_PAYLOAD)), 4.75);
}

/// Enrichment counts malformed payloads and discounted orders instead of
/// raising per record; every order still gets a row.
#[test]
fn enrichment_aggregates_recoverable_issues() {
    let orders = vec![
        make_order("o-1", Some(MULTI_PAYLOAD)),
        make_order("o-2", Some("{broken")),
        make_order("o-3", None),
    ];

    let (rows, stats) = enrich_orders(&orders);

    assert_eq!(rows.len(), 3);
    assert_eq!(stats.orders_seen, 3);
    assert_eq!(stats.malformed_payloads, 1);
    assert_eq!(stats.discounted_orders, 1);

    assert_eq!(rows[0].total_discount_sum, 4.75);
    assert!(rows[1].discount_values.is_empty());
    assert_eq!(rows[2].total_discount_sum, 0.0);
}
