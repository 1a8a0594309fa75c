//! Discount extraction — recursive walk of the per-order item tree.
//!
//! Orders carry a serialized tree of items; any node may hold a
//! `totalDiscount` and a list of `garnishItems` (sub-items, themselves
//! capable of carrying discounts and further sub-items). Extraction walks
//! the whole tree depth-first and collects every discount value found.
//!
//! Malformed payloads are expected in real data: extraction never errors.
//! A payload that fails to parse yields an empty sequence and a counter
//! bump in [`ExtractionStats`] — this is best-effort enrichment, not a
//! correctness-critical value.

use crate::record::OrderRecord;
use crate::types::OrderId;
use serde::{Deserialize, Serialize};

// ── Payload shape ────────────────────────────────────────────────────────────

/// One node of the nested item tree. Unknown keys are ignored; both fields
/// are optional in the wire format.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNode {
    #[serde(default)]
    pub total_discount: Option<TotalDiscount>,
    #[serde(default)]
    pub garnish_items: Option<Vec<ItemNode>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalDiscount {
    #[serde(default)]
    pub value: Option<DiscountValue>,
}

/// Discount values arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DiscountValue {
    Number(f64),
    Text(String),
}

impl DiscountValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            DiscountValue::Number(n) => Some(*n),
            DiscountValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// All discount values in the payload, in depth-first traversal order.
/// Absent, empty, or unparseable payloads yield an empty vec — never an
/// error. No deduplication: one order can legitimately carry several
/// discounted sub-items.
pub fn extract_discounts(payload: Option<&str>) -> Vec<f64> {
    let raw = match payload {
        None | Some("") => return Vec::new(),
        Some(raw) => raw,
    };
    match parse_items(raw) {
        Ok(items) => collect_all(&items),
        Err(err) => {
            log::debug!("unparseable items payload: {err}");
            Vec::new()
        }
    }
}

/// Sum of all discounts in the payload; 0.0 when none were found.
pub fn total_discount_sum(payload: Option<&str>) -> f64 {
    extract_discounts(payload).iter().sum()
}

fn parse_items(raw: &str) -> Result<Vec<ItemNode>, serde_json::Error> {
    serde_json::from_str(raw)
}

fn collect_all(items: &[ItemNode]) -> Vec<f64> {
    let mut discounts = Vec::new();
    for item in items {
        collect(item, &mut discounts);
    }
    discounts
}

fn collect(node: &ItemNode, out: &mut Vec<f64>) {
    if let Some(value) = node.total_discount.as_ref().and_then(|d| d.value.as_ref()) {
        match value.as_f64() {
            Some(v) => out.push(v),
            None => log::debug!("non-numeric discount value skipped"),
        }
    }
    if let Some(garnish) = node.garnish_items.as_ref() {
        for child in garnish {
            collect(child, out);
        }
    }
}

// ── Per-order enrichment ─────────────────────────────────────────────────────

/// Discount enrichment for a single order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDiscount {
    pub order_id: OrderId,
    pub discount_values: Vec<f64>,
    pub total_discount_sum: f64,
}

/// Recoverable-issue counters for one enrichment pass. Surfaced through the
/// run summary instead of being raised per record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub orders_seen: usize,
    pub malformed_payloads: usize,
    pub discounted_orders: usize,
}

/// Enrich every order with its extracted discounts. Independent of the rest
/// of the pipeline; safe to run in any order relative to aggregation.
pub fn enrich_orders(orders: &[OrderRecord]) -> (Vec<OrderDiscount>, ExtractionStats) {
    let mut stats = ExtractionStats::default();
    let mut rows = Vec::with_capacity(orders.len());

    for order in orders {
        stats.orders_seen += 1;
        let discount_values = match order.items.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => match parse_items(raw) {
                Ok(items) => collect_all(&items),
                Err(err) => {
                    stats.malformed_payloads += 1;
                    log::debug!("order {}: unparseable items payload: {err}", order.order_id);
                    Vec::new()
                }
            },
        };
        let total_discount_sum: f64 = discount_values.iter().sum();
        if total_discount_sum > 0.0 {
            stats.discounted_orders += 1;
        }
        rows.push(OrderDiscount {
            order_id: order.order_id.clone(),
            discount_values,
            total_discount_sum,
        });
    }

    (rows, stats)
}
