//! Monthly aggregation — per-customer order activity by calendar month.
//!
//! Classic map-reduce-by-key: orders are grouped on
//! `(customer_id, month(order_created_at))` and each group is reduced to
//! order count, total amount, average ticket, and distinct-merchant count.
//! The result carries no ordering guarantee across groups.

use crate::month::ReferenceMonth;
use crate::record::OrderRecord;
use crate::types::{CustomerId, MerchantId, OrderId};
use std::collections::{HashMap, HashSet};

pub type ActivityKey = (CustomerId, ReferenceMonth);
pub type ActivityMap = HashMap<ActivityKey, MonthlyActivity>;

/// Aggregated activity for one `(customer, month)` group. Groups exist only
/// for months with at least one order, so `total_order > 0` holds here;
/// zero-order months are represented by absence.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyActivity {
    /// Count of distinct order ids.
    pub total_order: u32,
    /// Sum of order amounts, rounded half-up to 2 decimals after summation.
    pub total_amount: f64,
    /// Average order value: raw sum / distinct order count, rounded half-up
    /// to 2 decimals.
    pub ticket_medio: f64,
    /// Count of distinct merchant ids.
    pub total_merchant: u32,
}

/// Round half-up at 2 decimal places. Applied once per aggregate, after
/// summation, so per-row rounding error never compounds.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Group cleaned orders into per-customer-month activity. Orders are
/// expected to carry a non-empty `customer_id` and a positive amount
/// (guaranteed upstream).
pub fn aggregate_orders(orders: &[OrderRecord]) -> ActivityMap {
    struct Group {
        order_ids: HashSet<OrderId>,
        merchant_ids: HashSet<MerchantId>,
        amount_sum: f64,
    }

    let mut groups: HashMap<ActivityKey, Group> = HashMap::new();
    for order in orders {
        let key = (
            order.customer_id.clone(),
            ReferenceMonth::truncate(order.order_created_at),
        );
        let group = groups.entry(key).or_insert_with(|| Group {
            order_ids: HashSet::new(),
            merchant_ids: HashSet::new(),
            amount_sum: 0.0,
        });
        group.order_ids.insert(order.order_id.clone());
        group.merchant_ids.insert(order.merchant_id.clone());
        group.amount_sum += order.order_total_amount;
    }

    groups
        .into_iter()
        .map(|(key, group)| {
            let total_order = group.order_ids.len() as u32;
            let activity = MonthlyActivity {
                total_order,
                total_amount: round2(group.amount_sum),
                ticket_medio: round2(group.amount_sum / total_order as f64),
                total_merchant: group.merchant_ids.len() as u32,
            };
            (key, activity)
        })
        .collect()
}
