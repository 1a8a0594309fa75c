//! Typed silver records — the cleaned datasets handed to the pipeline.
//!
//! The upstream cleaning collaborator guarantees the invariants documented
//! per record (non-empty customer ids, positive amounts, deduplicated
//! reference tables). Each stage of the pipeline works on these explicit
//! types; there is no schema evolution past this point.

use crate::types::{CustomerId, MerchantId, OrderId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One cleaned order. `customer_id` is non-empty and `order_total_amount`
/// is positive; `items` still carries the raw serialized item tree for the
/// discount extractor. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub merchant_id: MerchantId,
    pub order_created_at: NaiveDateTime,
    pub order_total_amount: f64,
    #[serde(default)]
    pub items: Option<String>,
}

/// One consumer account. `active` is the source-system flag — distinct from
/// the derived lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub customer_id: CustomerId,
    pub created_at: NaiveDateTime,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRecord {
    pub merchant_id: MerchantId,
    pub created_at: NaiveDateTime,
    pub enabled: bool,
}

/// One A/B-test group assignment. At most one per customer; customers absent
/// from the assignment table are excluded from classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub customer_id: CustomerId,
    pub is_target: TestGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestGroup {
    Control,
    Target,
}

impl TestGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestGroup::Control => "control",
            TestGroup::Target => "target",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "control" => Some(TestGroup::Control),
            "target" => Some(TestGroup::Target),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
