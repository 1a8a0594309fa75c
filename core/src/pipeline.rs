//! The pipeline orchestrator — wires the stages in dependency order.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Discount enrichment   (independent of everything downstream)
//!   2. Monthly aggregation
//!   3. Lifecycle classification (months ascending, per-customer fold)
//!
//! RULES:
//!   - The orchestrator owns no aggregation logic of its own.
//!   - Fatal errors propagate immediately with the offending key.
//!   - Recoverable issues are aggregated into the run summary, never raised
//!     per record.

use crate::{
    aggregate::aggregate_orders,
    discount::{enrich_orders, OrderDiscount},
    error::PipelineResult,
    lifecycle::{CustomerMonthFact, LifecycleClassifier},
    month::ReferenceMonth,
    record::{AssignmentRecord, ConsumerRecord, MerchantRecord, OrderRecord},
    types::RunId,
};
use serde::Serialize;
use std::collections::HashSet;

/// The four cleaned datasets handed over by the upstream collaborator.
#[derive(Debug, Clone, Default)]
pub struct SilverDatasets {
    pub orders: Vec<OrderRecord>,
    pub consumers: Vec<ConsumerRecord>,
    pub merchants: Vec<MerchantRecord>,
    pub assignments: Vec<AssignmentRecord>,
}

/// Recoverable-issue counts and volumes for one run. Fatal conditions never
/// reach this struct — they abort the run instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub orders_in: usize,
    pub consumers_in: usize,
    pub merchants_in: usize,
    pub assignments_in: usize,
    pub malformed_payloads: usize,
    pub discounted_orders: usize,
    pub orders_unknown_merchant: usize,
    pub customers_classified: usize,
    pub consumers_unassigned: usize,
    pub assignments_without_consumer: usize,
    pub facts_emitted: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: RunId,
    pub discounts: Vec<OrderDiscount>,
    pub facts: Vec<CustomerMonthFact>,
    pub summary: RunSummary,
}

#[derive(Debug)]
pub struct PipelineOrchestrator {
    classifier: LifecycleClassifier,
}

impl PipelineOrchestrator {
    /// Month validation happens here, before any data is touched.
    pub fn new(months: Vec<ReferenceMonth>) -> PipelineResult<Self> {
        Ok(Self {
            classifier: LifecycleClassifier::new(months)?,
        })
    }

    pub fn months(&self) -> &[ReferenceMonth] {
        self.classifier.months()
    }

    /// Run the full derivation over the given datasets and assemble the
    /// final fact table.
    pub fn run(&self, datasets: &SilverDatasets) -> PipelineResult<PipelineOutput> {
        let run_id: RunId = uuid::Uuid::new_v4().to_string();
        log::info!(
            "pipeline {run_id}: {} orders, {} consumers, {} merchants, {} assignments, {} months",
            datasets.orders.len(),
            datasets.consumers.len(),
            datasets.merchants.len(),
            datasets.assignments.len(),
            self.classifier.months().len(),
        );

        let (discounts, extraction) = enrich_orders(&datasets.orders);

        let known_merchants: HashSet<&str> = datasets
            .merchants
            .iter()
            .map(|m| m.merchant_id.as_str())
            .collect();
        let orders_unknown_merchant = datasets
            .orders
            .iter()
            .filter(|o| !known_merchants.contains(o.merchant_id.as_str()))
            .count();

        let activity = aggregate_orders(&datasets.orders);
        let classification =
            self.classifier
                .classify(&datasets.consumers, &datasets.assignments, &activity)?;

        let summary = RunSummary {
            orders_in: datasets.orders.len(),
            consumers_in: datasets.consumers.len(),
            merchants_in: datasets.merchants.len(),
            assignments_in: datasets.assignments.len(),
            malformed_payloads: extraction.malformed_payloads,
            discounted_orders: extraction.discounted_orders,
            orders_unknown_merchant,
            customers_classified: classification.stats.customers_classified,
            consumers_unassigned: classification.stats.consumers_unassigned,
            assignments_without_consumer: classification.stats.assignments_without_consumer,
            facts_emitted: classification.facts.len(),
        };

        log::info!(
            "pipeline {run_id}: {} facts for {} customers ({} malformed payloads, {} unassigned consumers)",
            summary.facts_emitted,
            summary.customers_classified,
            summary.malformed_payloads,
            summary.consumers_unassigned,
        );

        Ok(PipelineOutput {
            run_id,
            discounts,
            facts: classification.facts,
            summary,
        })
    }
}
