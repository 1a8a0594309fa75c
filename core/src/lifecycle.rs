//! Lifecycle classification — the month-over-month state machine.
//!
//! For every assigned customer and every reference month, derives:
//!   1. A preliminary status from that month's order count in isolation
//!   2. A final status from the preliminary status and the prior period
//!   3. A frequency-change label from current vs. prior order counts
//!   4. Account tenure (customer aging) at the reference point
//!   5. Carry-forward values from the prior month's fact
//!
//! Implemented as an explicit fold over each customer's months in ascending
//! order, carrying a small accumulator — months must be processed
//! chronologically per customer, but customers are independent of each
//! other.

use crate::{
    aggregate::ActivityMap,
    error::{PipelineError, PipelineResult},
    month::{months_between, validate_months, ReferenceMonth},
    record::{AssignmentRecord, ConsumerRecord, TestGroup},
    types::CustomerId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ── Public types ─────────────────────────────────────────────────────────────

/// Final lifecycle status for one customer-month.
///
/// `Unclassified` is a sentinel: the transition table covers every reachable
/// combination, so producing it signals a logic gap and aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Active,
    Churned,
    Reactivated,
    Inactive,
    Unclassified,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Churned => "churned",
            LifecycleStatus::Reactivated => "reactivated",
            LifecycleStatus::Inactive => "inactive",
            LifecycleStatus::Unclassified => "unclassified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LifecycleStatus::Active),
            "churned" => Some(LifecycleStatus::Churned),
            "reactivated" => Some(LifecycleStatus::Reactivated),
            "inactive" => Some(LifecycleStatus::Inactive),
            "unclassified" => Some(LifecycleStatus::Unclassified),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Month-over-month order-frequency signal, computed independently of
/// status. `NotApplicable` marks the first reference month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyChange {
    NotApplicable,
    Growth,
    Contraction,
    Maintenance,
}

impl FrequencyChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyChange::NotApplicable => "not_applicable",
            FrequencyChange::Growth => "growth",
            FrequencyChange::Contraction => "contraction",
            FrequencyChange::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_applicable" => Some(FrequencyChange::NotApplicable),
            "growth" => Some(FrequencyChange::Growth),
            "contraction" => Some(FrequencyChange::Contraction),
            "maintenance" => Some(FrequencyChange::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for FrequencyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the final fact table: composite key
/// `(customer_id, reference_month)`, never mutated after creation.
/// `*_lm` fields carry the prior month's values verbatim and are absent for
/// the first reference month; `ticket_medio` is absent when the month had
/// zero orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerMonthFact {
    pub reference_month: ReferenceMonth,
    pub customer_id: CustomerId,
    pub is_target: TestGroup,
    /// Account tenure in whole months at the reference point.
    pub customer_aging: u32,
    pub status: LifecycleStatus,
    pub last_status: Option<LifecycleStatus>,
    pub total_order: u32,
    pub total_order_lm: Option<u32>,
    pub alteracao_frequencia: FrequencyChange,
    pub total_amount: f64,
    pub total_amount_lm: Option<f64>,
    pub ticket_medio: Option<f64>,
    pub ticket_medio_lm: Option<f64>,
}

/// Recoverable-issue counters for one classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub customers_classified: usize,
    /// Consumers with no assignment row — excluded (inner-join semantics).
    pub consumers_unassigned: usize,
    /// Assignments whose customer never appeared in the consumer dataset.
    pub assignments_without_consumer: usize,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub facts: Vec<CustomerMonthFact>,
    pub stats: ClassificationStats,
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// The accumulator threaded through one customer's month fold.
struct LastPeriod {
    status: LifecycleStatus,
    total_order: u32,
    total_amount: f64,
    ticket_medio: Option<f64>,
}

#[derive(Debug)]
pub struct LifecycleClassifier {
    months: Vec<ReferenceMonth>,
}

impl LifecycleClassifier {
    /// Validates the month set up front: classification never starts with an
    /// empty or non-ascending time axis.
    pub fn new(months: Vec<ReferenceMonth>) -> PipelineResult<Self> {
        validate_months(&months)?;
        Ok(Self { months })
    }

    pub fn months(&self) -> &[ReferenceMonth] {
        &self.months
    }

    /// Produce one fact per (eligible customer, reference month).
    ///
    /// Eligibility is the inner join of the consumer dataset with the
    /// assignment table. An assigned customer with zero orders across every
    /// month is still emitted for every month, with `total_order = 0`.
    pub fn classify(
        &self,
        consumers: &[ConsumerRecord],
        assignments: &[AssignmentRecord],
        activity: &ActivityMap,
    ) -> PipelineResult<Classification> {
        let groups = assignment_map(assignments)?;

        let mut stats = ClassificationStats::default();
        let mut facts = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut matched: HashSet<&str> = HashSet::new();

        for consumer in consumers {
            if !seen.insert(consumer.customer_id.as_str()) {
                log::debug!("duplicate consumer record for {}", consumer.customer_id);
                continue;
            }
            let Some(&group) = groups.get(consumer.customer_id.as_str()) else {
                stats.consumers_unassigned += 1;
                continue;
            };
            matched.insert(consumer.customer_id.as_str());
            stats.customers_classified += 1;
            self.fold_customer(consumer, group, activity, &mut facts)?;
        }

        stats.assignments_without_consumer = groups.len() - matched.len();
        Ok(Classification { facts, stats })
    }

    /// Fold one customer's months in ascending order, carrying the prior
    /// period in `last`.
    fn fold_customer(
        &self,
        consumer: &ConsumerRecord,
        group: TestGroup,
        activity: &ActivityMap,
        out: &mut Vec<CustomerMonthFact>,
    ) -> PipelineResult<()> {
        let mut last: Option<LastPeriod> = None;

        for &month in &self.months {
            let key = (consumer.customer_id.clone(), month);
            let current = activity.get(&key);

            // Absence of an aggregation row means zero orders that month.
            let total_order = current.map_or(0, |a| a.total_order);
            let total_amount = current.map_or(0.0, |a| a.total_amount);
            let ticket_medio = current.map(|a| a.ticket_medio);

            let preliminary = if total_order > 0 {
                LifecycleStatus::Active
            } else {
                LifecycleStatus::Churned
            };

            let (status, last_status) = match last.as_ref() {
                None => (preliminary, None),
                Some(prev) => (transition(prev.status, preliminary), Some(prev.status)),
            };
            if status == LifecycleStatus::Unclassified {
                return Err(PipelineError::Unclassified {
                    customer_id: consumer.customer_id.clone(),
                    reference_month: month,
                });
            }

            let alteracao_frequencia = match last.as_ref() {
                None => FrequencyChange::NotApplicable,
                Some(prev) => frequency_change(total_order, prev.total_order),
            };

            out.push(CustomerMonthFact {
                reference_month: month,
                customer_id: consumer.customer_id.clone(),
                is_target: group,
                customer_aging: customer_aging(consumer.created_at, month),
                status,
                last_status,
                total_order,
                total_order_lm: last.as_ref().map(|p| p.total_order),
                alteracao_frequencia,
                total_amount,
                total_amount_lm: last.as_ref().map(|p| p.total_amount),
                ticket_medio,
                ticket_medio_lm: last.as_ref().and_then(|p| p.ticket_medio),
            });

            last = Some(LastPeriod {
                status,
                total_order,
                total_amount,
                ticket_medio,
            });
        }

        Ok(())
    }
}

/// Build the customer → test-group map, rejecting ambiguous assignments.
fn assignment_map(
    assignments: &[AssignmentRecord],
) -> PipelineResult<HashMap<&str, TestGroup>> {
    let mut groups: HashMap<&str, TestGroup> = HashMap::with_capacity(assignments.len());
    for record in assignments {
        if groups
            .insert(record.customer_id.as_str(), record.is_target)
            .is_some()
        {
            return Err(PipelineError::DuplicateAssignment {
                customer_id: record.customer_id.clone(),
            });
        }
    }
    Ok(groups)
}

/// The transition table: previous period's final status × current
/// preliminary status. Final statuses reduce to the binary axis they imply
/// (`active`/`reactivated` were active that month, `churned`/`inactive`
/// were not), which closes the table for any number of months.
fn transition(prev: LifecycleStatus, preliminary: LifecycleStatus) -> LifecycleStatus {
    use LifecycleStatus::*;
    match (prev, preliminary) {
        (Active | Reactivated, Active) => Active,
        (Active | Reactivated, _) => Churned,
        (Churned | Inactive, Active) => Reactivated,
        (Churned | Inactive, _) => Inactive,
        (Unclassified, _) => Unclassified,
    }
}

fn frequency_change(current: u32, previous: u32) -> FrequencyChange {
    use std::cmp::Ordering;
    match current.cmp(&previous) {
        Ordering::Greater => FrequencyChange::Growth,
        Ordering::Less => FrequencyChange::Contraction,
        Ordering::Equal => FrequencyChange::Maintenance,
    }
}

/// Account tenure in whole months at the reference point:
/// `round(abs(months_between))`, never negative.
pub fn customer_aging(created_at: chrono::NaiveDateTime, month: ReferenceMonth) -> u32 {
    months_between(created_at, month).abs().round() as u32
}
