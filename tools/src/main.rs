//! pipeline-runner: headless lifecycle-derivation runner.
//!
//! Usage:
//!   pipeline-runner --orders orders.jsonl --consumers consumers.jsonl \
//!       --merchants merchants.jsonl --assignments ab_test.jsonl \
//!       --months 2018-12,2019-01 --db facts.db
//!
//! The runner is the external collaborator around the core: it loads the
//! raw JSON-lines datasets, applies the bronze→silver cleanup (null
//! filtering, deduplication), hands the cleaned records to the pipeline,
//! persists the output, and prints a run summary.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use lifecycle_core::{
    month::ReferenceMonth,
    pipeline::{PipelineOrchestrator, PipelineOutput, SilverDatasets},
    record::{AssignmentRecord, ConsumerRecord, MerchantRecord, OrderRecord, TestGroup},
    store::FactStore,
};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};

// ── Raw (bronze) records ─────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct RawOrder {
    order_id: Option<String>,
    customer_id: Option<String>,
    merchant_id: Option<String>,
    order_created_at: Option<NaiveDateTime>,
    order_total_amount: Option<f64>,
    #[serde(default)]
    items: Option<String>,
}

#[derive(serde::Deserialize)]
struct RawConsumer {
    customer_id: Option<String>,
    created_at: Option<NaiveDateTime>,
    #[serde(default)]
    active: bool,
}

#[derive(serde::Deserialize)]
struct RawMerchant {
    #[serde(alias = "id")]
    merchant_id: Option<String>,
    created_at: Option<NaiveDateTime>,
    #[serde(default)]
    enabled: bool,
}

#[derive(serde::Deserialize)]
struct RawAssignment {
    customer_id: Option<String>,
    is_target: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let orders_path = require_arg(&args, "--orders")?;
    let consumers_path = require_arg(&args, "--consumers")?;
    let merchants_path = require_arg(&args, "--merchants")?;
    let assignments_path = require_arg(&args, "--assignments")?;
    let months_arg = require_arg(&args, "--months")?;
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");

    let months = months_arg
        .split(',')
        .map(|s| ReferenceMonth::parse(s.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    println!("lifecycle pipeline-runner");
    println!("  orders:      {orders_path}");
    println!("  consumers:   {consumers_path}");
    println!("  merchants:   {merchants_path}");
    println!("  assignments: {assignments_path}");
    println!("  months:      {months_arg}");
    println!("  db:          {db}");
    println!();

    let datasets = load_silver_datasets(
        &orders_path,
        &consumers_path,
        &merchants_path,
        &assignments_path,
    )?;

    let orchestrator = PipelineOrchestrator::new(months)?;
    let output = orchestrator.run(&datasets)?;

    let store = FactStore::open(db)?;
    store.migrate()?;
    let started_at = chrono::Utc::now().to_rfc3339();
    store.insert_run(
        &output.run_id,
        &started_at,
        env!("CARGO_PKG_VERSION"),
        orchestrator.months(),
    )?;
    for fact in &output.facts {
        store.insert_fact(&output.run_id, fact)?;
    }
    for discount in &output.discounts {
        store.insert_order_discount(&output.run_id, discount)?;
    }

    print_summary(&store, &output)?;
    Ok(())
}

// ── Bronze → silver ──────────────────────────────────────────────────────────

fn load_silver_datasets(
    orders_path: &str,
    consumers_path: &str,
    merchants_path: &str,
    assignments_path: &str,
) -> Result<SilverDatasets> {
    let raw_orders: Vec<RawOrder> = load_jsonl(orders_path)?;
    let raw_consumers: Vec<RawConsumer> = load_jsonl(consumers_path)?;
    let raw_merchants: Vec<RawMerchant> = load_jsonl(merchants_path)?;
    let raw_assignments: Vec<RawAssignment> = load_jsonl(assignments_path)?;

    let orders_in = raw_orders.len();
    let mut orders = Vec::with_capacity(orders_in);
    for raw in raw_orders {
        let (Some(order_id), Some(customer_id), Some(merchant_id), Some(created), Some(amount)) = (
            raw.order_id,
            raw.customer_id,
            raw.merchant_id,
            raw.order_created_at,
            raw.order_total_amount,
        ) else {
            continue;
        };
        if customer_id.is_empty() || amount <= 0.0 {
            continue;
        }
        orders.push(OrderRecord {
            order_id,
            customer_id,
            merchant_id,
            order_created_at: created,
            order_total_amount: amount,
            items: raw.items,
        });
    }
    log::info!(
        "orders: kept {} of {} (null customer_id / non-positive amount dropped)",
        orders.len(),
        orders_in,
    );

    let mut consumers = Vec::new();
    let mut seen_consumers: HashSet<String> = HashSet::new();
    for raw in raw_consumers {
        let (Some(customer_id), Some(created_at)) = (raw.customer_id, raw.created_at) else {
            continue;
        };
        if !seen_consumers.insert(customer_id.clone()) {
            continue;
        }
        consumers.push(ConsumerRecord {
            customer_id,
            created_at,
            active: raw.active,
        });
    }

    let mut merchants = Vec::new();
    let mut seen_merchants: HashSet<String> = HashSet::new();
    for raw in raw_merchants {
        let (Some(merchant_id), Some(created_at)) = (raw.merchant_id, raw.created_at) else {
            continue;
        };
        if !seen_merchants.insert(merchant_id.clone()) {
            continue;
        }
        merchants.push(MerchantRecord {
            merchant_id,
            created_at,
            enabled: raw.enabled,
        });
    }

    // Exact-duplicate rows are collapsed here; conflicting group assignments
    // for the same customer are passed through so the classifier rejects
    // them as ambiguous.
    let mut assignments = Vec::new();
    let mut seen_assignments: HashSet<(String, TestGroup)> = HashSet::new();
    for raw in raw_assignments {
        let (Some(customer_id), Some(group_raw)) = (raw.customer_id, raw.is_target) else {
            continue;
        };
        let Some(is_target) = TestGroup::parse(&group_raw) else {
            log::warn!("assignment for {customer_id}: unknown test group '{group_raw}', dropped");
            continue;
        };
        if !seen_assignments.insert((customer_id.clone(), is_target)) {
            continue;
        }
        assignments.push(AssignmentRecord {
            customer_id,
            is_target,
        });
    }

    Ok(SilverDatasets {
        orders,
        consumers,
        merchants,
        assignments,
    })
}

fn load_jsonl<T: DeserializeOwned>(path: &str) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {path}"))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                log::warn!("{path}:{}: bad record skipped: {err}", line_no + 1);
            }
        }
    }
    if skipped > 0 {
        log::warn!("{path}: {skipped} unreadable lines skipped");
    }
    Ok(records)
}

// ── Reporting ────────────────────────────────────────────────────────────────

fn print_summary(store: &FactStore, output: &PipelineOutput) -> Result<()> {
    let s = &output.summary;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:               {}", output.run_id);
    println!("  orders in:            {}", s.orders_in);
    println!("  consumers in:         {}", s.consumers_in);
    println!("  merchants in:         {}", s.merchants_in);
    println!("  assignments in:       {}", s.assignments_in);
    println!("  customers classified: {}", s.customers_classified);
    println!("  facts emitted:        {}", s.facts_emitted);
    println!("  malformed payloads:   {}", s.malformed_payloads);
    println!("  discounted orders:    {}", s.discounted_orders);
    println!("  unassigned consumers: {}", s.consumers_unassigned);
    println!("  unknown merchants:    {}", s.orders_unknown_merchant);

    println!();
    println!("=== LIFECYCLE BREAKDOWN (distinct customers) ===");
    for row in store.status_breakdown(&output.run_id)? {
        println!(
            "  {} {:<8} {:<12} {}",
            row.reference_month, row.is_target, row.label, row.total_customer
        );
    }

    println!();
    println!("=== FREQUENCY BREAKDOWN (distinct customers) ===");
    for row in store.frequency_breakdown(&output.run_id)? {
        println!(
            "  {} {:<8} {:<14} {}",
            row.reference_month, row.is_target, row.label, row.total_customer
        );
    }
    Ok(())
}

fn require_arg(args: &[String], flag: &str) -> Result<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .with_context(|| format!("missing required argument {flag}"))
}
