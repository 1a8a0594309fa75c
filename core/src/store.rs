//! SQLite persistence for the derived fact table.
//!
//! RULE: Only store.rs talks to the database.
//! Pipeline stages are pure; the runner persists their output through this
//! layer, and downstream reporting queries it.

use crate::{
    discount::OrderDiscount,
    error::{PipelineError, PipelineResult},
    lifecycle::{CustomerMonthFact, FrequencyChange, LifecycleStatus},
    month::ReferenceMonth,
    record::TestGroup,
};
use rusqlite::{params, Connection};

pub struct FactStore {
    conn: Connection,
}

/// One row of a grouped fact breakdown — the downstream "groupable by"
/// surface. `label` is a status or a frequency-change value depending on
/// the query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FactBreakdownRow {
    pub reference_month: String,
    pub is_target: String,
    pub label: String,
    pub total_customer: i64,
}

impl FactStore {
    /// Open (or create) the fact database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_lifecycle.sql"))?;
        Ok(())
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        started_at: &str,
        engine_version: &str,
        months: &[ReferenceMonth],
    ) -> PipelineResult<()> {
        let month_list = months
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.conn.execute(
            "INSERT INTO pipeline_run (run_id, started_at, engine_version, reference_months)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, started_at, engine_version, month_list],
        )?;
        Ok(())
    }

    pub fn insert_fact(&self, run_id: &str, fact: &CustomerMonthFact) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO customer_month_fact (
                run_id, customer_id, reference_month, is_target, customer_aging,
                status, last_status, total_order, total_order_lm,
                alteracao_frequencia, total_amount, total_amount_lm,
                ticket_medio, ticket_medio_lm
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                run_id,
                fact.customer_id,
                fact.reference_month.to_string(),
                fact.is_target.as_str(),
                fact.customer_aging,
                fact.status.as_str(),
                fact.last_status.map(|s| s.as_str()),
                fact.total_order,
                fact.total_order_lm,
                fact.alteracao_frequencia.as_str(),
                fact.total_amount,
                fact.total_amount_lm,
                fact.ticket_medio,
                fact.ticket_medio_lm,
            ],
        )?;
        Ok(())
    }

    pub fn insert_order_discount(
        &self,
        run_id: &str,
        discount: &OrderDiscount,
    ) -> PipelineResult<()> {
        let values_json = serde_json::to_string(&discount.discount_values)?;
        self.conn.execute(
            "INSERT INTO order_discount (run_id, order_id, discount_values, total_discount_sum)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                discount.order_id,
                values_json,
                discount.total_discount_sum,
            ],
        )?;
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn fact_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM customer_month_fact WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn discount_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM order_discount WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All facts for one customer, months ascending.
    pub fn facts_for_customer(
        &self,
        run_id: &str,
        customer_id: &str,
    ) -> PipelineResult<Vec<CustomerMonthFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT reference_month, customer_id, is_target, customer_aging,
                    status, last_status, total_order, total_order_lm,
                    alteracao_frequencia, total_amount, total_amount_lm,
                    ticket_medio, ticket_medio_lm
             FROM customer_month_fact
             WHERE run_id = ?1 AND customer_id = ?2
             ORDER BY reference_month",
        )?;
        let rows = stmt.query_map(params![run_id, customer_id], |row| {
            Ok(RawFactRow {
                reference_month: row.get(0)?,
                customer_id: row.get(1)?,
                is_target: row.get(2)?,
                customer_aging: row.get(3)?,
                status: row.get(4)?,
                last_status: row.get(5)?,
                total_order: row.get(6)?,
                total_order_lm: row.get(7)?,
                alteracao_frequencia: row.get(8)?,
                total_amount: row.get(9)?,
                total_amount_lm: row.get(10)?,
                ticket_medio: row.get(11)?,
                ticket_medio_lm: row.get(12)?,
            })
        })?;

        let mut facts = Vec::new();
        for row in rows {
            facts.push(row?.into_fact()?);
        }
        Ok(facts)
    }

    /// Distinct customers per (month, test group, status).
    pub fn status_breakdown(&self, run_id: &str) -> PipelineResult<Vec<FactBreakdownRow>> {
        self.breakdown(run_id, "status")
    }

    /// Distinct customers per (month, test group, frequency label).
    pub fn frequency_breakdown(&self, run_id: &str) -> PipelineResult<Vec<FactBreakdownRow>> {
        self.breakdown(run_id, "alteracao_frequencia")
    }

    fn breakdown(&self, run_id: &str, column: &str) -> PipelineResult<Vec<FactBreakdownRow>> {
        // `column` is one of two fixed identifiers, never user input.
        let sql = format!(
            "SELECT reference_month, is_target, {column}, COUNT(DISTINCT customer_id)
             FROM customer_month_fact
             WHERE run_id = ?1
             GROUP BY reference_month, is_target, {column}
             ORDER BY reference_month, is_target, {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(FactBreakdownRow {
                reference_month: row.get(0)?,
                is_target: row.get(1)?,
                label: row.get(2)?,
                total_customer: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

struct RawFactRow {
    reference_month: String,
    customer_id: String,
    is_target: String,
    customer_aging: i64,
    status: String,
    last_status: Option<String>,
    total_order: i64,
    total_order_lm: Option<i64>,
    alteracao_frequencia: String,
    total_amount: f64,
    total_amount_lm: Option<f64>,
    ticket_medio: Option<f64>,
    ticket_medio_lm: Option<f64>,
}

impl RawFactRow {
    fn into_fact(self) -> PipelineResult<CustomerMonthFact> {
        let last_status = match self.last_status.as_deref() {
            None => None,
            Some(raw) => Some(parse_status(raw)?),
        };
        Ok(CustomerMonthFact {
            reference_month: ReferenceMonth::parse(&self.reference_month)?,
            customer_id: self.customer_id,
            is_target: parse_enum(&self.is_target, "is_target", TestGroup::parse)?,
            customer_aging: self.customer_aging as u32,
            status: parse_status(&self.status)?,
            last_status,
            total_order: self.total_order as u32,
            total_order_lm: self.total_order_lm.map(|n| n as u32),
            alteracao_frequencia: parse_enum(
                &self.alteracao_frequencia,
                "alteracao_frequencia",
                FrequencyChange::parse,
            )?,
            total_amount: self.total_amount,
            total_amount_lm: self.total_amount_lm,
            ticket_medio: self.ticket_medio,
            ticket_medio_lm: self.ticket_medio_lm,
        })
    }
}

fn parse_status(raw: &str) -> PipelineResult<LifecycleStatus> {
    parse_enum(raw, "status", LifecycleStatus::parse)
}

fn parse_enum<T>(
    raw: &str,
    field: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> PipelineResult<T> {
    parse(raw).ok_or_else(|| PipelineError::UnknownEnumValue {
        field,
        value: raw.to_string(),
    })
}
