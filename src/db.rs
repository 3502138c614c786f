use crate::data_quality::DataQualityEngine;
use crate::pareto::{ParetoReport, RankedEntity};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// One line of the Global Superstore export.
/// Header names follow the published CSV.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Order {
    #[serde(rename = "Row ID")]
    pub row_id: i64,

    #[serde(rename = "Order ID")]
    pub order_id: String,

    #[serde(rename = "Order Date", deserialize_with = "deserialize_date")]
    pub order_date: NaiveDate,

    #[serde(rename = "Ship Date", deserialize_with = "deserialize_date")]
    pub ship_date: NaiveDate,

    #[serde(rename = "Ship Mode")]
    pub ship_mode: String,

    #[serde(rename = "Customer ID")]
    pub customer_id: String,

    #[serde(rename = "Customer Name")]
    pub customer_name: String,

    #[serde(rename = "Segment")]
    pub segment: String,

    #[serde(rename = "City")]
    pub city: String,

    #[serde(rename = "State")]
    pub state: String,

    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Postal Code", default)]
    pub postal_code: Option<String>,

    #[serde(rename = "Market")]
    pub market: String,

    #[serde(rename = "Region")]
    pub region: String,

    #[serde(rename = "Product ID")]
    pub product_id: String,

    #[serde(rename = "Category")]
    pub category: String,

    #[serde(rename = "Sub-Category")]
    pub sub_category: String,

    #[serde(rename = "Product Name")]
    pub product_name: String,

    // ========================================================================
    // AMOUNTS (exact decimals - stored as text, never as REAL)
    // ========================================================================
    #[serde(rename = "Sales", deserialize_with = "deserialize_amount")]
    pub sales: Decimal,

    #[serde(rename = "Quantity")]
    pub quantity: i64,

    #[serde(rename = "Discount", deserialize_with = "deserialize_amount")]
    pub discount: Decimal,

    #[serde(rename = "Profit", deserialize_with = "deserialize_amount")]
    pub profit: Decimal,

    #[serde(rename = "Shipping Cost", deserialize_with = "deserialize_amount")]
    pub shipping_cost: Decimal,

    #[serde(rename = "Order Priority")]
    pub order_priority: String,
}

impl Order {
    /// Compute idempotency hash for duplicate detection on re-import
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.row_id, self.order_id, self.product_id, self.customer_id, self.sales
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Accepts MM/DD/YYYY, DD-MM-YYYY and YYYY-MM-DD (all seen in Superstore exports)
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    Err(anyhow!("Unrecognized date format: '{}'", raw))
}

/// Parses "1,234.50", "$12.5" or "-3.2" into an exact decimal
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .with_context(|| format!("Invalid amount: '{}'", raw))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_amount(&raw).map_err(serde::de::Error::custom)
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            row_id INTEGER NOT NULL,
            order_id TEXT NOT NULL,
            order_date TEXT NOT NULL,
            ship_date TEXT NOT NULL,
            ship_mode TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            segment TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            country TEXT NOT NULL,
            postal_code TEXT,
            market TEXT NOT NULL,
            region TEXT NOT NULL,
            product_id TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_category TEXT NOT NULL,
            product_name TEXT NOT NULL,
            sales TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            discount TEXT NOT NULL,
            profit TEXT NOT NULL,
            shipping_cost TEXT NOT NULL,
            order_priority TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_date ON orders(order_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_location ON orders(country, city)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)",
        [],
    )?;

    // ==========================================================================
    // sales_lines view: the flat shape every report and source reads from.
    // Exact text amounts are kept next to REAL copies used for SQL aggregates.
    // ==========================================================================
    conn.execute(
        "CREATE VIEW IF NOT EXISTS sales_lines AS
         SELECT
            order_id,
            order_date,
            ship_date,
            ship_mode,
            customer_id,
            customer_name,
            segment,
            city,
            state,
            country,
            market,
            region,
            product_id,
            product_name,
            category,
            sub_category,
            order_priority,
            quantity,
            sales,
            CAST(sales AS REAL) AS sales_value,
            CAST(profit AS REAL) AS profit_value,
            CAST(shipping_cost AS REAL) AS shipping_cost_value
         FROM orders",
        [],
    )?;

    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn load_csv(csv_path: &Path) -> Result<Vec<Order>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut orders = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        // +2: header line plus 1-based numbering
        let order: Order =
            result.with_context(|| format!("Failed to deserialize order at line {}", line + 2))?;
        orders.push(order);
    }

    info!(rows = orders.len(), path = %csv_path.display(), "Loaded CSV");

    Ok(orders)
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Insert orders, skipping rows already present and rows with critical
/// quality issues
pub fn insert_orders(conn: &Connection, orders: &[Order]) -> Result<ImportSummary> {
    let engine = DataQualityEngine::new();
    let mut summary = ImportSummary::default();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO orders (
                idempotency_hash, row_id, order_id, order_date, ship_date, ship_mode,
                customer_id, customer_name, segment, city, state, country, postal_code,
                market, region, product_id, category, sub_category, product_name,
                sales, quantity, discount, profit, shipping_cost, order_priority
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        )?;

        for order in orders {
            let report = engine.validate(order);
            if report.has_critical_issues() {
                warn!(row_id = order.row_id, issues = ?report.issues, "Rejecting order row");
                summary.rejected += 1;
                continue;
            }

            let result = stmt.execute(params![
                order.compute_idempotency_hash(),
                order.row_id,
                order.order_id,
                order.order_date.format("%Y-%m-%d").to_string(),
                order.ship_date.format("%Y-%m-%d").to_string(),
                order.ship_mode,
                order.customer_id,
                order.customer_name,
                order.segment,
                order.city,
                order.state,
                order.country,
                order.postal_code,
                order.market,
                order.region,
                order.product_id,
                order.category,
                order.sub_category,
                order.product_name,
                order.sales.to_string(),
                order.quantity,
                order.discount.to_string(),
                order.profit.to_string(),
                order.shipping_cost.to_string(),
                order.order_priority,
            ]);

            match result {
                Ok(_) => summary.inserted += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    summary.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    tx.commit()?;

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "Import finished"
    );

    Ok(summary)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
    Ok(count)
}

pub fn get_all_orders(conn: &Connection) -> Result<Vec<Order>> {
    let mut stmt = conn.prepare(
        "SELECT row_id, order_id, order_date, ship_date, ship_mode,
                customer_id, customer_name, segment, city, state, country, postal_code,
                market, region, product_id, category, sub_category, product_name,
                sales, quantity, discount, profit, shipping_cost, order_priority
         FROM orders
         ORDER BY row_id",
    )?;

    let orders = stmt
        .query_map([], |row| {
            Ok(Order {
                row_id: row.get(0)?,
                order_id: row.get(1)?,
                order_date: date_column(row, 2)?,
                ship_date: date_column(row, 3)?,
                ship_mode: row.get(4)?,
                customer_id: row.get(5)?,
                customer_name: row.get(6)?,
                segment: row.get(7)?,
                city: row.get(8)?,
                state: row.get(9)?,
                country: row.get(10)?,
                postal_code: row.get(11)?,
                market: row.get(12)?,
                region: row.get(13)?,
                product_id: row.get(14)?,
                category: row.get(15)?,
                sub_category: row.get(16)?,
                product_name: row.get(17)?,
                sales: decimal_column(row, 18)?,
                quantity: row.get(19)?,
                discount: decimal_column(row, 20)?,
                profit: decimal_column(row, 21)?,
                shipping_cost: decimal_column(row, 22)?,
                order_priority: row.get(23)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(orders)
}

// ============================================================================
// STAGING (session-scoped temp table)
// ============================================================================

/// Replace the contents of `temp.pareto_results` with the report rows
pub fn stage_pareto_results(conn: &Connection, report: &ParetoReport) -> Result<usize> {
    conn.execute("DROP TABLE IF EXISTS temp.pareto_results", [])?;
    conn.execute(
        "CREATE TEMP TABLE pareto_results (
            position INTEGER PRIMARY KEY,
            group_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            total_amount TEXT NOT NULL,
            share TEXT NOT NULL,
            cumulative_share TEXT NOT NULL
        )",
        [],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO temp.pareto_results
            (position, group_id, entity_id, rank, total_amount, share, cumulative_share)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for (position, entity) in report.entities.iter().enumerate() {
        stmt.execute(params![
            position as i64,
            entity.group_id,
            entity.entity_id,
            entity.rank as i64,
            entity.total_amount.to_string(),
            entity.share.to_string(),
            entity.cumulative_share.to_string(),
        ])?;
    }

    debug!(rows = report.entities.len(), "Staged Pareto results");

    Ok(report.entities.len())
}

pub fn get_staged_results(conn: &Connection) -> Result<Vec<RankedEntity>> {
    let mut stmt = conn
        .prepare(
            "SELECT group_id, entity_id, rank, total_amount, share, cumulative_share
             FROM temp.pareto_results
             ORDER BY position",
        )
        .context("No staged Pareto results in this session")?;

    let rows = stmt
        .query_map([], |row| {
            let rank: i64 = row.get(2)?;
            Ok(RankedEntity {
                group_id: row.get(0)?,
                entity_id: row.get(1)?,
                rank: rank as usize,
                total_amount: decimal_column(row, 3)?,
                share: decimal_column(row, 4)?,
                cumulative_share: decimal_column(row, 5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
