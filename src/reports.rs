// 📊 Reports - plain aggregates over the sales_lines view
//
// Totals, seasonality, shipping cost and top-N lists. Amounts here are
// display figures (REAL, rounded to cents); the exact decimal path is the
// Pareto analyzer.

use crate::source::{EntityDimension, GroupDimension, SalesFilter};
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

fn money(value: &f64) -> String {
    format!("{:.2}", value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct DimensionSales {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Sales", display_with = "money")]
    pub total_sales: f64,
    #[tabled(rename = "Profit", display_with = "money")]
    pub total_profit: f64,
    #[tabled(rename = "Orders")]
    pub order_count: i64,
    #[tabled(rename = "Lines")]
    pub line_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct MonthlySales {
    #[tabled(rename = "Month")]
    pub month: u32,
    #[tabled(rename = "Sales", display_with = "money")]
    pub total_sales: f64,
    #[tabled(rename = "Orders")]
    pub order_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct ShippingCostStat {
    #[tabled(rename = "Ship Mode")]
    pub ship_mode: String,
    #[tabled(rename = "Shipping Cost", display_with = "money")]
    pub total_shipping_cost: f64,
    #[tabled(rename = "Average", display_with = "money")]
    pub average_shipping_cost: f64,
    #[tabled(rename = "Lines")]
    pub line_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct EntitySales {
    #[tabled(rename = "ID")]
    pub entity_id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Sales", display_with = "money")]
    pub total_sales: f64,
    #[tabled(rename = "Orders")]
    pub order_count: i64,
}

/// Sales, profit and order counts per value of `dimension`, largest first
pub fn sales_by_dimension(
    conn: &Connection,
    dimension: GroupDimension,
    filter: &SalesFilter,
) -> Result<Vec<DimensionSales>> {
    let (where_clause, values) = filter.to_sql();
    let sql = format!(
        "SELECT {} AS key,
                ROUND(SUM(sales_value), 2),
                ROUND(SUM(profit_value), 2),
                COUNT(DISTINCT order_id),
                COUNT(*)
         FROM sales_lines
         WHERE {}
         GROUP BY 1
         ORDER BY 2 DESC, 1",
        dimension.column(),
        where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok(DimensionSales {
                key: row.get(0)?,
                total_sales: row.get(1)?,
                total_profit: row.get(2)?,
                order_count: row.get(3)?,
                line_count: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Sales per calendar month (1-12), summed across years
pub fn monthly_seasonality(conn: &Connection, filter: &SalesFilter) -> Result<Vec<MonthlySales>> {
    let (where_clause, values) = filter.to_sql();
    let sql = format!(
        "SELECT CAST(strftime('%m', order_date) AS INTEGER) AS month,
                ROUND(SUM(sales_value), 2),
                COUNT(DISTINCT order_id)
         FROM sales_lines
         WHERE {}
         GROUP BY 1
         ORDER BY 1",
        where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok(MonthlySales {
                month: row.get(0)?,
                total_sales: row.get(1)?,
                order_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn shipping_cost_by_mode(conn: &Connection, filter: &SalesFilter) -> Result<Vec<ShippingCostStat>> {
    let (where_clause, values) = filter.to_sql();
    let sql = format!(
        "SELECT ship_mode,
                ROUND(SUM(shipping_cost_value), 2),
                ROUND(AVG(shipping_cost_value), 2),
                COUNT(*)
         FROM sales_lines
         WHERE {}
         GROUP BY ship_mode
         ORDER BY 2 DESC, 1",
        where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok(ShippingCostStat {
                ship_mode: row.get(0)?,
                total_shipping_cost: row.get(1)?,
                average_shipping_cost: row.get(2)?,
                line_count: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Largest `limit` customers or products by sales
pub fn top_entities(
    conn: &Connection,
    entity: EntityDimension,
    limit: usize,
    filter: &SalesFilter,
) -> Result<Vec<EntitySales>> {
    let (where_clause, mut values) = filter.to_sql();
    values.push(limit.to_string());
    let sql = format!(
        "SELECT {id}, MAX({name}),
                ROUND(SUM(sales_value), 2),
                COUNT(DISTINCT order_id)
         FROM sales_lines
         WHERE {where_clause}
         GROUP BY {id}
         ORDER BY 3 DESC, 1
         LIMIT CAST(?{limit_param} AS INTEGER)",
        id = entity.column(),
        name = entity.name_column(),
        where_clause = where_clause,
        limit_param = values.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok(EntitySales {
                entity_id: row.get(0)?,
                name: row.get(1)?,
                total_sales: row.get(2)?,
                order_count: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
