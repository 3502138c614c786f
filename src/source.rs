// Sales sources - where the analyzer's (entity, group, amount) rows come from
//
// A SalesQuery names the entity dimension (who is ranked), the group
// dimension (where ranking restarts) and optional filters. Both sources
// return the same rows for the same query.

use crate::data_quality::DataQualityEngine;
use crate::db::Order;
use crate::pareto::SalesRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

// ============================================================================
// DIMENSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityDimension {
    #[default]
    Customer,
    Product,
}

impl EntityDimension {
    pub fn column(&self) -> &'static str {
        match self {
            EntityDimension::Customer => "customer_id",
            EntityDimension::Product => "product_id",
        }
    }

    pub fn name_column(&self) -> &'static str {
        match self {
            EntityDimension::Customer => "customer_name",
            EntityDimension::Product => "product_name",
        }
    }

    pub fn key_of<'a>(&self, order: &'a Order) -> &'a str {
        match self {
            EntityDimension::Customer => &order.customer_id,
            EntityDimension::Product => &order.product_id,
        }
    }
}

impl FromStr for EntityDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(EntityDimension::Customer),
            "product" => Ok(EntityDimension::Product),
            other => Err(format!("unknown entity '{}' (expected customer or product)", other)),
        }
    }
}

impl fmt::Display for EntityDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityDimension::Customer => write!(f, "customer"),
            EntityDimension::Product => write!(f, "product"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupDimension {
    #[default]
    City,
    State,
    Country,
    Segment,
    Market,
    Region,
    Category,
    /// Single group spanning the whole table
    All,
}

/// Label used for the single group of `GroupDimension::All`
pub const ALL_GROUP: &str = "All";

impl GroupDimension {
    /// SQL expression over `sales_lines`; never user-supplied text
    pub fn column(&self) -> &'static str {
        match self {
            GroupDimension::City => "city",
            GroupDimension::State => "state",
            GroupDimension::Country => "country",
            GroupDimension::Segment => "segment",
            GroupDimension::Market => "market",
            GroupDimension::Region => "region",
            GroupDimension::Category => "category",
            GroupDimension::All => "'All'",
        }
    }

    pub fn key_of<'a>(&self, order: &'a Order) -> &'a str {
        match self {
            GroupDimension::City => &order.city,
            GroupDimension::State => &order.state,
            GroupDimension::Country => &order.country,
            GroupDimension::Segment => &order.segment,
            GroupDimension::Market => &order.market,
            GroupDimension::Region => &order.region,
            GroupDimension::Category => &order.category,
            GroupDimension::All => ALL_GROUP,
        }
    }
}

impl FromStr for GroupDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "city" => Ok(GroupDimension::City),
            "state" => Ok(GroupDimension::State),
            "country" => Ok(GroupDimension::Country),
            "segment" => Ok(GroupDimension::Segment),
            "market" => Ok(GroupDimension::Market),
            "region" => Ok(GroupDimension::Region),
            "category" => Ok(GroupDimension::Category),
            "all" => Ok(GroupDimension::All),
            other => Err(format!("unknown group '{}'", other)),
        }
    }
}

impl fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupDimension::City => "city",
            GroupDimension::State => "state",
            GroupDimension::Country => "country",
            GroupDimension::Segment => "segment",
            GroupDimension::Market => "market",
            GroupDimension::Region => "region",
            GroupDimension::Category => "category",
            GroupDimension::All => "all",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Row predicates shared by sources and reports. `None` means no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesFilter {
    pub country: Option<String>,
    pub city: Option<String>,
    pub segment: Option<String>,
    pub market: Option<String>,
    /// Inclusive
    pub from: Option<NaiveDate>,
    /// Inclusive
    pub to: Option<NaiveDate>,
}

impl SalesFilter {
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        fn same(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        same(&self.country, &order.country)
            && same(&self.city, &order.city)
            && same(&self.segment, &order.segment)
            && same(&self.market, &order.market)
            && self.from.map_or(true, |from| order.order_date >= from)
            && self.to.map_or(true, |to| order.order_date <= to)
    }

    /// WHERE clause (always present, `1 = 1` when empty) and its parameters
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut values = Vec::new();

        let text_filters = [
            ("country", &self.country),
            ("city", &self.city),
            ("segment", &self.segment),
            ("market", &self.market),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                values.push(value.clone());
                clauses.push(format!("{} = ?{}", column, values.len()));
            }
        }

        if let Some(from) = self.from {
            values.push(from.format("%Y-%m-%d").to_string());
            clauses.push(format!("order_date >= ?{}", values.len()));
        }
        if let Some(to) = self.to {
            values.push(to.format("%Y-%m-%d").to_string());
            clauses.push(format!("order_date <= ?{}", values.len()));
        }

        (clauses.join(" AND "), values)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesQuery {
    pub entity: EntityDimension,
    pub group: GroupDimension,
    pub filter: SalesFilter,
}

impl SalesQuery {
    pub fn new(entity: EntityDimension, group: GroupDimension) -> Self {
        SalesQuery {
            entity,
            group,
            filter: SalesFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: SalesFilter) -> Self {
        self.filter = filter;
        self
    }
}

// ============================================================================
// SOURCES
// ============================================================================

pub trait SalesSource {
    fn sales_records(&self, query: &SalesQuery) -> Result<Vec<SalesRecord>>;
}

/// Reads the `sales_lines` view
pub struct SqliteSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteSource { conn }
    }
}

impl SalesSource for SqliteSource<'_> {
    fn sales_records(&self, query: &SalesQuery) -> Result<Vec<SalesRecord>> {
        let (where_clause, values) = query.filter.to_sql();
        let sql = format!(
            "SELECT {}, {}, sales FROM sales_lines WHERE {} ORDER BY order_date, order_id",
            query.entity.column(),
            query.group.column(),
            where_clause
        );
        debug!(%sql, params = values.len(), "Querying sales records");

        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare sales query")?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                let entity_id: String = row.get(0)?;
                let group_id: String = row.get(1)?;
                let raw_amount: String = row.get(2)?;
                Ok((entity_id, group_id, raw_amount))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(entity_id, group_id, raw_amount)| {
                let amount = raw_amount
                    .parse::<Decimal>()
                    .with_context(|| format!("Stored sales amount is not a decimal: '{}'", raw_amount))?;
                Ok(SalesRecord {
                    entity_id,
                    group_id,
                    amount,
                })
            })
            .collect()
    }
}

/// Filters orders already in memory, e.g. straight from `load_csv`
pub struct MemorySource {
    orders: Vec<Order>,
}

impl MemorySource {
    /// Keeps the rows `insert_orders` would store: rows with critical
    /// quality issues and repeated rows are dropped.
    pub fn new(orders: Vec<Order>) -> Self {
        let engine = DataQualityEngine::new();
        let loaded = orders.len();
        let mut seen = HashSet::new();

        let orders: Vec<Order> = orders
            .into_iter()
            .filter(|order| !engine.validate(order).has_critical_issues())
            .filter(|order| seen.insert(order.compute_idempotency_hash()))
            .collect();

        if orders.len() < loaded {
            debug!(loaded, kept = orders.len(), "Dropped rejected or duplicate orders");
        }

        MemorySource { orders }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl SalesSource for MemorySource {
    fn sales_records(&self, query: &SalesQuery) -> Result<Vec<SalesRecord>> {
        Ok(self
            .orders
            .iter()
            .filter(|order| query.filter.matches(order))
            .map(|order| {
                SalesRecord::new(
                    query.entity.key_of(order),
                    query.group.key_of(order),
                    order.sales,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_order;
    use crate::db::{insert_orders, setup_database};
    use crate::pareto::ParetoAnalyzer;
    use rust_decimal_macros::dec;

    fn fixture_orders() -> Vec<Order> {
        let mut paris = sample_order(3, "AB-10015", "Paris", dec!(40));
        paris.country = "France".to_string();
        paris.market = "EU".to_string();
        paris.segment = "Corporate".to_string();

        let mut late = sample_order(4, "CG-12520", "New York City", dec!(20));
        late.order_date = NaiveDate::from_ymd_opt(2015, 6, 1).unwrap();
        late.ship_date = NaiveDate::from_ymd_opt(2015, 6, 3).unwrap();

        vec![
            sample_order(1, "CG-12520", "New York City", dec!(80.50)),
            sample_order(2, "DV-13045", "New York City", dec!(15.25)),
            paris,
            late,
        ]
    }

    fn sorted(mut records: Vec<SalesRecord>) -> Vec<SalesRecord> {
        records.sort_by(|a, b| {
            (&a.group_id, &a.entity_id, a.amount).cmp(&(&b.group_id, &b.entity_id, b.amount))
        });
        records
    }

    #[test]
    fn test_filter_to_sql() {
        let filter = SalesFilter::default()
            .country("United States")
            .between(NaiveDate::from_ymd_opt(2014, 1, 1), None);

        let (sql, values) = filter.to_sql();

        assert_eq!(sql, "1 = 1 AND country = ?1 AND order_date >= ?2");
        assert_eq!(values, vec!["United States".to_string(), "2014-01-01".to_string()]);
    }

    #[test]
    fn test_memory_source_filters() {
        let source = MemorySource::new(fixture_orders());
        let query = SalesQuery::new(EntityDimension::Customer, GroupDimension::City).with_filter(
            SalesFilter::default()
                .country("United States")
                .between(None, NaiveDate::from_ymd_opt(2014, 12, 31)),
        );

        let records = source.sales_records(&query).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.group_id == "New York City"));
    }

    #[test]
    fn test_sqlite_and_memory_sources_agree() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_orders(&conn, &fixture_orders()).unwrap();

        let sqlite = SqliteSource::new(&conn);
        let memory = MemorySource::new(fixture_orders());

        let queries = vec![
            SalesQuery::new(EntityDimension::Customer, GroupDimension::City),
            SalesQuery::new(EntityDimension::Product, GroupDimension::Segment),
            SalesQuery::new(EntityDimension::Customer, GroupDimension::All),
            SalesQuery::new(EntityDimension::Customer, GroupDimension::Market)
                .with_filter(SalesFilter::default().market("US").city("New York City")),
            SalesQuery::new(EntityDimension::Customer, GroupDimension::Country).with_filter(
                SalesFilter::default().between(
                    NaiveDate::from_ymd_opt(2015, 1, 1),
                    NaiveDate::from_ymd_opt(2015, 12, 31),
                ),
            ),
        ];

        for query in queries {
            let from_db = sorted(sqlite.sales_records(&query).unwrap());
            let from_memory = sorted(memory.sales_records(&query).unwrap());
            assert_eq!(from_db, from_memory, "sources disagree for {:?}", query);
        }
    }

    #[test]
    fn test_sources_agree_when_import_rejects_rows() {
        let mut no_quantity = sample_order(6, "DV-13045", "New York City", dec!(30));
        no_quantity.quantity = 0;

        let mut orders = fixture_orders();
        orders.push(sample_order(5, "CG-12520", "New York City", dec!(-5)));
        orders.push(no_quantity);
        orders.push(sample_order(7, "", "Paris", dec!(12)));
        orders.push(sample_order(1, "CG-12520", "New York City", dec!(80.50)));

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let summary = insert_orders(&conn, &orders).unwrap();
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.duplicates, 1);

        let memory = MemorySource::new(orders);
        assert_eq!(memory.len(), summary.inserted);

        let query = SalesQuery::new(EntityDimension::Customer, GroupDimension::City);
        let from_db = sqlite_records(&conn, &query);
        let from_memory = memory.sales_records(&query).unwrap();
        assert_eq!(sorted(from_db.clone()), sorted(from_memory.clone()));

        let analyzer = ParetoAnalyzer::new(dec!(80)).unwrap();
        let db_report = analyzer.analyze(&from_db).unwrap();
        let memory_report = analyzer.analyze(&from_memory).unwrap();
        assert!(!memory_report.has_exclusions());
        assert_eq!(db_report, memory_report);
    }

    fn sqlite_records(conn: &Connection, query: &SalesQuery) -> Vec<SalesRecord> {
        SqliteSource::new(conn).sales_records(query).unwrap()
    }

    #[test]
    fn test_pareto_over_sqlite_source() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_orders(&conn, &fixture_orders()).unwrap();

        let query = SalesQuery::new(EntityDimension::Customer, GroupDimension::All);
        let records = SqliteSource::new(&conn).sales_records(&query).unwrap();
        let report = ParetoAnalyzer::new(dec!(80)).unwrap().analyze(&records).unwrap();

        // CG-12520: 100.50 of 155.75
        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.entities[0].entity_id, "CG-12520");
        assert_eq!(report.entities[0].group_id, ALL_GROUP);
        assert_eq!(report.entities[0].total_amount, dec!(100.50));
    }

    #[test]
    fn test_dimension_parsing() {
        assert_eq!("Product".parse::<EntityDimension>().unwrap(), EntityDimension::Product);
        assert_eq!("segment".parse::<GroupDimension>().unwrap(), GroupDimension::Segment);
        assert!("planet".parse::<GroupDimension>().is_err());
        assert_eq!(GroupDimension::Category.to_string(), "category");
    }
}
