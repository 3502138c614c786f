// Superstore Analytics - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod data_quality;
pub mod db;
pub mod error;
pub mod pareto;
pub mod reports;
pub mod source;

// Re-export commonly used types
pub use config::{AppConfig, ParetoConfig};
pub use data_quality::{
    BatchSummary, DataQualityEngine, DataQualityWarning, QualityIssue, QualityReport, Severity,
    WarningReason,
};
pub use db::{
    Order, ImportSummary,
    load_csv, setup_database, insert_orders, verify_count, get_all_orders,
    stage_pareto_results, get_staged_results,
};
pub use error::{ParetoError, ParetoResult};
pub use pareto::{
    EntityAggregate, GroupTotal, ParetoAnalyzer, ParetoReport, RankedEntity, RankedGroup,
    Ranking, SalesRecord, ZeroTotalPolicy,
};
pub use reports::{
    DimensionSales, EntitySales, MonthlySales, ShippingCostStat,
    monthly_seasonality, sales_by_dimension, shipping_cost_by_mode, top_entities,
};
pub use source::{
    EntityDimension, GroupDimension, MemorySource, SalesFilter, SalesQuery, SalesSource,
    SqliteSource,
};

use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the stderr `tracing` subscriber; `RUST_LOG` overrides `default_filter`
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Ignore the error when a subscriber is already installed (tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the records described by `query` and run the analyzer over them
pub fn run_pareto(
    source: &dyn SalesSource,
    query: &SalesQuery,
    analyzer: &ParetoAnalyzer,
) -> anyhow::Result<ParetoReport> {
    let records = source.sales_records(query)?;
    tracing::info!(
        records = records.len(),
        entity = %query.entity,
        group = %query.group,
        threshold = %analyzer.threshold(),
        "Running Pareto analysis"
    );
    Ok(analyzer.analyze(&records)?)
}

/// Open an existing database, making sure schema and view are in place
pub fn open_database(path: &std::path::Path) -> anyhow::Result<Connection> {
    use anyhow::Context;

    if !path.exists() {
        anyhow::bail!(
            "Database not found at {} (run `superstore import` first)",
            path.display()
        );
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}
