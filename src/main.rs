use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;

use superstore_analytics::{
    get_staged_results, init_tracing, insert_orders, load_csv, monthly_seasonality, open_database,
    run_pareto, sales_by_dimension, setup_database, shipping_cost_by_mode, stage_pareto_results,
    top_entities, verify_count, AppConfig, DataQualityEngine, MemorySource, ParetoAnalyzer,
    SalesFilter, SalesQuery, SqliteSource,
};

mod cli;
mod output;

use cli::{Cli, Commands, ImportArgs, OutputFormat, ParetoArgs, ReportArgs, ReportKind};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(if cli.quiet { "warn" } else { "info" });

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let format = cli.format;

    match cli.command {
        Commands::Import(args) => run_import(&config, args)?,
        Commands::Pareto(args) => run_pareto_command(&config, args, format)?,
        Commands::Report(args) => run_report(&config, args, format)?,
    }

    Ok(())
}

fn run_import(config: &AppConfig, args: ImportArgs) -> Result<()> {
    println!("🗄️  Data Import - Global Superstore CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let csv_path = args
        .csv
        .or_else(|| config.csv_path.clone())
        .context("No CSV given: pass --csv or set csv_path in the config file")?;

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let orders = load_csv(&csv_path)?;
    println!("✓ Loaded {} order lines from {}", orders.len(), csv_path.display());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    setup_database(&conn)?;
    println!("✓ Database initialized at {}", config.database_path.display());

    // 3. Check row quality
    println!("\n✅ Checking data quality...");
    let engine = DataQualityEngine::new();
    let quality = engine.batch_summary(&engine.validate_batch(&orders));
    println!("✓ Clean rows: {}", quality.clean_rows);
    if quality.rows_with_warnings > 0 {
        println!("⚠️  Rows with warnings: {}", quality.rows_with_warnings);
    }
    if quality.rows_with_critical > 0 {
        println!("⚠️  Rows with critical issues: {}", quality.rows_with_critical);
    }

    // 4. Insert orders
    println!("\n💾 Inserting orders...");
    let summary = insert_orders(&conn, &orders)?;
    println!("✓ Inserted: {} order lines", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.duplicates);
    if summary.rejected > 0 {
        println!("⚠️  Rejected (critical quality issues): {}", summary.rejected);
    }

    // 5. Verify count
    println!("\n🔍 Verifying database...");
    let count = verify_count(&conn)?;
    println!("✓ Database contains {} order lines", count);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Import complete");

    Ok(())
}

fn run_pareto_command(config: &AppConfig, args: ParetoArgs, format: OutputFormat) -> Result<()> {
    let defaults = &config.pareto;

    let analyzer = ParetoAnalyzer::new(args.threshold.unwrap_or(defaults.threshold))?
        .with_policy(args.policy.unwrap_or(defaults.zero_total_policy));

    let query = SalesQuery::new(
        args.entity.unwrap_or(defaults.entity),
        args.group.unwrap_or(defaults.group),
    )
    .with_filter(SalesFilter::from(args.filter));

    if let Some(csv_path) = args.csv {
        let source = MemorySource::new(load_csv(&csv_path)?);
        let report = run_pareto(&source, &query, &analyzer)?;
        return output::print_pareto(&report.entities, &report, format);
    }

    let conn = open_database(&config.database_path)?;
    let source = SqliteSource::new(&conn);
    let report = run_pareto(&source, &query, &analyzer)?;

    if args.stage {
        stage_pareto_results(&conn, &report)?;
        let staged = get_staged_results(&conn)?;
        output::print_pareto(&staged, &report, format)
    } else {
        output::print_pareto(&report.entities, &report, format)
    }
}

fn run_report(config: &AppConfig, args: ReportArgs, format: OutputFormat) -> Result<()> {
    let conn = open_database(&config.database_path)?;

    match args.kind {
        ReportKind::Segments { by, filter } => {
            let rows = sales_by_dimension(&conn, by, &SalesFilter::from(filter))?;
            output::print_output(&rows, format)
        }
        ReportKind::Seasonality { filter } => {
            let rows = monthly_seasonality(&conn, &SalesFilter::from(filter))?;
            output::print_output(&rows, format)
        }
        ReportKind::Shipping { filter } => {
            let rows = shipping_cost_by_mode(&conn, &SalesFilter::from(filter))?;
            output::print_output(&rows, format)
        }
        ReportKind::Top {
            entity,
            limit,
            filter,
        } => {
            let rows = top_entities(&conn, entity, limit, &SalesFilter::from(filter))?;
            output::print_output(&rows, format)
        }
    }
}
