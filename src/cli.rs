//! CLI argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use superstore_analytics::{EntityDimension, GroupDimension, SalesFilter, ZeroTotalPolicy};

/// Superstore - descriptive sales reporting and Pareto analysis
#[derive(Parser)]
#[command(name = "superstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "SUPERSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database (overrides the config file)
    #[arg(long, global = true, env = "SUPERSTORE_DB")]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import the Superstore CSV export into SQLite
    Import(ImportArgs),

    /// Entities covering a cumulative share of sales within each group
    Pareto(ParetoArgs),

    /// Plain aggregate reports
    Report(ReportArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

#[derive(Args)]
pub struct ImportArgs {
    /// CSV export to import (defaults to csv_path from the config file)
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

/// Row filters shared by every analysis command
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub country: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    #[arg(long)]
    pub segment: Option<String>,

    #[arg(long)]
    pub market: Option<String>,

    /// First order date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last order date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

impl From<FilterArgs> for SalesFilter {
    fn from(args: FilterArgs) -> Self {
        SalesFilter {
            country: args.country,
            city: args.city,
            segment: args.segment,
            market: args.market,
            from: args.from,
            to: args.to,
        }
    }
}

#[derive(Args)]
pub struct ParetoArgs {
    /// Cumulative share cut, in percent (0, 100]
    #[arg(short, long)]
    pub threshold: Option<Decimal>,

    /// Ranked entity: customer or product
    #[arg(long)]
    pub entity: Option<EntityDimension>,

    /// Grouping: city, state, country, segment, market, region, category or all
    #[arg(long)]
    pub group: Option<GroupDimension>,

    /// Groups with a non-positive total: exclude (warn) or fail
    #[arg(long)]
    pub policy: Option<ZeroTotalPolicy>,

    /// Analyze a CSV export directly instead of the database
    #[arg(long, conflicts_with = "stage")]
    pub csv: Option<PathBuf>,

    /// Stage results in the session's temp table and display them from there
    #[arg(long)]
    pub stage: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub kind: ReportKind,
}

#[derive(Subcommand)]
pub enum ReportKind {
    /// Sales, profit and orders per segment (or another dimension)
    Segments {
        #[arg(long, default_value = "segment")]
        by: GroupDimension,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Sales per calendar month
    Seasonality {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Shipping cost per ship mode
    Shipping {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Largest customers or products by sales
    Top {
        #[arg(long, default_value = "customer")]
        entity: EntityDimension,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_pareto_command() {
        let cli = Cli::try_parse_from([
            "superstore",
            "pareto",
            "--threshold",
            "80",
            "--group",
            "segment",
            "--country",
            "United States",
            "--from",
            "2014-01-01",
            "--stage",
        ])
        .unwrap();

        match cli.command {
            Commands::Pareto(args) => {
                assert_eq!(args.threshold, Some(dec!(80)));
                assert_eq!(args.group, Some(GroupDimension::Segment));
                assert_eq!(args.entity, None);
                assert!(args.stage);

                let filter = SalesFilter::from(args.filter);
                assert_eq!(filter.country.as_deref(), Some("United States"));
                assert_eq!(filter.from, NaiveDate::from_ymd_opt(2014, 1, 1));
            }
            _ => panic!("expected pareto command"),
        }
    }

    #[test]
    fn test_csv_conflicts_with_stage() {
        let result = Cli::try_parse_from(["superstore", "pareto", "--csv", "x.csv", "--stage"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_report_defaults() {
        let cli = Cli::try_parse_from(["superstore", "--format", "json", "report", "top"]).unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Report(ReportArgs {
                kind: ReportKind::Top { entity, limit, .. },
            }) => {
                assert_eq!(entity, EntityDimension::Customer);
                assert_eq!(limit, 10);
            }
            _ => panic!("expected report top"),
        }
    }
}
