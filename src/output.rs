//! Output formatting utilities.

use rust_decimal::Decimal;
use serde::Serialize;
use superstore_analytics::{DataQualityWarning, ParetoReport, RankedEntity};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::cli::OutputFormat;

/// Display row for one ranked entity (amounts rounded to 2 dp)
#[derive(Debug, Serialize, Tabled)]
pub struct ParetoRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Entity")]
    pub entity: String,
    #[tabled(rename = "Sales")]
    pub sales: String,
    #[tabled(rename = "Share %")]
    pub share: String,
    #[tabled(rename = "Cumulative %")]
    pub cumulative_share: String,
}

fn two_dp(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

impl From<&RankedEntity> for ParetoRow {
    fn from(entity: &RankedEntity) -> Self {
        ParetoRow {
            group: entity.group_id.clone(),
            rank: entity.rank,
            entity: entity.entity_id.clone(),
            sales: two_dp(entity.total_amount),
            share: two_dp(entity.share),
            cumulative_share: two_dp(entity.cumulative_share),
        }
    }
}

/// Formats and prints output based on the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => print_table(data),
        OutputFormat::Json => print_json(data),
        OutputFormat::Csv => print_csv(data),
    }
}

/// Prints the Pareto rows, then any excluded groups.
/// JSON prints the full report instead of the rows.
pub fn print_pareto(
    entities: &[RankedEntity],
    report: &ParetoReport,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let rows: Vec<ParetoRow> = entities.iter().map(ParetoRow::from).collect();
    print_output(&rows, format)?;

    if format == OutputFormat::Table {
        println!("\n{}", report.summary());
        print_warnings(&report.excluded);
    } else {
        // Keep CSV on stdout clean
        for warning in &report.excluded {
            eprintln!("⚠️  {}", warning.summary());
        }
    }

    Ok(())
}

fn print_warnings(warnings: &[DataQualityWarning]) {
    if warnings.is_empty() {
        return;
    }

    println!("\n⚠️  Excluded groups ({}):", warnings.len());
    for warning in warnings {
        println!("   • {}", warning.summary());
    }
}

/// Prints data as a formatted table.
fn print_table<T: Tabled>(data: &[T]) -> anyhow::Result<()> {
    if data.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let table = Table::new(data)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::left()))
        .to_string();

    println!("{}", table);
    Ok(())
}

/// Prints data as JSON.
fn print_json<T: Serialize>(data: &[T]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Prints data as CSV.
fn print_csv<T: Serialize>(data: &[T]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for item in data {
        wtr.serialize(item)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pareto_row_rounds() {
        let entity = RankedEntity {
            group_id: "Consumer".to_string(),
            entity_id: "SM-20320".to_string(),
            total_amount: dec!(25043.05),
            rank: 1,
            share: dec!(1.234567),
            cumulative_share: dec!(33.333333333),
        };

        let row = ParetoRow::from(&entity);

        assert_eq!(row.sales, "25043.05");
        assert_eq!(row.share, "1.23");
        assert_eq!(row.cumulative_share, "33.33");
    }
}
