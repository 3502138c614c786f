// ✅ Data Quality - order row checks and per-group analysis warnings
//
// Two kinds of findings live here:
//   * QualityReport      - per-row checks run while importing the CSV export
//   * DataQualityWarning - a group the Pareto analyzer had to leave out

use crate::db::Order;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// GROUP WARNINGS (emitted by the Pareto analyzer)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    /// Group total is zero or negative
    NonPositiveTotal,
    /// At least one record in the group had a negative amount
    NegativeAmount,
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningReason::NonPositiveTotal => write!(f, "group total is not positive"),
            WarningReason::NegativeAmount => write!(f, "group contains a negative amount"),
        }
    }
}

/// A group excluded from the results, reported next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub group_id: String,
    pub group_total: Decimal,
    pub entity_count: usize,
    pub reason: WarningReason,
}

impl DataQualityWarning {
    pub fn new(
        group_id: impl Into<String>,
        group_total: Decimal,
        entity_count: usize,
        reason: WarningReason,
    ) -> Self {
        DataQualityWarning {
            group_id: group_id.into(),
            group_total,
            entity_count,
            reason,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Group '{}' excluded: {} (total {}, {} entities)",
            self.group_id,
            self.reason,
            self.group_total.round_dp(2),
            self.entity_count
        )
    }
}

// ============================================================================
// ROW VALIDATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Row cannot be used for analysis
    Warning,  // Row is questionable but usable
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub row_id: i64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
}

impl QualityReport {
    pub fn has_critical_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::Critical)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub clean_rows: usize,
    pub rows_with_warnings: usize,
    pub rows_with_critical: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DataQualityEngine;

impl DataQualityEngine {
    pub fn new() -> Self {
        DataQualityEngine
    }

    /// Validate one order line
    pub fn validate(&self, order: &Order) -> QualityReport {
        let validations = vec![
            self.validate_identifier("order_id", &order.order_id),
            self.validate_identifier("customer_id", &order.customer_id),
            self.validate_identifier("product_id", &order.product_id),
            self.validate_sales(order.sales),
            self.validate_quantity(order.quantity),
            self.validate_discount(order.discount),
            self.validate_ship_date(order),
        ];

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                severity: v.severity,
                field: v.field.clone(),
                issue: v.message.clone(),
            })
            .collect();

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;

        QualityReport {
            row_id: order.row_id,
            validations,
            issues,
            passed_count,
            failed_count,
        }
    }

    pub fn validate_batch(&self, orders: &[Order]) -> Vec<QualityReport> {
        orders.iter().map(|o| self.validate(o)).collect()
    }

    pub fn batch_summary(&self, reports: &[QualityReport]) -> BatchSummary {
        let rows_with_critical = reports.iter().filter(|r| r.has_critical_issues()).count();
        let clean_rows = reports.iter().filter(|r| r.is_clean()).count();

        BatchSummary {
            total_rows: reports.len(),
            clean_rows,
            rows_with_warnings: reports.len() - clean_rows - rows_with_critical,
            rows_with_critical,
        }
    }

    // ========================================================================
    // VALIDATION RULES
    // ========================================================================

    fn validate_identifier(&self, field: &str, value: &str) -> ValidationResult {
        if value.trim().is_empty() {
            return ValidationResult::fail(
                "identifier_not_empty",
                field,
                &format!("{} is empty", field),
                Severity::Critical,
            );
        }

        ValidationResult::pass("identifier_not_empty", field, "Identifier present")
    }

    fn validate_sales(&self, sales: Decimal) -> ValidationResult {
        if sales < Decimal::ZERO {
            return ValidationResult::fail(
                "sales_non_negative",
                "sales",
                &format!("Sales amount is negative: {}", sales),
                Severity::Critical,
            );
        }

        if sales.is_zero() {
            return ValidationResult::fail(
                "sales_non_zero",
                "sales",
                "Sales amount is zero",
                Severity::Warning,
            );
        }

        ValidationResult::pass("sales_valid", "sales", "Sales amount is valid")
    }

    fn validate_quantity(&self, quantity: i64) -> ValidationResult {
        if quantity <= 0 {
            return ValidationResult::fail(
                "quantity_positive",
                "quantity",
                &format!("Quantity must be positive, got {}", quantity),
                Severity::Critical,
            );
        }

        ValidationResult::pass("quantity_positive", "quantity", "Quantity is positive")
    }

    fn validate_discount(&self, discount: Decimal) -> ValidationResult {
        if discount < Decimal::ZERO || discount > Decimal::ONE {
            return ValidationResult::fail(
                "discount_range",
                "discount",
                &format!("Discount {} outside [0, 1]", discount),
                Severity::Warning,
            );
        }

        ValidationResult::pass("discount_range", "discount", "Discount within range")
    }

    fn validate_ship_date(&self, order: &Order) -> ValidationResult {
        if order.ship_date < order.order_date {
            return ValidationResult::fail(
                "ship_after_order",
                "ship_date",
                &format!(
                    "Ship date {} precedes order date {}",
                    order.ship_date, order.order_date
                ),
                Severity::Warning,
            );
        }

        ValidationResult::pass("ship_after_order", "ship_date", "Ship date follows order date")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_order;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_clean_order() {
        let engine = DataQualityEngine::new();
        let order = sample_order(1, "CG-12520", "New York City", dec!(261.96));

        let report = engine.validate(&order);

        assert!(report.is_clean());
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.passed_count, report.validations.len());
    }

    #[test]
    fn test_validate_negative_sales_is_critical() {
        let engine = DataQualityEngine::new();
        let order = sample_order(2, "CG-12520", "New York City", dec!(-5));

        let report = engine.validate(&order);

        assert!(report.has_critical_issues());
        assert_eq!(report.issues[0].field, "sales");
    }

    #[test]
    fn test_validate_zero_sales_is_warning() {
        let engine = DataQualityEngine::new();
        let order = sample_order(3, "CG-12520", "New York City", dec!(0));

        let report = engine.validate(&order);

        assert!(!report.is_clean());
        assert!(!report.has_critical_issues());
    }

    #[test]
    fn test_validate_empty_customer_and_bad_ship_date() {
        let engine = DataQualityEngine::new();
        let mut order = sample_order(4, "", "Paris", dec!(10));
        order.ship_date = NaiveDate::from_ymd_opt(2013, 12, 31).unwrap();

        let report = engine.validate(&order);

        assert!(report.has_critical_issues());
        assert!(report.issues.iter().any(|i| i.field == "customer_id"));
        assert!(report.issues.iter().any(|i| i.field == "ship_date"));
    }

    #[test]
    fn test_batch_summary() {
        let engine = DataQualityEngine::new();
        let mut discounted = sample_order(3, "BH-11710", "Paris", dec!(12));
        discounted.discount = dec!(1.5);

        let orders = vec![
            sample_order(1, "CG-12520", "Paris", dec!(100)),
            sample_order(2, "CG-12520", "Paris", dec!(-1)),
            discounted,
        ];

        let reports = engine.validate_batch(&orders);
        let summary = engine.batch_summary(&reports);

        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.clean_rows, 1);
        assert_eq!(summary.rows_with_critical, 1);
        assert_eq!(summary.rows_with_warnings, 1);
    }

    #[test]
    fn test_warning_summary() {
        let warning =
            DataQualityWarning::new("Lagos", Decimal::ZERO, 1, WarningReason::NonPositiveTotal);

        let text = warning.summary();
        assert!(text.contains("Lagos"));
        assert!(text.contains("not positive"));
    }
}
