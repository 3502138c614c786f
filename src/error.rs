// Error types for the Pareto analyzer
//
// Caller misuse (bad threshold) is always fatal. Group-level data problems
// only surface here when the analyzer runs with `ZeroTotalPolicy::Fail`;
// otherwise they are reported as `DataQualityWarning`s next to the results.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for Pareto operations.
pub type ParetoResult<T> = Result<T, ParetoError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParetoError {
    /// Threshold outside (0, 100].
    #[error("Invalid threshold {value}: must be greater than 0 and at most 100")]
    InvalidThreshold { value: Decimal },

    /// Group total is zero or negative, so shares are undefined.
    #[error("Group '{group_id}' has non-positive total {total}; shares are undefined")]
    EmptyGroup { group_id: String, total: Decimal },

    /// A record carried a negative amount.
    #[error("Negative amount {amount} for entity '{entity_id}' in group '{group_id}'")]
    NegativeAmount {
        group_id: String,
        entity_id: String,
        amount: Decimal,
    },

    /// Summing a group's amounts left the decimal range.
    #[error("Amounts in group '{group_id}' overflow the decimal range")]
    AmountOverflow { group_id: String },
}

impl ParetoError {
    pub fn empty_group(group_id: impl Into<String>, total: Decimal) -> Self {
        Self::EmptyGroup {
            group_id: group_id.into(),
            total,
        }
    }

    /// True for errors caused by the caller rather than the data.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, ParetoError::InvalidThreshold { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = ParetoError::InvalidThreshold { value: dec!(120) };
        assert!(err.to_string().contains("120"));
        assert!(err.is_caller_error());

        let err = ParetoError::empty_group("NYC", Decimal::ZERO);
        assert!(err.to_string().contains("NYC"));
        assert!(!err.is_caller_error());

        let err = ParetoError::NegativeAmount {
            group_id: "Consumer".to_string(),
            entity_id: "AA-10315".to_string(),
            amount: dec!(-12.50),
        };
        assert!(err.to_string().contains("AA-10315"));
        assert!(err.to_string().contains("-12.50"));
        assert!(!err.is_caller_error());

        let err = ParetoError::AmountOverflow {
            group_id: "Tokyo".to_string(),
        };
        assert!(err.to_string().contains("Tokyo"));
    }

    #[test]
    fn test_error_converts_to_anyhow() {
        fn run() -> anyhow::Result<()> {
            let result: ParetoResult<()> = Err(ParetoError::InvalidThreshold { value: dec!(0) });
            result?;
            Ok(())
        }

        let err = run().unwrap_err();
        assert!(err.downcast_ref::<ParetoError>().is_some());
    }
}
