// 📈 Pareto Analyzer - cumulative share of sales within each group
//
// For every group (city, segment, ...) entities are ranked by total amount:
//
//   share            = 100 * entity_total / group_total
//   cumulative_share = running sum of share, amount DESC then entity_id ASC
//
// and only the prefix with cumulative_share <= threshold is reported.
// Groups whose total is not positive are excluded and reported as
// DataQualityWarning, or fail the run under ZeroTotalPolicy::Fail.

use crate::data_quality::{DataQualityWarning, WarningReason};
use crate::error::{ParetoError, ParetoResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const HUNDRED: Decimal = dec!(100);

/// Default cut used by the reports: the classic 80/20.
pub const DEFAULT_THRESHOLD: Decimal = dec!(80);

// ============================================================================
// INPUT / DERIVED ROWS
// ============================================================================

/// One input row: an amount attributed to an entity inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub entity_id: String,
    pub group_id: String,
    pub amount: Decimal,
}

impl SalesRecord {
    pub fn new(entity_id: impl Into<String>, group_id: impl Into<String>, amount: Decimal) -> Self {
        SalesRecord {
            entity_id: entity_id.into(),
            group_id: group_id.into(),
            amount,
        }
    }
}

/// Sum of amounts for one (group, entity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAggregate {
    pub group_id: String,
    pub entity_id: String,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub group_id: String,
    pub total_amount: Decimal,
    pub entity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub group_id: String,
    pub entity_id: String,
    pub total_amount: Decimal,
    /// 1-based position inside the group
    pub rank: usize,
    /// Percentage of the group total
    pub share: Decimal,
    pub cumulative_share: Decimal,
}

/// What to do with a group whose shares cannot be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroTotalPolicy {
    /// Skip the group and report it as a warning
    #[default]
    Exclude,
    /// Abort the whole analysis
    Fail,
}

impl FromStr for ZeroTotalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" => Ok(ZeroTotalPolicy::Exclude),
            "fail" => Ok(ZeroTotalPolicy::Fail),
            other => Err(format!("unknown zero-total policy '{}' (expected exclude or fail)", other)),
        }
    }
}

impl fmt::Display for ZeroTotalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZeroTotalPolicy::Exclude => write!(f, "exclude"),
            ZeroTotalPolicy::Fail => write!(f, "fail"),
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Every entity of one group, ranked, before the threshold cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub total: GroupTotal,
    pub entities: Vec<RankedEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub groups: Vec<RankedGroup>,
    pub excluded: Vec<DataQualityWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoReport {
    pub threshold: Decimal,
    /// Ordered by group_id, then cumulative_share
    pub entities: Vec<RankedEntity>,
    pub excluded: Vec<DataQualityWarning>,
    pub groups_analyzed: usize,
    pub entities_ranked: usize,
}

impl ParetoReport {
    /// Distinct group ids present in the results, in report order
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for entity in &self.entities {
            if groups.last() != Some(&entity.group_id.as_str()) {
                groups.push(&entity.group_id);
            }
        }
        groups
    }

    pub fn entities_in(&self, group_id: &str) -> Vec<&RankedEntity> {
        self.entities
            .iter()
            .filter(|e| e.group_id == group_id)
            .collect()
    }

    pub fn has_exclusions(&self) -> bool {
        !self.excluded.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Pareto {}%: {} of {} entities across {} groups ({} groups excluded)",
            self.threshold,
            self.entities.len(),
            self.entities_ranked,
            self.groups_analyzed,
            self.excluded.len()
        )
    }
}

// ============================================================================
// ANALYZER
// ============================================================================

#[derive(Default)]
struct GroupBucket {
    entities: BTreeMap<String, Decimal>,
    first_negative: Option<(String, Decimal)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParetoAnalyzer {
    threshold: Decimal,
    policy: ZeroTotalPolicy,
}

impl ParetoAnalyzer {
    /// Threshold is a percentage in (0, 100].
    pub fn new(threshold: Decimal) -> ParetoResult<Self> {
        if threshold <= Decimal::ZERO || threshold > HUNDRED {
            return Err(ParetoError::InvalidThreshold { value: threshold });
        }

        Ok(ParetoAnalyzer {
            threshold,
            policy: ZeroTotalPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: ZeroTotalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn policy(&self) -> ZeroTotalPolicy {
        self.policy
    }

    /// Sum amounts per (group, entity), ordered by group then entity.
    pub fn aggregate<'a, I>(records: I) -> ParetoResult<Vec<EntityAggregate>>
    where
        I: IntoIterator<Item = &'a SalesRecord>,
    {
        Ok(Self::bucket(records)?
            .into_iter()
            .flat_map(|(group_id, bucket)| {
                bucket
                    .entities
                    .into_iter()
                    .map(move |(entity_id, total_amount)| EntityAggregate {
                        group_id: group_id.clone(),
                        entity_id,
                        total_amount,
                    })
            })
            .collect())
    }

    /// Sum aggregates per group, ordered by group.
    pub fn group_totals(aggregates: &[EntityAggregate]) -> ParetoResult<Vec<GroupTotal>> {
        let mut totals: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
        for aggregate in aggregates {
            let entry = totals
                .entry(aggregate.group_id.as_str())
                .or_insert((Decimal::ZERO, 0));
            entry.0 = checked_sum(entry.0, aggregate.total_amount, &aggregate.group_id)?;
            entry.1 += 1;
        }

        Ok(totals
            .into_iter()
            .map(|(group_id, (total_amount, entity_count))| GroupTotal {
                group_id: group_id.to_string(),
                total_amount,
                entity_count,
            })
            .collect())
    }

    /// Rank every entity of every usable group, without the threshold cut.
    pub fn rank<'a, I>(&self, records: I) -> ParetoResult<Ranking>
    where
        I: IntoIterator<Item = &'a SalesRecord>,
    {
        let mut groups = Vec::new();
        let mut excluded = Vec::new();

        for (group_id, bucket) in Self::bucket(records)? {
            let total = bucket
                .entities
                .values()
                .try_fold(Decimal::ZERO, |acc, amount| checked_sum(acc, *amount, &group_id))?;
            let entity_count = bucket.entities.len();

            if let Some((entity_id, amount)) = bucket.first_negative {
                if self.policy == ZeroTotalPolicy::Fail {
                    return Err(ParetoError::NegativeAmount {
                        group_id,
                        entity_id,
                        amount,
                    });
                }
                warn!(group = %group_id, entity = %entity_id, %amount, "Excluding group with negative amount");
                excluded.push(DataQualityWarning::new(
                    group_id,
                    total,
                    entity_count,
                    WarningReason::NegativeAmount,
                ));
                continue;
            }

            if total <= Decimal::ZERO {
                if self.policy == ZeroTotalPolicy::Fail {
                    return Err(ParetoError::empty_group(group_id, total));
                }
                warn!(group = %group_id, %total, "Excluding group with non-positive total");
                excluded.push(DataQualityWarning::new(
                    group_id,
                    total,
                    entity_count,
                    WarningReason::NonPositiveTotal,
                ));
                continue;
            }

            let mut ordered: Vec<(String, Decimal)> = bucket.entities.into_iter().collect();
            ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            // Running share is taken from the running amount so the last
            // entity lands on exactly 100.
            let mut running = Decimal::ZERO;
            let entities: Vec<RankedEntity> = ordered
                .into_iter()
                .enumerate()
                .map(|(idx, (entity_id, amount))| {
                    running += amount;
                    RankedEntity {
                        group_id: group_id.clone(),
                        entity_id,
                        total_amount: amount,
                        rank: idx + 1,
                        share: percent_of(amount, total),
                        cumulative_share: percent_of(running, total),
                    }
                })
                .collect();

            debug!(group = %group_id, %total, entities = entity_count, "Ranked group");

            groups.push(RankedGroup {
                total: GroupTotal {
                    group_id,
                    total_amount: total,
                    entity_count,
                },
                entities,
            });
        }

        Ok(Ranking { groups, excluded })
    }

    /// Rank, then keep entities with cumulative_share <= threshold.
    pub fn analyze<'a, I>(&self, records: I) -> ParetoResult<ParetoReport>
    where
        I: IntoIterator<Item = &'a SalesRecord>,
    {
        let ranking = self.rank(records)?;

        let groups_analyzed = ranking.groups.len();
        let entities_ranked = ranking.groups.iter().map(|g| g.entities.len()).sum();

        let entities: Vec<RankedEntity> = ranking
            .groups
            .into_iter()
            .flat_map(|group| group.entities)
            .filter(|e| e.cumulative_share <= self.threshold)
            .collect();

        let report = ParetoReport {
            threshold: self.threshold,
            entities,
            excluded: ranking.excluded,
            groups_analyzed,
            entities_ranked,
        };

        info!("{}", report.summary());

        Ok(report)
    }

    fn bucket<'a, I>(records: I) -> ParetoResult<BTreeMap<String, GroupBucket>>
    where
        I: IntoIterator<Item = &'a SalesRecord>,
    {
        let mut buckets: BTreeMap<String, GroupBucket> = BTreeMap::new();

        for record in records {
            let bucket = buckets.entry(record.group_id.clone()).or_default();
            if record.amount < Decimal::ZERO && bucket.first_negative.is_none() {
                bucket.first_negative = Some((record.entity_id.clone(), record.amount));
            }
            let sum = bucket
                .entities
                .entry(record.entity_id.clone())
                .or_insert(Decimal::ZERO);
            *sum = checked_sum(*sum, record.amount, &record.group_id)?;
        }

        Ok(buckets)
    }
}

fn checked_sum(acc: Decimal, amount: Decimal, group_id: &str) -> ParetoResult<Decimal> {
    acc.checked_add(amount)
        .ok_or_else(|| ParetoError::AmountOverflow {
            group_id: group_id.to_string(),
        })
}

/// `100 * part / total`, dividing first so large amounts cannot overflow.
fn percent_of(part: Decimal, total: Decimal) -> Decimal {
    (part / total) * HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc_records() -> Vec<SalesRecord> {
        vec![
            SalesRecord::new("A", "NYC", dec!(50)),
            SalesRecord::new("B", "NYC", dec!(15)),
            SalesRecord::new("C", "NYC", dec!(5)),
            SalesRecord::new("A", "NYC", dec!(30)),
        ]
    }

    fn ids(entities: &[RankedEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.entity_id.as_str()).collect()
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ParetoAnalyzer::new(dec!(80)).is_ok());
        assert!(ParetoAnalyzer::new(dec!(100)).is_ok());
        assert!(ParetoAnalyzer::new(dec!(0.01)).is_ok());

        assert_eq!(
            ParetoAnalyzer::new(Decimal::ZERO).unwrap_err(),
            ParetoError::InvalidThreshold { value: Decimal::ZERO }
        );
        assert!(ParetoAnalyzer::new(dec!(-5)).is_err());
        assert!(ParetoAnalyzer::new(dec!(100.01)).is_err());
    }

    #[test]
    fn test_aggregate_sums_per_entity() {
        let records = nyc_records();
        let aggregates = ParetoAnalyzer::aggregate(&records).unwrap();

        assert_eq!(aggregates.len(), 3);
        assert_eq!(aggregates[0].entity_id, "A");
        assert_eq!(aggregates[0].total_amount, dec!(80));

        let totals = ParetoAnalyzer::group_totals(&aggregates).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_amount, dec!(100));
        assert_eq!(totals[0].entity_count, 3);
    }

    #[test]
    fn test_nyc_scenario() {
        let records = nyc_records();

        let ranking = ParetoAnalyzer::new(dec!(80)).unwrap().rank(&records).unwrap();
        let nyc = &ranking.groups[0].entities;
        assert_eq!(ids(nyc), vec!["A", "B", "C"]);
        assert_eq!(nyc[0].share, dec!(80));
        assert_eq!(nyc[1].share, dec!(15));
        assert_eq!(nyc[2].share, dec!(5));
        assert_eq!(nyc[0].cumulative_share, dec!(80));
        assert_eq!(nyc[1].cumulative_share, dec!(95));
        assert_eq!(nyc[2].cumulative_share, dec!(100));

        let report = ParetoAnalyzer::new(dec!(80)).unwrap().analyze(&records).unwrap();
        assert_eq!(ids(&report.entities), vec!["A"]);

        let report = ParetoAnalyzer::new(dec!(95)).unwrap().analyze(&records).unwrap();
        assert_eq!(ids(&report.entities), vec!["A", "B"]);
    }

    #[test]
    fn test_row_crossing_threshold_is_excluded() {
        let records = nyc_records();
        let report = ParetoAnalyzer::new(dec!(94.99)).unwrap().analyze(&records).unwrap();

        assert_eq!(ids(&report.entities), vec!["A"]);
    }

    #[test]
    fn test_tie_break_by_entity_id() {
        let records = vec![
            SalesRecord::new("zeta", "Paris", dec!(10)),
            SalesRecord::new("alpha", "Paris", dec!(10)),
            SalesRecord::new("mid", "Paris", dec!(10)),
        ];

        let ranking = ParetoAnalyzer::new(dec!(100)).unwrap().rank(&records).unwrap();
        assert_eq!(ids(&ranking.groups[0].entities), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_groups_are_independent_and_ordered() {
        let records = vec![
            SalesRecord::new("X", "Seattle", dec!(10)),
            SalesRecord::new("A", "NYC", dec!(80)),
            SalesRecord::new("B", "NYC", dec!(20)),
            SalesRecord::new("Y", "Seattle", dec!(90)),
        ];

        let report = ParetoAnalyzer::new(dec!(90)).unwrap().analyze(&records).unwrap();

        assert_eq!(report.groups(), vec!["NYC", "Seattle"]);
        assert_eq!(ids(&report.entities), vec!["A", "Y"]);
        assert_eq!(report.entities_in("Seattle")[0].cumulative_share, dec!(90));
        assert_eq!(report.groups_analyzed, 2);
        assert_eq!(report.entities_ranked, 4);
    }

    #[test]
    fn test_threshold_hundred_returns_everything() {
        let records = vec![
            SalesRecord::new("a", "g", dec!(1)),
            SalesRecord::new("b", "g", dec!(1)),
            SalesRecord::new("c", "g", dec!(1)),
        ];

        let report = ParetoAnalyzer::new(dec!(100)).unwrap().analyze(&records).unwrap();

        assert_eq!(report.entities.len(), 3);
        assert_eq!(report.entities[2].cumulative_share, dec!(100));
    }

    #[test]
    fn test_tiny_threshold_keeps_nothing_with_positive_shares() {
        let records = nyc_records();
        let report = ParetoAnalyzer::new(dec!(0.0001)).unwrap().analyze(&records).unwrap();

        assert!(report.entities.is_empty());
        assert_eq!(report.entities_ranked, 3);
    }

    #[test]
    fn test_zero_total_group_excluded_with_warning() {
        let records = vec![
            SalesRecord::new("A", "NYC", dec!(80)),
            SalesRecord::new("B", "NYC", dec!(20)),
            SalesRecord::new("ghost", "Lagos", dec!(0)),
        ];

        let report = ParetoAnalyzer::new(dec!(80)).unwrap().analyze(&records).unwrap();

        assert!(report.has_exclusions());
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].group_id, "Lagos");
        assert_eq!(report.excluded[0].reason, WarningReason::NonPositiveTotal);
        assert_eq!(report.excluded[0].entity_count, 1);
        assert_eq!(ids(&report.entities), vec!["A"]);
        assert_eq!(report.groups_analyzed, 1);
    }

    #[test]
    fn test_zero_total_group_fails_under_fail_policy() {
        let records = vec![
            SalesRecord::new("A", "NYC", dec!(80)),
            SalesRecord::new("ghost", "Lagos", dec!(0)),
        ];

        let analyzer = ParetoAnalyzer::new(dec!(80))
            .unwrap()
            .with_policy(ZeroTotalPolicy::Fail);

        assert_eq!(
            analyzer.analyze(&records).unwrap_err(),
            ParetoError::empty_group("Lagos", Decimal::ZERO)
        );
    }

    #[test]
    fn test_negative_amount_group() {
        let records = vec![
            SalesRecord::new("A", "NYC", dec!(80)),
            SalesRecord::new("B", "Rome", dec!(50)),
            SalesRecord::new("C", "Rome", dec!(-10)),
        ];

        let analyzer = ParetoAnalyzer::new(dec!(100)).unwrap();
        let report = analyzer.analyze(&records).unwrap();
        assert_eq!(report.excluded[0].group_id, "Rome");
        assert_eq!(report.excluded[0].reason, WarningReason::NegativeAmount);
        assert_eq!(report.groups(), vec!["NYC"]);

        let err = analyzer
            .with_policy(ZeroTotalPolicy::Fail)
            .analyze(&records)
            .unwrap_err();
        assert!(matches!(err, ParetoError::NegativeAmount { ref entity_id, .. } if entity_id == "C"));
    }

    #[test]
    fn test_zero_amount_entity_in_positive_group() {
        let records = vec![
            SalesRecord::new("A", "NYC", dec!(10)),
            SalesRecord::new("B", "NYC", dec!(0)),
        ];

        let ranking = ParetoAnalyzer::new(dec!(100)).unwrap().rank(&records).unwrap();
        let nyc = &ranking.groups[0].entities;

        assert_eq!(nyc[1].share, Decimal::ZERO);
        assert_eq!(nyc[1].cumulative_share, dec!(100));
    }

    #[test]
    fn test_group_total_overflow_is_an_error() {
        let records = vec![
            SalesRecord::new("A", "NYC", Decimal::MAX),
            SalesRecord::new("B", "NYC", Decimal::MAX),
            SalesRecord::new("C", "Rome", dec!(10)),
        ];

        let err = ParetoAnalyzer::new(dec!(80))
            .unwrap()
            .analyze(&records)
            .unwrap_err();
        assert_eq!(
            err,
            ParetoError::AmountOverflow {
                group_id: "NYC".to_string()
            }
        );
    }

    #[test]
    fn test_entity_sum_overflow_is_an_error() {
        let records = vec![
            SalesRecord::new("A", "NYC", Decimal::MAX),
            SalesRecord::new("A", "NYC", dec!(1)),
        ];

        assert!(matches!(
            ParetoAnalyzer::aggregate(&records),
            Err(ParetoError::AmountOverflow { ref group_id }) if group_id == "NYC"
        ));
        assert!(ParetoAnalyzer::new(dec!(100)).unwrap().rank(&records).is_err());

        let aggregates = vec![
            EntityAggregate {
                group_id: "NYC".to_string(),
                entity_id: "A".to_string(),
                total_amount: Decimal::MAX,
            },
            EntityAggregate {
                group_id: "NYC".to_string(),
                entity_id: "B".to_string(),
                total_amount: Decimal::MAX,
            },
        ];
        assert!(ParetoAnalyzer::group_totals(&aggregates).is_err());
    }

    #[test]
    fn test_empty_input() {
        let report = ParetoAnalyzer::new(dec!(80))
            .unwrap()
            .analyze(&Vec::<SalesRecord>::new())
            .unwrap();

        assert!(report.entities.is_empty());
        assert!(!report.has_exclusions());
        assert_eq!(report.groups_analyzed, 0);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("exclude".parse::<ZeroTotalPolicy>().unwrap(), ZeroTotalPolicy::Exclude);
        assert_eq!("FAIL".parse::<ZeroTotalPolicy>().unwrap(), ZeroTotalPolicy::Fail);
        assert!("skip".parse::<ZeroTotalPolicy>().is_err());
    }

    #[test]
    fn test_report_summary() {
        let records = nyc_records();
        let report = ParetoAnalyzer::new(dec!(80)).unwrap().analyze(&records).unwrap();

        assert_eq!(
            report.summary(),
            "Pareto 80%: 1 of 3 entities across 1 groups (0 groups excluded)"
        );
    }
}
