//! Bisection over row id ranges to locate a count mismatch.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::oracle::ConsistencyOracle;
use super::types::{QueryRange, ReadEngine, WorklistPolicy};
use crate::codec::{encode, BoundaryStatus, TikvKey};
use crate::error::Result;
use crate::tidb::RowCountSource;

/// Result of a bisection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectOutcome {
    /// Whether the run ended without an unresolved mismatch.
    pub consistent: bool,
    /// Range checked last.
    pub last_range: Option<QueryRange>,
    /// Mismatching ranges that could not be split any further.
    pub suspects: Vec<QueryRange>,
    pub ranges_checked: usize,
    pub splits: usize,
}

impl BisectOutcome {
    /// Range to start the Region walk from, if the run was inconsistent.
    pub fn seed_range(&self) -> Option<QueryRange> {
        if self.consistent {
            return None;
        }
        self.suspects.first().copied().or(self.last_range)
    }

    /// Key of the seed range's lower bound, or the table start when unbounded.
    pub fn seed_key(&self, table_id: i64) -> Result<Option<TikvKey>> {
        self.seed_range()
            .map(|range| match range.lower() {
                Some(row_id) => encode(table_id, row_id, BoundaryStatus::Normal),
                None => encode(table_id, 0, BoundaryStatus::LowSentinel),
            })
            .transpose()
    }
}

/// Drives a worklist of ranges through the oracle, halving mismatches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BisectEngine {
    policy: WorklistPolicy,
}

impl BisectEngine {
    pub fn new(policy: WorklistPolicy) -> Self {
        Self { policy }
    }

    /// Starting range for a run.
    ///
    /// Explicit bounds win; otherwise the union of both engines' row id
    /// spans is used, with the upper end made exclusive. Disagreeing spans
    /// are reported but not fatal.
    pub async fn initial_range<S: RowCountSource>(
        &self,
        oracle: &mut ConsistencyOracle<S>,
        lower_bound: Option<i64>,
        upper_bound: Option<i64>,
    ) -> Result<QueryRange> {
        if lower_bound.is_some() || upper_bound.is_some() {
            return Ok(QueryRange::with_bounds(lower_bound, upper_bound));
        }

        let tikv = oracle.min_max_row_id(ReadEngine::Tikv).await?;
        let tiflash = oracle.min_max_row_id(ReadEngine::Tiflash).await?;
        info!("RowID range: {:?} (tikv)", tikv);
        info!("RowID range: {:?} (tiflash)", tiflash);

        let (min, max) = match (tikv, tiflash) {
            (None, None) => return Ok(QueryRange::all()),
            (Some(span), None) | (None, Some(span)) => {
                warn!("only one engine has rows, using {:?}", span);
                span
            }
            (Some((kv_min, kv_max)), Some((fl_min, fl_max))) => {
                let (min, max) = (kv_min.min(fl_min), kv_max.max(fl_max));
                if kv_min != fl_min {
                    warn!("tikv min id {} != tiflash min id {}, use {} as begin", kv_min, fl_min, min);
                }
                if kv_max != fl_max {
                    warn!("tikv max id {} != tiflash max id {}, use {} as end", kv_max, fl_max, max);
                }
                (min, max)
            }
        };

        Ok(match max.checked_add(1) {
            Some(end) => QueryRange::between(min, end),
            None => QueryRange::from(min),
        })
    }

    /// Run the worklist until it is empty.
    pub async fn run<S: RowCountSource>(
        &self,
        oracle: &mut ConsistencyOracle<S>,
        initial: Vec<QueryRange>,
    ) -> Result<BisectOutcome> {
        let mut worklist: VecDeque<QueryRange> = initial.into();
        info!("Init query ranges: {:?}", worklist.iter().map(|r| r.to_string()).collect::<Vec<_>>());

        let mut outcome = BisectOutcome {
            consistent: true,
            last_range: None,
            suspects: Vec::new(),
            ranges_checked: 0,
            splits: 0,
        };
        let mut last_matched = true;

        while let Some(range) = worklist.pop_front() {
            let verdict = oracle.compare(&range).await?;
            outcome.ranges_checked += 1;
            outcome.last_range = Some(range);
            last_matched = verdict.matched;
            if verdict.matched {
                continue;
            }

            if self.policy == WorklistPolicy::Abandon {
                worklist.clear();
            }
            match range.split() {
                Some((lo, hi)) => {
                    outcome.splits += 1;
                    worklist.push_back(lo);
                    worklist.push_back(hi);
                }
                None => outcome.suspects.push(range),
            }
            info!(
                "New query ranges: {:?}",
                worklist.iter().map(|r| r.to_string()).collect::<Vec<_>>()
            );
        }

        outcome.consistent = match self.policy {
            WorklistPolicy::Abandon => last_matched,
            WorklistPolicy::FullCoverage => outcome.suspects.is_empty(),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::testing::FakeReplicas;
    use crate::tidb::TableRef;

    fn table() -> TableRef {
        TableRef::new("test", "t", "_tidb_rowid")
    }

    #[tokio::test]
    async fn test_isolates_single_row_mismatch() {
        let mut replicas = FakeReplicas::identical(1..1000).missing_in_tiflash(&[500]);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 2);
        let engine = BisectEngine::new(WorklistPolicy::Abandon);

        let outcome = engine
            .run(&mut oracle, vec![QueryRange::between(1, 1000)])
            .await
            .unwrap();

        assert!(!outcome.consistent);
        assert_eq!(outcome.last_range, Some(QueryRange::between(500, 501)));
        assert_eq!(outcome.suspects, vec![QueryRange::between(500, 501)]);
        // ceil(log2(999)) = 10
        assert!(outcome.splits <= 10, "splits = {}", outcome.splits);
        assert_eq!(
            outcome.seed_key(55).unwrap(),
            Some(encode(55, 500, BoundaryStatus::Normal).unwrap())
        );
    }

    #[tokio::test]
    async fn test_mismatch_in_lower_half_drops_upper_half() {
        let mut replicas = FakeReplicas::identical(1..1000)
            .missing_in_tiflash(&[10])
            .extra_in_tiflash(&[10_000]);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 1);
        let engine = BisectEngine::new(WorklistPolicy::Abandon);

        let outcome = engine
            .run(&mut oracle, vec![QueryRange::between(1, 1000)])
            .await
            .unwrap();

        assert!(!outcome.consistent);
        assert_eq!(outcome.suspects, vec![QueryRange::between(10, 11)]);
        drop(oracle);
        // the upper half [500, 1000) was queued once and then abandoned
        assert!(!replicas
            .counted
            .iter()
            .any(|(_, r)| *r == QueryRange::between(500, 1000)));
    }

    #[tokio::test]
    async fn test_full_coverage_finds_every_mismatch() {
        let mut replicas = FakeReplicas::identical(0..64)
            .missing_in_tiflash(&[3])
            .missing_in_tiflash(&[40]);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 1);
        let engine = BisectEngine::new(WorklistPolicy::FullCoverage);

        let outcome = engine
            .run(&mut oracle, vec![QueryRange::between(0, 64)])
            .await
            .unwrap();

        assert!(!outcome.consistent);
        assert_eq!(
            outcome.suspects,
            vec![QueryRange::between(3, 4), QueryRange::between(40, 41)]
        );
        assert_eq!(outcome.seed_range(), Some(QueryRange::between(3, 4)));
    }

    #[tokio::test]
    async fn test_consistent_table() {
        let mut replicas = FakeReplicas::identical(0..100);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 2);
        let engine = BisectEngine::default();

        let initial = engine.initial_range(&mut oracle, None, None).await.unwrap();
        assert_eq!(initial, QueryRange::between(0, 100));

        let outcome = engine.run(&mut oracle, vec![initial]).await.unwrap();
        assert!(outcome.consistent);
        assert_eq!(outcome.ranges_checked, 1);
        assert_eq!(outcome.splits, 0);
        assert_eq!(outcome.seed_key(1).unwrap(), None);
    }

    #[tokio::test]
    async fn test_initial_range_uses_union_of_engines() {
        let mut replicas = FakeReplicas::identical(10..20).extra_in_tiflash(&[5, 30]);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 1);
        let engine = BisectEngine::default();

        let initial = engine.initial_range(&mut oracle, None, None).await.unwrap();
        assert_eq!(initial, QueryRange::between(5, 31));
    }

    #[tokio::test]
    async fn test_initial_range_explicit_bounds() {
        let mut replicas = FakeReplicas::identical(0..10);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 1);
        let engine = BisectEngine::default();

        assert_eq!(
            engine.initial_range(&mut oracle, Some(3), None).await.unwrap(),
            QueryRange::from(3)
        );
        assert_eq!(
            engine.initial_range(&mut oracle, None, Some(7)).await.unwrap(),
            QueryRange::to(7)
        );
        assert_eq!(
            engine.initial_range(&mut oracle, Some(3), Some(7)).await.unwrap(),
            QueryRange::between(3, 7)
        );
        drop(oracle);
        assert_eq!(replicas.count_queries(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_mismatch_seeds_from_table_start() {
        let mut replicas = FakeReplicas::identical(0..10).missing_in_tiflash(&[1]);
        let mut oracle = ConsistencyOracle::new(&mut replicas, table(), 1);
        let engine = BisectEngine::default();

        let outcome = engine.run(&mut oracle, vec![QueryRange::to(7)]).await.unwrap();
        assert!(!outcome.consistent);
        assert_eq!(outcome.ranges_checked, 1);
        assert_eq!(
            outcome.seed_key(9).unwrap(),
            Some(encode(9, 0, BoundaryStatus::LowSentinel).unwrap())
        );
    }
}
