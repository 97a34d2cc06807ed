//! Region-by-Region recheck following a bisection mismatch.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::oracle::ConsistencyOracle;
use super::types::{QueryRange, Remediation};
use crate::codec::{TableRowKey, TikvKey};
use crate::error::Result;
use crate::pd::{Region, RegionSource};
use crate::tidb::RowCountSource;

/// Default number of consecutive consistent Regions that ends a walk.
pub const DEFAULT_STREAK_LIMIT: usize = 20;

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkStop {
    /// More consecutive Regions matched than the streak limit.
    StreakReached,
    /// The last Region of the key space was checked.
    EndOfKeySpace,
    /// The next Region holds no rows of the table.
    EndOfTable,
}

/// Summary of a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkReport {
    pub regions_checked: usize,
    pub inconsistent_regions: Vec<u64>,
    pub actions: Vec<Remediation>,
    pub stop: WalkStop,
}

/// Where a boundary key falls relative to the rows of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    BeforeTable,
    Row(i64),
    AfterTable,
}

fn edge_of(key: &TikvKey, table_id: i64) -> Result<Edge> {
    Ok(match TableRowKey::decode(key)? {
        TableRowKey::Row { table_id: t, row_id } => match t.cmp(&table_id) {
            Ordering::Less => Edge::BeforeTable,
            Ordering::Equal => Edge::Row(row_id),
            Ordering::Greater => Edge::AfterTable,
        },
        TableRowKey::TableStart { table_id: t } if t <= table_id => Edge::BeforeTable,
        TableRowKey::TableEnd { table_id: t } if t < table_id => Edge::BeforeTable,
        TableRowKey::TableStart { .. } | TableRowKey::TableEnd { .. } => Edge::AfterTable,
    })
}

/// Row id range of `table_id` covered by a Region.
///
/// Row keys of the table give a bound. Keys in an earlier table, the
/// table's own start, and the empty start key leave the low side unbounded;
/// keys in a later table, the table end, and the empty end key leave the
/// high side unbounded. `None` when the Region holds no rows of the table.
pub fn region_query_range(region: &Region, table_id: i64) -> Result<Option<QueryRange>> {
    let start = region.start()?;
    let end = region.end()?;
    let low = if start.is_empty() {
        Edge::BeforeTable
    } else {
        edge_of(&start, table_id)?
    };
    let high = if end.is_empty() {
        Edge::AfterTable
    } else {
        edge_of(&end, table_id)?
    };

    let min = match low {
        Edge::BeforeTable => None,
        Edge::Row(row_id) => Some(row_id),
        Edge::AfterTable => return Ok(None),
    };
    let max = match high {
        Edge::AfterTable => None,
        Edge::Row(row_id) => Some(row_id),
        Edge::BeforeTable => return Ok(None),
    };
    Ok(Some(QueryRange::with_bounds(min, max)))
}

/// Walks Regions forward from a key, rechecking each one.
pub struct RegionWalker<'a, R: ?Sized> {
    regions: &'a R,
    table_id: i64,
    streak_limit: usize,
}

impl<'a, R: RegionSource + ?Sized> RegionWalker<'a, R> {
    pub fn new(regions: &'a R, table_id: i64, streak_limit: usize) -> Self {
        Self {
            regions,
            table_id,
            streak_limit,
        }
    }

    /// Walk from the Region containing `start`.
    ///
    /// A mismatching Region yields one `RemovePeer` per learner, handed to
    /// `emit` as soon as it is found. The walk ends once more than
    /// `streak_limit` Regions in a row are consistent, at the first Region
    /// past the table, or after the last Region of the key space. Lookup and
    /// decode failures abort the walk.
    pub async fn walk<S, F>(
        &self,
        oracle: &mut ConsistencyOracle<S>,
        start: TikvKey,
        mut emit: F,
    ) -> Result<WalkReport>
    where
        S: RowCountSource,
        F: FnMut(&Remediation),
    {
        let mut key = start;
        let mut streak = 0usize;
        let mut regions_checked = 0usize;
        let mut inconsistent_regions = Vec::new();
        let mut actions = Vec::new();

        let stop = loop {
            let region = self.regions.region_by_key(&key).await?;
            let Some(range) = region_query_range(&region, self.table_id)? else {
                info!(
                    "Region {} is outside table {}, stop walking",
                    region.id, self.table_id
                );
                break WalkStop::EndOfTable;
            };
            info!("The query range of Region {} is {}", region.id, range);

            let verdict = oracle.compare(&range).await?;
            regions_checked += 1;

            if verdict.matched {
                streak += 1;
                info!("Region {} have consist num of rows", region.id);
                if streak > self.streak_limit {
                    break WalkStop::StreakReached;
                }
            } else {
                streak = 0;
                warn!("Region {} have not consist num of rows", region.id);
                inconsistent_regions.push(region.id);
                for store_id in region.learner_store_ids() {
                    let action = Remediation::RemovePeer {
                        region_id: region.id,
                        store_id,
                    };
                    emit(&action);
                    actions.push(action);
                }
            }

            let end = region.end()?;
            if end.is_empty() {
                break WalkStop::EndOfKeySpace;
            }
            key = end;
        };

        Ok(WalkReport {
            regions_checked,
            inconsistent_regions,
            actions,
            stop,
        })
    }
}
