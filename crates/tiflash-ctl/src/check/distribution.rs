//! Per-store Region counts of a table and their spread.

use serde::{Deserialize, Serialize};

/// Regions of one table held by one store, as leader or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRegionCount {
    /// `tikv` or `tiflash`.
    pub store_type: String,
    pub store_id: i64,
    pub address: String,
    pub is_leader: bool,
    pub num_regions: i64,
}

/// Stores are compared only against stores of the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreGroup {
    TikvLeader,
    TikvFollower,
    Tiflash,
}

impl StoreRegionCount {
    /// `None` for store types that are not part of the comparison.
    pub fn group(&self) -> Option<StoreGroup> {
        match (self.store_type.as_str(), self.is_leader) {
            ("tikv", true) => Some(StoreGroup::TikvLeader),
            ("tikv", false) => Some(StoreGroup::TikvFollower),
            ("tiflash", _) => Some(StoreGroup::Tiflash),
            _ => None,
        }
    }
}

/// One store row with its deviation from the group average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    #[serde(flatten)]
    pub store: StoreRegionCount,
    /// `(num_regions - avg) / avg * 100`; `None` when the average is zero.
    pub diff_percent: Option<f64>,
}

/// Group averages and the per-store rows they were computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub avg_tikv_leader: Option<f64>,
    pub avg_tikv_follower: Option<f64>,
    pub avg_tiflash: Option<f64>,
    pub rows: Vec<DistributionRow>,
}

impl DistributionSummary {
    pub fn average(&self, group: StoreGroup) -> Option<f64> {
        match group {
            StoreGroup::TikvLeader => self.avg_tikv_leader,
            StoreGroup::TikvFollower => self.avg_tikv_follower,
            StoreGroup::Tiflash => self.avg_tiflash,
        }
    }
}

fn average(counts: &[StoreRegionCount], group: StoreGroup) -> Option<f64> {
    let (sum, n) = counts
        .iter()
        .filter(|c| c.group() == Some(group))
        .fold((0i64, 0usize), |(sum, n), c| (sum + c.num_regions, n + 1));
    (n > 0).then(|| sum as f64 / n as f64)
}

/// Average each group and rate every store against its group.
///
/// Rows of other store types (e.g. pd, tidb) are dropped.
pub fn summarize(counts: Vec<StoreRegionCount>) -> DistributionSummary {
    let mut summary = DistributionSummary {
        avg_tikv_leader: average(&counts, StoreGroup::TikvLeader),
        avg_tikv_follower: average(&counts, StoreGroup::TikvFollower),
        avg_tiflash: average(&counts, StoreGroup::Tiflash),
        rows: Vec::with_capacity(counts.len()),
    };

    for store in counts {
        let Some(group) = store.group() else {
            continue;
        };
        let diff_percent = summary
            .average(group)
            .filter(|avg| *avg != 0.0)
            .map(|avg| (store.num_regions as f64 - avg) / avg * 100.0);
        summary.rows.push(DistributionRow {
            store,
            diff_percent,
        });
    }
    summary
}
