//! Type definitions for the consistency and boundary checks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A half-open `_tidb_rowid` range `[min, max)`.
///
/// Either side may be unbounded, in which case its value is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRange {
    /// Lower bound (inclusive), ignored when `min_unbounded`.
    pub min: i64,
    /// Upper bound (exclusive), ignored when `max_unbounded`.
    pub max: i64,
    pub min_unbounded: bool,
    pub max_unbounded: bool,
}

impl QueryRange {
    /// The whole table.
    pub fn all() -> Self {
        Self {
            min: 0,
            max: 0,
            min_unbounded: true,
            max_unbounded: true,
        }
    }

    /// `[min, max)`.
    pub fn between(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            min_unbounded: false,
            max_unbounded: false,
        }
    }

    /// `[min, +Inf)`.
    pub fn from(min: i64) -> Self {
        Self {
            min,
            max: 0,
            min_unbounded: false,
            max_unbounded: true,
        }
    }

    /// `[-Inf, max)`.
    pub fn to(max: i64) -> Self {
        Self {
            min: 0,
            max,
            min_unbounded: true,
            max_unbounded: false,
        }
    }

    /// Build a range from optional bounds, `None` meaning unbounded.
    pub fn with_bounds(min: Option<i64>, max: Option<i64>) -> Self {
        match (min, max) {
            (Some(lo), Some(hi)) => Self::between(lo, hi),
            (Some(lo), None) => Self::from(lo),
            (None, Some(hi)) => Self::to(hi),
            (None, None) => Self::all(),
        }
    }

    pub fn lower(&self) -> Option<i64> {
        (!self.min_unbounded).then_some(self.min)
    }

    pub fn upper(&self) -> Option<i64> {
        (!self.max_unbounded).then_some(self.max)
    }

    /// Split at the midpoint.
    ///
    /// Returns `None` for ranges with an unbounded side and for ranges whose
    /// midpoint does not fall strictly between `min` and `max` (one row wide
    /// or empty).
    pub fn split(&self) -> Option<(QueryRange, QueryRange)> {
        let (lo, hi) = (self.lower()?, self.upper()?);
        let mid = (lo as i128 + (hi as i128 - lo as i128) / 2) as i64;
        if mid > lo && mid < hi {
            Some((Self::between(lo, mid), Self::between(mid, hi)))
        } else {
            None
        }
    }

    /// Render as a SQL filter on `column`. Empty for the whole table.
    pub fn where_clause(&self, column: &str) -> String {
        match (self.lower(), self.upper()) {
            (None, None) => String::new(),
            (Some(lo), None) => format!("where {} <= {}", lo, column),
            (None, Some(hi)) => format!("where {} < {}", column, hi),
            (Some(lo), Some(hi)) => format!("where {} <= {} and {} < {}", lo, column, column, hi),
        }
    }
}

impl fmt::Display for QueryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower() {
            Some(lo) => write!(f, "[{}, ", lo)?,
            None => write!(f, "[-Inf, ")?,
        }
        match self.upper() {
            Some(hi) => write!(f, "{})", hi),
            None => write!(f, "+Inf)"),
        }
    }
}

/// Storage engine a read is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadEngine {
    /// Row store.
    Tikv,
    /// Columnar replica.
    Tiflash,
}

impl ReadEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadEngine::Tikv => "tikv",
            ReadEngine::Tiflash => "tiflash",
        }
    }
}

impl fmt::Display for ReadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing the row counts of both engines over one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub range: QueryRange,
    pub matched: bool,
    /// Rows seen by TiKV on the last attempt.
    pub tikv_rows: u64,
    /// Rows seen by TiFlash on the last attempt.
    pub tiflash_rows: u64,
    /// Count pairs taken before the verdict was reached.
    pub attempts: usize,
}

/// How the bisection worklist reacts to a mismatching range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorklistPolicy {
    /// Drop every pending range and continue with the two halves only.
    #[default]
    Abandon,
    /// Keep pending ranges and queue the two halves behind them.
    FullCoverage,
}

/// An operator command proposed by a check.
///
/// Nothing is executed; the commands are printed for a human or a separate
/// tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Remediation {
    SplitPartition { region_id: u64 },
    MergePartitions { region_a: u64, region_b: u64 },
    RemovePeer { region_id: u64, store_id: u64 },
}

impl Remediation {
    /// The same command in pd-ctl syntax.
    pub fn pd_ctl_command(&self) -> String {
        match self {
            Remediation::SplitPartition { region_id } => {
                format!("operator add split-region {} --policy=scan", region_id)
            }
            Remediation::MergePartitions { region_a, region_b } => {
                format!("operator add merge-region {} {}", region_a, region_b)
            }
            Remediation::RemovePeer {
                region_id,
                store_id,
            } => format!("operator add remove-peer {} {}", region_id, store_id),
        }
    }
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remediation::SplitPartition { region_id } => write!(f, "split-partition {}", region_id),
            Remediation::MergePartitions { region_a, region_b } => {
                write!(f, "merge-partitions {} {}", region_a, region_b)
            }
            Remediation::RemovePeer {
                region_id,
                store_id,
            } => write!(f, "remove-peer {} {}", region_id, store_id),
        }
    }
}
