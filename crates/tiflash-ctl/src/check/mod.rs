//! Consistency and boundary checks over a table's Regions.
//!
//! The consistency check runs in two stages:
//!
//! - **Bisection**: compare TiKV and TiFlash row counts over a `_tidb_rowid`
//!   range, halving mismatching ranges until a suspect range is isolated
//! - **Region walk**: starting from the suspect, recheck Region by Region and
//!   propose removing the TiFlash learners of every inconsistent Region
//!
//! The boundary check validates that every Region of a table starts and ends
//! on a row key or a table boundary.

pub mod bisect;
pub mod boundary;
pub mod distribution;
pub mod oracle;
pub mod types;
pub mod walker;

#[cfg(test)]
mod testing;

// Re-exports
pub use bisect::{BisectEngine, BisectOutcome};
pub use boundary::{BoundaryMode, BoundaryReport, BoundaryScanner};
pub use distribution::{summarize, DistributionRow, DistributionSummary, StoreRegionCount};
pub use oracle::ConsistencyOracle;
pub use types::{QueryRange, ReadEngine, Remediation, Verdict, WorklistPolicy};
pub use walker::{region_query_range, RegionWalker, WalkReport, WalkStop, DEFAULT_STREAK_LIMIT};
