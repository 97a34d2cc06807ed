//! Region boundary validation for one table.
//!
//! Every Region of an int-handle table should start and end on a row key or
//! a table boundary. Regions cut anywhere else are reported together with the
//! split or merge commands that would repair them.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::types::Remediation;
use crate::codec::{encode, BoundaryStatus, TableRowKey, TikvKey};
use crate::error::Result;
use crate::pd::{Region, RegionSource};
use crate::tidb::TableInfo;

/// Which remediation commands to derive from a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Split every Region that has an invalid boundary.
    #[default]
    Split,
    /// Merge Region pairs sharing an invalid boundary.
    Merge,
}

/// Result of scanning the Regions of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryReport {
    pub table_id: i64,
    /// Set when the table uses a clustered common handle, whose keys are not
    /// row ids; nothing was scanned.
    pub unsupported: bool,
    /// Region count PD reports for the table's key range.
    pub expected_regions: i64,
    /// Every Region accumulated for the table, in key order.
    pub regions: Vec<Region>,
    /// Ids of Regions with at least one invalid boundary, in key order.
    pub invalid_regions: Vec<u64>,
    /// Invalid boundary key (hex) to the Regions it bounds.
    pub invalid_boundaries: BTreeMap<String, Vec<u64>>,
}

impl BoundaryReport {
    pub fn valid_count(&self) -> usize {
        self.regions.len() - self.invalid_regions.len()
    }

    /// One split per Region with an invalid boundary.
    pub fn split_actions(&self) -> Vec<Remediation> {
        self.invalid_regions
            .iter()
            .map(|id| Remediation::SplitPartition { region_id: *id })
            .collect()
    }

    /// One merge per invalid key shared by exactly two Regions.
    ///
    /// A Region takes part in at most one merge.
    pub fn merge_actions(&self) -> Vec<Remediation> {
        let mut merged = HashSet::new();
        let mut actions = Vec::new();
        for (key, ids) in &self.invalid_boundaries {
            let [a, b] = ids.as_slice() else {
                continue;
            };
            if merged.contains(a) || merged.contains(b) {
                continue;
            }
            info!(
                "Need to merge the Regions with invalid boundary: {}, Regions: {} {}",
                key, a, b
            );
            merged.insert(*a);
            merged.insert(*b);
            actions.push(Remediation::MergePartitions {
                region_a: *a,
                region_b: *b,
            });
        }
        actions
    }

    pub fn actions(&self, mode: BoundaryMode) -> Vec<Remediation> {
        match mode {
            BoundaryMode::Split => self.split_actions(),
            BoundaryMode::Merge => self.merge_actions(),
        }
    }

    fn record_invalid(&mut self, region_id: u64, key: &str) {
        if self.invalid_regions.last() != Some(&region_id) {
            self.invalid_regions.push(region_id);
        }
        self.invalid_boundaries
            .entry(key.to_string())
            .or_default()
            .push(region_id);
    }
}

/// Whether a PD boundary key is a row key or a table boundary.
///
/// The empty key (an edge of the whole key space) counts as valid.
fn check_boundary(pd_key: &str) -> Result<()> {
    if pd_key.is_empty() {
        return Ok(());
    }
    TableRowKey::decode(&TikvKey::from_pd_key(pd_key)?).map(|_| ())
}

/// Scans a table's Regions in batches.
pub struct BoundaryScanner<'a, R: ?Sized> {
    regions: &'a R,
    batch_size: usize,
}

impl<'a, R: RegionSource + ?Sized> BoundaryScanner<'a, R> {
    pub fn new(regions: &'a R, batch_size: usize) -> Self {
        Self {
            regions,
            batch_size: batch_size.max(1),
        }
    }

    /// Collect the table's Regions and validate their boundaries.
    pub async fn scan(&self, table: &TableInfo) -> Result<BoundaryReport> {
        let table_id = table.table_id;
        let mut report = BoundaryReport {
            table_id,
            ..Default::default()
        };
        if !table.is_single_integer_key() {
            warn!("Checking boundary on clustered index table is not supported");
            report.unsupported = true;
            return Ok(report);
        }

        let start = encode(table_id, 0, BoundaryStatus::LowSentinel)?;
        let end = encode(table_id, 0, BoundaryStatus::HighSentinel)?;
        report.expected_regions = self.regions.count_regions_between(&start, &end).await?;
        info!(
            "The expected total num of Regions is {}, table id: {}",
            report.expected_regions, table_id
        );
        info!("Scanning all Regions with batch size: {}", self.batch_size);

        // PD's count may drift from what we see: Regions split and merge
        // concurrently for unrelated reasons.
        let mut key = start;
        loop {
            let batch = self.regions.regions_from(&key, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            match collect_same_table(&mut report.regions, batch, table_id)? {
                Some(next) => key = next,
                None => break,
            }
        }
        info!(
            "The actual total num of Regions is {}, table id: {}",
            report.regions.len(),
            table_id
        );

        for i in 0..report.regions.len() {
            let (id, start_key, end_key) = {
                let r = &report.regions[i];
                (r.id, r.start_key.clone(), r.end_key.clone())
            };
            if let Err(e) = check_boundary(&start_key) {
                warn!("Region {}, start key: {}, err: {}", id, start_key, e);
                report.record_invalid(id, &start_key);
            }
            if let Err(e) = check_boundary(&end_key) {
                warn!("Region {}, end   key: {}, err: {}", id, end_key, e);
                report.record_invalid(id, &end_key);
            }
        }
        info!(
            "The num of Regions have invalid boundary is: {}, total Region num is: {}",
            report.invalid_regions.len(),
            report.regions.len()
        );

        Ok(report)
    }
}

/// Append Regions until one starts outside `table_id`.
///
/// Returns the key to continue from, or `None` once the table (or the key
/// space) has been left.
fn collect_same_table(
    all: &mut Vec<Region>,
    batch: Vec<Region>,
    table_id: i64,
) -> Result<Option<TikvKey>> {
    let mut next = None;
    for region in batch {
        let start = region.start()?;
        let start_table = if start.is_empty() {
            None
        } else {
            Some(start.table_id_prefix()?)
        };
        if start_table != Some(table_id) {
            info!(
                "The start key of Region {} is {}, table id: {:?}. All finished, break.",
                region.id, region.start_key, start_table
            );
            return Ok(None);
        }
        let end = region.end()?;
        all.push(region);
        next = Some(end);
    }

    match next {
        Some(end) if !end.is_empty() => {
            info!("Continue with the end key: {}", end);
            Ok(Some(end))
        }
        _ => Ok(None),
    }
}
