//! In-memory collaborators for the check engine tests.

use std::collections::BTreeSet;
use std::ops::Range;

use async_trait::async_trait;

use super::types::{QueryRange, ReadEngine};
use crate::codec::{encode, BoundaryStatus, TikvKey};
use crate::error::{CtlError, Result};
use crate::pd::{Peer, PeerRole, Region, RegionSource};
use crate::tidb::{RowCountSource, TableRef};

/// Two row id sets standing in for TiKV and TiFlash.
#[derive(Debug, Default)]
pub struct FakeReplicas {
    tikv: BTreeSet<i64>,
    tiflash: BTreeSet<i64>,
    engine: Option<ReadEngine>,
    fail: bool,
    pub counted: Vec<(ReadEngine, QueryRange)>,
}

impl FakeReplicas {
    pub fn identical(rows: Range<i64>) -> Self {
        Self {
            tikv: rows.clone().collect(),
            tiflash: rows.collect(),
            ..Default::default()
        }
    }

    pub fn missing_in_tiflash(mut self, rows: &[i64]) -> Self {
        for row in rows {
            self.tiflash.remove(row);
        }
        self
    }

    pub fn extra_in_tiflash(mut self, rows: &[i64]) -> Self {
        self.tiflash.extend(rows.iter().copied());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn count_queries(&self) -> usize {
        self.counted.len()
    }

    fn rows(&self) -> Result<&BTreeSet<i64>> {
        match self.engine {
            Some(ReadEngine::Tikv) => Ok(&self.tikv),
            Some(ReadEngine::Tiflash) => Ok(&self.tiflash),
            None => Err(CtlError::ReplicaQuery("read engine not set".into())),
        }
    }
}

#[async_trait]
impl RowCountSource for FakeReplicas {
    async fn set_read_engine(&mut self, engine: ReadEngine) -> Result<()> {
        self.engine = Some(engine);
        Ok(())
    }

    async fn count_rows(&mut self, _table: &TableRef, range: &QueryRange) -> Result<u64> {
        if self.fail {
            return Err(CtlError::ReplicaQuery("connection reset".into()));
        }
        let engine = self.engine.unwrap_or(ReadEngine::Tikv);
        self.counted.push((engine, *range));
        let count = self
            .rows()?
            .iter()
            .filter(|r| range.lower().map_or(true, |lo| **r >= lo))
            .filter(|r| range.upper().map_or(true, |hi| **r < hi))
            .count();
        Ok(count as u64)
    }

    async fn min_max_row_id(&mut self, _table: &TableRef) -> Result<Option<(i64, i64)>> {
        if self.fail {
            return Err(CtlError::ReplicaQuery("connection reset".into()));
        }
        let rows = self.rows()?;
        Ok(rows.first().copied().zip(rows.last().copied()))
    }
}

/// Regions held in key order.
#[derive(Debug, Default)]
pub struct FakeRegions {
    regions: Vec<Region>,
    fail: bool,
}

impl FakeRegions {
    pub fn new(mut regions: Vec<Region>) -> Self {
        regions.sort_by_key(|r| r.start().unwrap_or_default());
        Self {
            regions,
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn position(&self, key: &TikvKey) -> Option<usize> {
        self.regions.iter().position(|r| {
            let start = r.start().unwrap_or_default();
            let end = r.end().unwrap_or_default();
            start <= *key && (end.is_empty() || *key < end)
        })
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(CtlError::MetadataLookup("PD unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegionSource for FakeRegions {
    async fn region_by_key(&self, key: &TikvKey) -> Result<Region> {
        self.check()?;
        self.position(key)
            .map(|i| self.regions[i].clone())
            .ok_or_else(|| CtlError::MetadataLookup(format!("no Region covers key {}", key)))
    }

    async fn regions_from(&self, key: &TikvKey, limit: usize) -> Result<Vec<Region>> {
        self.check()?;
        // like PD's scan: every Region ending after `key`, gaps skipped
        Ok(self
            .regions
            .iter()
            .filter(|r| {
                let end = r.end().unwrap_or_default();
                end.is_empty() || *key < end
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_regions_between(&self, start: &TikvKey, end: &TikvKey) -> Result<i64> {
        self.check()?;
        let count = self
            .regions
            .iter()
            .filter(|r| {
                let r_start = r.start().unwrap_or_default();
                let r_end = r.end().unwrap_or_default();
                r_start < *end && (r_end.is_empty() || *start < r_end)
            })
            .count();
        Ok(count as i64)
    }
}

pub fn row_key(table_id: i64, row_id: i64) -> TikvKey {
    encode(table_id, row_id, BoundaryStatus::Normal).unwrap()
}

pub fn table_start(table_id: i64) -> TikvKey {
    encode(table_id, 0, BoundaryStatus::LowSentinel).unwrap()
}

pub fn table_end(table_id: i64) -> TikvKey {
    encode(table_id, 0, BoundaryStatus::HighSentinel).unwrap()
}

/// A Region with one voter on store 1 and a learner on each of `learner_stores`.
pub fn region(id: u64, start: &TikvKey, end: &TikvKey, learner_stores: &[u64]) -> Region {
    let mut peers = vec![Peer {
        id: id * 10,
        store_id: 1,
        role: PeerRole::Voter,
    }];
    for (i, store_id) in learner_stores.iter().enumerate() {
        peers.push(Peer {
            id: id * 10 + 1 + i as u64,
            store_id: *store_id,
            role: PeerRole::Learner,
        });
    }
    Region {
        id,
        start_key: start.to_pd_key(),
        end_key: end.to_pd_key(),
        peers,
    }
}

/// Regions for `table_id` cut at each of `cuts`, learners on store 100.
pub fn split_table(table_id: i64, first_id: u64, cuts: &[i64]) -> Vec<Region> {
    let mut bounds = vec![table_start(table_id)];
    bounds.extend(cuts.iter().map(|c| row_key(table_id, *c)));
    bounds.push(table_end(table_id));
    bounds
        .windows(2)
        .enumerate()
        .map(|(i, w)| region(first_id + i as u64, &w[0], &w[1], &[100]))
        .collect()
}
