//! Row count comparison between TiKV and TiFlash.

use async_trait::async_trait;
use tracing::{info, warn};

use super::types::{QueryRange, ReadEngine, Verdict};
use crate::error::Result;
use crate::tidb::{RowCountSource, TableRef};

/// Compares the row counts both engines report for a range.
///
/// The two counts are read one after the other, not from one snapshot, so
/// writes landing in between can flip the verdict either way.
pub struct ConsistencyOracle<S> {
    source: S,
    table: TableRef,
    repetitions: usize,
}

impl<S: RowCountSource> ConsistencyOracle<S> {
    /// `repetitions` is the number of count pairs taken while they keep
    /// matching; it is raised to 1 if zero.
    pub fn new(source: S, table: TableRef, repetitions: usize) -> Self {
        Self {
            source,
            table,
            repetitions: repetitions.max(1),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    async fn count_on(&mut self, engine: ReadEngine, range: &QueryRange) -> Result<u64> {
        self.source.set_read_engine(engine).await?;
        self.source.count_rows(&self.table, range).await
    }

    /// Compare the two engines over `range`.
    ///
    /// Count pairs are re-taken up to the repetition budget while they agree,
    /// since each read may be served by a different TiFlash replica. The first
    /// disagreement is final.
    pub async fn compare(&mut self, range: &QueryRange) -> Result<Verdict> {
        let mut tikv_rows = 0;
        let mut tiflash_rows = 0;
        let mut attempts = 0;

        while attempts < self.repetitions {
            tikv_rows = self.count_on(ReadEngine::Tikv, range).await?;
            tiflash_rows = self.count_on(ReadEngine::Tiflash, range).await?;
            attempts += 1;
            if tikv_rows != tiflash_rows {
                break;
            }
        }

        let matched = tikv_rows == tiflash_rows;
        if matched {
            info!(
                "Range {}, num of rows: tikv {}, tiflash {}. OK",
                range, tikv_rows, tiflash_rows
            );
        } else {
            warn!(
                "Range {}, num of rows: tikv {}, tiflash {}. FAIL",
                range, tikv_rows, tiflash_rows
            );
        }

        Ok(Verdict {
            range: *range,
            matched,
            tikv_rows,
            tiflash_rows,
            attempts,
        })
    }

    /// Lowest and highest row id as seen by `engine`.
    pub async fn min_max_row_id(&mut self, engine: ReadEngine) -> Result<Option<(i64, i64)>> {
        self.source.set_read_engine(engine).await?;
        self.source.min_max_row_id(&self.table).await
    }
}

#[async_trait]
impl<T: RowCountSource + ?Sized> RowCountSource for &mut T {
    async fn set_read_engine(&mut self, engine: ReadEngine) -> Result<()> {
        (**self).set_read_engine(engine).await
    }

    async fn count_rows(&mut self, table: &TableRef, range: &QueryRange) -> Result<u64> {
        (**self).count_rows(table, range).await
    }

    async fn min_max_row_id(&mut self, table: &TableRef) -> Result<Option<(i64, i64)>> {
        (**self).min_max_row_id(table).await
    }
}
