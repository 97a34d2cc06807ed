//! TiDB SQL collaborators.
//!
//! - [`RowCountSource`]: row counts and row id bounds, per read engine
//! - [`TableResolver`]: database/table name to table id
//! - [`TidbClient`]: both, over a single MySQL-protocol session

mod client;
pub mod query;

pub use client::TidbClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::check::types::{QueryRange, ReadEngine};
use crate::error::Result;

/// The table being checked and the column holding its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
    pub row_id_column: String,
}

impl TableRef {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        row_id_column: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            row_id_column: row_id_column.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("`{}`.`{}`", self.database, self.table)
    }
}

/// How rows of a table are keyed in TiKV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleType {
    /// A single signed integer handle (`_tidb_rowid` or an int primary key).
    Int64,
    /// Clustered index on a non-integer or composite key.
    Common,
}

/// Result of resolving a table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_id: i64,
    pub handle: HandleType,
}

impl TableInfo {
    pub fn is_single_integer_key(&self) -> bool {
        self.handle == HandleType::Int64
    }
}

/// Row counts as seen by one storage engine at a time.
///
/// The engine is session state: [`set_read_engine`](Self::set_read_engine)
/// applies to every later query until changed.
#[async_trait]
pub trait RowCountSource: Send {
    async fn set_read_engine(&mut self, engine: ReadEngine) -> Result<()>;

    /// Rows of `table` inside `range` on the current engine.
    async fn count_rows(&mut self, table: &TableRef, range: &QueryRange) -> Result<u64>;

    /// Lowest and highest row id on the current engine, `None` for an empty table.
    async fn min_max_row_id(&mut self, table: &TableRef) -> Result<Option<(i64, i64)>>;
}

/// Name resolution against the TiDB catalog.
#[async_trait]
pub trait TableResolver: Send {
    async fn resolve_table(&mut self, database: &str, table: &str) -> Result<TableInfo>;
}
