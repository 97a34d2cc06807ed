//! TiDB client over one MySQL-protocol connection.
//!
//! A single connection is held on purpose: the read engine is a session
//! variable, so a pool would route counts to whichever engine the borrowed
//! connection happened to be set to.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info};

use super::query::{
    count_rows_query, min_max_row_id_query, region_distribution_statement, set_read_engine_query,
    INSTANCES_QUERY, SESSION_SETUP, TABLE_ID_AND_PK_TYPE_QUERY, TABLE_ID_QUERY,
};
use super::{HandleType, RowCountSource, TableInfo, TableRef, TableResolver};
use crate::check::distribution::StoreRegionCount;
use crate::check::types::{QueryRange, ReadEngine};
use crate::config::TidbConfig;
use crate::error::{CtlError, Result};

/// MySQL error number for "Unknown column".
const ER_BAD_FIELD_ERROR: u16 = 1054;

/// TiDB session used for counts, name resolution and cluster discovery.
pub struct TidbClient {
    conn: MySqlConnection,
    engine: Option<ReadEngine>,
}

impl TidbClient {
    /// Connect and prepare the session for engine-pinned reads.
    pub async fn connect(config: &TidbConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4");

        let conn = options
            .connect()
            .await
            .map_err(|e| CtlError::ReplicaQuery(format!("connect to TiDB failed: {}", e)))?;

        info!("Connected to TiDB: {}:{}", config.host, config.port);

        let mut client = Self { conn, engine: None };
        for stmt in SESSION_SETUP {
            client.exec(stmt).await?;
        }
        Ok(client)
    }

    /// Execute a statement, logging its elapsed time.
    pub async fn exec(&mut self, sql: &str) -> Result<()> {
        let start = Instant::now();
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        debug!("{} => {}ms", sql, start.elapsed().as_millis());
        Ok(())
    }

    /// Addresses of every instance of a component (`pd`, `tikv`, `tiflash`, ...).
    pub async fn instances(&mut self, component: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(INSTANCES_QUERY)
            .bind(component)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows.into_iter().map(|(addr,)| addr).collect())
    }

    /// Region count of a table per store.
    pub async fn region_distribution(
        &mut self,
        database: &str,
        table: &str,
    ) -> Result<Vec<StoreRegionCount>> {
        let sql = region_distribution_statement();
        let start = Instant::now();
        let rows: Vec<(String, i64, String, i64, i64)> = sqlx::query_as(&sql)
            .bind(database)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;
        debug!("region distribution query => {}ms", start.elapsed().as_millis());

        Ok(rows
            .into_iter()
            .map(
                |(store_type, store_id, address, is_leader, num_regions)| StoreRegionCount {
                    store_type,
                    store_id,
                    address,
                    is_leader: is_leader != 0,
                    num_regions,
                },
            )
            .collect())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl RowCountSource for TidbClient {
    async fn set_read_engine(&mut self, engine: ReadEngine) -> Result<()> {
        if self.engine == Some(engine) {
            return Ok(());
        }
        self.exec(&set_read_engine_query(engine)).await?;
        self.engine = Some(engine);
        Ok(())
    }

    async fn count_rows(&mut self, table: &TableRef, range: &QueryRange) -> Result<u64> {
        let sql = count_rows_query(table, range);
        let start = Instant::now();
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&mut self.conn).await?;
        info!(
            "{} => {}ms ({})",
            sql,
            start.elapsed().as_millis(),
            self.engine.map(|e| e.as_str()).unwrap_or("default")
        );
        Ok(count as u64)
    }

    async fn min_max_row_id(&mut self, table: &TableRef) -> Result<Option<(i64, i64)>> {
        let sql = min_max_row_id_query(table);
        let start = Instant::now();
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as(&sql).fetch_one(&mut self.conn).await?;
        info!(
            "{} => {}ms ({})",
            sql,
            start.elapsed().as_millis(),
            self.engine.map(|e| e.as_str()).unwrap_or("default")
        );
        Ok(min.zip(max))
    }
}

#[async_trait]
impl TableResolver for TidbClient {
    async fn resolve_table(&mut self, database: &str, table: &str) -> Result<TableInfo> {
        let not_found = || {
            CtlError::TableResolution(format!("table `{}`.`{}` not found", database, table))
        };

        let row: std::result::Result<Option<(i64, String)>, sqlx::Error> =
            sqlx::query_as(TABLE_ID_AND_PK_TYPE_QUERY)
                .bind(database)
                .bind(table)
                .fetch_optional(&mut self.conn)
                .await;

        match row {
            Ok(Some((table_id, pk_type))) => {
                let handle = match pk_type.as_str() {
                    "CLUSTERED" => HandleType::Common,
                    "NONCLUSTERED" => HandleType::Int64,
                    other => {
                        return Err(CtlError::TableResolution(format!(
                            "invalid TIDB_PK_TYPE from information_schema.tables, got: {} for `{}`.`{}`",
                            other, database, table
                        )))
                    }
                };
                Ok(TableInfo { table_id, handle })
            }
            Ok(None) => Err(not_found()),
            Err(sqlx::Error::Database(db_err))
                if db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|e| e.number() == ER_BAD_FIELD_ERROR) =>
            {
                // TiDB v4.x: no TIDB_PK_TYPE, and no clustered index either
                debug!("TIDB_PK_TYPE unavailable, falling back to table id only");
                let row: Option<(i64,)> = sqlx::query_as(TABLE_ID_QUERY)
                    .bind(database)
                    .bind(table)
                    .fetch_optional(&mut self.conn)
                    .await
                    .map_err(|e| CtlError::TableResolution(e.to_string()))?;
                let (table_id,) = row.ok_or_else(not_found)?;
                Ok(TableInfo {
                    table_id,
                    handle: HandleType::Int64,
                })
            }
            Err(e) => Err(CtlError::TableResolution(e.to_string())),
        }
    }
}
