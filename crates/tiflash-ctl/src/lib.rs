//! # tiflash-ctl
//!
//! Consistency tooling for TiFlash replicas of TiDB tables.
//!
//! - **Key codec** for TiKV table row keys and their memcomparable wrapping
//! - **Consistency check** comparing TiKV and TiFlash row counts, narrowing
//!   mismatches by bisection and then Region by Region
//! - **Boundary check** for Regions cut outside row keys
//! - **Region distribution** per store
//! - **Dispatch** of raw commands to every TiFlash instance
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiflash_ctl::check::{BisectEngine, ConsistencyOracle};
//! use tiflash_ctl::tidb::{TableRef, TableResolver, TidbClient};
//! use tiflash_ctl::Config;
//!
//! #[tokio::main]
//! async fn main() -> tiflash_ctl::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut client = TidbClient::connect(&config.tidb).await?;
//!     client.resolve_table("test", "t").await?;
//!
//!     let table = TableRef::new("test", "t", &config.check.row_id_column);
//!     let mut oracle = ConsistencyOracle::new(&mut client, table, config.check.num_replica);
//!     let engine = BisectEngine::new(config.check.worklist_policy);
//!     let initial = engine.initial_range(&mut oracle, None, None).await?;
//!     let outcome = engine.run(&mut oracle, vec![initial]).await?;
//!     println!("consistent: {}", outcome.consistent);
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod codec;
pub mod config;
pub mod error;
pub mod pd;
pub mod tidb;
pub mod tiflash;

// Re-exports for convenient access
pub use codec::{BoundaryStatus, TableRowKey, TikvKey};
pub use config::{CheckConfig, Config, PdConfig, TidbConfig};
pub use error::{CtlError, Result};
pub use pd::{PdClient, Region, RegionSource};
pub use tidb::{TableInfo, TableRef, TidbClient};
pub use tiflash::{TiflashClient, TiflashHttp};
