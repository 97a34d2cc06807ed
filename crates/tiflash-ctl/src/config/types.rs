//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::types::WorklistPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// TiDB connection.
    #[serde(default)]
    pub tidb: TidbConfig,

    /// PD endpoint.
    #[serde(default)]
    pub pd: PdConfig,

    /// Check behaviour.
    #[serde(default)]
    pub check: CheckConfig,
}

/// TiDB connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TidbConfig {
    /// TiDB host (default: 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,

    /// TiDB port (default: 4000).
    #[serde(default = "default_tidb_port")]
    pub port: u16,

    /// Username (default: root).
    #[serde(default = "default_user")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

impl Default for TidbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_tidb_port(),
            user: default_user(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for TidbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TidbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// PD endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdConfig {
    /// PD address (`host:port`). Discovered through TiDB when unset.
    #[serde(default)]
    pub address: Option<String>,

    /// HTTP request timeout in seconds (default: 30).
    #[serde(default = "default_pd_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PdConfig {
    fn default() -> Self {
        Self {
            address: None,
            timeout_secs: default_pd_timeout_secs(),
        }
    }
}

/// Check behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// How many times a matching count pair is re-taken before a range is
    /// accepted (default: 2, one per TiFlash replica).
    #[serde(default = "default_num_replica")]
    pub num_replica: usize,

    /// Row id column (default: _tidb_rowid).
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,

    /// Regions fetched per PD request when scanning boundaries (default: 16).
    #[serde(default = "default_region_batch")]
    pub region_batch: usize,

    /// Consecutive consistent Regions after which the walk stops (default: 20).
    #[serde(default = "default_walk_streak_limit")]
    pub walk_streak_limit: usize,

    /// Bisection worklist policy (default: abandon).
    #[serde(default)]
    pub worklist_policy: WorklistPolicy,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            num_replica: default_num_replica(),
            row_id_column: default_row_id_column(),
            region_batch: default_region_batch(),
            walk_streak_limit: default_walk_streak_limit(),
            worklist_policy: WorklistPolicy::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tidb_port() -> u16 {
    4000
}

fn default_user() -> String {
    "root".to_string()
}

fn default_pd_timeout_secs() -> u64 {
    30
}

fn default_num_replica() -> usize {
    2
}

fn default_row_id_column() -> String {
    "_tidb_rowid".to_string()
}

fn default_region_batch() -> usize {
    16
}

fn default_walk_streak_limit() -> usize {
    20
}
