//! Region metadata from PD.
//!
//! - [`RegionSource`]: the lookups the walker and the boundary scanner need
//! - [`PdClient`]: implementation over the PD HTTP API

mod client;
pub mod types;

pub use client::PdClient;
pub use types::{Peer, PeerRole, Region};

use async_trait::async_trait;

use crate::codec::TikvKey;
use crate::error::Result;

/// Read-only access to Region metadata.
///
/// Every failure is a `MetadataLookup` error; callers do not retry.
#[async_trait]
pub trait RegionSource: Send + Sync {
    /// The Region whose range contains `key`.
    async fn region_by_key(&self, key: &TikvKey) -> Result<Region>;

    /// Up to `limit` Regions in key order, starting with the one containing `key`.
    async fn regions_from(&self, key: &TikvKey, limit: usize) -> Result<Vec<Region>>;

    /// Number of Regions intersecting `[start, end)`.
    async fn count_regions_between(&self, start: &TikvKey, end: &TikvKey) -> Result<i64>;
}
