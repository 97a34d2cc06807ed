//! Region metadata as returned by the PD HTTP API.

use serde::{Deserialize, Serialize};

use crate::codec::TikvKey;
use crate::error::Result;

/// Replication role of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Voter,
    Learner,
}

/// One replica of a Region.
///
/// PD v5+ reports `role_name`; v4 only sets `is_learner` on learners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPeer")]
pub struct Peer {
    pub id: u64,
    pub store_id: u64,
    pub role: PeerRole,
}

impl Peer {
    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }
}

#[derive(Deserialize)]
struct RawPeer {
    id: u64,
    store_id: u64,
    #[serde(default)]
    role_name: Option<String>,
    #[serde(default)]
    is_learner: bool,
}

impl From<RawPeer> for Peer {
    fn from(raw: RawPeer) -> Self {
        let role = match raw.role_name.as_deref() {
            Some("Learner") => PeerRole::Learner,
            Some(_) => PeerRole::Voter,
            None if raw.is_learner => PeerRole::Learner,
            None => PeerRole::Voter,
        };
        Self {
            id: raw.id,
            store_id: raw.store_id,
            role,
        }
    }
}

/// A contiguous key range `[start_key, end_key)` and its replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: u64,
    /// Upper-case hex, empty for the start of the key space.
    #[serde(default)]
    pub start_key: String,
    /// Upper-case hex, empty for the end of the key space.
    #[serde(default)]
    pub end_key: String,
    #[serde(default)]
    pub peers: Vec<Peer>,
}

impl Region {
    pub fn start(&self) -> Result<TikvKey> {
        TikvKey::from_pd_key(&self.start_key)
    }

    pub fn end(&self) -> Result<TikvKey> {
        TikvKey::from_pd_key(&self.end_key)
    }

    /// Stores holding a learner peer of this Region.
    pub fn learner_store_ids(&self) -> Vec<u64> {
        self.peers
            .iter()
            .filter(|p| p.is_learner())
            .map(|p| p.store_id)
            .collect()
    }
}

/// Body of `GET /regions/key`.
#[derive(Debug, Deserialize)]
pub(crate) struct RegionsResponse {
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// Body of `GET /stats/region`.
#[derive(Debug, Deserialize)]
pub(crate) struct RegionStatsResponse {
    pub count: i64,
}
