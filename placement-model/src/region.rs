//! Region snapshots as reported by heartbeats.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::ids::{PeerId, RegionId, StoreId};

/// Version pair identifying a region's range generation (`version`) and
/// membership generation (`conf_ver`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionEpoch {
    pub version: u64,
    pub conf_ver: u64,
}

impl RegionEpoch {
    pub const fn new(version: u64, conf_ver: u64) -> Self {
        Self { version, conf_ver }
    }
}

impl fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.version, self.conf_ver)
    }
}

/// Membership role of a peer. `IncomingVoter` and `DemotingVoter` only exist
/// while the region is in a joint consensus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PeerRole {
    #[default]
    Voter,
    Learner,
    IncomingVoter,
    DemotingVoter,
}

impl PeerRole {
    /// Every role except `Learner` takes part in a voting quorum.
    pub const fn is_voter_like(self) -> bool {
        !matches!(self, PeerRole::Learner)
    }

    pub const fn is_joint(self) -> bool {
        matches!(self, PeerRole::IncomingVoter | PeerRole::DemotingVoter)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PeerRole::Voter => "voter",
            PeerRole::Learner => "learner",
            PeerRole::IncomingVoter => "incoming_voter",
            PeerRole::DemotingVoter => "demoting_voter",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voter" => Ok(PeerRole::Voter),
            "learner" => Ok(PeerRole::Learner),
            "incoming_voter" => Ok(PeerRole::IncomingVoter),
            "demoting_voter" => Ok(PeerRole::DemotingVoter),
            _ => Err(ModelError::UnknownRole(s.to_string())),
        }
    }
}

/// A single replica of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
    pub role: PeerRole,
    pub is_witness: bool,
}

impl Peer {
    pub const fn new(id: u64, store_id: u64, role: PeerRole) -> Self {
        Self {
            id: PeerId(id),
            store_id: StoreId(store_id),
            role,
            is_witness: false,
        }
    }

    pub const fn voter(id: u64, store_id: u64) -> Self {
        Self::new(id, store_id, PeerRole::Voter)
    }

    pub const fn learner(id: u64, store_id: u64) -> Self {
        Self::new(id, store_id, PeerRole::Learner)
    }

    pub fn witness(mut self) -> Self {
        self.is_witness = true;
        self
    }

    pub fn with_role(mut self, role: PeerRole) -> Self {
        self.role = role;
        self
    }
}

/// Point-in-time view of a region. Snapshots are cheap to clone and are
/// never mutated once handed to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionInfo {
    pub id: RegionId,
    pub epoch: RegionEpoch,
    pub peers: Vec<Peer>,
    pub leader: Option<Peer>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pending_peers: Vec<Peer>,
    /// Approximate data size in MB.
    #[cfg_attr(feature = "serde", serde(default))]
    pub approximate_size: u64,
}

impl RegionInfo {
    pub fn new(id: u64, epoch: RegionEpoch, peers: Vec<Peer>) -> Self {
        Self {
            id: RegionId(id),
            epoch,
            peers,
            leader: None,
            pending_peers: Vec::new(),
            approximate_size: 0,
        }
    }

    /// Marks the peer living on `store` as leader. Unknown stores leave the
    /// region leaderless.
    pub fn with_leader(mut self, store: u64) -> Self {
        self.leader = self.store_peer(StoreId(store)).copied();
        self
    }

    /// Marks the given peers as pending (still catching up on a snapshot).
    pub fn with_pending(mut self, peer_ids: &[PeerId]) -> Self {
        self.pending_peers = self
            .peers
            .iter()
            .filter(|peer| peer_ids.contains(&peer.id))
            .copied()
            .collect();
        self
    }

    pub fn with_approximate_size(mut self, size_mb: u64) -> Self {
        self.approximate_size = size_mb;
        self
    }

    pub fn with_epoch(mut self, epoch: RegionEpoch) -> Self {
        self.epoch = epoch;
        self
    }

    /// Rejects snapshots that place two peers on one store or repeat a peer id.
    pub fn validate(&self) -> Result<()> {
        let mut stores = HashSet::with_capacity(self.peers.len());
        let mut ids = HashSet::with_capacity(self.peers.len());
        for peer in &self.peers {
            if !stores.insert(peer.store_id) {
                return Err(ModelError::DuplicateStore(peer.store_id));
            }
            if !ids.insert(peer.id) {
                return Err(ModelError::DuplicatePeer(peer.id));
            }
        }
        Ok(())
    }

    pub fn store_peer(&self, store: StoreId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.store_id == store)
    }

    pub fn store_voter(&self, store: StoreId) -> Option<&Peer> {
        self.store_peer(store).filter(|peer| peer.role.is_voter_like())
    }

    pub fn store_learner(&self, store: StoreId) -> Option<&Peer> {
        self.store_peer(store)
            .filter(|peer| peer.role == PeerRole::Learner)
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    pub fn pending_peer(&self, id: PeerId) -> Option<&Peer> {
        self.pending_peers.iter().find(|peer| peer.id == id)
    }

    pub fn leader_store_id(&self) -> Option<StoreId> {
        self.leader.map(|peer| peer.store_id)
    }

    pub fn voters(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|peer| peer.role.is_voter_like())
    }

    pub fn learners(&self) -> impl Iterator<Item = &Peer> {
        self.peers
            .iter()
            .filter(|peer| peer.role == PeerRole::Learner)
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|peer| peer.store_id).collect()
    }

    pub fn is_in_joint_state(&self) -> bool {
        self.peers.iter().any(|peer| peer.role.is_joint())
    }
}
