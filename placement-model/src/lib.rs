//! Core data model definitions shared across the placement crates.
//!
//! These are plain snapshots of what the cluster heartbeat layer observed:
//! stores, regions, and the peers that replicate a region. Nothing in here
//! mutates shared state; the operator engine in `placement-core` only reads
//! these values.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod prelude;
pub mod priority;
pub mod region;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use ids::{PeerId, RegionId, StoreId};
pub use priority::{PriorityLevel, ResourceKind};
pub use region::{Peer, PeerRole, RegionEpoch, RegionInfo};
