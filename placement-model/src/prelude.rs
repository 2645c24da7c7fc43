//! Convenience imports for crates consuming the model.

pub use crate::error::{ModelError, Result as ModelResult};
pub use crate::ids::{PeerId, RegionId, StoreId};
pub use crate::priority::{PriorityLevel, ResourceKind};
pub use crate::region::{Peer, PeerRole, RegionEpoch, RegionInfo};
