use placement_model::{PeerId, PeerRole, StoreId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    #[error("Unknown operator kind: {0}")]
    UnknownKind(String),

    #[error("Unknown operator status: {0}")]
    UnknownStatus(String),

    #[error("Peer does not exist on store {store}")]
    PeerNotFound { store: StoreId },

    #[error(
        "Peer {found} already exists on store {store}, the operator expects peer {expected}"
    )]
    PeerMismatch {
        store: StoreId,
        expected: PeerId,
        found: PeerId,
    },

    #[error("Peer {peer} on store {store} is a {actual}, expected {expected}")]
    UnexpectedRole {
        store: StoreId,
        peer: PeerId,
        actual: PeerRole,
        expected: &'static str,
    },

    #[error("Cannot remove or demote the leader peer on store {0}")]
    LeaderPeer(StoreId),

    #[error("Peer on store {0} is a witness and cannot hold leadership")]
    WitnessLeader(StoreId),

    #[error("Invalid operator config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
