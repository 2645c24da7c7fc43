use std::fmt::{self, Display};

use crate::ids::{PeerId, StoreId};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    DuplicateStore(StoreId),
    DuplicatePeer(PeerId),
    UnknownRole(String),
    UnknownResourceKind(String),
    UnknownPriority(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::DuplicateStore(store) => {
                write!(f, "region already has a peer on store {store}")
            }
            ModelError::DuplicatePeer(peer) => {
                write!(f, "peer {peer} appears more than once")
            }
            ModelError::UnknownRole(raw) => write!(f, "unknown peer role: {raw}"),
            ModelError::UnknownResourceKind(raw) => {
                write!(f, "unknown resource kind: {raw}")
            }
            ModelError::UnknownPriority(raw) => {
                write!(f, "unknown priority level: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
