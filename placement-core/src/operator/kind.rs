use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::OperatorError;

/// Bitmask of purpose tags describing why an operator exists. An operator
/// usually carries more than one tag, e.g. `REGION | REPLICA`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpKind(u32);

const KIND_NAMES: [(OpKind, &str); 9] = [
    (OpKind::LEADER, "leader"),
    (OpKind::REGION, "region"),
    (OpKind::SPLIT, "split"),
    (OpKind::ADMIN, "admin"),
    (OpKind::HOT_REGION, "hot-region"),
    (OpKind::REPLICA, "replica"),
    (OpKind::MERGE, "merge"),
    (OpKind::RANGE, "range"),
    (OpKind::WITNESS, "witness"),
];

impl OpKind {
    /// Includes a leader transfer.
    pub const LEADER: OpKind = OpKind(1 << 0);
    /// Includes peer addition or removal.
    pub const REGION: OpKind = OpKind(1 << 1);
    /// Includes a region split.
    pub const SPLIT: OpKind = OpKind(1 << 2);
    /// Requested by an administrator; runs at urgent priority.
    pub const ADMIN: OpKind = OpKind(1 << 3);
    /// Created by the hot-region scheduler.
    pub const HOT_REGION: OpKind = OpKind(1 << 4);
    /// Repairs missing or misplaced replicas.
    pub const REPLICA: OpKind = OpKind(1 << 5);
    /// Includes a region merge.
    pub const MERGE: OpKind = OpKind(1 << 6);
    /// Created by the range scheduler.
    pub const RANGE: OpKind = OpKind(1 << 7);
    /// Switches peers between witness and full replica.
    pub const WITNESS: OpKind = OpKind(1 << 8);

    const ALL_BITS: u32 = (1 << 9) - 1;

    pub const fn empty() -> Self {
        OpKind(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Drops bits that do not name a known kind.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        OpKind(bits & Self::ALL_BITS)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: OpKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: OpKind) -> bool {
        self.0 & other.0 != 0
    }

    /// Lowest set bit, used when a caller needs one representative kind.
    /// `REGION | HOT_REGION` resolves to `REGION`.
    pub const fn lowest_bit(self) -> OpKind {
        OpKind(self.0 & self.0.wrapping_neg())
    }

    pub fn iter(self) -> impl Iterator<Item = OpKind> {
        KIND_NAMES
            .into_iter()
            .map(|(kind, _)| kind)
            .filter(move |kind| self.contains(*kind))
    }
}

impl BitOr for OpKind {
    type Output = OpKind;

    fn bitor(self, rhs: OpKind) -> OpKind {
        OpKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpKind {
    fn bitor_assign(&mut self, rhs: OpKind) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for OpKind {
    type Output = OpKind;

    fn bitand(self, rhs: OpKind) -> OpKind {
        OpKind(self.0 & rhs.0)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, name) in KIND_NAMES {
            if self.contains(kind) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("unknown")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpKind({self})")
    }
}

impl FromStr for OpKind {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kind = OpKind::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (bit, _) = KIND_NAMES
                .iter()
                .find(|(_, name)| *name == part)
                .ok_or_else(|| OperatorError::UnknownKind(part.to_string()))?;
            kind |= *bit;
        }
        Ok(kind)
    }
}

impl Serialize for OpKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_bit_picks_highest_priority_kind() {
        let kind = OpKind::REGION | OpKind::SPLIT;
        assert_eq!(kind.lowest_bit(), OpKind::REGION);
        let kind = OpKind::LEADER | OpKind::SPLIT;
        assert_eq!(kind.lowest_bit(), OpKind::LEADER);
        assert_eq!(OpKind::SPLIT.lowest_bit(), OpKind::SPLIT);
        assert_eq!(OpKind::empty().lowest_bit(), OpKind::empty());
    }

    #[test]
    fn display_and_parse_agree() {
        let kind = OpKind::ADMIN | OpKind::HOT_REGION | OpKind::LEADER;
        assert_eq!(kind.to_string(), "leader,admin,hot-region");
        assert_eq!("leader, admin,hot-region".parse::<OpKind>(), Ok(kind));
        assert_eq!(OpKind::empty().to_string(), "unknown");
        assert_eq!(
            "leader,teleport".parse::<OpKind>(),
            Err(OperatorError::UnknownKind("teleport".to_string()))
        );
    }

    #[test]
    fn contains_and_iter_walk_set_bits() {
        let kind = OpKind::REGION | OpKind::REPLICA;
        assert!(kind.contains(OpKind::REPLICA));
        assert!(!kind.contains(OpKind::REPLICA | OpKind::ADMIN));
        assert!(kind.intersects(OpKind::REPLICA | OpKind::ADMIN));
        assert_eq!(kind.iter().collect::<Vec<_>>(), vec![OpKind::REGION, OpKind::REPLICA]);
        assert_eq!(OpKind::from_bits_truncate(u32::MAX).iter().count(), 9);
    }

    #[test]
    fn serializes_as_names() {
        let json = serde_json::to_string(&(OpKind::MERGE | OpKind::RANGE)).unwrap();
        assert_eq!(json, "\"merge,range\"");
        let back: OpKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OpKind::MERGE | OpKind::RANGE);
    }
}
