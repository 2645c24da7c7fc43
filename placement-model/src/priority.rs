use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Scheduling priority of an operator. Ordered from least to most urgent so
/// callers can compare levels directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum PriorityLevel {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Urgent = 3,
}

impl PriorityLevel {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`PriorityLevel::as_u8`]; out-of-range values saturate to
    /// `Urgent`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PriorityLevel::Low,
            1 => PriorityLevel::Medium,
            2 => PriorityLevel::High,
            _ => PriorityLevel::Urgent,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PriorityLevel::Low => "low",
            PriorityLevel::Medium => "medium",
            PriorityLevel::High => "high",
            PriorityLevel::Urgent => "urgent",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PriorityLevel::Low),
            "medium" => Ok(PriorityLevel::Medium),
            "high" => Ok(PriorityLevel::High),
            "urgent" => Ok(PriorityLevel::Urgent),
            _ => Err(ModelError::UnknownPriority(s.to_string())),
        }
    }
}

/// The kind of store resource a history entry or influence refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ResourceKind {
    Leader,
    Region,
    Witness,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Leader => "leader",
            ResourceKind::Region => "region",
            ResourceKind::Witness => "witness",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leader" => Ok(ResourceKind::Leader),
            "region" => Ok(ResourceKind::Region),
            "witness" => Ok(ResourceKind::Witness),
            _ => Err(ModelError::UnknownResourceKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_levels_are_ordered() {
        assert!(PriorityLevel::Low < PriorityLevel::Medium);
        assert!(PriorityLevel::High < PriorityLevel::Urgent);
        assert_eq!(PriorityLevel::default(), PriorityLevel::Medium);
    }

    #[test]
    fn priority_u8_encoding_is_stable() {
        for level in [
            PriorityLevel::Low,
            PriorityLevel::Medium,
            PriorityLevel::High,
            PriorityLevel::Urgent,
        ] {
            assert_eq!(PriorityLevel::from_u8(level.as_u8()), level);
        }
        assert_eq!(PriorityLevel::from_u8(200), PriorityLevel::Urgent);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert_eq!("Urgent".parse::<PriorityLevel>(), Ok(PriorityLevel::Urgent));
        assert!(matches!(
            "critical".parse::<PriorityLevel>(),
            Err(ModelError::UnknownPriority(_))
        ));
        assert_eq!("witness".parse::<ResourceKind>(), Ok(ResourceKind::Witness));
    }
}
