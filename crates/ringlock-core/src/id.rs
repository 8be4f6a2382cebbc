//! Strongly-typed identifiers for agents and resources.

use std::fmt;

/// Identifies an agent by its position around the ring.
///
/// `AgentId(i)` sits between resource `i` (its left) and resource
/// `(i + 1) mod N` (its right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Position of this agent as a slice index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a resource by its ring position.
///
/// The derived `Ord` is the global total order used by ordered acquisition:
/// lower ids are always taken before higher ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// Position of this resource as a slice index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ResourceId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_order_follows_position() {
        assert!(ResourceId(0) < ResourceId(4));
        assert_eq!(ResourceId(3).min(ResourceId(1)), ResourceId(1));
    }

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(AgentId(7).to_string(), "7");
        assert_eq!(ResourceId::from(2).to_string(), "2");
        assert_eq!(AgentId::from(5).index(), 5);
    }
}
