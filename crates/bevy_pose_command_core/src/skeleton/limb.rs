use std::fmt;

use crate::ik::SolverKind;

/// Four-character tag naming a limb, such as `LftA` or `RgtL`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LimbHandle([u8; 4]);

impl LimbHandle {
    pub const fn new(tag: [u8; 4]) -> Self {
        Self(tag)
    }

    /// Builds a handle from a string of exactly four ASCII characters.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let bytes: [u8; 4] = tag.as_bytes().try_into().ok()?;
        bytes.is_ascii().then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for LimbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LimbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LimbHandle({self})")
    }
}

/// A joint chain that can be driven by an IK solver. The chain runs from the limb root to the
/// end effector, each joint being the parent of the next.
#[derive(Clone, Debug, PartialEq)]
pub struct LimbDefinition {
    pub handle: LimbHandle,
    pub solver: SolverKind,
    pub chain: Vec<u16>,
}

impl LimbDefinition {
    pub fn root(&self) -> Option<usize> {
        self.chain.first().map(|joint| *joint as usize)
    }

    pub fn end_effector(&self) -> Option<usize> {
        self.chain.last().map(|joint| *joint as usize)
    }
}
