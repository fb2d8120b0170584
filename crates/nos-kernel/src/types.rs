//! Core identifiers shared across the kernel.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Address space identifier, the user-visible handle of a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u32);

impl SpaceId {
    /// Interpret a register value as a space id. Negative values are never ids.
    pub fn from_register(value: i32) -> Option<Self> {
        u32::try_from(value).ok().map(SpaceId)
    }

    /// The value handed back to user code in register 2.
    pub fn as_register(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a process came into existence.
///
/// Decides console lease handling: a top-level process acquires its own
/// lease and releases it at exit, descendants reference their creator's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnKind {
    /// Created by the kernel's program loader
    TopLevel,
    /// Created by Exec from the given parent
    Execed(SpaceId),
    /// Created by Fork from the given parent
    Forked(SpaceId),
}

impl SpawnKind {
    /// The creating process, if any.
    pub fn parent(&self) -> Option<SpaceId> {
        match self {
            SpawnKind::TopLevel => None,
            SpawnKind::Execed(parent) | SpawnKind::Forked(parent) => Some(*parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_id_from_register() {
        assert_eq!(SpaceId::from_register(7), Some(SpaceId(7)));
        assert_eq!(SpaceId::from_register(-1), None);
        assert_eq!(SpaceId(12).as_register(), 12);
    }

    #[test]
    fn test_spawn_kind_parent() {
        assert_eq!(SpawnKind::TopLevel.parent(), None);
        assert_eq!(SpawnKind::Execed(SpaceId(3)).parent(), Some(SpaceId(3)));
        assert_eq!(SpawnKind::Forked(SpaceId(4)).parent(), Some(SpaceId(4)));
    }
}
