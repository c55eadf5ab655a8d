//! Identity types for the scene
//!
//! Entity identifiers are allocated from a monotonically increasing
//! counter, so ordering by id is ordering by registration.

use std::fmt;

/// Entity identity - registration-ordered handle
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const ZERO: EntityId = EntityId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        EntityId(self.0 + 1)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a renderable frame owned by the render surface
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u64);

impl TextureHandle {
    #[inline]
    pub fn new(id: u64) -> Self {
        TextureHandle(id)
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tex({:x})", self.0)
    }
}
