//! Core identifier and descriptor types for the map structures.

/// Unique identifier for a frame within the world map.
///
/// Ids are assigned sequentially on creation and serve as lightweight
/// handles for cross-referencing without Arc/Rc, which keeps ownership
/// with the world map and avoids cyclic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

/// Unique identifier for a landmark within the world map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LandmarkId(pub u64);

/// Unique identifier for a local map within the world map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalMapId(pub u64);

/// Unique handle for one appearance descriptor submitted to the external
/// descriptor index.
///
/// Handles stay stable across index-internal merges: when the index absorbs
/// a near-duplicate descriptor, the absorbed handle is rewritten to the
/// surviving one everywhere it is referenced, so a dead handle is never
/// dereferenced again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppearanceId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl std::fmt::Display for LocalMapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LM{}", self.0)
    }
}

impl std::fmt::Display for AppearanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Number of bytes in a binary appearance descriptor (256 bits).
pub const DESCRIPTOR_SIZE_BYTES: usize = 32;

/// Compact binary feature signature used for place recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryDescriptor(pub [u8; DESCRIPTOR_SIZE_BYTES]);

impl BinaryDescriptor {
    /// All-zero descriptor, mostly useful in tests.
    pub fn zeros() -> Self {
        Self([0u8; DESCRIPTOR_SIZE_BYTES])
    }

    /// Hamming distance (number of differing bits) to another descriptor.
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}
