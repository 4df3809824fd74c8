//! LocalMap - a contiguous span of frames plus its appearance set.

use nalgebra::Isometry3;

use super::types::{AppearanceId, BinaryDescriptor, FrameId, LandmarkId, LocalMapId};

/// One appearance descriptor submitted to place recognition, with a
/// back-reference to the landmark it was observed on.
#[derive(Debug, Clone)]
pub struct Appearance {
    /// Stable handle for this descriptor in the external index.
    pub id: AppearanceId,

    /// Landmark this descriptor belongs to.
    pub landmark: LandmarkId,

    /// The binary descriptor itself.
    pub descriptor: BinaryDescriptor,
}

/// A node of the map graph aggregating a contiguous span of frames.
///
/// Immutable once created, except for appearance-handle bookkeeping when the
/// external index merges near-duplicate descriptors.
#[derive(Debug, Clone)]
pub struct LocalMap {
    /// Unique identifier.
    pub id: LocalMapId,

    /// Frames consolidated into this local map, in temporal order.
    pub frames: Vec<FrameId>,

    /// Anchor pose: robot-to-world of the newest frame at creation time.
    pub robot_to_world: Isometry3<f64>,

    /// Appearance set submitted to place recognition.
    pub appearances: Vec<Appearance>,
}

impl LocalMap {
    pub fn new(
        id: LocalMapId,
        frames: Vec<FrameId>,
        robot_to_world: Isometry3<f64>,
        appearances: Vec<Appearance>,
    ) -> Self {
        Self {
            id,
            frames,
            robot_to_world,
            appearances,
        }
    }

    /// Rewrite an absorbed appearance handle to the surviving one.
    ///
    /// Returns the landmark owning the rewritten appearance, if present.
    pub fn replace_appearance(
        &mut self,
        absorbed: AppearanceId,
        surviving: AppearanceId,
    ) -> Option<LandmarkId> {
        for appearance in &mut self.appearances {
            if appearance.id == absorbed {
                appearance.id = surviving;
                return Some(appearance.landmark);
            }
        }
        None
    }
}
