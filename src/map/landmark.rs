//! Landmark - a 3D point estimate with appearance descriptors.

use nalgebra::Vector3;

use super::types::{AppearanceId, FrameId, LandmarkId};

/// Number of coordinate updates after which the estimate is trusted enough
/// to serve as an alignment target.
const MINIMUM_UPDATES_FOR_VALIDATION: u32 = 2;

/// A 3D landmark owned by the world map.
///
/// The coordinate estimate starts out unvalidated; residual models fall back
/// to the raw observed point (with extra down-weighting) until enough
/// triangulation updates have confirmed it.
#[derive(Debug, Clone)]
pub struct Landmark {
    /// Unique identifier.
    pub id: LandmarkId,

    /// Estimated 3D coordinates in the world frame.
    pub coordinates: Vector3<f64>,

    /// Whether the coordinate estimate is trustworthy as an alignment target.
    pub is_validated: bool,

    /// Whether the estimate was explicitly rejected after validation failed.
    /// Purification reclaims such landmarks.
    pub is_invalidated: bool,

    /// Appearance descriptors registered for this landmark, by handle.
    pub appearances: Vec<AppearanceId>,

    /// How many coordinate updates have been folded into the estimate.
    pub number_of_updates: u32,

    /// Frame that most recently observed this landmark.
    pub last_seen: Option<FrameId>,
}

impl Landmark {
    pub fn new(id: LandmarkId, coordinates: Vector3<f64>) -> Self {
        Self {
            id,
            coordinates,
            is_validated: false,
            is_invalidated: false,
            appearances: Vec::new(),
            number_of_updates: 1,
            last_seen: None,
        }
    }

    /// Fold a new coordinate measurement into the running estimate.
    ///
    /// The estimate becomes validated once enough updates agree on it.
    pub fn update_coordinates(&mut self, coordinates: Vector3<f64>) {
        let n = f64::from(self.number_of_updates);
        self.coordinates = (self.coordinates * n + coordinates) / (n + 1.0);
        self.number_of_updates += 1;
        if self.number_of_updates >= MINIMUM_UPDATES_FOR_VALIDATION {
            self.is_validated = true;
        }
    }

    /// Mark the coordinate estimate as untrustworthy.
    pub fn invalidate(&mut self) {
        self.is_validated = false;
        self.is_invalidated = true;
    }

    /// Rewrite an absorbed appearance handle to the surviving one after the
    /// descriptor index merged near-duplicates.
    ///
    /// Returns true if the handle was present.
    pub fn replace_appearance(&mut self, absorbed: AppearanceId, surviving: AppearanceId) -> bool {
        let mut replaced = false;
        for appearance in &mut self.appearances {
            if *appearance == absorbed {
                *appearance = surviving;
                replaced = true;
            }
        }
        // A merge may leave the surviving handle listed twice.
        if replaced {
            self.appearances.dedup();
        }
        replaced
    }
}
