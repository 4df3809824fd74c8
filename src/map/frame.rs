//! Frame - one processed camera frame with its tracked points.

use nalgebra::{Isometry3, Vector3};

use super::types::{BinaryDescriptor, FrameId, LandmarkId};

/// One tracked 2D/3D feature point inside a frame, as delivered by the
/// external frontend.
#[derive(Debug, Clone)]
pub struct FramePoint {
    /// Observed image coordinates plus depth: (u, v, d).
    pub image_coordinates: Vector3<f64>,

    /// Observed point in the camera frame.
    pub camera_coordinates: Vector3<f64>,

    /// Observed point in the world frame (from the frame pose at creation).
    pub world_coordinates: Vector3<f64>,

    /// Appearance descriptor extracted for this observation, if any.
    pub descriptor: Option<BinaryDescriptor>,

    /// Backward link to the same track in the previous frame, as
    /// (frame, point index).
    pub previous: Option<(FrameId, usize)>,

    /// Landmark this point has been promoted to, if any.
    pub landmark: Option<LandmarkId>,
}

/// A camera frame in the temporal chain, owned by the world map.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique identifier.
    pub id: FrameId,

    /// Sequence number assigned by the frontend.
    pub sequence_number: u64,

    /// Estimated robot-to-world rigid transform.
    pub robot_to_world: Isometry3<f64>,

    /// Currently active tracked points.
    pub points: Vec<FramePoint>,

    /// Predecessor in the temporal chain.
    pub previous: Option<FrameId>,
}

impl Frame {
    pub fn new(
        id: FrameId,
        sequence_number: u64,
        robot_to_world: Isometry3<f64>,
        previous: Option<FrameId>,
    ) -> Self {
        Self {
            id,
            sequence_number,
            robot_to_world,
            points: Vec::new(),
            previous,
        }
    }

    /// Landmarks linked by this frame's active points.
    pub fn observed_landmarks(&self) -> impl Iterator<Item = LandmarkId> + '_ {
        self.points.iter().filter_map(|point| point.landmark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_landmarks() {
        let mut frame = Frame::new(FrameId(0), 0, Isometry3::identity(), None);
        frame.points.push(FramePoint {
            image_coordinates: Vector3::zeros(),
            camera_coordinates: Vector3::zeros(),
            world_coordinates: Vector3::zeros(),
            descriptor: None,
            previous: None,
            landmark: Some(LandmarkId(3)),
        });
        frame.points.push(FramePoint {
            image_coordinates: Vector3::zeros(),
            camera_coordinates: Vector3::zeros(),
            world_coordinates: Vector3::zeros(),
            descriptor: None,
            previous: None,
            landmark: None,
        });

        let observed: Vec<_> = frame.observed_landmarks().collect();
        assert_eq!(observed, vec![LandmarkId(3)]);
    }
}
