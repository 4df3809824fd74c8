//! WorldMap - owner of all frames, landmarks and local maps.
//!
//! The world map accumulates a sliding window of frames and decides when it
//! crystallizes into a new local map, applies verified loop closures as
//! graph corrections, and garbage-collects landmarks that are no longer
//! useful.

use std::collections::{BTreeMap, HashMap};

use nalgebra::Isometry3;
use tracing::{debug, info, warn};

use crate::config::{PurificationConfig, SegmentationConfig};

use super::frame::{Frame, FramePoint};
use super::landmark::Landmark;
use super::local_map::{Appearance, LocalMap};
use super::types::{AppearanceId, FrameId, LandmarkId, LocalMapId};

/// A loop-closure correction that has been fused into the map graph.
#[derive(Debug, Clone)]
pub struct ClosureEdge {
    pub query: LocalMapId,
    pub reference: LocalMapId,
    pub query_to_reference: Isometry3<f64>,
}

/// Owner of all map entities and the segmentation/lifecycle policy.
pub struct WorldMap {
    frames: HashMap<FrameId, Frame>,
    landmarks: HashMap<LandmarkId, Landmark>,
    local_maps: HashMap<LocalMapId, LocalMap>,

    /// Creation order of local maps; ids are monotonic in time.
    local_map_order: Vec<LocalMapId>,

    next_frame_id: u64,
    next_landmark_id: u64,
    next_local_map_id: u64,
    next_appearance_id: u64,

    root_frame: Option<FrameId>,
    current_frame: Option<FrameId>,
    previous_frame: Option<FrameId>,

    /// Last pose confirmed by tracking or a relocalization correction.
    last_good_robot_pose: Isometry3<f64>,
    relocalized: bool,

    /// Window accumulators since the last local-map boundary.
    distance_traveled_window: f64,
    rotation_accumulated_window: f64,

    /// Frames buffered for the next local map.
    frame_queue: Vec<FrameId>,

    /// Closure corrections applied so far.
    closure_edges: Vec<ClosureEdge>,

    segmentation: SegmentationConfig,
    purification: PurificationConfig,
}

impl WorldMap {
    pub fn new(segmentation: SegmentationConfig, purification: PurificationConfig) -> Self {
        Self {
            frames: HashMap::new(),
            landmarks: HashMap::new(),
            local_maps: HashMap::new(),
            local_map_order: Vec::new(),
            next_frame_id: 0,
            next_landmark_id: 0,
            next_local_map_id: 0,
            next_appearance_id: 0,
            root_frame: None,
            current_frame: None,
            previous_frame: None,
            last_good_robot_pose: Isometry3::identity(),
            relocalized: false,
            distance_traveled_window: 0.0,
            rotation_accumulated_window: 0.0,
            frame_queue: Vec::new(),
            closure_edges: Vec::new(),
            segmentation,
            purification,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────────────

    /// Allocate a new frame linked to the current frame as predecessor.
    ///
    /// Updates the window accumulators with the translational and rotational
    /// motion relative to the previous frame, and buffers the frame for the
    /// next local map.
    pub fn create_frame(
        &mut self,
        robot_to_world: Isometry3<f64>,
        sequence_number: u64,
    ) -> FrameId {
        let id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;

        let previous = self.current_frame;
        if let Some(previous_id) = previous {
            let previous_pose = self.frames[&previous_id].robot_to_world;
            let delta = previous_pose.inverse() * robot_to_world;
            self.distance_traveled_window += delta.translation.vector.norm();
            self.rotation_accumulated_window += delta.rotation.angle();
        }

        let frame = Frame::new(id, sequence_number, robot_to_world, previous);
        if self.root_frame.is_none() {
            self.root_frame = Some(id);
        }
        self.previous_frame = previous;
        self.current_frame = Some(id);
        self.frame_queue.push(id);
        self.frames.insert(id, frame);
        id
    }

    /// Attach a tracked point to a frame, updating landmark recency.
    pub fn add_frame_point(&mut self, frame_id: FrameId, point: FramePoint) {
        if let Some(landmark_id) = point.landmark {
            if let Some(landmark) = self.landmarks.get_mut(&landmark_id) {
                landmark.last_seen = Some(frame_id);
            }
        }
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.points.push(point);
        } else {
            warn!(frame = %frame_id, "add_frame_point: unknown frame");
        }
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id)
    }

    /// Frames sorted by sequence number, for trajectory export.
    pub fn frames_in_order(&self) -> Vec<&Frame> {
        let mut frames: Vec<&Frame> = self.frames.values().collect();
        frames.sort_by_key(|frame| frame.sequence_number);
        frames
    }

    pub fn root_frame(&self) -> Option<FrameId> {
        self.root_frame
    }

    pub fn current_frame(&self) -> Option<FrameId> {
        self.current_frame
    }

    pub fn previous_frame(&self) -> Option<FrameId> {
        self.previous_frame
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Landmarks
    // ─────────────────────────────────────────────────────────────────────

    /// Promote a triangulated point to a landmark.
    pub fn create_landmark(&mut self, coordinates: nalgebra::Vector3<f64>) -> LandmarkId {
        let id = LandmarkId(self.next_landmark_id);
        self.next_landmark_id += 1;
        self.landmarks.insert(id, Landmark::new(id, coordinates));
        id
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.get_mut(&id)
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Reclaim landmarks that failed validation or have not been observed
    /// within the purification horizon, unless a local-map appearance still
    /// anchors them. Stale frame-point links are cleared alongside.
    ///
    /// Returns the number of landmarks removed.
    pub fn purify_landmarks(&mut self) -> usize {
        let horizon = self.current_frame.map_or(0, |frame| frame.0);
        let maximum_unseen = self.purification.maximum_frames_unseen;

        let to_remove: Vec<LandmarkId> = self
            .landmarks
            .values()
            .filter(|landmark| {
                if !landmark.appearances.is_empty() {
                    return false;
                }
                if landmark.is_invalidated {
                    return true;
                }
                let unseen = match landmark.last_seen {
                    Some(frame) => horizon.saturating_sub(frame.0),
                    None => horizon,
                };
                unseen > maximum_unseen
            })
            .map(|landmark| landmark.id)
            .collect();

        for id in &to_remove {
            self.landmarks.remove(id);
        }

        if !to_remove.is_empty() {
            for frame in self.frames.values_mut() {
                for point in &mut frame.points {
                    if let Some(landmark) = point.landmark {
                        if !self.landmarks.contains_key(&landmark) {
                            point.landmark = None;
                        }
                    }
                }
            }
            debug!(removed = to_remove.len(), "purified landmarks");
        }

        to_remove.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Local maps
    // ─────────────────────────────────────────────────────────────────────

    /// Consolidate the buffered frame window into a new local map if the
    /// segmentation trigger fires.
    ///
    /// The trigger fires when enough translation or rotation accumulated
    /// since the last boundary AND the buffer holds the minimum number of
    /// frames. On firing the window accumulators are reset and the buffer
    /// cleared.
    pub fn create_local_map(&mut self) -> Option<LocalMapId> {
        let moved_enough = self.distance_traveled_window
            >= self.segmentation.minimum_distance_traveled
            || self.rotation_accumulated_window >= self.segmentation.minimum_rotation_accumulated;
        if !moved_enough || self.frame_queue.len() < self.segmentation.minimum_number_of_frames {
            return None;
        }

        // One appearance per landmark observed in the window; the newest
        // descriptor wins. BTreeMap keeps the appearance order deterministic.
        let mut descriptors = BTreeMap::new();
        for frame_id in &self.frame_queue {
            for point in &self.frames[frame_id].points {
                if let (Some(landmark), Some(descriptor)) = (point.landmark, point.descriptor) {
                    if self.landmarks.contains_key(&landmark) {
                        descriptors.insert(landmark, descriptor);
                    }
                }
            }
        }

        let anchor_frame = *self.frame_queue.last()?;
        let anchor_pose = self.frames[&anchor_frame].robot_to_world;

        let id = LocalMapId(self.next_local_map_id);
        self.next_local_map_id += 1;

        let mut appearances = Vec::with_capacity(descriptors.len());
        for (landmark_id, descriptor) in descriptors {
            let handle = AppearanceId(self.next_appearance_id);
            self.next_appearance_id += 1;
            appearances.push(Appearance {
                id: handle,
                landmark: landmark_id,
                descriptor,
            });
            if let Some(landmark) = self.landmarks.get_mut(&landmark_id) {
                landmark.appearances.push(handle);
            }
        }

        let frames = std::mem::take(&mut self.frame_queue);
        debug!(
            local_map = %id,
            frames = frames.len(),
            appearances = appearances.len(),
            distance = self.distance_traveled_window,
            rotation = self.rotation_accumulated_window,
            "created local map"
        );

        self.local_maps
            .insert(id, LocalMap::new(id, frames, anchor_pose, appearances));
        self.local_map_order.push(id);
        self.distance_traveled_window = 0.0;
        self.rotation_accumulated_window = 0.0;
        Some(id)
    }

    pub fn local_map(&self, id: LocalMapId) -> Option<&LocalMap> {
        self.local_maps.get(&id)
    }

    pub fn local_map_mut(&mut self, id: LocalMapId) -> Option<&mut LocalMap> {
        self.local_maps.get_mut(&id)
    }

    /// Local map ids in creation order.
    pub fn local_map_ids(&self) -> &[LocalMapId] {
        &self.local_map_order
    }

    pub fn current_local_map(&self) -> Option<LocalMapId> {
        self.local_map_order.last().copied()
    }

    pub fn num_local_maps(&self) -> usize {
        self.local_map_order.len()
    }

    /// Apply a verified relative transform between two local maps recognized
    /// as the same place.
    ///
    /// Re-anchors the query local map onto the reference and propagates the
    /// correction to every frame from the query span onward, so the current
    /// pose estimate jumps onto the corrected branch of the graph.
    pub fn close_local_maps(
        &mut self,
        query: LocalMapId,
        reference: LocalMapId,
        query_to_reference: &Isometry3<f64>,
    ) -> bool {
        let Some(reference_pose) = self.local_maps.get(&reference).map(|m| m.robot_to_world)
        else {
            warn!(local_map = %reference, "close_local_maps: unknown reference");
            return false;
        };
        let Some(query_map) = self.local_maps.get(&query) else {
            warn!(local_map = %query, "close_local_maps: unknown query");
            return false;
        };

        let corrected = reference_pose * query_to_reference;
        let correction = corrected * query_map.robot_to_world.inverse();
        let first_corrected_frame = query_map.frames.first().copied();

        if let Some(first) = first_corrected_frame {
            for frame in self.frames.values_mut() {
                if frame.id >= first {
                    frame.robot_to_world = correction * frame.robot_to_world;
                }
            }
            for local_map in self.local_maps.values_mut() {
                if local_map.id >= query {
                    local_map.robot_to_world = correction * local_map.robot_to_world;
                }
            }
        }

        if let Some(current) = self.current_frame {
            self.last_good_robot_pose = self.frames[&current].robot_to_world;
        }
        self.closure_edges.push(ClosureEdge {
            query,
            reference,
            query_to_reference: *query_to_reference,
        });
        self.relocalized = true;
        info!(query = %query, reference = %reference, "closed local maps");
        true
    }

    pub fn closure_edges(&self) -> &[ClosureEdge] {
        &self.closure_edges
    }

    // ─────────────────────────────────────────────────────────────────────
    // Window / localization state
    // ─────────────────────────────────────────────────────────────────────

    /// Clear the segmentation accumulators and the buffered frame queue.
    /// Called after a relocalization jump to avoid spurious re-segmentation.
    pub fn reset_window(&mut self) {
        self.distance_traveled_window = 0.0;
        self.rotation_accumulated_window = 0.0;
        self.frame_queue.clear();
    }

    pub fn distance_traveled_window(&self) -> f64 {
        self.distance_traveled_window
    }

    pub fn rotation_accumulated_window(&self) -> f64 {
        self.rotation_accumulated_window
    }

    pub fn frame_queue_len(&self) -> usize {
        self.frame_queue.len()
    }

    pub fn relocalized(&self) -> bool {
        self.relocalized
    }

    pub fn last_good_robot_pose(&self) -> Isometry3<f64> {
        self.last_good_robot_pose
    }

    pub fn set_last_good_robot_pose(&mut self, pose: Isometry3<f64>) {
        self.last_good_robot_pose = pose;
    }

    /// Drop all owned entities and reset the lifecycle state.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.landmarks.clear();
        self.local_maps.clear();
        self.local_map_order.clear();
        self.frame_queue.clear();
        self.closure_edges.clear();
        self.root_frame = None;
        self.current_frame = None;
        self.previous_frame = None;
        self.relocalized = false;
        self.distance_traveled_window = 0.0;
        self.rotation_accumulated_window = 0.0;
        self.last_good_robot_pose = Isometry3::identity();
    }
}

impl Default for WorldMap {
    fn default() -> Self {
        Self::new(SegmentationConfig::default(), PurificationConfig::default())
    }
}

impl std::fmt::Debug for WorldMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldMap")
            .field("num_frames", &self.frames.len())
            .field("num_landmarks", &self.landmarks.len())
            .field("num_local_maps", &self.local_map_order.len())
            .finish()
    }
}
