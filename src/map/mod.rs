//! Map entities and the world map that owns them.
//!
//! All cross-references between frames, landmarks and local maps are
//! expressed as typed identifiers into arenas owned by the [`WorldMap`],
//! never as direct references. This keeps ownership unambiguous and makes
//! the graph trivially checkpointable.

pub mod frame;
pub mod landmark;
pub mod local_map;
pub mod types;
pub mod world_map;

pub use frame::{Frame, FramePoint};
pub use landmark::Landmark;
pub use local_map::{Appearance, LocalMap};
pub use types::{
    AppearanceId, BinaryDescriptor, FrameId, LandmarkId, LocalMapId, DESCRIPTOR_SIZE_BYTES,
};
pub use world_map::{ClosureEdge, WorldMap};
