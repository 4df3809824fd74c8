//! Trajectory export in the KITTI odometry benchmark format.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::map::WorldMap;

/// Write one line per frame, in sequence order: the 12 values of the 3x4
/// row-major robot-to-world transform.
pub fn write_trajectory(world_map: &WorldMap, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create trajectory file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let frames = world_map.frames_in_order();
    for frame in &frames {
        let matrix = frame.robot_to_world.to_homogeneous();
        let mut values = Vec::with_capacity(12);
        for row in 0..3 {
            for column in 0..4 {
                values.push(format!("{}", matrix[(row, column)]));
            }
        }
        writeln!(writer, "{}", values.join(" "))
            .with_context(|| format!("failed to write trajectory to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush trajectory to {}", path.display()))?;

    info!(frames = frames.len(), path = %path.display(), "trajectory written");
    Ok(())
}
